//! HTTP surface — REST API consumed by the presentation layer.

pub mod routes;

pub use routes::{AppState, api_routes};
