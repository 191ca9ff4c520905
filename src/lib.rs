//! inboxbrief — newsletter ingestion, enrichment, and digest service.

pub mod aggregate;
pub mod config;
pub mod detector;
pub mod enrich;
pub mod error;
pub mod mailbox;
pub mod model;
pub mod server;
pub mod store;
pub mod sync;
