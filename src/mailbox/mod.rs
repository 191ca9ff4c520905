//! Mailbox collaborator — message listing and fetch.
//!
//! The sync pipeline only sees this trait; the Gmail REST implementation
//! lives in [`gmail`]. Tests substitute an in-memory implementation.

pub mod gmail;

pub use gmail::GmailMailbox;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::MailboxError;

/// A fetched message with its lower-cased header map.
///
/// The header map carries at least `list-unsubscribe`, `list-id`,
/// `precedence`, and `x-mailer` when present on the wire, which is
/// everything the detector looks at.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub id: String,
    pub subject: String,
    /// Full From header, e.g. `Jane Doe <jane@example.com>`.
    pub from: String,
    pub date: DateTime<Utc>,
    pub raw_html: String,
    pub cleaned_text: String,
    pub headers: HashMap<String, String>,
}

/// A distinct sender seen in the inbox, with how often it appeared.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderInfo {
    /// Full `Name <email>` header string.
    pub from: String,
    pub name: String,
    pub email: String,
    pub domain: String,
    pub count: u32,
}

/// Read-only access to the user's mailbox.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// List candidate message ids matching `query`, newest first.
    async fn list_candidate_ids(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<String>, MailboxError>;

    /// Fetch and parse one message.
    async fn fetch_message(&self, id: &str) -> Result<RawMessage, MailboxError>;

    /// Aggregate recent inbox senders by email, most frequent first.
    async fn list_senders(&self, max_results: u32) -> Result<Vec<SenderInfo>, MailboxError>;
}
