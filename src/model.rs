//! Core domain types: sources, issues, and their derived scores.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Fallback category for anything the summarizer can't place.
pub const DEFAULT_CATEGORY: &str = "Other";

/// Default importance score when the summarizer produced nothing.
pub const DEFAULT_IMPORTANCE: f64 = 50.0;

/// Derived three-tier importance bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportanceLevel {
    High,
    Medium,
    Low,
}

impl ImportanceLevel {
    /// Pure function of the importance score: >= 70 high, >= 40 medium, else low.
    pub fn from_score(score: f64) -> Self {
        if score >= 70.0 {
            ImportanceLevel::High
        } else if score >= 40.0 {
            ImportanceLevel::Medium
        } else {
            ImportanceLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImportanceLevel::High => "high",
            ImportanceLevel::Medium => "medium",
            ImportanceLevel::Low => "low",
        }
    }
}

impl std::str::FromStr for ImportanceLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s {
            "high" => Ok(ImportanceLevel::High),
            "low" => Ok(ImportanceLevel::Low),
            _ => Ok(ImportanceLevel::Medium),
        }
    }
}

/// Derived external-attention level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuzzLevel {
    High,
    Medium,
    #[default]
    Low,
}

impl BuzzLevel {
    /// >= 20 total mentions is high, >= 5 medium, else low.
    pub fn from_mentions(total: u32) -> Self {
        if total >= 20 {
            BuzzLevel::High
        } else if total >= 5 {
            BuzzLevel::Medium
        } else {
            BuzzLevel::Low
        }
    }
}

/// Mention counts from external signal sources plus the derived buzz level.
///
/// Serialized as camelCase JSON — this is both the wire format and the
/// format stored in the `social_score` column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SocialScore {
    pub hn_mentions: u32,
    pub reddit_mentions: u32,
    pub total_buzz: BuzzLevel,
}

impl SocialScore {
    pub fn new(hn_mentions: u32, reddit_mentions: u32) -> Self {
        Self {
            hn_mentions,
            reddit_mentions,
            total_buzz: BuzzLevel::from_mentions(hn_mentions + reddit_mentions),
        }
    }
}

/// A tracked newsletter sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: String,
    pub sender_email: String,
    pub sender_name: String,
    pub domain: String,
    pub category: String,
    pub credibility_score: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Source {
    /// Derive the stable source id from a sender email.
    ///
    /// Must be reproducible across runs so re-discovery of the same sender
    /// never creates a duplicate row. Hashing the full address keeps the
    /// id fixed-length without collapsing senders that share a prefix.
    pub fn derive_id(sender_email: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(sender_email.as_bytes());
        let digest = hasher.finalize();
        format!("src_{}", URL_SAFE_NO_PAD.encode(&digest[..12]))
    }

    /// Build a freshly-detected source with default category and credibility.
    pub fn detected(sender_email: &str, sender_name: &str, domain: &str) -> Self {
        Self {
            id: Self::derive_id(sender_email),
            sender_email: sender_email.to_string(),
            sender_name: sender_name.to_string(),
            domain: domain.to_string(),
            category: DEFAULT_CATEGORY.to_string(),
            credibility_score: 50.0,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

/// One stored, enriched newsletter message.
///
/// Identity equals the originating mailbox message id, which makes
/// the upsert naturally idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: String,
    pub source_id: String,
    pub subject: String,
    pub received_at: DateTime<Utc>,
    pub raw_html: String,
    pub cleaned_text: String,

    // AI-derived
    pub summary: String,
    pub key_points: Vec<String>,
    pub why_it_matters: String,
    pub category: String,
    pub tags: Vec<String>,

    // Scoring
    pub importance_score: f64,
    pub importance_level: ImportanceLevel,
    pub social_score: SocialScore,

    // User state — survives re-sync
    pub is_read: bool,
    pub is_saved: bool,
}

/// Output of the summarization collaborator.
///
/// Lenient on missing fields so a partial JSON response still yields
/// usable defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SummarizeResult {
    pub summary: String,
    pub key_points: Vec<String>,
    pub why_it_matters: String,
    pub category: String,
    pub tags: Vec<String>,
    pub importance_score: f64,
}

impl Default for SummarizeResult {
    fn default() -> Self {
        Self {
            summary: String::new(),
            key_points: Vec::new(),
            why_it_matters: String::new(),
            category: DEFAULT_CATEGORY.to_string(),
            tags: Vec::new(),
            importance_score: DEFAULT_IMPORTANCE,
        }
    }
}

/// Remove duplicate tags while keeping first-seen order.
pub fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.into_iter().filter(|t| seen.insert(t.clone())).collect()
}
