//! Gmail REST implementation of the [`Mailbox`] trait.
//!
//! Fetches messages in `format=raw`, base64url-decodes the payload, and
//! parses it with `mail-parser`. Auth is a bearer access token supplied
//! by the environment — token acquisition/refresh is out of scope.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use mail_parser::MessageParser;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use super::{Mailbox, RawMessage, SenderInfo};
use crate::error::MailboxError;

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Gmail REST mailbox client.
pub struct GmailMailbox {
    client: reqwest::Client,
    access_token: SecretString,
    base_url: String,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Deserialize)]
struct RawMessageResponse {
    raw: Option<String>,
}

#[derive(Deserialize)]
struct MetadataResponse {
    payload: Option<MetadataPayload>,
}

#[derive(Deserialize)]
struct MetadataPayload {
    #[serde(default)]
    headers: Vec<MetadataHeader>,
}

#[derive(Deserialize)]
struct MetadataHeader {
    name: String,
    value: String,
}

impl GmailMailbox {
    pub fn new(access_token: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            access_token,
            base_url: GMAIL_API_BASE.to_string(),
        }
    }

    /// Point the client at a different API base (test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, MailboxError> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await
            .map_err(|e| MailboxError::RequestFailed(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(MailboxError::AuthFailed("access token rejected".into()));
        }
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(MailboxError::NotFound(url.to_string()));
        }

        resp.error_for_status()
            .map_err(|e| MailboxError::RequestFailed(e.to_string()))?
            .json::<T>()
            .await
            .map_err(|e| MailboxError::RequestFailed(e.to_string()))
    }
}

#[async_trait]
impl Mailbox for GmailMailbox {
    async fn list_candidate_ids(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<String>, MailboxError> {
        let url = format!("{}/messages", self.base_url);
        let max = max_results.to_string();
        let resp: ListResponse = self
            .get_json(&url, &[("q", query), ("maxResults", &max)])
            .await?;

        Ok(resp.messages.into_iter().map(|m| m.id).collect())
    }

    async fn fetch_message(&self, id: &str) -> Result<RawMessage, MailboxError> {
        let url = format!("{}/messages/{}", self.base_url, id);
        let resp: RawMessageResponse = self.get_json(&url, &[("format", "raw")]).await?;

        let raw_b64 = resp.raw.ok_or_else(|| MailboxError::InvalidPayload {
            id: id.to_string(),
            reason: "missing raw payload".into(),
        })?;
        let raw = URL_SAFE_NO_PAD
            .decode(raw_b64.trim_end_matches('='))
            .map_err(|e| MailboxError::InvalidPayload {
                id: id.to_string(),
                reason: format!("base64 decode failed: {e}"),
            })?;

        parse_rfc822(id, &raw)
    }

    async fn list_senders(&self, max_results: u32) -> Result<Vec<SenderInfo>, MailboxError> {
        let ids = self.list_candidate_ids("in:inbox", max_results).await?;
        debug!(count = ids.len(), "Scanning inbox senders");

        // Fetch From metadata in parallel batches of 20.
        let mut sender_map: HashMap<String, SenderInfo> = HashMap::new();
        let mut order: Vec<String> = Vec::new();

        for batch in ids.chunks(20) {
            let fetches = batch.iter().map(|id| {
                let url = format!("{}/messages/{}", self.base_url, id);
                async move {
                    self.get_json::<MetadataResponse>(
                        &url,
                        &[("format", "metadata"), ("metadataHeaders", "From")],
                    )
                    .await
                }
            });

            for result in futures::future::join_all(fetches).await {
                // A single failed metadata fetch is skipped, not fatal
                let Ok(resp) = result else { continue };
                let Some(from) = resp.payload.and_then(|p| {
                    p.headers
                        .into_iter()
                        .find(|h| h.name.eq_ignore_ascii_case("from"))
                        .map(|h| h.value)
                }) else {
                    continue;
                };

                let email = crate::detector::sender_email(&from);
                let name = crate::detector::sender_display_name(&from);
                let domain = crate::detector::sender_domain(&email);
                if email.is_empty() || domain.is_empty() {
                    continue;
                }

                match sender_map.get_mut(&email) {
                    Some(info) => info.count += 1,
                    None => {
                        order.push(email.clone());
                        sender_map.insert(
                            email.clone(),
                            SenderInfo {
                                from,
                                name,
                                email,
                                domain,
                                count: 1,
                            },
                        );
                    }
                }
            }
        }

        let mut senders: Vec<SenderInfo> = order
            .into_iter()
            .filter_map(|email| sender_map.remove(&email))
            .collect();
        senders.sort_by(|a, b| b.count.cmp(&a.count));
        Ok(senders)
    }
}

/// Parse a raw RFC 822 message into our `RawMessage`.
pub fn parse_rfc822(id: &str, raw: &[u8]) -> Result<RawMessage, MailboxError> {
    let parsed =
        MessageParser::default()
            .parse(raw)
            .ok_or_else(|| MailboxError::InvalidPayload {
                id: id.to_string(),
                reason: "unparseable RFC 822 message".into(),
            })?;

    let subject = parsed.subject().unwrap_or("(no subject)").to_string();

    let from = parsed
        .from()
        .and_then(|addrs| addrs.first())
        .map(|a| {
            let email = a.address().unwrap_or_default();
            match a.name() {
                Some(name) if !name.is_empty() => format!("{name} <{email}>"),
                _ => email.to_string(),
            }
        })
        .unwrap_or_default();

    let date = parsed
        .date()
        .and_then(|d| {
            chrono::NaiveDate::from_ymd_opt(d.year as i32, u32::from(d.month), u32::from(d.day))
                .and_then(|date| {
                    date.and_hms_opt(
                        u32::from(d.hour),
                        u32::from(d.minute),
                        u32::from(d.second),
                    )
                })
                .map(|naive| naive.and_utc())
        })
        .unwrap_or_else(Utc::now);

    // Lower-cased header map for the detector. First occurrence wins.
    let mut headers: HashMap<String, String> = HashMap::new();
    for header in parsed.headers() {
        let name = header.name().to_ascii_lowercase();
        let value = header
            .value()
            .as_text()
            .map(|v| v.to_string())
            .unwrap_or_default();
        headers.entry(name).or_insert(value);
    }

    let raw_html = parsed
        .body_html(0)
        .map(|h| h.to_string())
        .unwrap_or_default();
    let cleaned_text = if raw_html.is_empty() {
        parsed.body_text(0).map(|t| t.to_string()).unwrap_or_default()
    } else {
        let stripped = strip_html(&raw_html);
        if stripped.is_empty() {
            parsed.body_text(0).map(|t| t.to_string()).unwrap_or_default()
        } else {
            stripped
        }
    };

    Ok(RawMessage {
        id: id.to_string(),
        subject,
        from,
        date,
        raw_html,
        cleaned_text,
        headers,
    })
}

/// Strip tags and common entities from an HTML body.
///
/// Style and script blocks are dropped wholesale; remaining tags become
/// spaces and whitespace runs collapse.
pub fn strip_html(html: &str) -> String {
    let without_blocks = remove_blocks(&remove_blocks(html, "style"), "script");

    let mut out = String::with_capacity(without_blocks.len());
    let mut in_tag = false;
    for c in without_blocks.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }

    let decoded = out
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"");

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove `<tag ...> ... </tag>` blocks, case-insensitively.
fn remove_blocks(html: &str, tag: &str) -> String {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    // ASCII-only lowercasing keeps byte offsets valid for slicing the
    // original string; Unicode lowercasing can change byte lengths.
    let lower = html.to_ascii_lowercase();
    let mut out = String::with_capacity(html.len());
    let mut pos = 0;

    while let Some(start) = lower[pos..].find(&open) {
        let start = pos + start;
        out.push_str(&html[pos..start]);
        match lower[start..].find(&close) {
            Some(end) => pos = start + end + close.len(),
            None => return out,
        }
    }
    out.push_str(&html[pos..]);
    out
}
