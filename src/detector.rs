//! Newsletter detection — pure classification over fetched messages.
//!
//! No network calls, no side effects. The manual-tracking override
//! (a sender the user tracks even though the heuristics reject it)
//! lives in the sync layer; this module only looks at the message.

use crate::mailbox::RawMessage;

/// Bulk-mail platforms whose sending domains mark a message as a newsletter.
const KNOWN_NEWSLETTER_DOMAINS: &[&str] = &[
    "substack.com",
    "beehiiv.com",
    "mailchimp.com",
    "convertkit.com",
    "ghost.io",
    "ghost.org",
    "buttondown.email",
    "revue.co",
    "tinyletter.com",
    "campaign-archive.com",
    "list-manage.com",
    "constantcontact.com",
    "sendgrid.net",
    "mailgun.org",
];

/// X-Mailer values that identify bulk-sending software.
const NEWSLETTER_MAILERS: &[&str] = &["mailchimp", "sendgrid", "convertkit", "beehiiv", "substack"];

/// Classify a message as newsletter or not.
///
/// Decision order, first match wins:
/// 1. `List-Unsubscribe` header present
/// 2. `List-ID` header present
/// 3. `Precedence: bulk` or `Precedence: list`
/// 4. Sender domain on the known bulk-platform list
/// 5. `X-Mailer` matches a known bulk sender
pub fn is_newsletter(msg: &RawMessage) -> bool {
    if msg.headers.contains_key("list-unsubscribe") {
        return true;
    }

    if msg.headers.contains_key("list-id") {
        return true;
    }

    if let Some(precedence) = msg.headers.get("precedence") {
        let p = precedence.trim().to_lowercase();
        if p == "bulk" || p == "list" {
            return true;
        }
    }

    let from_lower = msg.from.to_lowercase();
    if KNOWN_NEWSLETTER_DOMAINS.iter().any(|d| from_lower.contains(d)) {
        return true;
    }

    if let Some(mailer) = msg.headers.get("x-mailer") {
        let mailer = mailer.to_lowercase();
        if NEWSLETTER_MAILERS.iter().any(|m| mailer.contains(m)) {
            return true;
        }
    }

    false
}

/// Lower-cased domain part of an email address, or empty string if absent.
pub fn sender_domain(email: &str) -> String {
    match email.rfind('@') {
        Some(pos) => email[pos + 1..]
            .trim_end_matches('>')
            .trim()
            .to_lowercase(),
        None => String::new(),
    }
}

/// Display name from a `Name <email@domain>` formatted From header.
///
/// Falls back to the local part of a bare address, then the whole input.
pub fn sender_display_name(from: &str) -> String {
    if let Some(pos) = from.find('<') {
        let name = from[..pos].trim().trim_matches('"').trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }
    let bare = from.trim().trim_matches(|c| c == '<' || c == '>');
    match bare.find('@') {
        Some(pos) => bare[..pos].to_string(),
        None => bare.to_string(),
    }
}

/// Bare email address from a From header, lower-cased.
///
/// `"Jane Doe <jane@example.com>"` → `jane@example.com`; a bare address
/// passes through unchanged.
pub fn sender_email(from: &str) -> String {
    if let Some(start) = from.find('<')
        && let Some(end) = from[start + 1..].find('>')
    {
        return from[start + 1..start + 1 + end].trim().to_lowercase();
    }
    from.trim().to_lowercase()
}
