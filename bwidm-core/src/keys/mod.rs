//! SSH key entries as listed by the registry, and what gets emitted for them.
//!
//! The key endpoints answer in one of two shapes: a JSON array of key objects,
//! or plain `authorized_keys` lines. Both are normalized into [`SshKeyEntry`]
//! by a [`ResponseShape`] before filtering.

pub mod fido2;
pub mod filter;

use std::fmt;

use serde::Deserialize;

use crate::error::{KeysError, Result};

pub use filter::{filter_and_emit, is_within_validity, parse_created_at, KeyPolicy};

/// Lifecycle status of a key in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyStatus {
    Active,
    Expired,
    Other(String),
}

impl KeyStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "ACTIVE" => Self::Active,
            "EXPIRED" => Self::Expired,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "ACTIVE",
            Self::Expired => "EXPIRED",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One key from a registry response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshKeyEntry {
    pub key_type: String,
    /// Base64 key blob.
    pub encoded_key: String,
    pub name: String,
    pub status: KeyStatus,
    /// Creation time exactly as the registry sent it.
    pub created_at: Option<String>,
    /// Original `authorized_keys` line for entries read from raw text.
    pub raw_line: Option<String>,
}

impl SshKeyEntry {
    /// Normalize one `authorized_keys` line.
    ///
    /// A leading options field is skipped; the next three whitespace-separated
    /// fields become type, key and name. The line itself is kept for verbatim
    /// emission.
    pub fn from_raw_line(line: &str) -> Self {
        let mut fields = strip_options(line).split_whitespace();
        let key_type = fields.next().unwrap_or_default().to_string();
        let encoded_key = fields.next().unwrap_or_default().to_string();
        let name = fields.collect::<Vec<_>>().join(" ");
        Self {
            key_type,
            encoded_key,
            name,
            status: KeyStatus::Active,
            created_at: None,
            raw_line: Some(line.to_string()),
        }
    }
}

fn is_key_type(token: &str) -> bool {
    ["ssh-", "ecdsa-", "sk-"]
        .iter()
        .any(|prefix| token.starts_with(prefix))
}

/// The part of an `authorized_keys` line after its options, if it has any.
///
/// Options end at the first whitespace outside double quotes.
fn strip_options(line: &str) -> &str {
    let line = line.trim_start();
    if line.split_whitespace().next().map_or(true, is_key_type) {
        return line;
    }

    let mut in_quotes = false;
    let mut escaped = false;
    for (idx, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => return line[idx..].trim_start(),
            _ => {}
        }
    }
    ""
}

/// A key object from the JSON key-list endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyObject {
    #[serde(default)]
    name: String,
    key_type: String,
    encoded_key: String,
    #[serde(default)]
    key_status: Option<String>,
    #[serde(default)]
    created_at: Option<serde_json::Value>,
}

impl From<KeyObject> for SshKeyEntry {
    fn from(obj: KeyObject) -> Self {
        let created_at = obj.created_at.and_then(|value| match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s),
            other => Some(other.to_string()),
        });
        Self {
            key_type: obj.key_type,
            encoded_key: obj.encoded_key,
            name: obj.name,
            status: obj
                .key_status
                .as_deref()
                .map(KeyStatus::parse)
                .unwrap_or_else(|| KeyStatus::Other(String::new())),
            created_at,
            raw_line: None,
        }
    }
}

/// Wire format of a key-list response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// JSON array of key objects.
    JsonList,
    /// Newline-delimited `authorized_keys` lines.
    RawLines,
}

impl ResponseShape {
    /// Normalize a response body into key entries, preserving order.
    pub fn parse(self, body: &str) -> Result<Vec<SshKeyEntry>> {
        match self {
            Self::JsonList => {
                let objects: Vec<KeyObject> = serde_json::from_str(body).map_err(|e| {
                    KeysError::MalformedResponse(format!("key list is not a JSON array of keys: {e}"))
                })?;
                Ok(objects.into_iter().map(SshKeyEntry::from).collect())
            }
            Self::RawLines => Ok(body
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(SshKeyEntry::from_raw_line)
                .collect()),
        }
    }
}

/// A key decided to be authorized, in emitted form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKey {
    pub key_type: String,
    pub key_material: String,
    pub label: String,
}

impl fmt::Display for ResolvedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.key_type, self.key_material, self.label)
    }
}

/// One line of command output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizedKey {
    Resolved(ResolvedKey),
    /// A registry line emitted unchanged.
    PassThrough(String),
}

impl fmt::Display for AuthorizedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved(key) => key.fmt(f),
            Self::PassThrough(line) => f.write_str(line),
        }
    }
}
