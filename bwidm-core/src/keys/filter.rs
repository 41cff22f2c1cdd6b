//! Key filtering and emission.

use std::collections::HashSet;

use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use tracing::debug;

use super::fido2::unwrap_fido2;
use super::{AuthorizedKey, KeyStatus, ResolvedKey, SshKeyEntry};

/// Zone suffix the registry appends to its timestamps.
const UTC_ZONE_SUFFIX: &str = "[UTC]";

/// Which keys are trusted and how they are emitted.
#[derive(Debug, Clone)]
pub struct KeyPolicy {
    /// Keys must have a name matching this pattern, when set.
    pub name_pattern: Option<Regex>,
    pub status_allow: HashSet<KeyStatus>,
    /// Keys older than this many days are no longer trusted.
    pub max_age_days: Option<u32>,
    pub fido2_unwrap: bool,
}

impl Default for KeyPolicy {
    fn default() -> Self {
        Self {
            name_pattern: None,
            status_allow: HashSet::from([KeyStatus::Active]),
            max_age_days: None,
            fido2_unwrap: false,
        }
    }
}

impl KeyPolicy {
    /// Decide whether `entry` is trusted at `now`.
    pub fn accepts(&self, entry: &SshKeyEntry, now: DateTime<Utc>) -> bool {
        if let Some(pattern) = &self.name_pattern {
            if !pattern.is_match(&entry.name) {
                debug!(name = %entry.name, "Key name does not match");
                return false;
            }
        }
        if !self.status_allow.contains(&entry.status) {
            debug!(name = %entry.name, status = %entry.status, "Key status not allowed");
            return false;
        }
        if let Some(days) = self.max_age_days {
            let valid = entry
                .created_at
                .as_deref()
                .and_then(parse_created_at)
                .is_some_and(|created| is_within_validity(created, days, now));
            if !valid {
                debug!(
                    name = %entry.name,
                    created_at = entry.created_at.as_deref().unwrap_or("<missing>"),
                    max_age_days = days,
                    "Key expired or without usable creation time"
                );
                return false;
            }
        }
        true
    }

    /// Emitted form of an accepted entry.
    fn emit(&self, entry: SshKeyEntry, username: &str) -> AuthorizedKey {
        match entry.raw_line {
            Some(line) => {
                if self.fido2_unwrap {
                    if let Some(key) = unwrap_fido2(&line) {
                        debug!(label = %key.label, "Unwrapped FIDO2 command key");
                        return AuthorizedKey::Resolved(key);
                    }
                }
                AuthorizedKey::PassThrough(line)
            }
            None => AuthorizedKey::Resolved(ResolvedKey {
                key_type: entry.key_type,
                key_material: entry.encoded_key,
                label: username.to_string(),
            }),
        }
    }
}

/// Filter entries by `policy` and turn the survivors into output lines.
///
/// Input order is preserved.
pub fn filter_and_emit<'a, I>(
    entries: I,
    username: &'a str,
    policy: &'a KeyPolicy,
    now: DateTime<Utc>,
) -> impl Iterator<Item = AuthorizedKey> + 'a
where
    I: IntoIterator<Item = SshKeyEntry>,
    I::IntoIter: 'a,
{
    entries
        .into_iter()
        .filter(move |entry| policy.accepts(entry, now))
        .map(move |entry| policy.emit(entry, username))
}

/// Parse a registry timestamp such as `2024-03-01T10:15:30.123Z[UTC]`.
pub fn parse_created_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let raw = raw.strip_suffix(UTC_ZONE_SUFFIX).unwrap_or(raw);
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// A key created at `created` stays valid while `created + max_age_days > now`.
pub fn is_within_validity(created: DateTime<Utc>, max_age_days: u32, now: DateTime<Utc>) -> bool {
    TimeDelta::try_days(i64::from(max_age_days))
        .and_then(|age| created.checked_add_signed(age))
        .is_some_and(|expires| expires > now)
}
