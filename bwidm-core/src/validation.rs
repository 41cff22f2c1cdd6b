//! Input validation for login requests.
//!
//! Runs before any file or network access; a rejected request never reaches
//! the registry.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{KeysError, Result};

/// bwIDM user ids are six digits and strictly above this floor.
pub const MIN_USER_ID: u32 = 900_000;

/// Number of digits in a bwIDM user id.
pub const USER_ID_DIGITS: usize = 6;

/// Default upper bound on username length.
pub const DEFAULT_USERNAME_MAX_LEN: usize = 20;

static WORD_CHARS: OnceLock<Regex> = OnceLock::new();

fn word_chars_regex() -> &'static Regex {
    WORD_CHARS.get_or_init(|| Regex::new(r"^\w+$").expect("word pattern is valid"))
}

/// A validated login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    username: String,
    claimed_user_id: Option<u32>,
}

impl LoginRequest {
    /// Validate raw process input.
    ///
    /// The username must consist of 1..=`max_len` word characters; a claimed
    /// user id, if given, must pass [`validate_user_id`].
    pub fn validate(raw_username: &str, raw_user_id: Option<&str>, max_len: usize) -> Result<Self> {
        let username = validate_username(raw_username, max_len)?;
        let claimed_user_id = raw_user_id.map(validate_user_id).transpose()?;
        Ok(Self {
            username,
            claimed_user_id,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn claimed_user_id(&self) -> Option<u32> {
        self.claimed_user_id
    }
}

/// Check a username against `^\w{1,max_len}$`.
pub fn validate_username(raw: &str, max_len: usize) -> Result<String> {
    if !word_chars_regex().is_match(raw) || raw.chars().count() > max_len {
        return Err(KeysError::InvalidUsername(raw.to_string()));
    }
    Ok(raw.to_string())
}

/// Check a claimed user id: exactly six ASCII digits, greater than [`MIN_USER_ID`].
pub fn validate_user_id(raw: &str) -> Result<u32> {
    if raw.len() == USER_ID_DIGITS && raw.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(id) = raw.parse::<u32>() {
            if id > MIN_USER_ID {
                return Ok(id);
            }
        }
    }
    Err(KeysError::InvalidUserId(raw.to_string()))
}
