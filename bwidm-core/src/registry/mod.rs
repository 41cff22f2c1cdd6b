//! Access to the bwIDM registry.
//!
//! The pipeline only sees the [`Registry`] trait. [`BwidmRegistry`] talks to
//! the REST API; [`MockRegistry`] answers from memory and counts calls.

mod http;
mod mock;

pub use http::BwidmRegistry;
pub use mock::MockRegistry;

use async_trait::async_trait;

use crate::error::Result;
use crate::keys::{KeyStatus, ResponseShape, SshKeyEntry};

/// Result of an identity lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityRecord {
    pub numeric_user_id: u64,
}

/// Key-listing endpoint of the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyEndpoint {
    /// `/rest/ssh-key/auth/all/<service>/uidnumber/<uid>`: keys usable for the
    /// service, as `authorized_keys` lines.
    ServiceAuthorized,
    /// `/rest/ssh-key/list/uidnumber/<uid>/key-status/<STATUS>` or `.../all`:
    /// all keys of the user as JSON, optionally scoped to one status.
    UserList { status: Option<KeyStatus> },
}

impl KeyEndpoint {
    /// Path segments below the base URL.
    pub fn path_segments(&self, service_name: &str, user_id: u64) -> Vec<String> {
        let uid = user_id.to_string();
        match self {
            Self::ServiceAuthorized => ["rest", "ssh-key", "auth", "all", service_name, "uidnumber", uid.as_str()]
                .map(String::from)
                .to_vec(),
            Self::UserList { status } => {
                let mut segments: Vec<String> = ["rest", "ssh-key", "list", "uidnumber", uid.as_str()]
                    .map(String::from)
                    .to_vec();
                match status {
                    Some(status) => {
                        segments.push("key-status".to_string());
                        segments.push(status.to_string());
                    }
                    None => segments.push("all".to_string()),
                }
                segments
            }
        }
    }

    /// Wire format the endpoint answers in.
    pub fn shape(&self) -> ResponseShape {
        match self {
            Self::ServiceAuthorized => ResponseShape::RawLines,
            Self::UserList { .. } => ResponseShape::JsonList,
        }
    }
}

/// Read-only view of the registry used by the key-resolution pipeline.
///
/// Each method performs at most one request and never retries.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Map a username to the registry's numeric user id.
    async fn resolve_identity(&self, username: &str) -> Result<IdentityRecord>;

    /// List the keys of a user, in registry order.
    async fn retrieve_keys(&self, user_id: u64, endpoint: &KeyEndpoint) -> Result<Vec<SshKeyEntry>>;
}

#[async_trait]
impl<T: Registry + ?Sized> Registry for &T {
    async fn resolve_identity(&self, username: &str) -> Result<IdentityRecord> {
        (**self).resolve_identity(username).await
    }

    async fn retrieve_keys(&self, user_id: u64, endpoint: &KeyEndpoint) -> Result<Vec<SshKeyEntry>> {
        (**self).retrieve_keys(user_id, endpoint).await
    }
}
