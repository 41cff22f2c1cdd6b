//! In-memory registry for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{IdentityRecord, KeyEndpoint, Registry};
use crate::error::{KeysError, Result};
use crate::keys::SshKeyEntry;

type Answer<T> = std::result::Result<T, fn() -> KeysError>;

/// Registry answering from canned responses.
///
/// Every call is counted, so tests can assert that a request never reached
/// the network.
pub struct MockRegistry {
    identity: Answer<u64>,
    keys_body: Answer<String>,
    identity_calls: AtomicUsize,
    key_calls: AtomicUsize,
    last_endpoint: Mutex<Option<(u64, KeyEndpoint)>>,
}

impl MockRegistry {
    /// Registry knowing `uid_number` and answering key lists with `keys_body`,
    /// parsed in the shape of the requested endpoint.
    pub fn new(uid_number: u64, keys_body: impl Into<String>) -> Self {
        Self {
            identity: Ok(uid_number),
            keys_body: Ok(keys_body.into()),
            identity_calls: AtomicUsize::new(0),
            key_calls: AtomicUsize::new(0),
            last_endpoint: Mutex::new(None),
        }
    }

    /// Make identity lookups fail with the error built by `err`.
    pub fn failing_identity(mut self, err: fn() -> KeysError) -> Self {
        self.identity = Err(err);
        self
    }

    /// Make key retrieval fail with the error built by `err`.
    pub fn failing_keys(mut self, err: fn() -> KeysError) -> Self {
        self.keys_body = Err(err);
        self
    }

    pub fn identity_calls(&self) -> usize {
        self.identity_calls.load(Ordering::SeqCst)
    }

    pub fn key_calls(&self) -> usize {
        self.key_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.identity_calls() + self.key_calls()
    }

    /// User id and endpoint of the most recent key retrieval.
    pub fn last_key_request(&self) -> Option<(u64, KeyEndpoint)> {
        self.last_endpoint
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }
}

impl Default for MockRegistry {
    fn default() -> Self {
        Self::new(900_001, "")
    }
}

#[async_trait]
impl Registry for MockRegistry {
    async fn resolve_identity(&self, _username: &str) -> Result<IdentityRecord> {
        self.identity_calls.fetch_add(1, Ordering::SeqCst);
        match &self.identity {
            Ok(uid) => Ok(IdentityRecord {
                numeric_user_id: *uid,
            }),
            Err(err) => Err(err()),
        }
    }

    async fn retrieve_keys(&self, user_id: u64, endpoint: &KeyEndpoint) -> Result<Vec<SshKeyEntry>> {
        self.key_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_endpoint.lock() {
            *last = Some((user_id, endpoint.clone()));
        }
        match &self.keys_body {
            Ok(body) => endpoint.shape().parse(body),
            Err(err) => Err(err()),
        }
    }
}
