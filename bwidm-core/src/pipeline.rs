//! The key-resolution pipeline.
//!
//! validate → local override → [identity lookup] → key retrieval → filter/unwrap.
//! Every stage returns a typed result; nothing here exits the process.

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::{KeysError, Result};
use crate::keys::{filter_and_emit, AuthorizedKey};
use crate::local_override::check_local_override;
use crate::policy::{PipelinePolicy, UserIdSource};
use crate::registry::Registry;
use crate::validation::LoginRequest;

/// What to print for a login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Contents of the local override file, printed verbatim.
    Override(Vec<u8>),
    /// Keys from the registry, one line each.
    Keys(Vec<AuthorizedKey>),
}

impl Resolution {
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        match self {
            Self::Override(content) => out.write_all(content)?,
            Self::Keys(keys) => {
                for key in keys {
                    writeln!(out, "{key}")?;
                }
            }
        }
        out.flush()
    }
}

/// Resolves login names to authorized keys under one deployment policy.
#[derive(Debug, Clone)]
pub struct KeyResolver {
    policy: PipelinePolicy,
    authorized_keys_dir: PathBuf,
}

impl KeyResolver {
    pub fn new(policy: PipelinePolicy, authorized_keys_dir: impl Into<PathBuf>) -> Self {
        Self {
            policy,
            authorized_keys_dir: authorized_keys_dir.into(),
        }
    }

    pub fn policy(&self) -> &PipelinePolicy {
        &self.policy
    }

    /// Run the whole pipeline for one login attempt.
    ///
    /// `connect` is only called once the request is valid and no local
    /// override exists, so configuration problems never affect override users.
    pub async fn resolve<R, F>(
        &self,
        raw_username: &str,
        raw_user_id: Option<&str>,
        connect: F,
    ) -> Result<Resolution>
    where
        R: Registry,
        F: FnOnce() -> Result<R>,
    {
        let request = self.validate(raw_username, raw_user_id)?;

        if let Some(content) = check_local_override(&self.authorized_keys_dir, request.username())? {
            info!(username = request.username(), "Local override, registry skipped");
            return Ok(Resolution::Override(content));
        }

        let registry = connect()?;
        let keys = self.resolve_remote(&request, &registry, Utc::now()).await?;
        Ok(Resolution::Keys(keys))
    }

    /// Validate process input under this policy.
    pub fn validate(&self, raw_username: &str, raw_user_id: Option<&str>) -> Result<LoginRequest> {
        let request = LoginRequest::validate(raw_username, raw_user_id, self.policy.username_max_len)?;
        if self.policy.user_id_source == UserIdSource::Claimed && request.claimed_user_id().is_none() {
            return Err(KeysError::InvalidUserId("<missing>".to_string()));
        }
        Ok(request)
    }

    /// Registry part of the pipeline: look up, retrieve, filter.
    pub async fn resolve_remote<R: Registry + ?Sized>(
        &self,
        request: &LoginRequest,
        registry: &R,
        now: DateTime<Utc>,
    ) -> Result<Vec<AuthorizedKey>> {
        let start = Instant::now();

        let user_id = match self.policy.user_id_source {
            UserIdSource::Claimed => request
                .claimed_user_id()
                .map(u64::from)
                .ok_or_else(|| KeysError::InvalidUserId("<missing>".to_string()))?,
            UserIdSource::RegistryLookup => {
                registry
                    .resolve_identity(request.username())
                    .await?
                    .numeric_user_id
            }
        };
        debug!(user_id, "Using registry user id");

        let entries = registry
            .retrieve_keys(user_id, &self.policy.key_endpoint)
            .await?;
        let received = entries.len();

        let keys: Vec<_> =
            filter_and_emit(entries, request.username(), &self.policy.keys, now).collect();

        info!(
            username = request.username(),
            received,
            authorized = keys.len(),
            total_latency_ms = start.elapsed().as_millis() as u64,
            "Resolved authorized keys"
        );
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DenialReason;
    use crate::keys::fido2::tests::sk_blob;
    use crate::keys::{KeyStatus, ResolvedKey};
    use crate::policy::Preset;
    use crate::registry::{KeyEndpoint, MockRegistry};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn lines(resolution: &Resolution) -> String {
        let mut out = Vec::new();
        resolution.write_to(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_username_never_touches_registry() {
        let temp = TempDir::new().unwrap();
        let resolver = KeyResolver::new(Preset::Jumphost.policy(), temp.path());
        let registry = MockRegistry::default();

        for name in ["al ice", "a/b", "abcdefghijklm"] {
            let err = resolver.resolve(name, None, || Ok(&registry)).await.unwrap_err();
            assert!(matches!(err, KeysError::InvalidUsername(_)));
        }
        assert_eq!(registry.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_user_id_never_connects() {
        let temp = TempDir::new().unwrap();
        let resolver = KeyResolver::new(Preset::AuthKeys.policy(), temp.path());

        for raw in [Some("900000"), Some("12345"), None] {
            let err = resolver
                .resolve("alice", raw, || -> Result<MockRegistry> {
                    panic!("registry must not be contacted")
                })
                .await
                .unwrap_err();
            assert!(matches!(err, KeysError::InvalidUserId(_)));
        }
    }

    #[tokio::test]
    async fn test_override_short_circuits_connect() {
        let temp = TempDir::new().unwrap();
        let content = b"ssh-ed25519 AAAAlocal admin\n";
        std::fs::write(temp.path().join("alice"), content).unwrap();
        let resolver = KeyResolver::new(Preset::Jumphost.policy(), temp.path());

        let resolution = resolver
            .resolve("alice", None, || -> Result<MockRegistry> {
                Err(KeysError::Transport("unreachable".into()))
            })
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::Override(content.to_vec()));
        assert_eq!(lines(&resolution).as_bytes(), content);
    }

    #[tokio::test]
    async fn test_connect_errors_propagate() {
        let temp = TempDir::new().unwrap();
        let resolver = KeyResolver::new(Preset::Jumphost.policy(), temp.path());
        let err = resolver
            .resolve("alice", None, || -> Result<MockRegistry> {
                Err(KeysError::ConfigFieldEmpty {
                    field: crate::error::ConfigField::RestUser,
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, KeysError::ConfigFieldEmpty { .. }));
    }

    #[tokio::test]
    async fn test_jumphost_scenario() {
        let body = r#"[
            {"name":"UNIFR-JUMPHOST-1","keyType":"ssh-ed25519","encodedKey":"AAAAC3NzaC1lZDI1NTE5","keyStatus":"ACTIVE"},
            {"name":"home","keyType":"ssh-rsa","encodedKey":"AAAAB3NzaC1yc2E","keyStatus":"ACTIVE"}
        ]"#;
        let registry = MockRegistry::new(900123, body);
        let resolver = KeyResolver::new(Preset::Jumphost.policy(), "/nonexistent");
        let request = resolver.validate("alice", None).unwrap();

        let keys = resolver.resolve_remote(&request, &registry, now()).await.unwrap();
        assert_eq!(
            lines(&Resolution::Keys(keys)),
            "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5 alice\n"
        );
        assert_eq!(registry.identity_calls(), 1);
        assert_eq!(
            registry.last_key_request(),
            Some((
                900123,
                KeyEndpoint::UserList {
                    status: Some(KeyStatus::Active)
                }
            ))
        );
    }

    #[tokio::test]
    async fn test_claimed_id_skips_identity_lookup() {
        let blob = sk_blob();
        let body = format!(
            "ssh-rsa AAAAB3Nza bob@desk\ncommand=\"FIDO2\",from=\"0.0.0.0/0\" sk-ssh-ed25519@openssh.com {blob} bob@key\n"
        );
        let registry = MockRegistry::new(1, body);
        let resolver = KeyResolver::new(Preset::AuthKeys.policy(), "/nonexistent");
        let request = resolver.validate("bob", Some("900777")).unwrap();

        let keys = resolver.resolve_remote(&request, &registry, now()).await.unwrap();
        assert_eq!(registry.identity_calls(), 0);
        assert_eq!(
            registry.last_key_request(),
            Some((900777, KeyEndpoint::ServiceAuthorized))
        );
        assert_eq!(
            keys,
            vec![
                AuthorizedKey::PassThrough("ssh-rsa AAAAB3Nza bob@desk".into()),
                AuthorizedKey::Resolved(ResolvedKey {
                    key_type: "sk-ssh-ed25519@openssh.com".into(),
                    key_material: blob,
                    label: "bob@key".into(),
                }),
            ]
        );
    }

    #[tokio::test]
    async fn test_identity_denial_stops_pipeline() {
        let registry = MockRegistry::default()
            .failing_identity(|| KeysError::Denied(DenialReason::NoAssertion));
        let resolver = KeyResolver::new(Preset::Jumphost.policy(), "/nonexistent");
        let request = resolver.validate("alice", None).unwrap();

        let err = resolver
            .resolve_remote(&request, &registry, now())
            .await
            .unwrap_err();
        assert!(matches!(err, KeysError::Denied(DenialReason::NoAssertion)));
        assert_eq!(registry.key_calls(), 0);
    }

    #[tokio::test]
    async fn test_key_retrieval_failure_propagates() {
        let registry = MockRegistry::default()
            .failing_keys(|| KeysError::Transport("connection reset".into()));
        let resolver = KeyResolver::new(Preset::JumphostAged.policy(), "/nonexistent");
        let request = resolver.validate("alice", None).unwrap();

        let err = resolver
            .resolve_remote(&request, &registry, now())
            .await
            .unwrap_err();
        assert!(matches!(err, KeysError::Transport(_)));
    }

    #[tokio::test]
    async fn test_aged_preset_filters_by_age() {
        let body = r#"[
            {"name":"UNIFR-JUMPHOST-a","keyType":"ssh-ed25519","encodedKey":"AAAAfresh","keyStatus":"EXPIRED","createdAt":"2025-02-01T00:00:00.000Z[UTC]"},
            {"name":"UNIFR-JUMPHOST-b","keyType":"ssh-ed25519","encodedKey":"AAAAold","keyStatus":"ACTIVE","createdAt":"2023-02-01T00:00:00.000Z[UTC]"},
            {"name":"UNIFR-JUMPHOST-c","keyType":"ssh-ed25519","encodedKey":"AAAAbad","keyStatus":"ACTIVE","createdAt":"02/01/2025"}
        ]"#;
        let registry = MockRegistry::new(900123, body);
        let resolver = KeyResolver::new(Preset::JumphostAged.policy(), "/nonexistent");
        let request = resolver.validate("alice", None).unwrap();

        let keys = resolver.resolve_remote(&request, &registry, now()).await.unwrap();
        assert_eq!(
            lines(&Resolution::Keys(keys)),
            "ssh-ed25519 AAAAfresh alice\n"
        );
    }

    #[test]
    fn test_empty_key_list_writes_nothing() {
        assert_eq!(lines(&Resolution::Keys(Vec::new())), "");
    }
}
