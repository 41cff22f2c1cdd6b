//! Deployment presets.
//!
//! The helper has been deployed with different username bounds, lookup paths
//! and key filters. Each deployment is a [`PipelinePolicy`]; the presets below
//! reproduce the known ones.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use regex::Regex;

use crate::keys::{KeyPolicy, KeyStatus};
use crate::registry::KeyEndpoint;
use crate::validation::DEFAULT_USERNAME_MAX_LEN;

/// Key name prefix used for jump host keys.
pub const JUMPHOST_KEY_NAME: &str = "UNIFR-JUMPHOST";

/// Days a jump host key stays trusted after creation.
pub const JUMPHOST_VALID_DAYS: u32 = 365;

/// Username bound of the jump host deployments.
pub const JUMPHOST_USERNAME_MAX_LEN: usize = 12;

/// Where the numeric user id comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserIdSource {
    /// The caller passes it as the second argument.
    Claimed,
    /// Looked up in the registry by eppn.
    RegistryLookup,
}

/// Everything that differs between deployments.
#[derive(Debug, Clone)]
pub struct PipelinePolicy {
    pub username_max_len: usize,
    pub user_id_source: UserIdSource,
    pub key_endpoint: KeyEndpoint,
    pub keys: KeyPolicy,
}

/// Named deployment presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// Service-authorized keys by claimed user id, FIDO2 command keys unwrapped.
    AuthKeys,
    /// Like [`Preset::AuthKeys`] without FIDO2 unwrapping.
    AuthKeysPlain,
    /// Active jump host keys of a user looked up by name.
    Jumphost,
    /// Active or expired jump host keys younger than a year.
    JumphostAged,
}

impl Preset {
    pub const ALL: [Preset; 4] = [
        Self::AuthKeys,
        Self::AuthKeysPlain,
        Self::Jumphost,
        Self::JumphostAged,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::AuthKeys => "auth-keys",
            Self::AuthKeysPlain => "auth-keys-plain",
            Self::Jumphost => "jumphost",
            Self::JumphostAged => "jumphost-aged",
        }
    }

    pub fn policy(self) -> PipelinePolicy {
        match self {
            Self::AuthKeys | Self::AuthKeysPlain => PipelinePolicy {
                username_max_len: DEFAULT_USERNAME_MAX_LEN,
                user_id_source: UserIdSource::Claimed,
                key_endpoint: KeyEndpoint::ServiceAuthorized,
                keys: KeyPolicy {
                    fido2_unwrap: self == Self::AuthKeys,
                    ..KeyPolicy::default()
                },
            },
            Self::Jumphost => PipelinePolicy {
                username_max_len: JUMPHOST_USERNAME_MAX_LEN,
                user_id_source: UserIdSource::RegistryLookup,
                key_endpoint: KeyEndpoint::UserList {
                    status: Some(KeyStatus::Active),
                },
                keys: KeyPolicy {
                    name_pattern: Some(jumphost_name_pattern()),
                    ..KeyPolicy::default()
                },
            },
            Self::JumphostAged => PipelinePolicy {
                username_max_len: JUMPHOST_USERNAME_MAX_LEN,
                user_id_source: UserIdSource::RegistryLookup,
                key_endpoint: KeyEndpoint::UserList { status: None },
                keys: KeyPolicy {
                    name_pattern: Some(jumphost_name_pattern()),
                    status_allow: HashSet::from([KeyStatus::Active, KeyStatus::Expired]),
                    max_age_days: Some(JUMPHOST_VALID_DAYS),
                    fido2_unwrap: false,
                },
            },
        }
    }
}

fn jumphost_name_pattern() -> Regex {
    Regex::new(&regex::escape(JUMPHOST_KEY_NAME)).expect("escaped literal is a valid pattern")
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|preset| preset.name() == s)
            .ok_or_else(|| {
                let names: Vec<_> = Self::ALL.iter().map(|p| p.name()).collect();
                format!("unknown preset '{s}', expected one of: {}", names.join(", "))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::ResponseShape;

    #[test]
    fn test_preset_names_round_trip() {
        for preset in Preset::ALL {
            assert_eq!(preset.name().parse::<Preset>().unwrap(), preset);
        }
        assert!("bastion".parse::<Preset>().is_err());
    }

    #[test]
    fn test_auth_keys_presets() {
        let policy = Preset::AuthKeys.policy();
        assert_eq!(policy.user_id_source, UserIdSource::Claimed);
        assert_eq!(policy.username_max_len, 20);
        assert_eq!(policy.key_endpoint.shape(), ResponseShape::RawLines);
        assert!(policy.keys.fido2_unwrap);

        assert!(!Preset::AuthKeysPlain.policy().keys.fido2_unwrap);
    }

    #[test]
    fn test_jumphost_presets() {
        let policy = Preset::Jumphost.policy();
        assert_eq!(policy.user_id_source, UserIdSource::RegistryLookup);
        assert_eq!(policy.username_max_len, 12);
        assert_eq!(policy.keys.max_age_days, None);
        assert_eq!(policy.keys.status_allow, HashSet::from([KeyStatus::Active]));

        let aged = Preset::JumphostAged.policy();
        assert_eq!(aged.key_endpoint, KeyEndpoint::UserList { status: None });
        assert_eq!(aged.keys.max_age_days, Some(365));
        assert!(aged.keys.status_allow.contains(&KeyStatus::Expired));
        assert!(aged
            .keys
            .name_pattern
            .as_ref()
            .is_some_and(|p| p.is_match("UNIFR-JUMPHOST-laptop")));
    }
}
