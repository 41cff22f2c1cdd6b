//! Registry credentials loaded from the INI configuration file.
//!
//! ```ini
//! [DEFAULT]
//! max_time = 10
//!
//! [REST]
//! reg_host = registration_host
//! rest_user = rest_user
//! rest_pw = rest_pw
//!
//! [SSN]
//! ssn = service_name
//! eppn_scope = uni-freiburg.de
//! ```
//!
//! Values are taken verbatim: no quote stripping and no backslash escapes.
//! Option names are case-insensitive and options under `[DEFAULT]` are
//! visible in every section.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Map, Source, Value, ValueKind};
use ini::{Ini, ParseOption};
use serde::Deserialize;
use tracing::debug;
use url::Url;
use zeroize::Zeroizing;

use crate::error::{ConfigField, KeysError, Result};

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/usr/local/etc/bwidm-rest-ssh.conf";

/// Default per-request timeout in seconds.
pub const DEFAULT_MAX_TIME_SECS: u64 = 10;

/// Default scope appended to usernames for eppn identity lookups.
pub const DEFAULT_EPPN_SCOPE: &str = "uni-freiburg.de";

/// Section whose options every other section inherits.
const DEFAULT_SECTION: &str = "DEFAULT";

/// INI text as a `config` source, read without value processing.
#[derive(Debug, Clone)]
struct VerbatimIni {
    contents: String,
}

impl VerbatimIni {
    fn table(props: &ini::Properties) -> Map<String, Value> {
        props
            .iter()
            .map(|(key, value)| (key.to_lowercase(), Value::new(None, value.to_string())))
            .collect()
    }
}

impl Source for VerbatimIni {
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> std::result::Result<Map<String, Value>, ConfigError> {
        let verbatim = ParseOption {
            enabled_quote: false,
            enabled_escape: false,
        };
        let ini = Ini::load_from_str_opt(&self.contents, verbatim)
            .map_err(|e| ConfigError::Foreign(Box::new(e)))?;

        let mut defaults = Map::new();
        let mut sections: Vec<(String, Map<String, Value>)> = Vec::new();
        for (name, props) in &ini {
            match name {
                None if props.is_empty() => {}
                None => return Err(ConfigError::Message("option outside of a section".into())),
                Some(DEFAULT_SECTION) => defaults.extend(Self::table(props)),
                Some(name) => sections.push((name.to_string(), Self::table(props))),
            }
        }

        let mut map: Map<String, Value> = Map::new();
        for (name, table) in sections {
            let mut merged = match map.remove(&name).map(|v| v.kind) {
                Some(ValueKind::Table(existing)) => existing,
                _ => Map::new(),
            };
            merged.extend(table);
            map.insert(name, Value::new(None, ValueKind::Table(merged)));
        }
        for value in map.values_mut() {
            if let ValueKind::Table(table) = &mut value.kind {
                for (key, default) in &defaults {
                    table.entry(key.clone()).or_insert_with(|| default.clone());
                }
            }
        }
        map.insert(
            DEFAULT_SECTION.to_string(),
            Value::new(None, ValueKind::Table(defaults)),
        );
        Ok(map)
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default, rename = "DEFAULT", alias = "default")]
    defaults: DefaultSection,
    #[serde(default, rename = "REST", alias = "rest")]
    rest: RestSection,
    #[serde(default, rename = "SSN", alias = "ssn")]
    ssn: SsnSection,
}

#[derive(Debug, Default, Deserialize)]
struct DefaultSection {
    max_time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RestSection {
    reg_host: Option<String>,
    rest_user: Option<String>,
    rest_pw: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SsnSection {
    ssn: Option<String>,
    eppn_scope: Option<String>,
}

/// Connection settings for the bwIDM registry.
#[derive(Clone)]
pub struct RegistryCredentials {
    /// Host name, or a full base URL when it contains `://`.
    pub host: String,
    pub basic_auth_user: String,
    pub basic_auth_password: Zeroizing<String>,
    /// bwIDM service short name.
    pub service_name: String,
    pub timeout_secs: u64,
    pub eppn_scope: String,
}

impl std::fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("host", &self.host)
            .field("basic_auth_user", &self.basic_auth_user)
            .field("basic_auth_password", &"[REDACTED]")
            .field("service_name", &self.service_name)
            .field("timeout_secs", &self.timeout_secs)
            .field("eppn_scope", &self.eppn_scope)
            .finish()
    }
}

impl RegistryCredentials {
    /// Load credentials from an INI file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| unreadable(path, e))?;
        let creds = Self::from_ini_str(&contents).map_err(|e| match e {
            KeysError::ConfigUnreadable { reason, .. } => unreadable(path, reason),
            other => other,
        })?;
        debug!(path = %path.display(), host = %creds.host, "Loaded registry configuration");
        Ok(creds)
    }

    /// Parse credentials from INI text.
    pub fn from_ini_str(contents: &str) -> Result<Self> {
        let raw: RawConfig = Config::builder()
            .add_source(VerbatimIni {
                contents: contents.to_string(),
            })
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| unreadable(Path::new(""), e))?;

        let timeout_secs = match raw.defaults.max_time.as_deref().map(str::trim) {
            None | Some("") => DEFAULT_MAX_TIME_SECS,
            Some(value) => match value.parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(unreadable(
                        Path::new(""),
                        format!("max_time is not a positive integer: {value}"),
                    ))
                }
            },
        };

        let reg_host = present(raw.rest.reg_host, "REST", "reg_host")?;
        let rest_user = present(raw.rest.rest_user, "REST", "rest_user")?;
        let basic_auth_password = Zeroizing::new(present(raw.rest.rest_pw, "REST", "rest_pw")?);
        let ssn = present(raw.ssn.ssn, "SSN", "ssn")?;

        let host = non_empty(reg_host, ConfigField::RegHost)?;
        let basic_auth_user = non_empty(rest_user, ConfigField::RestUser)?;
        // Sent as-is, surrounding spaces included.
        if basic_auth_password.is_empty() {
            return Err(KeysError::ConfigFieldEmpty {
                field: ConfigField::RestPassword,
            });
        }
        let service_name = non_empty(ssn, ConfigField::ServiceName)?;
        let eppn_scope = raw
            .ssn
            .eppn_scope
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_EPPN_SCOPE.to_string());

        Ok(Self {
            host,
            basic_auth_user,
            basic_auth_password,
            service_name,
            timeout_secs,
            eppn_scope,
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Base URL of the registry.
    ///
    /// A bare host name implies `https://`.
    pub fn base_url(&self) -> Result<Url> {
        let candidate = if self.host.contains("://") {
            self.host.clone()
        } else {
            format!("https://{}", self.host)
        };
        let url = Url::parse(&candidate)
            .map_err(|e| KeysError::InvalidRegistryHost(format!("{}: {e}", self.host)))?;
        if url.cannot_be_a_base() || !matches!(url.scheme(), "https" | "http") {
            return Err(KeysError::InvalidRegistryHost(self.host.clone()));
        }
        Ok(url)
    }
}

/// A required option must exist, even if empty.
fn present(value: Option<String>, section: &str, option: &str) -> Result<String> {
    value.ok_or_else(|| unreadable(Path::new(""), format!("no option {option} in section {section}")))
}

fn non_empty(value: String, field: ConfigField) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(KeysError::ConfigFieldEmpty { field });
    }
    Ok(value.to_string())
}

fn unreadable(path: &Path, reason: impl std::fmt::Display) -> KeysError {
    KeysError::ConfigUnreadable {
        path: PathBuf::from(path),
        reason: reason.to_string(),
    }
}
