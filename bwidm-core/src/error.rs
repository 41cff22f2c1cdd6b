use std::path::PathBuf;

use thiserror::Error;

/// Required configuration values, in the order they are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigField {
    RegHost,
    RestUser,
    RestPassword,
    ServiceName,
}

impl ConfigField {
    /// Name used in diagnostics. The service name is reported as `SID`.
    pub fn label(self) -> &'static str {
        match self {
            Self::RegHost => "reg_host",
            Self::RestUser => "rest_user",
            Self::RestPassword => "rest_pw",
            Self::ServiceName => "SID",
        }
    }
}

/// Registry answers that are authoritative denials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// HTTP 401
    LoginFailed,
    /// HTTP 402
    ServiceIdInvalid,
    /// HTTP 403
    NoAssertion,
    /// HTTP 404
    UserNotRegistered,
    /// HTTP 500
    MisconfiguredService,
}

impl DenialReason {
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            401 => Some(Self::LoginFailed),
            402 => Some(Self::ServiceIdInvalid),
            403 => Some(Self::NoAssertion),
            404 => Some(Self::UserNotRegistered),
            500 => Some(Self::MisconfiguredService),
            _ => None,
        }
    }

    pub fn status(self) -> u16 {
        match self {
            Self::LoginFailed => 401,
            Self::ServiceIdInvalid => 402,
            Self::NoAssertion => 403,
            Self::UserNotRegistered => 404,
            Self::MisconfiguredService => 500,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::LoginFailed => "Login Failed",
            Self::ServiceIdInvalid => "Service ID not valid",
            Self::NoAssertion => "No assertion resulted from the AttributeQuery",
            Self::UserNotRegistered => "User is not registered",
            Self::MisconfiguredService => "Misconfigured service",
        }
    }
}

#[derive(Error, Debug)]
pub enum KeysError {
    #[error("Not a valid user name: {}", printable(.0))]
    InvalidUsername(String),

    #[error("Not a bwIDM User ID: {}", printable(.0))]
    InvalidUserId(String),

    #[error("Can not read config file {}: {reason}", path.display())]
    ConfigUnreadable { path: PathBuf, reason: String },

    #[error("Config variable {} is empty", field.label())]
    ConfigFieldEmpty { field: ConfigField },

    #[error("Config variable reg_host is not usable: {0}")]
    InvalidRegistryHost(String),

    #[error("Can not read authorized keys file {}: {source}", path.display())]
    OverrideUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Access was not granted (Access denied). {0}")]
    Transport(String),

    #[error("{} (Access denied)", .0.description())]
    Denied(DenialReason),

    #[error("Access was not granted (Access denied). HTTP status code is {0}.")]
    UnexpectedStatus(u16),

    #[error("Malformed registry response (Access denied): {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for KeysError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(describe_chain(&err))
    }
}

/// Escape control characters so caller input cannot span diagnostic lines.
fn printable(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_control() {
                c.escape_default().to_string()
            } else {
                c.to_string()
            }
        })
        .collect()
}

/// Flatten an error and its sources into one diagnostic line.
pub fn describe_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message.replace(['\n', '\r'], " ")
}

pub type Result<T> = std::result::Result<T, KeysError>;
