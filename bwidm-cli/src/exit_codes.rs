//! Exit codes of the command-line tools.
//!
//! The key helper reports every failure condition with its own code so that
//! sshd logs and wrapper scripts can tell them apart. Usage and I/O errors
//! follow sysexits.h.

#![allow(dead_code)] // Not every binary uses every code

use bwidm_core::{ConfigField, KeysError};

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// Username failed validation.
pub const INVALID_USERNAME: i32 = 8;

/// User id missing, malformed or out of range.
pub const INVALID_USER_ID: i32 = 9;

/// Configuration file unreadable or unparsable.
pub const CONFIG_UNREADABLE: i32 = 12;

/// Local override file exists but cannot be read.
pub const OVERRIDE_UNREADABLE: i32 = 13;

/// `REST.reg_host` empty or unusable.
pub const REG_HOST_EMPTY: i32 = 14;

/// `REST.rest_user` empty.
pub const REST_USER_EMPTY: i32 = 15;

/// `REST.rest_pw` empty.
pub const REST_PW_EMPTY: i32 = 16;

/// `SSN.ssn` empty.
pub const SERVICE_NAME_EMPTY: i32 = 17;

/// Registry unreachable or request timed out.
pub const TRANSPORT_ERROR: i32 = 18;

/// Registry answered with a status outside the known set.
pub const UNEXPECTED_STATUS: i32 = 19;

/// Registry body could not be interpreted.
pub const MALFORMED_RESPONSE: i32 = 20;

/// HTTP 401 from the registry.
pub const LOGIN_FAILED: i32 = 41;

/// HTTP 402 from the registry.
pub const SERVICE_ID_INVALID: i32 = 42;

/// HTTP 403 from the registry.
pub const NO_ASSERTION: i32 = 43;

/// HTTP 404 from the registry.
pub const USER_NOT_REGISTERED: i32 = 44;

/// HTTP 500 from the registry.
pub const MISCONFIGURED_SERVICE: i32 = 50;

/// Command line usage error (invalid arguments).
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// No FIDO2 key or marker in the inspected file.
/// Maps to EX_DATAERR from sysexits.h.
pub const KEY_NOT_FOUND: i32 = 65;

/// Cannot open input file.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// Cannot write to stdout.
/// Maps to EX_IOERR from sysexits.h.
pub const IO_ERROR: i32 = 74;

/// Represents an exit code with optional error context.
#[derive(Debug)]
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub const fn success() -> Self {
        Self {
            code: SUCCESS,
            message: None,
        }
    }

    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }

    /// Map a pipeline error to its exit code and diagnostic line.
    pub fn from_error(err: &KeysError) -> Self {
        Self::error(code_for(err), err.to_string())
    }
}

/// Exit code of a pipeline error.
pub fn code_for(err: &KeysError) -> i32 {
    match err {
        KeysError::InvalidUsername(_) => INVALID_USERNAME,
        KeysError::InvalidUserId(_) => INVALID_USER_ID,
        KeysError::ConfigUnreadable { .. } => CONFIG_UNREADABLE,
        KeysError::OverrideUnreadable { .. } => OVERRIDE_UNREADABLE,
        KeysError::ConfigFieldEmpty { field } => match field {
            ConfigField::RegHost => REG_HOST_EMPTY,
            ConfigField::RestUser => REST_USER_EMPTY,
            ConfigField::RestPassword => REST_PW_EMPTY,
            ConfigField::ServiceName => SERVICE_NAME_EMPTY,
        },
        KeysError::InvalidRegistryHost(_) => REG_HOST_EMPTY,
        KeysError::Transport(_) => TRANSPORT_ERROR,
        KeysError::Denied(reason) => match reason.status() {
            401 => LOGIN_FAILED,
            402 => SERVICE_ID_INVALID,
            403 => NO_ASSERTION,
            404 => USER_NOT_REGISTERED,
            _ => MISCONFIGURED_SERVICE,
        },
        KeysError::UnexpectedStatus(_) => UNEXPECTED_STATUS,
        KeysError::MalformedResponse(_) => MALFORMED_RESPONSE,
    }
}
