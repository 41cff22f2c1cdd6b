//! FIDO2 resident keys carried through bwIDM command keys.
//!
//! bwIDM has no native `sk-ssh-ed25519@openssh.com` support, so such keys are
//! uploaded as command keys with the command set to `FIDO2`:
//!
//! ```text
//! command="FIDO2",from="<ignored>" sk-ssh-ed25519@openssh.com <base64> <label>
//! ```
//!
//! Unwrapping turns such a line back into a plain FIDO2 key line. A line that
//! does not survive every decoding step is simply not a wrapped key.

use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;

use super::ResolvedKey;

/// OpenSSH key type of FIDO2 ed25519 keys.
pub const SK_ED25519: &str = "sk-ssh-ed25519@openssh.com";

/// Length prefix of the algorithm name at the start of the key blob.
const LENGTH_PREFIX: usize = 4;

static WRAPPED_KEY: OnceLock<Regex> = OnceLock::new();
static SK_PUBLIC_KEY: OnceLock<Regex> = OnceLock::new();

fn wrapped_key_regex() -> &'static Regex {
    WRAPPED_KEY.get_or_init(|| {
        Regex::new(
            r#"command="FIDO2",from=".*"\s+sk-ssh-ed25519@openssh\.com\s+([A-Za-z0-9+/=]+)\s+([A-Za-z0-9+/=.@-]+)"#,
        )
        .expect("wrapped key pattern is valid")
    })
}

fn sk_public_key_regex() -> &'static Regex {
    SK_PUBLIC_KEY.get_or_init(|| {
        Regex::new(r"sk-ssh-ed25519@openssh\.com\s+([A-Za-z0-9+/=]+)")
            .expect("sk public key pattern is valid")
    })
}

/// Extract `(blob, label)` from a FIDO2 command-key line.
pub fn find_wrapped_key(line: &str) -> Option<(&str, &str)> {
    let caps = wrapped_key_regex().captures(line)?;
    Some((caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}

/// Find the base64 blob of the first `sk-ssh-ed25519@openssh.com` key in `text`.
pub fn find_sk_public_key(text: &str) -> Option<&str> {
    sk_public_key_regex()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Whether a base64 key blob names the `sk-ssh-ed25519@openssh.com` algorithm.
///
/// Decodes the blob, skips the 4-byte length prefix, cuts at the first NUL
/// and looks for the algorithm name in what remains.
pub fn blob_has_sk_marker(blob: &str) -> bool {
    let Ok(decoded) = STANDARD.decode(blob) else {
        return false;
    };
    let rest = decoded.get(LENGTH_PREFIX..).unwrap_or_default();
    let name = match rest.iter().position(|&b| b == 0) {
        Some(nul) => &rest[..nul],
        None => rest,
    };
    std::str::from_utf8(name).is_ok_and(|text| text.contains(SK_ED25519))
}

/// Unwrap a FIDO2 command-key line into a plain FIDO2 key.
///
/// Returns `None` for anything that is not a well-formed wrapped key; the
/// caller then emits the line unchanged.
pub fn unwrap_fido2(line: &str) -> Option<ResolvedKey> {
    let (blob, label) = find_wrapped_key(line)?;
    blob_has_sk_marker(blob).then(|| ResolvedKey {
        key_type: SK_ED25519.to_string(),
        key_material: blob.to_string(),
        label: label.to_string(),
    })
}
