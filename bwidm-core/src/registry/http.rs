//! bwIDM REST client.
//!
//! One GET per call with HTTP basic auth and the configured timeout. Transport
//! failures and non-200 answers are final; there is no retry.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{IdentityRecord, KeyEndpoint, Registry};
use crate::config::RegistryCredentials;
use crate::error::{describe_chain, DenialReason, KeysError, Result};
use crate::keys::SshKeyEntry;

/// Field of the attribute-query answer holding the numeric user id.
const UID_NUMBER_FIELD: &str = "uidNumber";

/// Registry client backed by the bwIDM REST API.
pub struct BwidmRegistry {
    client: Client,
    base_url: Url,
    credentials: RegistryCredentials,
}

impl BwidmRegistry {
    /// Build a client for the configured registry.
    ///
    /// A plain host name is reached over HTTPS only.
    #[instrument(level = "debug", skip_all, fields(
        host = %credentials.host,
        timeout_secs = credentials.timeout_secs
    ))]
    pub fn new(credentials: RegistryCredentials) -> Result<Self> {
        let base_url = credentials.base_url()?;

        let client = Client::builder()
            .timeout(credentials.timeout())
            .https_only(base_url.scheme() == "https")
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .build()
            .map_err(|e| {
                warn!(error = %e, "Failed to create HTTP client");
                KeysError::Transport(format!("Failed to create HTTP client: {}", describe_chain(&e)))
            })?;

        debug!(base_url = %base_url, "Registry client created");
        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    fn endpoint_url<I>(&self, segments: I) -> Result<Url>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| KeysError::InvalidRegistryHost(self.credentials.host.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET `url` and return the body of a 200 answer.
    async fn fetch(&self, url: Url) -> Result<String> {
        let start = Instant::now();

        let response = self
            .client
            .get(url.clone())
            .basic_auth(
                &self.credentials.basic_auth_user,
                Some(self.credentials.basic_auth_password.as_str()),
            )
            .send()
            .await
            .map_err(|e| {
                warn!(
                    error = %e,
                    path = url.path(),
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Registry request failed"
                );
                KeysError::from(e)
            })?;

        let status = response.status();
        debug!(status = %status, path = url.path(), "Received HTTP response");
        check_status(status)?;

        let body = response.text().await?;
        debug!(
            bytes = body.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Request completed successfully"
        );
        Ok(body)
    }
}

/// Map a registry HTTP status onto the error taxonomy. Only 200 is success.
pub(crate) fn check_status(status: StatusCode) -> Result<()> {
    if status == StatusCode::OK {
        return Ok(());
    }
    warn!(status = %status, "Registry denied the request");
    Err(match DenialReason::from_status(status.as_u16()) {
        Some(reason) => KeysError::Denied(reason),
        None => KeysError::UnexpectedStatus(status.as_u16()),
    })
}

/// Pull the numeric user id out of an attribute-query answer.
pub(crate) fn parse_identity(body: &str) -> Result<IdentityRecord> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| KeysError::MalformedResponse(format!("identity is not JSON: {e}")))?;

    let field = value
        .as_object()
        .ok_or_else(|| KeysError::MalformedResponse("identity is not a JSON object".into()))?
        .get(UID_NUMBER_FIELD)
        .ok_or_else(|| KeysError::MalformedResponse(format!("identity has no {UID_NUMBER_FIELD}")))?;

    let numeric_user_id = match field {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| {
        KeysError::MalformedResponse(format!("{UID_NUMBER_FIELD} is not a user id: {field}"))
    })?;

    Ok(IdentityRecord { numeric_user_id })
}

#[async_trait]
impl Registry for BwidmRegistry {
    #[instrument(level = "info", skip(self), fields(service = %self.credentials.service_name))]
    async fn resolve_identity(&self, username: &str) -> Result<IdentityRecord> {
        let eppn = format!("{username}@{}", self.credentials.eppn_scope);
        let url = self.endpoint_url([
            "rest",
            "attrq",
            "eppn",
            self.credentials.service_name.as_str(),
            eppn.as_str(),
        ])?;

        let identity = parse_identity(&self.fetch(url).await?)?;
        info!(uid_number = identity.numeric_user_id, "Resolved identity");
        Ok(identity)
    }

    #[instrument(level = "info", skip(self))]
    async fn retrieve_keys(&self, user_id: u64, endpoint: &KeyEndpoint) -> Result<Vec<SshKeyEntry>> {
        let url = self.endpoint_url(endpoint.path_segments(&self.credentials.service_name, user_id))?;

        let body = self.fetch(url).await?;
        let entries = endpoint.shape().parse(&body)?;
        info!(count = entries.len(), "Retrieved keys");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_status_mapping() {
        assert!(check_status(StatusCode::OK).is_ok());
        assert!(matches!(
            check_status(StatusCode::UNAUTHORIZED),
            Err(KeysError::Denied(DenialReason::LoginFailed))
        ));
        assert!(matches!(
            check_status(StatusCode::PAYMENT_REQUIRED),
            Err(KeysError::Denied(DenialReason::ServiceIdInvalid))
        ));
        assert!(matches!(
            check_status(StatusCode::FORBIDDEN),
            Err(KeysError::Denied(DenialReason::NoAssertion))
        ));
        assert!(matches!(
            check_status(StatusCode::NOT_FOUND),
            Err(KeysError::Denied(DenialReason::UserNotRegistered))
        ));
        assert!(matches!(
            check_status(StatusCode::INTERNAL_SERVER_ERROR),
            Err(KeysError::Denied(DenialReason::MisconfiguredService))
        ));
        assert!(matches!(
            check_status(StatusCode::BAD_GATEWAY),
            Err(KeysError::UnexpectedStatus(502))
        ));
        assert!(matches!(
            check_status(StatusCode::NO_CONTENT),
            Err(KeysError::UnexpectedStatus(204))
        ));
    }

    #[test]
    fn test_parse_identity() {
        let id = parse_identity(r#"{"uidNumber": 900123, "eppn": "alice@uni-freiburg.de"}"#).unwrap();
        assert_eq!(id.numeric_user_id, 900123);

        let id = parse_identity(r#"{"uidNumber": "900124"}"#).unwrap();
        assert_eq!(id.numeric_user_id, 900124);
    }

    #[test]
    fn test_parse_identity_malformed() {
        for body in [
            "",
            "<html>",
            "[]",
            r#"{"uid": 1}"#,
            r#"{"uidNumber": null}"#,
            r#"{"uidNumber": -5}"#,
            r#"{"uidNumber": "abc"}"#,
        ] {
            assert!(
                matches!(parse_identity(body), Err(KeysError::MalformedResponse(_))),
                "{body:?} should be malformed"
            );
        }
    }
}
