//! The scoped HTTPS session used to talk to Intel Trust Authority.
//!
//! Two calls per verification: `GET {portal}/certs` (the JWK set) and
//! `POST {provider}/appraisal/{api_version}/attest` (the attestation
//! request). The verification callback this session serves is itself a
//! blocking call (see the crate's concurrency model), so this wraps
//! `reqwest::blocking::Client` rather than spinning up an async runtime of
//! our own.

use std::time::Duration;

use serde::Deserialize;

use crate::{base64url, config::ConfigSlots, error::VerifyError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A reusable session wrapping one `reqwest::blocking::Client`. Building the
/// client is the only fallible, non-trivial step; cloning a
/// `reqwest::blocking::Client` is cheap (it's an `Arc` internally), so a
/// single [`Session`] may be kept alive and reused across many verification
/// calls (§9 "Single-use session vs pool").
pub struct Session {
    http: reqwest::blocking::Client,
}

#[derive(Deserialize)]
struct AttestResponse {
    token: String,
}

impl Session {
    pub fn build() -> Result<Self, VerifyError> {
        let http = reqwest::blocking::Client::builder()
            .https_only(true)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| VerifyError::UpstreamError(e.to_string()))?;
        Ok(Self { http })
    }

    /// `GET {portal}/certs` -> the raw JWK-set JSON body, as text (the JWT
    /// validator re-parses it itself; we just need it to be non-empty
    /// well-formed JSON here).
    pub fn get_signing_certs(
        &self,
        config: &ConfigSlots,
    ) -> Result<String, VerifyError> {
        let url = config.certs_url();
        let resp = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .map_err(|e| {
                VerifyError::UpstreamError(format!(
                    "GET {url} failed: {e}"
                ))
            })?;

        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        if !status.is_success() {
            tracing::warn!(%url, %status, "ITA \"GET certs\" request failed");
            return Err(VerifyError::UpstreamError(format!(
                "GET {url} returned status {status}"
            )));
        }
        if body.is_empty() {
            return Err(VerifyError::UpstreamError(
                "ITA \"GET certs\" response body is empty".to_string(),
            ));
        }
        // Just a structural sanity check; the JWT validator owns the real
        // parse of `keys`/`kty`/`kid`/`x5c`.
        let _: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| {
                VerifyError::UpstreamError(format!(
                    "ITA \"GET certs\" response is not valid JSON: {e}"
                ))
            })?;
        Ok(body)
    }

    /// `POST {provider}/appraisal/{api_version}/attest` -> the raw JWT
    /// string (`h.p.s`).
    pub fn send_attestation(
        &self,
        config: &ConfigSlots,
        quote: &[u8],
        runtime_data: &[u8],
        policy_ids: Option<&str>,
    ) -> Result<String, VerifyError> {
        let url = config.attest_url();
        let quote_b64 = base64url::encode_url(quote);
        let runtime_data_b64 = base64url::encode_url(runtime_data);

        // `policy_ids` is a raw JSON array literal taken verbatim from the
        // environment (see `config::policy_ids_literal`), not a Rust value
        // serde can serialize on its own; splice it in unescaped, matching
        // the source's `snprintf`-based request construction.
        let body = match policy_ids {
            Some(literal) => format!(
                "{{\"quote\": \"{quote_b64}\", \"runtime_data\": \"{runtime_data_b64}\", \
                 \"policy_ids\": [{literal}]}}"
            ),
            None => format!(
                "{{\"quote\": \"{quote_b64}\", \"runtime_data\": \"{runtime_data_b64}\"}}"
            ),
        };

        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &config.api_key)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .map_err(|e| {
                VerifyError::UpstreamError(format!(
                    "POST {url} failed: {e}"
                ))
            })?;

        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        if !status.is_success() {
            tracing::warn!(%url, %status, "ITA attestation request failed");
            return Err(VerifyError::UpstreamError(format!(
                "POST {url} returned status {status}"
            )));
        }
        if body.is_empty() {
            return Err(VerifyError::UpstreamError(
                "ITA attestation response body is empty".to_string(),
            ));
        }

        let parsed: AttestResponse =
            serde_json::from_str(&body).map_err(|e| {
                VerifyError::UpstreamError(format!(
                    "ITA attestation response is not valid JSON: {e}"
                ))
            })?;
        Ok(parsed.token)
    }
}
