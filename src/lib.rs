//! RA-TLS verification callback that appraises SGX quotes via Intel Trust
//! Authority (ITA).
//!
//! This crate implements the certificate-verification callback a TLS
//! library invokes on a peer's self-signed certificate during a remote
//! attestation handshake: it pulls an embedded SGX quote out of the
//! certificate, submits it to ITA for appraisal over HTTPS, cryptographically
//! verifies the signed JWT ITA returns, and gates the connection on the
//! enclave's identity, debuggability, and TCB freshness.
//!
//! The TLS library hosting this callback, the SGX quote-generation side, and
//! the companion secret-provisioning transport ([`secret_provisioning`]) are
//! all out of scope — this crate only decides trust/no-trust.

pub mod base64url;
pub mod client;
pub mod config;
pub mod error;
pub mod hex;
pub mod jwt;
pub mod logging;
pub mod quote;
pub mod secret_provisioning;
pub mod verdict;

use std::sync::Arc;

pub use error::{VerifyError, VerifyErrorKind};
pub use verdict::{MeasurementPolicy, Stage};

use config::{AllowFlags, ConfigSlots, ExpectedMeasurements};

/// This core doesn't yet have a name registered in any shared
/// attestation-scheme enum upstream, so it reports itself generically.
pub const ATTESTATION_SCHEME: &str = "ita";

/// The overall outcome of a verification call, handed back across the TLS
/// boundary this crate's callback serves.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Status {
    Verified,
    CertVerifyFailed,
}

/// The expanded, struct-carrying counterpart to a results-out parameter: the
/// stage reached, and — on success — the raw JWT/JWK-set material and any
/// advisory IDs ITA attached to the token. Returned by value, owned by the
/// caller; nothing is published through process-wide state.
#[derive(Debug, Default)]
pub struct VerifyResults {
    pub attestation_scheme: Option<&'static str>,
    pub stage: Option<Stage>,
    pub jwt: Option<String>,
    pub jwk_set: Option<String>,
    pub advisory_ids: Option<Vec<String>>,
    pub kind: Option<VerifyErrorKind>,
}

/// Verify a peer's self-signed certificate against Intel Trust Authority,
/// building a one-off HTTPS session for the call.
///
/// Callers that verify more than once per process should build a
/// [`Verifier`] instead and call [`Verifier::verify`], which reuses one
/// `reqwest::blocking::Client` across calls rather than paying connection
/// setup on every call.
pub fn verify(
    cert_der: &[u8],
    depth: i32,
    measurement_policy: Option<&dyn MeasurementPolicy>,
    results: Option<&mut VerifyResults>,
) -> Status {
    match client::Session::build() {
        Ok(session) => {
            Verifier { session: Arc::new(session) }
                .verify(cert_der, depth, measurement_policy, results)
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to build ITA HTTPS session");
            if let Some(r) = results {
                r.kind = Some(e.kind());
            }
            Status::CertVerifyFailed
        }
    }
}

/// A reusable, `Arc`-wrapped [`client::Session`], for embedders that verify
/// more than once per process and want to avoid rebuilding the HTTPS client
/// on every call (§9 "Single-use session vs pool").
#[derive(Clone)]
pub struct Verifier {
    session: Arc<client::Session>,
}

impl Verifier {
    pub fn build() -> Result<Self, VerifyError> {
        Ok(Self {
            session: Arc::new(client::Session::build()?),
        })
    }

    pub fn session(&self) -> &client::Session {
        &self.session
    }

    /// Verify a peer's self-signed certificate against Intel Trust
    /// Authority.
    ///
    /// `depth` must be `0` — RA-TLS certificate chains are a single
    /// self-signed leaf; any other depth is rejected without inspecting
    /// `cert_der`. `results` is optional; when present it is populated with
    /// the stage reached and, on success, the verified JWT/JWK-set
    /// material.
    ///
    /// `measurement_policy` selects the verdict engine's final measurement
    /// check: `None` falls back to the environment-variable-backed
    /// [`ExpectedMeasurements`] policy (§6 of the crate's design notes).
    pub fn verify(
        &self,
        cert_der: &[u8],
        depth: i32,
        measurement_policy: Option<&dyn MeasurementPolicy>,
        mut results: Option<&mut VerifyResults>,
    ) -> Status {
        if let Some(r) = results.as_deref_mut() {
            *r = VerifyResults {
                attestation_scheme: Some(ATTESTATION_SCHEME),
                stage: Some(Stage::Init),
                ..Default::default()
            };
        }

        match self.verify_inner(cert_der, depth, measurement_policy, results.as_deref_mut()) {
            Ok(()) => {
                if let Some(r) = results {
                    r.stage = Some(Stage::Done);
                }
                Status::Verified
            }
            Err(e) => {
                tracing::warn!(error = %e, "RA-TLS ITA verification failed");
                if let Some(r) = results {
                    r.kind = Some(e.kind());
                }
                Status::CertVerifyFailed
            }
        }
    }

    fn verify_inner(
        &self,
        cert_der: &[u8],
        depth: i32,
        measurement_policy: Option<&dyn MeasurementPolicy>,
        mut results: Option<&mut VerifyResults>,
    ) -> Result<(), VerifyError> {
        if depth != 0 {
            return Err(VerifyError::InvalidCert(format!(
                "expected a single self-signed leaf cert at depth 0, got depth {depth}"
            )));
        }

        let config = ConfigSlots::get_or_init()?;

        set_stage(&mut results, Stage::ExtractQuote);
        let (quote, pk_der) = quote::extract_and_check_binding(cert_der)?;

        set_stage(&mut results, Stage::VerifyExternal);
        let jwk_set = self.session.get_signing_certs(config)?;
        let policy_ids = config::policy_ids_literal()?;
        let token = self.session.send_attestation(
            config,
            quote.as_bytes(),
            &pk_der,
            policy_ids.as_deref(),
        )?;

        let allow = AllowFlags::from_env();
        let verified = jwt::verify(&token, &jwk_set, &config.certs_url(), &allow)?;

        if let Some(r) = results.as_deref_mut() {
            r.jwt = Some(token);
            r.jwk_set = Some(jwk_set);
            r.advisory_ids = verified.advisory_ids.clone();
        }

        verdict::check_measurements_agree(&quote, &verified.quote_body)?;

        set_stage(&mut results, Stage::VerifyEnclaveAttrs);
        verdict::check_enclave_attributes(&verified.quote_body, &allow)?;

        set_stage(&mut results, Stage::VerifyEnclaveMeasurements);
        match measurement_policy {
            Some(policy) => policy.check(&verified.quote_body)?,
            None => {
                let expected = ExpectedMeasurements::from_env()?;
                expected.check(&verified.quote_body)?;
            }
        }

        Ok(())
    }
}

fn set_stage(results: &mut Option<&mut VerifyResults>, stage: Stage) {
    if let Some(r) = results.as_deref_mut() {
        r.stage = Some(stage);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_depth_nonzero_rejected() {
        let status = verify(&[], 1, None, None);
        assert_eq!(status, Status::CertVerifyFailed);
    }

    #[test]
    fn test_results_stage_recorded_on_early_failure() {
        let mut results = VerifyResults::default();
        let status = verify(&[], 1, None, Some(&mut results));
        assert_eq!(status, Status::CertVerifyFailed);
        assert_eq!(results.stage, Some(Stage::Init));
        assert_eq!(results.kind, Some(VerifyErrorKind::InvalidCert));
    }
}
