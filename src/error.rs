//! The error taxonomy for RA-TLS ITA verification.
//!
//! Every fallible function in this crate returns [`VerifyError`]. The
//! verification entry point ([`crate::verify`]) maps any [`VerifyError`] down
//! to the single umbrella [`crate::Status::CertVerifyFailed`] expected by the
//! TLS host, while preserving the finer-grained kind and the verification
//! [`Stage`](crate::Stage) at which it occurred on [`crate::VerifyResults`].

use thiserror::Error;

/// The full error taxonomy for a single verification call.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("missing required environment variable `{0}`")]
    ConfigMissing(&'static str),

    #[error("environment variable `{0}` is not valid UTF-8")]
    ConfigInvalid(&'static str),

    #[error("upstream HTTPS request to ITA failed: {0}")]
    UpstreamError(String),

    #[error("peer certificate does not carry a usable SGX quote extension: {0}")]
    InvalidCert(String),

    #[error("quote report_data does not bind to the peer certificate's public key")]
    BindingMismatch,

    #[error("malformed JWT: {0}")]
    MalformedJwt(String),

    #[error("JWT PS384 signature verification failed")]
    SignatureInvalid,

    #[error("no JWK in the signing-certificate set matches the JWT's `kid`")]
    KeyNotFound,

    #[error("JWT is outside its validity window (nbf/exp)")]
    JwtExpired,

    #[error("ITA attestation token reports unmatched policy IDs")]
    PolicyUnmatched,

    #[error("attester_type is not \"SGX\"")]
    WrongAttester,

    #[error("TCB status `{0}` is not permitted by the configured allow-flags")]
    TcbNotAllowed(String),

    #[error("enclave measurements from the JWT disagree with the original quote")]
    MeasurementMismatch,

    #[error("enclave is running in debug mode and debug enclaves are not allowed")]
    DebugEnclave,

    #[error("enclave attribute flags are invalid: mode/init bits clear or provisioning/license-key bits set")]
    InvalidAttributes,

    #[error("publish slots for JWT/JWK-set are already populated")]
    StateAlreadyPublished,
}

/// A fieldless mirror of [`VerifyError`], cheap to store on
/// [`crate::VerifyResults`] without holding onto the error's `String`
/// payloads.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VerifyErrorKind {
    ConfigMissing,
    ConfigInvalid,
    UpstreamError,
    InvalidCert,
    BindingMismatch,
    MalformedJwt,
    SignatureInvalid,
    KeyNotFound,
    JwtExpired,
    PolicyUnmatched,
    WrongAttester,
    TcbNotAllowed,
    MeasurementMismatch,
    DebugEnclave,
    InvalidAttributes,
    StateAlreadyPublished,
}

impl VerifyError {
    pub fn kind(&self) -> VerifyErrorKind {
        match self {
            Self::ConfigMissing(_) => VerifyErrorKind::ConfigMissing,
            Self::ConfigInvalid(_) => VerifyErrorKind::ConfigInvalid,
            Self::UpstreamError(_) => VerifyErrorKind::UpstreamError,
            Self::InvalidCert(_) => VerifyErrorKind::InvalidCert,
            Self::BindingMismatch => VerifyErrorKind::BindingMismatch,
            Self::MalformedJwt(_) => VerifyErrorKind::MalformedJwt,
            Self::SignatureInvalid => VerifyErrorKind::SignatureInvalid,
            Self::KeyNotFound => VerifyErrorKind::KeyNotFound,
            Self::JwtExpired => VerifyErrorKind::JwtExpired,
            Self::PolicyUnmatched => VerifyErrorKind::PolicyUnmatched,
            Self::WrongAttester => VerifyErrorKind::WrongAttester,
            Self::TcbNotAllowed(_) => VerifyErrorKind::TcbNotAllowed,
            Self::MeasurementMismatch => VerifyErrorKind::MeasurementMismatch,
            Self::DebugEnclave => VerifyErrorKind::DebugEnclave,
            Self::InvalidAttributes => VerifyErrorKind::InvalidAttributes,
            Self::StateAlreadyPublished => {
                VerifyErrorKind::StateAlreadyPublished
            }
        }
    }
}
