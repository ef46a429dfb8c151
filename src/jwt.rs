//! Parsing and verification of the attestation token Intel Trust Authority
//! returns from a `POST /attest` call.
//!
//! A token is a standard compact JWS: three base64url segments joined by
//! `.`. ITA only ever issues PS384 (RSASSA-PSS, SHA-384, 48-byte salt)
//! tokens, signed by a key whose certificate is published at the portal's
//! `/certs` JWK-set endpoint. Everything here operates on that one token
//! shape; there is no support for other `alg` values because ITA never
//! sends them.

use asn1_rs::FromDer;
use serde::Deserialize;
use serde_json::Value;
use x509_parser::certificate::X509Certificate;

use crate::{
    base64url,
    config::AllowFlags,
    error::VerifyError,
    quote::AttributesFlags,
};

const EXPECTED_ISSUER: &str = "Intel Trust Authority";
const EXPECTED_VERSION: &str = "1.0.0";
const EXPECTED_ATTESTER_TYPE: &str = "SGX";
const NOT_BEFORE_SLACK_SECS: i64 = 60;

#[derive(Deserialize)]
struct Header {
    alg: String,
    typ: String,
    kid: String,
    jku: String,
}

#[derive(Deserialize)]
struct Jwk {
    kty: String,
    kid: String,
    x5c: Vec<String>,
}

#[derive(Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

/// The enclave identity materialized from a verified token's `sgx_*` claims,
/// standing in for a full SGX quote body so the rest of the verifier can
/// cross-check it against the quote it extracted straight from the peer
/// certificate (§4.4 of the expanded spec).
#[derive(Debug)]
pub struct SyntheticQuoteBody {
    pub mr_enclave: [u8; 32],
    pub mr_signer: [u8; 32],
    pub report_data: [u8; 64],
    pub isv_prod_id: u16,
    pub isv_svn: u16,
    pub attributes_flags: AttributesFlags,
}

/// Everything pulled out of a verified token that the rest of the verifier
/// cares about.
#[derive(Debug)]
pub struct VerifiedToken {
    pub quote_body: SyntheticQuoteBody,
    pub advisory_ids: Option<Vec<String>>,
}

/// Verify `token` (`h.p.s`) against `jwk_set_json` (the raw JSON body
/// returned by `GET {portal}/certs`), checking the signature, the generic
/// and ITA-specific claims, and the TCB status policy. `expected_jku` is the
/// `{portal}/certs` URL the `jku` header claim must match exactly.
pub fn verify(
    token: &str,
    jwk_set_json: &str,
    expected_jku: &str,
    allow: &AllowFlags,
) -> Result<VerifiedToken, VerifyError> {
    let mut parts = token.split('.');
    let (Some(header_b64), Some(payload_b64), Some(sig_b64), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return Err(VerifyError::MalformedJwt(
            "token does not have exactly three `.`-separated segments"
                .to_string(),
        ));
    };

    let header_bytes = base64url::decode_url(header_b64)
        .map_err(|_| VerifyError::MalformedJwt("header is not base64url".to_string()))?;
    let payload_bytes = base64url::decode_url(payload_b64)
        .map_err(|_| VerifyError::MalformedJwt("payload is not base64url".to_string()))?;
    let signature = base64url::decode_url(sig_b64)
        .map_err(|_| VerifyError::MalformedJwt("signature is not base64url".to_string()))?;

    let header: Header = serde_json::from_slice(&header_bytes).map_err(|e| {
        VerifyError::MalformedJwt(format!("header is not valid JSON: {e}"))
    })?;
    if header.alg != "PS384" || header.typ != "JWT" {
        return Err(VerifyError::MalformedJwt(format!(
            "unsupported header alg/typ: {}/{}",
            header.alg, header.typ
        )));
    }
    if header.jku != expected_jku {
        return Err(VerifyError::MalformedJwt(format!(
            "header `jku` is `{}`, expected `{}`",
            header.jku, expected_jku
        )));
    }

    let signing_key = find_signing_key(jwk_set_json, &header.kid)?;
    let signed_message = format!("{header_b64}.{payload_b64}");
    verify_signature(&signing_key, signed_message.as_bytes(), &signature)?;

    let payload: Value = serde_json::from_slice(&payload_bytes).map_err(|e| {
        VerifyError::MalformedJwt(format!("payload is not valid JSON: {e}"))
    })?;

    check_generic_claims(&payload)?;
    check_policy_ids(&payload)?;
    let advisory_ids = check_attester_claims(&payload, allow)?;
    let quote_body = materialize_quote_body(&payload)?;

    Ok(VerifiedToken {
        quote_body,
        advisory_ids,
    })
}

/// Find the signing certificate's RSA public key (in the DER `RSAPublicKey`
/// form `ring` expects) among the keys in the JWK set whose `kid` matches.
fn find_signing_key(
    jwk_set_json: &str,
    kid: &str,
) -> Result<Vec<u8>, VerifyError> {
    let jwk_set: JwkSet = serde_json::from_str(jwk_set_json).map_err(|e| {
        VerifyError::UpstreamError(format!(
            "ITA JWK set is not valid JSON: {e}"
        ))
    })?;

    for key in &jwk_set.keys {
        if key.kty != "RSA" {
            return Err(VerifyError::MalformedJwt(format!(
                "ITA JWK `kty` is `{}`, expected `RSA`",
                key.kty
            )));
        }
        if key.kid != kid {
            continue;
        }
        let cert_b64 = key.x5c.first().ok_or_else(|| {
            VerifyError::MalformedJwt(
                "ITA JWK's `x5c` array is empty".to_string(),
            )
        })?;
        // `x5c` is standard (padded) base64, unlike the JWT's own segments.
        let cert_der = base64url::decode_standard(cert_b64).map_err(|_| {
            VerifyError::UpstreamError(
                "ITA JWK's `x5c` entry is not valid base64".to_string(),
            )
        })?;
        let (_, cert) = X509Certificate::from_der(&cert_der).map_err(|e| {
            VerifyError::UpstreamError(format!(
                "ITA JWK's `x5c` entry is not a valid X.509 cert: {e}"
            ))
        })?;
        // For RSA keys the SPKI's `subjectPublicKey` bit string content is
        // exactly the DER-encoded `RSAPublicKey` ring's verifier wants.
        return Ok(cert.public_key().subject_public_key.as_ref().to_vec());
    }

    Err(VerifyError::KeyNotFound)
}

fn verify_signature(
    rsa_public_key_der: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), VerifyError> {
    let key = ring::signature::UnparsedPublicKey::new(
        &ring::signature::RSA_PSS_2048_8192_SHA384,
        rsa_public_key_der,
    );
    key.verify(message, signature)
        .map_err(|_| VerifyError::SignatureInvalid)
}

fn check_generic_claims(payload: &Value) -> Result<(), VerifyError> {
    let iss = expect_str(payload, "iss")?;
    if iss != EXPECTED_ISSUER {
        return Err(VerifyError::MalformedJwt(format!(
            "`iss` is `{iss}`, expected `{EXPECTED_ISSUER}`"
        )));
    }

    let ver = expect_str(payload, "ver")?;
    if ver != EXPECTED_VERSION {
        return Err(VerifyError::MalformedJwt(format!(
            "`ver` is `{ver}`, expected `{EXPECTED_VERSION}`"
        )));
    }

    let exp = expect_i64(payload, "exp")?;
    let nbf = expect_i64(payload, "nbf")?;
    let nbf_with_slack = if nbf > NOT_BEFORE_SLACK_SECS {
        nbf - NOT_BEFORE_SLACK_SECS
    } else {
        nbf
    };

    let now = now_unix();
    if !(nbf_with_slack <= now && now <= exp) {
        return Err(VerifyError::JwtExpired);
    }
    Ok(())
}

fn now_unix() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

fn check_policy_ids(payload: &Value) -> Result<(), VerifyError> {
    if let Some(matched) = payload.get("policy_ids_matched") {
        if !matched.is_array() {
            return Err(VerifyError::MalformedJwt(
                "`policy_ids_matched` is not a JSON array".to_string(),
            ));
        }
    }
    if let Some(unmatched) = payload.get("policy_ids_unmatched") {
        let arr = unmatched.as_array().ok_or_else(|| {
            VerifyError::MalformedJwt(
                "`policy_ids_unmatched` is not a JSON array".to_string(),
            )
        })?;
        if !arr.is_empty() {
            return Err(VerifyError::PolicyUnmatched);
        }
    }
    Ok(())
}

/// Check `attester_type` and `attester_tcb_status` against the allow-flags
/// policy, and return `attester_advisory_ids` (present only for informational
/// surfacing, never itself a gate).
fn check_attester_claims(
    payload: &Value,
    allow: &AllowFlags,
) -> Result<Option<Vec<String>>, VerifyError> {
    let attester_type = expect_str(payload, "attester_type")?;
    if attester_type != EXPECTED_ATTESTER_TYPE {
        return Err(VerifyError::WrongAttester);
    }

    let tcb_status = expect_str(payload, "attester_tcb_status")?;
    let tcb_allowed = match tcb_status {
        "UpToDate" => true,
        "SWHardeningNeeded" => allow.allow_sw_hardening_needed,
        "ConfigurationNeeded" => allow.allow_hw_config_needed,
        "ConfigurationAndSWHardeningNeeded" => {
            allow.allow_hw_config_needed && allow.allow_sw_hardening_needed
        }
        "OutOfDate" => allow.allow_outdated_tcb,
        "OutOfDateConfigurationNeeded" => {
            allow.allow_outdated_tcb && allow.allow_hw_config_needed
        }
        _ => false,
    };
    if !tcb_allowed {
        return Err(VerifyError::TcbNotAllowed(tcb_status.to_string()));
    }
    if tcb_status != "UpToDate" {
        tracing::info!(tcb_status, "allowing non-up-to-date TCB status");
    }

    let advisory_ids = match payload.get("attester_advisory_ids") {
        None => None,
        Some(val) => {
            let arr = val.as_array().ok_or_else(|| {
                VerifyError::MalformedJwt(
                    "`attester_advisory_ids` is not a JSON array".to_string(),
                )
            })?;
            let ids = arr
                .iter()
                .map(|v| {
                    v.as_str().map(str::to_string).ok_or_else(|| {
                        VerifyError::MalformedJwt(
                            "`attester_advisory_ids` entry is not a string"
                                .to_string(),
                        )
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            if !ids.is_empty() {
                tracing::info!(advisory_ids = ?ids, "ITA JWT advisory IDs");
            }
            Some(ids)
        }
    };

    Ok(advisory_ids)
}

fn materialize_quote_body(
    payload: &Value,
) -> Result<SyntheticQuoteBody, VerifyError> {
    let is_debuggable = payload
        .get("sgx_is_debuggable")
        .and_then(Value::as_bool)
        .ok_or_else(|| {
            VerifyError::MalformedJwt(
                "`sgx_is_debuggable` is missing or not a bool".to_string(),
            )
        })?;
    let mr_enclave_hex = expect_str(payload, "sgx_mrenclave")?;
    let mr_signer_hex = expect_str(payload, "sgx_mrsigner")?;
    let report_data_hex = expect_str(payload, "sgx_report_data")?;
    let isv_prod_id = expect_u16(payload, "sgx_isvprodid")?;
    let isv_svn = expect_u16(payload, "sgx_isvsvn")?;

    let mr_enclave = crate::hex::decode_array(mr_enclave_hex).map_err(|_| {
        VerifyError::MalformedJwt("`sgx_mrenclave` is not hex".to_string())
    })?;
    let mr_signer = crate::hex::decode_array(mr_signer_hex).map_err(|_| {
        VerifyError::MalformedJwt("`sgx_mrsigner` is not hex".to_string())
    })?;
    let report_data =
        crate::hex::decode_array(report_data_hex).map_err(|_| {
            VerifyError::MalformedJwt(
                "`sgx_report_data` is not hex".to_string(),
            )
        })?;

    let mut flags = AttributesFlags::INITIALIZED | AttributesFlags::MODE64BIT;
    if is_debuggable {
        flags = flags | AttributesFlags::DEBUG;
    }

    Ok(SyntheticQuoteBody {
        mr_enclave,
        mr_signer,
        report_data,
        isv_prod_id,
        isv_svn,
        attributes_flags: flags,
    })
}

fn expect_str<'a>(
    payload: &'a Value,
    field: &'static str,
) -> Result<&'a str, VerifyError> {
    payload.get(field).and_then(Value::as_str).ok_or_else(|| {
        VerifyError::MalformedJwt(format!(
            "`{field}` is missing or not a string"
        ))
    })
}

fn expect_i64(
    payload: &Value,
    field: &'static str,
) -> Result<i64, VerifyError> {
    payload.get(field).and_then(Value::as_i64).ok_or_else(|| {
        VerifyError::MalformedJwt(format!(
            "`{field}` is missing or not an integer"
        ))
    })
}

fn expect_u16(
    payload: &Value,
    field: &'static str,
) -> Result<u16, VerifyError> {
    let raw = expect_i64(payload, field)?;
    u16::try_from(raw).map_err(|_| {
        VerifyError::MalformedJwt(format!("`{field}` does not fit in u16"))
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_tcb_status_policy() {
        let deny_all = AllowFlags::default();
        let allow_all = AllowFlags {
            allow_outdated_tcb: true,
            allow_hw_config_needed: true,
            allow_sw_hardening_needed: true,
            allow_debug_enclave: true,
        };

        let up_to_date = serde_json::json!({
            "attester_type": "SGX",
            "attester_tcb_status": "UpToDate",
        });
        assert!(check_attester_claims(&up_to_date, &deny_all).is_ok());

        let out_of_date = serde_json::json!({
            "attester_type": "SGX",
            "attester_tcb_status": "OutOfDate",
        });
        assert!(matches!(
            check_attester_claims(&out_of_date, &deny_all),
            Err(VerifyError::TcbNotAllowed(_))
        ));
        assert!(check_attester_claims(&out_of_date, &allow_all).is_ok());

        let combo = serde_json::json!({
            "attester_type": "SGX",
            "attester_tcb_status": "ConfigurationAndSWHardeningNeeded",
        });
        assert!(matches!(
            check_attester_claims(&combo, &deny_all),
            Err(VerifyError::TcbNotAllowed(_))
        ));
        assert!(check_attester_claims(&combo, &allow_all).is_ok());
    }

    #[test]
    fn test_wrong_attester_type_rejected() {
        let wrong = serde_json::json!({
            "attester_type": "TDX",
            "attester_tcb_status": "UpToDate",
        });
        assert!(matches!(
            check_attester_claims(&wrong, &AllowFlags::default()),
            Err(VerifyError::WrongAttester)
        ));
    }

    #[test]
    fn test_unmatched_policy_ids_rejected() {
        let payload = serde_json::json!({
            "policy_ids_matched": ["a"],
            "policy_ids_unmatched": ["b"],
        });
        assert!(matches!(
            check_policy_ids(&payload),
            Err(VerifyError::PolicyUnmatched)
        ));

        let clean = serde_json::json!({
            "policy_ids_matched": ["a"],
            "policy_ids_unmatched": [],
        });
        assert!(check_policy_ids(&clean).is_ok());
    }

    #[test]
    fn test_materialize_quote_body() {
        let payload = serde_json::json!({
            "sgx_is_debuggable": true,
            "sgx_mrenclave": "11".repeat(32),
            "sgx_mrsigner": "22".repeat(32),
            "sgx_report_data": "33".repeat(64),
            "sgx_isvprodid": 1,
            "sgx_isvsvn": 2,
        });
        let body = materialize_quote_body(&payload).unwrap();
        assert_eq!(body.mr_enclave, [0x11u8; 32]);
        assert_eq!(body.mr_signer, [0x22u8; 32]);
        assert_eq!(body.isv_prod_id, 1);
        assert_eq!(body.isv_svn, 2);
        assert!(body
            .attributes_flags
            .contains(AttributesFlags::DEBUG));
    }

    #[test]
    fn test_malformed_token_shape_rejected() {
        let err = super::verify(
            "only.two",
            "{}",
            "https://example/certs",
            &AllowFlags::default(),
        )
        .unwrap_err();
        assert!(matches!(err, VerifyError::MalformedJwt(_)));
    }
}
