//! Process-wide configuration slots, resolved from the environment.
//!
//! Mirrors the `OrEnvExt` env-fallback idiom used elsewhere in this
//! workspace, but specialized for required-vs-optional string slots rather
//! than a CLI-arg override. Required slots are cached for the lifetime of
//! the process in a [`std::sync::OnceLock`] once successfully resolved;
//! policy selectors are intentionally read fresh on every call.

use std::{env, sync::OnceLock};

use crate::error::VerifyError;

const PROVIDER_URL: &str = "RA_TLS_ITA_PROVIDER_URL";
const PROVIDER_API_VERSION: &str = "RA_TLS_ITA_PROVIDER_API_VERSION";
const API_KEY: &str = "RA_TLS_ITA_API_KEY";
const PORTAL_URL: &str = "RA_TLS_ITA_PORTAL_URL";

const DEFAULT_API_VERSION: &str = "v1";

/// The four process-wide, write-once configuration slots.
#[derive(Debug, Clone)]
pub struct ConfigSlots {
    pub provider_url: String,
    pub provider_api_version: String,
    pub api_key: String,
    pub portal_url: String,
}

static CONFIG: OnceLock<ConfigSlots> = OnceLock::new();

impl ConfigSlots {
    /// Resolve the config slots from the environment on first call; return
    /// the cached value on every subsequent call in this process.
    pub fn get_or_init() -> Result<&'static ConfigSlots, VerifyError> {
        if let Some(slots) = CONFIG.get() {
            return Ok(slots);
        }
        let slots = Self::from_env()?;
        // If another thread won the race, fall back to its value: callers
        // must serialize verifications (see the crate's concurrency model),
        // but `OnceLock` itself is safe regardless.
        Ok(CONFIG.get_or_init(|| slots))
    }

    fn from_env() -> Result<Self, VerifyError> {
        Ok(Self {
            provider_url: required_env(PROVIDER_URL)?,
            provider_api_version: optional_env_or(
                PROVIDER_API_VERSION,
                DEFAULT_API_VERSION,
            )?,
            api_key: required_env(API_KEY)?,
            portal_url: required_env(PORTAL_URL)?,
        })
    }

    /// `{portal}/certs`
    pub fn certs_url(&self) -> String {
        format!("{}/certs", self.portal_url)
    }

    /// `{provider}/appraisal/{api_version}/attest`
    pub fn attest_url(&self) -> String {
        format!(
            "{}/appraisal/{}/attest",
            self.provider_url, self.provider_api_version
        )
    }
}

fn env_var_opt(name: &'static str) -> Result<Option<String>, VerifyError> {
    match env::var(name) {
        Ok(val) => Ok(Some(val)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => {
            Err(VerifyError::ConfigInvalid(name))
        }
    }
}

fn required_env(name: &'static str) -> Result<String, VerifyError> {
    env_var_opt(name)?.ok_or(VerifyError::ConfigMissing(name))
}

fn optional_env_or(
    name: &'static str,
    default: &str,
) -> Result<String, VerifyError> {
    Ok(env_var_opt(name)?.unwrap_or_else(|| default.to_string()))
}

/// Read a boolean env var per the spec's convention: presence of the
/// variable means `true` unless its value is literal `"0"` or empty.
fn env_bool(name: &str) -> bool {
    match env::var(name) {
        Ok(val) => !(val.is_empty() || val == "0"),
        Err(_) => false,
    }
}

/// The policy allow-flags, read fresh on every verification call (never
/// cached, unlike [`ConfigSlots`]).
#[derive(Copy, Clone, Debug, Default)]
pub struct AllowFlags {
    pub allow_outdated_tcb: bool,
    pub allow_hw_config_needed: bool,
    pub allow_sw_hardening_needed: bool,
    pub allow_debug_enclave: bool,
}

impl AllowFlags {
    pub fn from_env() -> Self {
        Self {
            allow_outdated_tcb: env_bool("RA_TLS_ALLOW_OUTDATED_TCB"),
            allow_hw_config_needed: env_bool(
                "RA_TLS_ALLOW_HW_CONFIG_NEEDED",
            ),
            allow_sw_hardening_needed: env_bool(
                "RA_TLS_ALLOW_SW_HARDENING_NEEDED",
            ),
            allow_debug_enclave: env_bool("RA_TLS_ALLOW_DEBUG_ENCLAVE"),
        }
    }
}

/// `RA_TLS_ITA_POLICY_IDS`: a raw JSON array literal, included verbatim in
/// the attestation request body. Must start with `"` per the source (a
/// sanity check that the env value looks like a JSON string/array element,
/// not a guarantee of full JSON validity — the upstream ITA service is the
/// final arbiter of the request body's shape).
pub fn policy_ids_literal() -> Result<Option<String>, VerifyError> {
    match env_var_opt("RA_TLS_ITA_POLICY_IDS")? {
        None => Ok(None),
        Some(literal) if literal.starts_with('"') => Ok(Some(literal)),
        Some(_) => Err(VerifyError::ConfigInvalid("RA_TLS_ITA_POLICY_IDS")),
    }
}

/// Expected measurement slots for the default (no user callback) measurement
/// policy (§6 of the expanded spec). Absence of any slot means "accept any
/// value for this field" — mirrors the original's
/// `verify_quote_body_against_envvar_measurements`, which gates on all four
/// of mrenclave/mrsigner/isv_prod_id/isv_svn when their env vars are set.
#[derive(Clone, Debug, Default)]
pub struct ExpectedMeasurements {
    pub mrenclave: Option<[u8; 32]>,
    pub mrsigner: Option<[u8; 32]>,
    pub isv_prod_id: Option<u16>,
    pub isv_svn: Option<u16>,
}

impl ExpectedMeasurements {
    pub fn from_env() -> Result<Self, VerifyError> {
        Ok(Self {
            mrenclave: optional_hex32("RA_TLS_ITA_MRENCLAVE")?,
            mrsigner: optional_hex32("RA_TLS_ITA_MRSIGNER")?,
            isv_prod_id: optional_u16("RA_TLS_ITA_ISVPRODID")?,
            isv_svn: optional_u16("RA_TLS_ITA_ISVSVN")?,
        })
    }
}

fn optional_hex32(
    name: &'static str,
) -> Result<Option<[u8; 32]>, VerifyError> {
    match env_var_opt(name)? {
        None => Ok(None),
        Some(hex_str) => crate::hex::decode_array(&hex_str)
            .map(Some)
            .map_err(|_| VerifyError::ConfigInvalid(name)),
    }
}

fn optional_u16(name: &'static str) -> Result<Option<u16>, VerifyError> {
    match env_var_opt(name)? {
        None => Ok(None),
        Some(raw) => raw
            .parse::<u16>()
            .map(Some)
            .map_err(|_| VerifyError::ConfigInvalid(name)),
    }
}
