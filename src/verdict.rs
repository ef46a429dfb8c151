//! The cross-checks and policy decisions applied after a token has been
//! cryptographically verified: measurement agreement between the quote
//! extracted from the peer certificate and the one reconstructed from the
//! token, enclave attribute flags, and finally the caller's measurement
//! policy.

use crate::{
    config::{AllowFlags, ExpectedMeasurements},
    error::VerifyError,
    jwt::SyntheticQuoteBody,
    quote::{AttributesFlags, QuoteBlob},
};

/// The stage a verification call reached before failing, or completing.
/// Discriminants increase monotonically with how far the call progressed,
/// mirroring the linear `AT_*` state machine the callback this crate
/// replaces used to report through its results struct.
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Stage {
    Init = 0,
    ExtractQuote = 1,
    VerifyExternal = 2,
    VerifyEnclaveAttrs = 3,
    VerifyEnclaveMeasurements = 4,
    Done = 5,
}

/// A caller-supplied measurement policy, invoked with the enclave identity
/// reconstructed from the verified token. Used in place of
/// [`ExpectedMeasurements`] when the caller wants logic richer than a
/// single allowed mrenclave/mrsigner pair (e.g. an allowlist looked up from
/// a database).
pub trait MeasurementPolicy {
    fn check(&self, quote_body: &SyntheticQuoteBody) -> Result<(), VerifyError>;
}

impl<F> MeasurementPolicy for F
where
    F: Fn(&SyntheticQuoteBody) -> Result<(), VerifyError>,
{
    fn check(&self, quote_body: &SyntheticQuoteBody) -> Result<(), VerifyError> {
        self(quote_body)
    }
}

impl MeasurementPolicy for ExpectedMeasurements {
    fn check(&self, quote_body: &SyntheticQuoteBody) -> Result<(), VerifyError> {
        if let Some(expected) = self.mrenclave {
            if expected != quote_body.mr_enclave {
                return Err(VerifyError::MeasurementMismatch);
            }
        }
        if let Some(expected) = self.mrsigner {
            if expected != quote_body.mr_signer {
                return Err(VerifyError::MeasurementMismatch);
            }
        }
        if let Some(expected) = self.isv_prod_id {
            if expected != quote_body.isv_prod_id {
                return Err(VerifyError::MeasurementMismatch);
            }
        }
        if let Some(expected) = self.isv_svn {
            if expected != quote_body.isv_svn {
                return Err(VerifyError::MeasurementMismatch);
            }
        }
        Ok(())
    }
}

/// Compare the quote pulled directly off the peer certificate against the
/// one reconstructed from the verified token's `sgx_*` claims. Only
/// `report_data`, `mr_enclave`, and `mr_signer` are compared, matching the
/// sanity cross-check the source performs (isv_prod_id/isv_svn/attributes
/// aren't re-derivable from the original quote without parsing it further,
/// so they're trusted from the token alone).
pub fn check_measurements_agree(
    original: &QuoteBlob,
    from_token: &SyntheticQuoteBody,
) -> Result<(), VerifyError> {
    if original.report_data() != from_token.report_data
        || original.mr_enclave() != from_token.mr_enclave
        || original.mr_signer() != from_token.mr_signer
    {
        return Err(VerifyError::MeasurementMismatch);
    }
    Ok(())
}

/// Check the enclave attribute bits the token claims: mode/init bits must be
/// set, provisioning/license-key bits must be clear, and the debug bit is
/// gated on `allow.allow_debug_enclave`.
pub fn check_enclave_attributes(
    quote_body: &SyntheticQuoteBody,
    allow: &AllowFlags,
) -> Result<(), VerifyError> {
    let flags = quote_body.attributes_flags;

    if !allow.allow_debug_enclave && flags.contains(AttributesFlags::DEBUG) {
        return Err(VerifyError::DebugEnclave);
    }

    if !flags.contains(AttributesFlags::MODE64BIT)
        || !flags.contains(AttributesFlags::INITIALIZED)
        || flags.contains(AttributesFlags::PROVISION_KEY)
        || flags.contains(AttributesFlags::LICENSE_KEY)
    {
        return Err(VerifyError::InvalidAttributes);
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn quote_body(flags: AttributesFlags) -> SyntheticQuoteBody {
        SyntheticQuoteBody {
            mr_enclave: [1u8; 32],
            mr_signer: [2u8; 32],
            report_data: [3u8; 64],
            isv_prod_id: 1,
            isv_svn: 1,
            attributes_flags: flags,
        }
    }

    #[test]
    fn test_attribute_checks() {
        let good = AttributesFlags::INITIALIZED | AttributesFlags::MODE64BIT;
        assert!(check_enclave_attributes(
            &quote_body(good),
            &AllowFlags::default()
        )
        .is_ok());

        let missing_init = AttributesFlags::MODE64BIT;
        assert!(matches!(
            check_enclave_attributes(&quote_body(missing_init), &AllowFlags::default()),
            Err(VerifyError::InvalidAttributes)
        ));

        let with_provision = good | AttributesFlags::PROVISION_KEY;
        assert!(matches!(
            check_enclave_attributes(&quote_body(with_provision), &AllowFlags::default()),
            Err(VerifyError::InvalidAttributes)
        ));

        let debug = good | AttributesFlags::DEBUG;
        assert!(matches!(
            check_enclave_attributes(&quote_body(debug), &AllowFlags::default()),
            Err(VerifyError::DebugEnclave)
        ));
        let allow_debug = AllowFlags {
            allow_debug_enclave: true,
            ..Default::default()
        };
        assert!(check_enclave_attributes(&quote_body(debug), &allow_debug).is_ok());
    }

    #[test]
    fn test_expected_measurements_policy() {
        let policy = ExpectedMeasurements {
            mrenclave: Some([1u8; 32]),
            mrsigner: None,
            isv_prod_id: None,
            isv_svn: None,
        };
        let good = AttributesFlags::INITIALIZED | AttributesFlags::MODE64BIT;
        assert!(policy.check(&quote_body(good)).is_ok());

        let wrong = ExpectedMeasurements {
            mrenclave: Some([9u8; 32]),
            mrsigner: None,
            isv_prod_id: None,
            isv_svn: None,
        };
        assert!(wrong.check(&quote_body(good)).is_err());
    }

    #[test]
    fn test_expected_measurements_policy_gates_isv_ids() {
        let good = AttributesFlags::INITIALIZED | AttributesFlags::MODE64BIT;

        let matching = ExpectedMeasurements {
            mrenclave: None,
            mrsigner: None,
            isv_prod_id: Some(1),
            isv_svn: Some(1),
        };
        assert!(matching.check(&quote_body(good)).is_ok());

        let wrong_svn = ExpectedMeasurements {
            mrenclave: None,
            mrsigner: None,
            isv_prod_id: Some(1),
            isv_svn: Some(99),
        };
        assert!(matches!(
            wrong_svn.check(&quote_body(good)),
            Err(VerifyError::MeasurementMismatch)
        ));
    }

    #[test]
    fn test_stage_ordering() {
        assert!(Stage::Init < Stage::ExtractQuote);
        assert!(Stage::VerifyEnclaveMeasurements < Stage::Done);
    }
}
