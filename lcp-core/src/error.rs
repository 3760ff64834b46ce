use thiserror::Error;

/**
    Stable integer status codes returned at the public API boundary.

    Ref: spec §6. These never change meaning once assigned; new failure
    modes get new codes rather than reusing one.
*/
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok = 0,
    LicenseOutOfDate = 11,
    CertRevoked = 12,
    CertSigAlgoNotFound = 13,
    ProviderCertNotValid = 14,
    LicenseSignatureInvalid = 15,
    ContextInvalid = 16,
    UserKeyCheckFailed = 21,
    ContentKeyDecryptFailed = 22,
    LicenseNetworkError = 31,
    LicenseStorageError = 32,
    DecryptPaddingInvalid = 41,
    DecryptShortRead = 42,
    DecryptOutOfRange = 43,
    RightsInsufficient = 51,
    RightsExpired = 52,
}

impl StatusCode {
    pub const fn code(self) -> u16 {
        self as u16
    }
}

impl core::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/**
    Error returned by `FromStr`/base64/hex decode helpers.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind}: {reason}")]
pub struct DecodeError {
    pub kind: &'static str,
    pub reason: String,
}
