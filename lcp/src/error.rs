use thiserror::Error;

use lcp_core::StatusCode;

/**
    Certificate parsing and chain-verification failures (§4.2).
*/
#[derive(Debug, Clone, Error)]
pub enum CertError {
    #[error("malformed certificate: {0}")]
    Malformed(String),
    #[error("certificate signature algorithm OID not supported: {0}")]
    SigAlgoNotFound(String),
    #[error("certificate signature length does not match modulus size, or verification failed")]
    NotValid,
    #[error("certificate is not yet valid")]
    NotStarted,
    #[error("certificate has expired")]
    Expired,
    #[error("certificate serial {0} is revoked")]
    Revoked(String),
}

/**
    CRL fetch/cache failures (§4.3).
*/
#[derive(Debug, Clone, Error)]
pub enum CrlError {
    #[error("malformed CRL: {0}")]
    Malformed(String),
    #[error("CRL fetch failed: {0}")]
    FetchFailed(String),
    #[error("CRL fetch timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/**
    License document parsing and signature-verification failures (§4.4).
*/
#[derive(Debug, Clone, Error)]
pub enum LicenseError {
    #[error("malformed license: {0}")]
    Malformed(String),
    #[error(transparent)]
    Cert(#[from] CertError),
    #[error(transparent)]
    Crl(#[from] CrlError),
    #[error("certificate not chained to profile root")]
    NotChained,
    #[error("license signature invalid")]
    SignatureInvalid,
    #[error("unknown encryption profile: {0}")]
    UnknownProfile(String),
    #[error("license rights window does not include the current time")]
    OutOfDate,
}

/**
    User-key check / content-key unwrap failures (§4.5).
*/
#[derive(Debug, Clone, Error)]
pub enum KeyError {
    #[error("AES-CBC input invalid: {0}")]
    AesInvalidInput(String),
    #[error("PKCS#7 padding invalid")]
    PaddingInvalid,
    #[error("user key check failed")]
    UserKeyCheckFailed,
    #[error("content key decrypt failed: {0}")]
    ContentKeyDecryptFailed(String),
}

/**
    Rights-manager failures (§4.6).
*/
#[derive(Debug, Clone, Error)]
pub enum RightsError {
    #[error("right '{0}' is not countable")]
    NotCountable(String),
    #[error("insufficient remaining right '{right}': have {have}, need {need}")]
    Insufficient {
        right: String,
        have: u64,
        need: u64,
    },
    #[error("right '{0}' is out of its time window")]
    Expired(String),
    #[error("rights storage error: {0}")]
    Storage(String),
}

/**
    Decryption-stream failures (§4.7).
*/
#[derive(Debug, Clone, Error)]
pub enum DecryptError {
    #[error("PKCS#7 padding invalid at final ciphertext block")]
    PaddingInvalid,
    #[error("short read from underlying resource: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },
    #[error("seek position {pos} out of range (size {size})")]
    OutOfRange { pos: u64, size: u64 },
}

/**
    Acquisition-driver failures (§4.8).
*/
#[derive(Debug, Clone, Error)]
pub enum AcquisitionError {
    #[error("network error: {0}")]
    Network(String),
    #[error("acquisition canceled")]
    Canceled,
}

/**
    Aggregate error for the service facade (C9), mapping 1:1 to spec §6
    status codes via [`LcpError::status_code`].
*/
#[derive(Debug, Clone, Error)]
pub enum LcpError {
    #[error(transparent)]
    License(#[from] LicenseError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Rights(#[from] RightsError),
    #[error(transparent)]
    Decrypt(#[from] DecryptError),
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
    #[error("no open license for this handle")]
    ContextInvalid,
}

impl LcpError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            LcpError::License(LicenseError::Malformed(_)) => StatusCode::ContextInvalid,
            LcpError::License(LicenseError::OutOfDate) => StatusCode::LicenseOutOfDate,
            LcpError::License(LicenseError::Cert(CertError::NotStarted)) => {
                StatusCode::ProviderCertNotValid
            }
            LcpError::License(LicenseError::Cert(CertError::Expired)) => {
                StatusCode::ProviderCertNotValid
            }
            LcpError::License(LicenseError::Cert(CertError::SigAlgoNotFound(_))) => {
                StatusCode::CertSigAlgoNotFound
            }
            LcpError::License(LicenseError::Cert(CertError::NotValid)) => {
                StatusCode::ProviderCertNotValid
            }
            LcpError::License(LicenseError::Cert(CertError::Revoked(_))) => {
                StatusCode::CertRevoked
            }
            LcpError::License(LicenseError::Cert(CertError::Malformed(_))) => {
                StatusCode::ContextInvalid
            }
            LcpError::License(LicenseError::Crl(CrlError::FetchFailed(_)))
            | LcpError::License(LicenseError::Crl(CrlError::Timeout(_))) => {
                StatusCode::CertRevoked
            }
            LcpError::License(LicenseError::Crl(CrlError::Malformed(_))) => {
                StatusCode::CertRevoked
            }
            LcpError::License(LicenseError::NotChained) => StatusCode::ProviderCertNotValid,
            LcpError::License(LicenseError::SignatureInvalid) => {
                StatusCode::LicenseSignatureInvalid
            }
            LcpError::License(LicenseError::UnknownProfile(_)) => StatusCode::ContextInvalid,
            LcpError::Key(KeyError::UserKeyCheckFailed) => StatusCode::UserKeyCheckFailed,
            LcpError::Key(_) => StatusCode::ContentKeyDecryptFailed,
            LcpError::Rights(RightsError::Insufficient { .. })
            | LcpError::Rights(RightsError::NotCountable(_)) => StatusCode::RightsInsufficient,
            LcpError::Rights(RightsError::Expired(_)) => StatusCode::RightsExpired,
            LcpError::Rights(RightsError::Storage(_)) => StatusCode::LicenseStorageError,
            LcpError::Decrypt(DecryptError::PaddingInvalid) => StatusCode::DecryptPaddingInvalid,
            LcpError::Decrypt(DecryptError::ShortRead { .. }) => StatusCode::DecryptShortRead,
            LcpError::Decrypt(DecryptError::OutOfRange { .. }) => StatusCode::DecryptOutOfRange,
            LcpError::Acquisition(AcquisitionError::Network(_)) => StatusCode::LicenseNetworkError,
            LcpError::Acquisition(AcquisitionError::Canceled) => StatusCode::LicenseNetworkError,
            LcpError::ContextInvalid => StatusCode::ContextInvalid,
        }
    }
}
