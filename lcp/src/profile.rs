use std::collections::HashMap;

use crate::cert::Certificate;
use crate::crypto::SignatureAlgorithm;
use crate::error::LicenseError;

/**
    Named bundle of algorithms, parameters and trust anchor a license
    references by URI. The default profile binds unsalted SHA-256
    passphrase hashing, AES-256-CBC/PKCS#7 content streams, RSA-PKCS#1
    v1.5 signatures, and one embedded root certificate.
*/
pub struct Profile {
    id: String,
    root_certificate: Certificate,
    permitted_signature_algorithms: Vec<SignatureAlgorithm>,
    require_crl_check: bool,
}

impl Profile {
    pub fn new(
        id: impl Into<String>,
        root_certificate: Certificate,
        permitted_signature_algorithms: Vec<SignatureAlgorithm>,
    ) -> Self {
        Self {
            id: id.into(),
            root_certificate,
            permitted_signature_algorithms,
            require_crl_check: true,
        }
    }

    /// Build the default profile against the root certificate shipped with
    /// this build ([`DEFAULT_ROOT_CERTIFICATE_DER`]), with all three
    /// RSA-PKCS#1 v1.5 digest variants permitted for both certificate and
    /// license signatures.
    pub fn default_profile() -> Result<Self, LicenseError> {
        Self::with_root_certificate(DEFAULT_ROOT_CERTIFICATE_DER)
    }

    /// Build the default profile's algorithm set against an arbitrary root
    /// certificate. Trust anchor rotation means registering a new profile
    /// id; this is how that new profile gets built, and it's also how
    /// tests exercise the pipeline against a root other than the one
    /// shipped with the build.
    pub fn with_root_certificate(root_certificate_der: &[u8]) -> Result<Self, LicenseError> {
        let root = Certificate::from_der(root_certificate_der.to_vec())
            .map_err(LicenseError::Cert)?;
        Ok(Self::new(
            DEFAULT_PROFILE_ID,
            root,
            vec![
                SignatureAlgorithm::Sha256WithRsa,
                SignatureAlgorithm::Sha1WithRsa,
                SignatureAlgorithm::Md5WithRsa,
            ],
        ))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root_certificate(&self) -> &Certificate {
        &self.root_certificate
    }

    pub fn permits(&self, algorithm: SignatureAlgorithm) -> bool {
        self.permitted_signature_algorithms.contains(&algorithm)
    }

    /// CRL checking is mandatory whenever the certificate carries
    /// distribution points; the default profile offers no looser mode, but
    /// the knob exists so a future profile could opt out explicitly.
    pub fn requires_crl_check(&self) -> bool {
        self.require_crl_check
    }

    /// Default profile's KDF: unsalted SHA-256 of the passphrase bytes.
    pub fn derive_user_key(&self, passphrase: &str) -> [u8; 32] {
        crate::crypto::kdf::sha256_passphrase(passphrase)
    }
}

/// URI naming the default profile in a license's `encryption.profile` field.
pub const DEFAULT_PROFILE_ID: &str = "http://readium.org/lcp/profile-1.0";

/// Root trust anchor shipped with the default profile: a single
/// DER-encoded root certificate embedded directly in the binary. Rotating
/// trust means registering a new profile id bound to a different root,
/// not mutating this constant in place.
pub const DEFAULT_ROOT_CERTIFICATE_DER: &[u8] = include_bytes!("../certs/lcp_root.der");

/**
    Read-only (after construction) table of known profiles, keyed by the
    URI a license names in `encryption.profile`. An unknown profile fails
    the open with a distinguishable error. Owned by the service facade,
    not a global singleton.
*/
pub struct ProfileRegistry {
    profiles: HashMap<String, Profile>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self {
            profiles: HashMap::new(),
        }
    }

    /// Registry containing only the default profile, built against the
    /// root certificate shipped with this build.
    pub fn with_default() -> Result<Self, LicenseError> {
        let mut registry = Self::new();
        registry.register(Profile::default_profile()?);
        Ok(registry)
    }

    /// Registry containing only the default profile's algorithm set, built
    /// against an arbitrary root certificate — for tests and deployments
    /// that pin a different trust anchor under the same profile id.
    pub fn with_default_root(root_certificate_der: &[u8]) -> Result<Self, LicenseError> {
        let mut registry = Self::new();
        registry.register(Profile::with_root_certificate(root_certificate_der)?);
        Ok(registry)
    }

    pub fn register(&mut self, profile: Profile) {
        self.profiles.insert(profile.id().to_string(), profile);
    }

    pub fn get(&self, id: &str) -> Result<&Profile, LicenseError> {
        self.profiles
            .get(id)
            .ok_or_else(|| LicenseError::UnknownProfile(id.to_string()))
    }
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_profile_is_distinguishable_error() {
        let registry = ProfileRegistry::new();
        let err = registry.get("http://example.com/unknown-profile").unwrap_err();
        assert!(matches!(err, LicenseError::UnknownProfile(id) if id == "http://example.com/unknown-profile"));
    }
}
