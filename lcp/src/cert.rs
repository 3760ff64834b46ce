use rsa::RsaPublicKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::traits::PublicKeyParts;
use x509_parser::extensions::{DistributionPointName, GeneralName, ParsedExtension};
use x509_parser::prelude::{FromDer, X509Certificate};

use lcp_core::Instant;

use crate::crypto::SignatureAlgorithm;
use crate::error::CertError;

/**
    An X.509 v1/v3 DER certificate, decoded once and retained in owned form
    so callers don't need to keep the original base64/DER bytes alive.

    §4.2. The TBS (to-be-signed) byte range is kept verbatim — it must be
    re-encoded identically when re-verifying a signature, so it is sliced
    directly out of the original DER rather than rebuilt.
*/
#[derive(Debug, Clone)]
pub struct Certificate {
    der: Vec<u8>,
    tbs_range: core::ops::Range<usize>,
    serial: String,
    not_before: Instant,
    not_after: Instant,
    public_key: RsaPublicKey,
    signature_algorithm: SignatureAlgorithm,
    signature: Vec<u8>,
    crl_distribution_points: Vec<String>,
}

impl Certificate {
    /// Parse a certificate from base64-encoded DER (as found in a license's
    /// `signature.certificate` field).
    pub fn from_base64(b64: impl AsRef<[u8]>) -> Result<Self, CertError> {
        let der = lcp_core::base64_decode(b64)
            .map_err(|e| CertError::Malformed(format!("base64: {e}")))?;
        Self::from_der(der)
    }

    /// Parse a certificate from raw DER bytes.
    pub fn from_der(der: Vec<u8>) -> Result<Self, CertError> {
        let (_, cert) = X509Certificate::from_der(&der)
            .map_err(|e| CertError::Malformed(format!("DER decode: {e}")))?;

        let tbs_raw = cert.tbs_certificate.as_ref();
        let tbs_start = offset_of(&der, tbs_raw)
            .ok_or_else(|| CertError::Malformed("TBS range not within certificate DER".into()))?;
        let tbs_range = tbs_start..tbs_start + tbs_raw.len();

        let serial = cert.raw_serial_as_string();

        let not_before = cert.validity().not_before.to_datetime();
        let not_after = cert.validity().not_after.to_datetime();

        let spki_bytes = cert.public_key().subject_public_key.data.as_ref();
        let public_key = RsaPublicKey::from_pkcs1_der(spki_bytes)
            .map_err(|e| CertError::Malformed(format!("RSA public key: {e}")))?;

        let sig_oid = cert.signature_algorithm.algorithm.to_id_string();
        let signature_algorithm = SignatureAlgorithm::from_oid(&sig_oid)
            .ok_or_else(|| CertError::SigAlgoNotFound(sig_oid))?;

        let signature = cert.signature_value.data.to_vec();

        let crl_distribution_points = extract_crl_distribution_points(&cert);

        Ok(Certificate {
            der,
            tbs_range,
            serial,
            not_before,
            not_after,
            public_key,
            signature_algorithm,
            signature,
            crl_distribution_points,
        })
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn not_before(&self) -> Instant {
        self.not_before
    }

    pub fn not_after(&self) -> Instant {
        self.not_after
    }

    pub fn crl_distribution_points(&self) -> &[String] {
        &self.crl_distribution_points
    }

    pub fn is_valid_at(&self, now: Instant) -> Result<(), CertError> {
        if now < self.not_before {
            return Err(CertError::NotStarted);
        }
        if now > self.not_after {
            return Err(CertError::Expired);
        }
        Ok(())
    }

    fn tbs_bytes(&self) -> &[u8] {
        &self.der[self.tbs_range.clone()]
    }

    /// Verify an arbitrary message against this certificate's public key,
    /// using `algorithm` as named by the *signer* (never this certificate's
    /// own signature algorithm, which only describes how this cert was
    /// signed by its issuer).
    pub fn verify_message(
        &self,
        algorithm: SignatureAlgorithm,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), CertError> {
        algorithm.verify(&self.public_key, message, signature)
    }

    /// Verify this certificate's own signature against `root`'s public key,
    /// using this certificate's signature algorithm OID (§4.2).
    pub fn verify_against(&self, root: &Certificate) -> Result<(), CertError> {
        let modulus_bytes = root.public_key.size();
        if self.signature.len() != modulus_bytes {
            return Err(CertError::NotValid);
        }
        self.signature_algorithm
            .verify(&root.public_key, self.tbs_bytes(), &self.signature)
    }
}

/// Locate `needle`'s byte range within `haystack` by pointer arithmetic —
/// `x509-parser` borrows its raw TBS slice directly out of the input DER,
/// so this never falls back to a content search.
fn offset_of(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    let start = needle.as_ptr() as usize;
    let base = haystack.as_ptr() as usize;
    if start < base || start + needle.len() > base + haystack.len() {
        return None;
    }
    Some(start - base)
}

fn extract_crl_distribution_points(cert: &X509Certificate<'_>) -> Vec<String> {
    let mut urls = Vec::new();
    for ext in cert.extensions() {
        if let ParsedExtension::CRLDistributionPoints(points) = ext.parsed_extension() {
            for point in points.iter() {
                if let Some(DistributionPointName::FullName(names)) = &point.distribution_point {
                    for name in names {
                        if let GeneralName::URI(uri) = name {
                            urls.push((*uri).to_owned());
                        }
                    }
                }
            }
        }
    }
    urls
}

#[cfg(test)]
mod tests {
    use super::*;
    use lcp_core::Clock as _;

    #[test]
    fn bad_base64_is_malformed() {
        let err = Certificate::from_base64("not valid base64!!").unwrap_err();
        assert!(matches!(err, CertError::Malformed(_)));
    }

    #[test]
    fn truncated_der_is_malformed() {
        let err = Certificate::from_der(vec![0x30, 0x82, 0x01]).unwrap_err();
        assert!(matches!(err, CertError::Malformed(_)));
    }

    const ROOT_DER: &[u8] = include_bytes!("../tests/fixtures/root.der");
    const PROVIDER_DER: &[u8] = include_bytes!("../tests/fixtures/provider.der");

    #[test]
    fn provider_chains_to_root() {
        let root = Certificate::from_der(ROOT_DER.to_vec()).unwrap();
        let provider = Certificate::from_der(PROVIDER_DER.to_vec()).unwrap();
        provider.verify_against(&root).unwrap();
    }

    #[test]
    fn provider_does_not_chain_to_itself() {
        let provider = Certificate::from_der(PROVIDER_DER.to_vec()).unwrap();
        assert!(provider.verify_against(&provider).is_err());
    }

    #[test]
    fn root_cert_is_currently_valid() {
        let root = Certificate::from_der(ROOT_DER.to_vec()).unwrap();
        root.is_valid_at(lcp_core::SystemClock.now()).unwrap();
    }

    #[test]
    fn validity_bounds_reject_outside_instants() {
        let root = Certificate::from_der(ROOT_DER.to_vec()).unwrap();
        let far_past = time::OffsetDateTime::from_unix_timestamp(0).unwrap();
        assert!(matches!(root.is_valid_at(far_past), Err(CertError::NotStarted)));

        let far_future = lcp_core::SystemClock.now() + time::Duration::weeks(52 * 100);
        assert!(matches!(root.is_valid_at(far_future), Err(CertError::Expired)));
    }
}
