use md5::{Digest as _, Md5};
use rsa::Pkcs1v15Sign;
use rsa::RsaPublicKey;
use sha1::Sha1;
use sha2::Sha256;

use crate::error::CertError;

/**
    RSA-PKCS#1 v1.5 signature digest algorithms a certificate or license
    signature may name, identified by their PKCS#1 OID arcs (§4.1, §4.2).
    The digest used to verify a signature is always the *signer's*
    algorithm, never the verifying certificate's own.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Md5WithRsa,
    Sha1WithRsa,
    Sha256WithRsa,
}

impl SignatureAlgorithm {
    /// PKCS#1 `{pkcs-1} 4/5/11` OID dotted strings, as found in a
    /// certificate's `signatureAlgorithm` or a license's `signature.algorithm` URI.
    pub fn from_oid(oid: &str) -> Option<Self> {
        match oid {
            "1.2.840.113549.1.1.4" => Some(Self::Md5WithRsa),
            "1.2.840.113549.1.1.5" => Some(Self::Sha1WithRsa),
            "1.2.840.113549.1.1.11" => Some(Self::Sha256WithRsa),
            _ => None,
        }
    }

    /// Matches license `signature.algorithm` URIs, e.g.
    /// `http://www.w3.org/2000/09/xmldsig#rsa-sha256`.
    pub fn from_uri(uri: &str) -> Option<Self> {
        if uri.ends_with("rsa-sha256") {
            Some(Self::Sha256WithRsa)
        } else if uri.ends_with("rsa-sha1") {
            Some(Self::Sha1WithRsa)
        } else if uri.ends_with("rsa-md5") {
            Some(Self::Md5WithRsa)
        } else {
            None
        }
    }

    /**
        Verify an RSA-PKCS#1 v1.5 signature over `message` using this
        digest algorithm, dispatching to the matching RustCrypto digest
        the way `Certificate::VerifyCertificate` dispatches on the
        signature-algorithm OID in the original implementation.
    */
    pub fn verify(
        &self,
        public_key: &RsaPublicKey,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), CertError> {
        let result = match self {
            SignatureAlgorithm::Sha256WithRsa => {
                let hashed = Sha256::digest(message);
                public_key.verify(Pkcs1v15Sign::new::<Sha256>(), &hashed, signature)
            }
            SignatureAlgorithm::Sha1WithRsa => {
                let hashed = Sha1::digest(message);
                public_key.verify(Pkcs1v15Sign::new::<Sha1>(), &hashed, signature)
            }
            SignatureAlgorithm::Md5WithRsa => {
                let hashed = Md5::digest(message);
                public_key.verify(Pkcs1v15Sign::new::<Md5>(), &hashed, signature)
            }
        };
        result.map_err(|_| CertError::NotValid)
    }
}
