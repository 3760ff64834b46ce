use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use lcp_core::Instant;

use crate::cert::Certificate;
use crate::crl::{CrlCache, CrlFetcher};
use crate::crypto::SignatureAlgorithm;
use crate::error::{CertError, LicenseError};
use crate::profile::ProfileRegistry;

/// `encryption.content_key` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentKeyInfo {
    pub algorithm: String,
    pub encrypted_value: String,
}

/// `encryption.user_key` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserKeyInfo {
    pub algorithm: String,
    pub key_check: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_hint: Option<String>,
}

/// `encryption` (spec §3, §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Encryption {
    pub profile: String,
    pub content_key: ContentKeyInfo,
    pub user_key: UserKeyInfo,
}

/// `signature` (spec §3, §4.4; URI of the digest algorithm, base64 DER
/// certificate, base64 signature value).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    pub algorithm: String,
    pub certificate: String,
    pub value: String,
}

/// `rights` (spec §3): known countable/boolean/time-bounded members plus
/// any unrecognized ones, preserved verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rights {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub print: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copy: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

/// `user` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/**
    A parsed license document (spec §3, §4.4). Holds both the typed fields
    used by the pipeline and the original `serde_json::Value` it was parsed
    from, so canonicalization for signature verification operates on the
    exact member set the provider signed — including unknown members this
    struct doesn't model.
*/
#[derive(Debug, Clone)]
pub struct License {
    pub id: String,
    pub issued: String,
    pub updated: String,
    pub provider: String,
    pub encryption: Encryption,
    pub links: Value,
    pub rights: Rights,
    pub user: User,
    pub signature: Signature,
    raw: Value,
}

// Manual Deserialize isn't needed; we parse via serde_json::Value and pull
// typed fields out explicitly so `raw` can retain the untouched document.
impl License {
    /// Parse and structurally validate a license document (§4.4 step 1).
    /// Does not verify the signature or chain of trust — see
    /// [`License::verify`].
    pub fn parse(json: &str) -> Result<Self, LicenseError> {
        let raw: Value = serde_json::from_str(json)
            .map_err(|e| LicenseError::Malformed(format!("invalid JSON: {e}")))?;

        let id = field_str(&raw, "id")?;
        let issued = field_str(&raw, "issued")?;
        let updated = field_str(&raw, "updated")?;
        let provider = field_str(&raw, "provider")?;

        let encryption: Encryption = serde_json::from_value(
            raw.get("encryption")
                .cloned()
                .ok_or_else(|| LicenseError::Malformed("missing 'encryption'".into()))?,
        )
        .map_err(|e| LicenseError::Malformed(format!("encryption: {e}")))?;

        let rights: Rights = match raw.get("rights") {
            Some(v) => serde_json::from_value(v.clone())
                .map_err(|e| LicenseError::Malformed(format!("rights: {e}")))?,
            None => Rights::default(),
        };

        let user: User = serde_json::from_value(
            raw.get("user")
                .cloned()
                .ok_or_else(|| LicenseError::Malformed("missing 'user'".into()))?,
        )
        .map_err(|e| LicenseError::Malformed(format!("user: {e}")))?;

        let signature: Signature = serde_json::from_value(
            raw.get("signature")
                .cloned()
                .ok_or_else(|| LicenseError::Malformed("missing 'signature'".into()))?,
        )
        .map_err(|e| LicenseError::Malformed(format!("signature: {e}")))?;

        let links = raw.get("links").cloned().unwrap_or(Value::Null);

        Ok(License {
            id,
            issued,
            updated,
            provider,
            encryption,
            links,
            rights,
            user,
            signature,
            raw,
        })
    }

    /// The canonical-JSON bytes that `signature.value` was computed over:
    /// the full document with the `signature` member removed, serialized
    /// with RFC 8785 (JSON Canonicalization Scheme) — canonical member
    /// order, no insignificant whitespace, shortest valid escaping (§4.4
    /// step 2).
    pub fn canonical_signed_bytes(&self) -> Result<Vec<u8>, LicenseError> {
        let mut without_signature = self.raw.clone();
        if let Value::Object(map) = &mut without_signature {
            map.remove("signature");
        }
        serde_json_canonicalizer::to_vec(&without_signature)
            .map_err(|e| LicenseError::Malformed(format!("canonicalization: {e}")))
    }

    /// Full verification pipeline (§4.4 steps 2-4): decode the signer
    /// certificate, chain it to the profile's root, CRL-check it, and
    /// verify `signature.value` over the canonical bytes.
    pub async fn verify<F: CrlFetcher>(
        &self,
        profiles: &ProfileRegistry,
        crl_cache: &CrlCache<F>,
        clock: &dyn lcp_core::Clock,
    ) -> Result<(), LicenseError> {
        let profile = profiles.get(&self.encryption.profile)?;

        let algorithm = SignatureAlgorithm::from_uri(&self.signature.algorithm).ok_or_else(|| {
            LicenseError::Cert(CertError::SigAlgoNotFound(self.signature.algorithm.clone()))
        })?;
        if !profile.permits(algorithm) {
            return Err(LicenseError::Cert(CertError::SigAlgoNotFound(
                self.signature.algorithm.clone(),
            )));
        }

        let signer = Certificate::from_base64(&self.signature.certificate)?;

        let now = clock.now();
        signer.is_valid_at(now)?;
        signer.verify_against(profile.root_certificate())?;

        if profile.requires_crl_check() {
            self.check_revocation(&signer, crl_cache, clock).await?;
        }

        let canonical = self.canonical_signed_bytes()?;
        let sig_bytes = lcp_core::base64_decode(&self.signature.value)
            .map_err(|e| LicenseError::Malformed(format!("signature.value: {e}")))?;

        signer
            .verify_message(algorithm, &canonical, &sig_bytes)
            .map_err(|_| LicenseError::SignatureInvalid)?;

        tracing::debug!(license_id = %self.id, "license signature verified");
        Ok(())
    }

    /// §9 Open Question resolution: CRL checking is mandatory whenever the
    /// certificate names distribution points; absent any, this spec treats
    /// the certificate as not subject to revocation checking.
    async fn check_revocation<F: CrlFetcher>(
        &self,
        signer: &Certificate,
        crl_cache: &CrlCache<F>,
        clock: &dyn lcp_core::Clock,
    ) -> Result<(), LicenseError> {
        for url in signer.crl_distribution_points() {
            let revoked = crl_cache
                .is_revoked(url, signer.serial(), clock)
                .await
                .map_err(LicenseError::Crl)?;
            if revoked {
                tracing::warn!(serial = signer.serial(), %url, "certificate revoked");
                return Err(LicenseError::Cert(CertError::Revoked(
                    signer.serial().to_string(),
                )));
            }
        }
        Ok(())
    }

    /// §4.6: the facade refuses to open if the clock is outside the
    /// license's rights window.
    pub fn is_within_time_window(&self, now: Instant) -> bool {
        if let Some(start) = &self.rights.start {
            if let Ok(start) = lcp_core::parse_rfc3339(start) {
                if now < start {
                    return false;
                }
            }
        }
        if let Some(end) = &self.rights.end {
            if let Ok(end) = lcp_core::parse_rfc3339(end) {
                if now > end {
                    return false;
                }
            }
        }
        true
    }
}

fn field_str(raw: &Value, name: &str) -> Result<String, LicenseError> {
    raw.get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| LicenseError::Malformed(format!("missing or non-string '{name}'")))
}
