use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

/**
    Default profile's passphrase-to-user-key derivation (§4.1, §4.5): a
    single unsalted SHA-256 of the UTF-8 passphrase bytes.
*/
pub fn sha256_passphrase(passphrase: &str) -> [u8; 32] {
    let digest = Sha256::digest(passphrase.as_bytes());
    digest.into()
}

/**
    PBKDF2-HMAC-SHA256, exposed for non-default profiles that specify an
    iterated, salted KDF instead of the default's bare SHA-256 (§4.1 allows
    additional profiles to name their own KDF parameters).
*/
pub fn pbkdf2_hmac_sha256(passphrase: &[u8], salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut out = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase, salt, iterations, &mut out);
    out
}

/**
    HMAC-SHA-256, a primitive independent of which profile uses it (listed
    alongside the other C1 primitives) — not called by the default profile's
    key-check, but available for a MAC-based variant.
*/
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; 32] {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(message);
    mac.finalize().into_bytes().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passphrase_hash_prefix_matches_known_vector() {
        // spec §8 scenario 1: SHA-256("White whales are huge!") begins b5cd1260…
        let uk = sha256_passphrase("White whales are huge!");
        assert_eq!(&uk[..4], &[0xb5, 0xcd, 0x12, 0x60]);
    }

    #[test]
    fn pbkdf2_is_deterministic_and_salt_sensitive() {
        let a = pbkdf2_hmac_sha256(b"pass", b"salt1", 1000);
        let b = pbkdf2_hmac_sha256(b"pass", b"salt1", 1000);
        let c = pbkdf2_hmac_sha256(b"pass", b"salt2", 1000);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn hmac_sha256_rfc4231_case_1() {
        // RFC 4231 test case 1: key = 0x0b * 20, data = "Hi There"
        let key = [0x0bu8; 20];
        let mac = hmac_sha256(&key, b"Hi There");
        let expected = lcp_core::hex_decode(
            "b0344c61d8db38535ca8afceaf0bf12b\
             881dc200c9833da726e9376c2e32cff7",
        )
        .unwrap();
        assert_eq!(mac.to_vec(), expected);
    }
}
