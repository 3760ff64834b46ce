use aes::Aes256;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};

use crate::error::KeyError;
use crate::crypto::padding::pkcs7_unpad;

pub const BLOCK_SIZE: usize = 16;

/**
    Decrypt a contiguous run of AES-256-CBC ciphertext blocks, chaining each
    block against the previous *ciphertext* block (the caller supplies the
    block that precedes the first one — the IV when decrypting from the
    start of the stream, or an arbitrary earlier ciphertext block when
    serving a random-access read per §4.7).

    `ciphertext` must be a whole number of 16-byte blocks. Returns exactly
    `ciphertext.len()` bytes of plaintext, still PKCS#7-padded if this run
    includes the final block of the stream.
*/
pub fn cbc_decrypt_blocks(
    key: &[u8; 32],
    prev_block: &[u8; 16],
    ciphertext: &[u8],
) -> Result<Vec<u8>, KeyError> {
    if ciphertext.is_empty() || !ciphertext.len().is_multiple_of(BLOCK_SIZE) {
        return Err(KeyError::AesInvalidInput(
            "ciphertext must be non-empty and block-aligned".into(),
        ));
    }

    let cipher = Aes256::new(GenericArray::from_slice(key));
    let mut plaintext = Vec::with_capacity(ciphertext.len());
    let mut prev = *prev_block;

    for chunk in ciphertext.chunks_exact(BLOCK_SIZE) {
        let saved: [u8; 16] = chunk.try_into().unwrap();
        let mut block = *GenericArray::from_slice(chunk);
        cipher.decrypt_block(&mut block);
        for i in 0..BLOCK_SIZE {
            plaintext.push(block[i] ^ prev[i]);
        }
        prev = saved;
    }

    Ok(plaintext)
}

/**
    Encrypt plaintext (already PKCS#7 padded) as AES-256-CBC, used only by
    tests to build self-consistent fixtures — production traffic arrives
    pre-encrypted from the license/resource.
*/
pub fn cbc_encrypt_blocks(key: &[u8; 32], iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    assert!(
        !plaintext.is_empty() && plaintext.len().is_multiple_of(BLOCK_SIZE),
        "plaintext must be pre-padded to the AES block size"
    );

    let cipher = Aes256::new(GenericArray::from_slice(key));
    let mut ciphertext = Vec::with_capacity(plaintext.len());
    let mut prev = *iv;

    for chunk in plaintext.chunks_exact(BLOCK_SIZE) {
        let mut block = [0u8; BLOCK_SIZE];
        for i in 0..BLOCK_SIZE {
            block[i] = chunk[i] ^ prev[i];
        }
        let mut block_ga = GenericArray::from(block);
        cipher.encrypt_block(&mut block_ga);
        prev.copy_from_slice(&block_ga);
        ciphertext.extend_from_slice(&block_ga);
    }

    ciphertext
}

/**
    Decrypt a full IV-prepended AES-256-CBC blob (spec §4.5's key-check and
    content-key-unwrap convention: first 16 bytes are the IV, the rest is
    ciphertext), and strip PKCS#7 padding from the result.
*/
pub fn decrypt_iv_prefixed(key: &[u8; 32], blob: &[u8]) -> Result<Vec<u8>, KeyError> {
    if blob.len() <= BLOCK_SIZE {
        return Err(KeyError::AesInvalidInput(
            "IV-prefixed blob must be longer than one block".into(),
        ));
    }
    let iv: [u8; 16] = blob[..BLOCK_SIZE].try_into().unwrap();
    let ciphertext = &blob[BLOCK_SIZE..];
    let padded = cbc_decrypt_blocks(key, &iv, ciphertext)?;
    pkcs7_unpad(&padded, BLOCK_SIZE).map_err(|_| KeyError::PaddingInvalid)
}
