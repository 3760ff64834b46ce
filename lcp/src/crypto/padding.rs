use crate::error::KeyError;

/**
    Remove PKCS#7 padding from a decrypted AES-CBC plaintext block.

    The last byte indicates the number of padding bytes (1-16). All padding
    bytes must carry that same value.
*/
pub fn pkcs7_unpad(data: &[u8], block_size: usize) -> Result<Vec<u8>, KeyError> {
    if data.is_empty() || !data.len().is_multiple_of(block_size) {
        return Err(KeyError::PaddingInvalid);
    }

    let pad = data[data.len() - 1] as usize;
    if pad == 0 || pad > block_size || pad > data.len() {
        return Err(KeyError::PaddingInvalid);
    }

    for &byte in &data[data.len() - pad..] {
        if byte as usize != pad {
            return Err(KeyError::PaddingInvalid);
        }
    }

    Ok(data[..data.len() - pad].to_vec())
}

/**
    Apply PKCS#7 padding to plaintext, appending 1..=block_size bytes each
    carrying the padding length.
*/
pub fn pkcs7_pad(data: &[u8], block_size: usize) -> Vec<u8> {
    let pad = block_size - (data.len() % block_size);
    let mut out = Vec::with_capacity(data.len() + pad);
    out.extend_from_slice(data);
    out.resize(data.len() + pad, pad as u8);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_unpad_round_trip() {
        for len in 0..=48 {
            let data: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let padded = pkcs7_pad(&data, 16);
            assert!(padded.len().is_multiple_of(16));
            assert!(padded.len() > data.len());
            let unpadded = pkcs7_unpad(&padded, 16).unwrap();
            assert_eq!(unpadded, data);
        }
    }

    #[test]
    fn pad_exact_block_adds_full_block() {
        let data = [0u8; 16];
        let padded = pkcs7_pad(&data, 16);
        assert_eq!(padded.len(), 32);
        assert!(padded[16..].iter().all(|&b| b == 16));
    }

    #[test]
    fn unpad_empty_fails() {
        let err = pkcs7_unpad(&[], 16).unwrap_err();
        assert!(matches!(err, KeyError::PaddingInvalid));
    }

    #[test]
    fn unpad_bad_pad_value_zero() {
        let mut block = [0u8; 16];
        block[15] = 0;
        let err = pkcs7_unpad(&block, 16).unwrap_err();
        assert!(matches!(err, KeyError::PaddingInvalid));
    }

    #[test]
    fn unpad_bad_pad_value_too_large() {
        let mut block = [0u8; 16];
        block[15] = 17;
        let err = pkcs7_unpad(&block, 16).unwrap_err();
        assert!(matches!(err, KeyError::PaddingInvalid));
    }

    #[test]
    fn unpad_inconsistent_padding() {
        let mut block = [0u8; 16];
        block[15] = 4;
        block[14] = 4;
        block[13] = 4;
        block[12] = 99;
        let err = pkcs7_unpad(&block, 16).unwrap_err();
        assert!(matches!(err, KeyError::PaddingInvalid));
    }

    #[test]
    fn unpad_not_block_aligned() {
        let err = pkcs7_unpad(&[0u8; 15], 16).unwrap_err();
        assert!(matches!(err, KeyError::PaddingInvalid));
    }
}
