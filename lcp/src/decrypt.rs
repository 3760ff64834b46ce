use std::sync::Mutex;

use crate::crypto::aes::{BLOCK_SIZE, cbc_decrypt_blocks};
use crate::crypto::padding::pkcs7_unpad;
use crate::error::DecryptError;
use crate::key::ContentKey;

/**
    External collaborator (spec §6): the archive container's raw byte
    stream for one encrypted resource. Implemented by the host's ZIP/EPUB
    reader; this crate never touches the archive format itself.
*/
pub trait ArchiveResource: Send {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
    fn seek(&mut self, pos: u64) -> std::io::Result<u64>;
    fn position(&mut self) -> std::io::Result<u64>;
    fn bytes_available(&mut self) -> std::io::Result<u64>;
}

/**
    Random-access AES-256-CBC/PKCS#7 decryption adapter over an
    [`ArchiveResource`] (C8, §4.7). Plaintext size and padding length are
    determined lazily on first [`DecryptionStream::size`] call by decrypting
    the final ciphertext block; every `read`/`seek` after that reuses the
    cached size without touching the underlying stream beyond the bytes it
    actually needs.
*/
pub struct DecryptionStream<R: ArchiveResource> {
    inner: Mutex<R>,
    key: [u8; 32],
    ciphertext_len: u64,
    plaintext_size: Mutex<Option<u64>>,
    position: Mutex<u64>,
}

impl<R: ArchiveResource> DecryptionStream<R> {
    /// `ciphertext_len` is the total length of `inner` (IV + ciphertext
    /// blocks), as reported by the archive reader.
    pub fn new(inner: R, key: &ContentKey, ciphertext_len: u64) -> Self {
        Self {
            inner: Mutex::new(inner),
            key: *key.as_bytes(),
            ciphertext_len,
            plaintext_size: Mutex::new(None),
            position: Mutex::new(0),
        }
    }

    /// §4.7: `size() = ciphertext_size − IV_size − padding_size`. The
    /// padding size is discovered by decrypting the last ciphertext block,
    /// cached after the first call.
    pub fn size(&self) -> Result<u64, DecryptError> {
        if let Some(cached) = *self.plaintext_size.lock().unwrap() {
            return Ok(cached);
        }

        let block_size = BLOCK_SIZE as u64;
        if self.ciphertext_len <= block_size || !self.ciphertext_len.is_multiple_of(block_size) {
            return Err(DecryptError::ShortRead {
                expected: BLOCK_SIZE,
                got: self.ciphertext_len as usize,
            });
        }

        let last_block_ct_offset = self.ciphertext_len - block_size;
        let prev_block_offset = last_block_ct_offset - block_size;

        let mut buf = vec![0u8; (block_size * 2) as usize];
        self.read_exact_at(prev_block_offset, &mut buf)?;

        let prev_block: [u8; 16] = buf[..BLOCK_SIZE].try_into().unwrap();
        let last_ct: &[u8] = &buf[BLOCK_SIZE..];
        let plain = cbc_decrypt_blocks(&self.key, &prev_block, last_ct)
            .map_err(|_| DecryptError::PaddingInvalid)?;
        let pad = *plain.last().ok_or(DecryptError::PaddingInvalid)? as u64;
        if pad == 0 || pad > block_size {
            return Err(DecryptError::PaddingInvalid);
        }

        let total_plaintext_with_padding = self.ciphertext_len - block_size; // minus IV
        let size = total_plaintext_with_padding - pad;
        *self.plaintext_size.lock().unwrap() = Some(size);
        Ok(size)
    }

    /// `seek(pos)` for `pos ∈ [0, size()]` is O(1) — it only updates the
    /// logical cursor, §4.7.
    pub fn seek(&self, pos: u64) -> Result<(), DecryptError> {
        let size = self.size()?;
        if pos > size {
            return Err(DecryptError::OutOfRange { pos, size });
        }
        *self.position.lock().unwrap() = pos;
        Ok(())
    }

    pub fn position(&self) -> u64 {
        *self.position.lock().unwrap()
    }

    /// Delivers up to `n` plaintext bytes starting at the current logical
    /// position, implementing §4.7's block-aligned range-fetch-then-discard
    /// algorithm, and advances the position by the number of bytes
    /// returned.
    pub fn read(&self, n: usize) -> Result<Vec<u8>, DecryptError> {
        let size = self.size()?;
        let p = self.position();
        if p >= size || n == 0 {
            return Ok(Vec::new());
        }

        let n = n.min((size - p) as usize);
        let plaintext = self.decrypt_range(p, n as u64)?;
        *self.position.lock().unwrap() = p + plaintext.len() as u64;
        Ok(plaintext)
    }

    /// Decrypt the logical plaintext range `[p, p+n)` against the full
    /// stream `size`, per §4.7's block arithmetic: ciphertext block `k`
    /// (block 0 is the IV) holds plaintext block `k - 1`, so the range
    /// `[p, p+n)` needs ciphertext blocks `k_lo - 1 ..= k_hi` fetched, each
    /// decrypted against its immediately preceding ciphertext block as IV.
    fn decrypt_range(&self, p: u64, n: u64) -> Result<Vec<u8>, DecryptError> {
        let b = BLOCK_SIZE as u64;
        let k_lo = p / b + 1;
        let k_hi = (p + n - 1) / b + 1;
        let total_ct_blocks = (self.ciphertext_len - b) / b; // blocks 1..=total_ct_blocks hold plaintext

        let fetch_offset = (k_lo - 1) * b;
        let fetch_len = (k_hi - k_lo + 2) * b;

        let mut buf = vec![0u8; fetch_len as usize];
        self.read_exact_at(fetch_offset, &mut buf)?;

        let prev_block: [u8; 16] = buf[..BLOCK_SIZE].try_into().unwrap();
        let ciphertext = &buf[BLOCK_SIZE..];
        let mut plaintext = cbc_decrypt_blocks(&self.key, &prev_block, ciphertext)
            .map_err(|_| DecryptError::PaddingInvalid)?;

        if k_hi == total_ct_blocks {
            // This fetch includes the final ciphertext block; strip its
            // PKCS#7 padding before slicing the requested range out.
            let tail_start = plaintext.len() - BLOCK_SIZE;
            let unpadded_tail = pkcs7_unpad(&plaintext[tail_start..], BLOCK_SIZE)
                .map_err(|_| DecryptError::PaddingInvalid)?;
            plaintext.truncate(tail_start);
            plaintext.extend_from_slice(&unpadded_tail);
        }

        let discard_front = (p % b) as usize;
        let wanted_end = discard_front + n as usize;
        let end = wanted_end.min(plaintext.len());
        Ok(plaintext[discard_front..end].to_vec())
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), DecryptError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .seek(offset)
            .map_err(|_| DecryptError::ShortRead {
                expected: buf.len(),
                got: 0,
            })?;
        let mut total = 0;
        while total < buf.len() {
            let got = inner.read(&mut buf[total..]).map_err(|_| DecryptError::ShortRead {
                expected: buf.len(),
                got: total,
            })?;
            if got == 0 {
                return Err(DecryptError::ShortRead {
                    expected: buf.len(),
                    got: total,
                });
            }
            total += got;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::ContentKey;

    struct SliceResource {
        data: Vec<u8>,
        pos: u64,
    }

    impl ArchiveResource for SliceResource {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let start = self.pos as usize;
            if start >= self.data.len() {
                return Ok(0);
            }
            let n = buf.len().min(self.data.len() - start);
            buf[..n].copy_from_slice(&self.data[start..start + n]);
            self.pos += n as u64;
            Ok(n)
        }
        fn seek(&mut self, pos: u64) -> std::io::Result<u64> {
            self.pos = pos;
            Ok(pos)
        }
        fn position(&mut self) -> std::io::Result<u64> {
            Ok(self.pos)
        }
        fn bytes_available(&mut self) -> std::io::Result<u64> {
            Ok(self.data.len() as u64 - self.pos)
        }
    }

    const RESOURCE_BLOB: &[u8] = include_bytes!("../tests/fixtures/resource.bin");
    const RESOURCE_PLAIN: &[u8] = include_bytes!("../tests/fixtures/resource_plain.bin");
    const CEK_HEX: &str = include_str!("../tests/fixtures/cek.hex");

    fn sample_stream() -> DecryptionStream<SliceResource> {
        let cek_bytes: [u8; 32] = lcp_core::hex_decode(CEK_HEX.trim())
            .unwrap()
            .try_into()
            .unwrap();
        let resource = SliceResource {
            data: RESOURCE_BLOB.to_vec(),
            pos: 0,
        };
        DecryptionStream::new(resource, &ContentKey(cek_bytes), RESOURCE_BLOB.len() as u64)
    }

    #[test]
    fn size_matches_known_plaintext_length() {
        let stream = sample_stream();
        assert_eq!(stream.size().unwrap(), RESOURCE_PLAIN.len() as u64);
    }

    #[test]
    fn full_plaintext_length_is_multiple_of_16_with_full_pad_block() {
        // spec §8 scenario 7.
        assert_eq!(RESOURCE_PLAIN.len() % 16, 0);
    }

    #[test]
    fn seek_read_matches_full_decrypt_slice() {
        // spec §8 scenario 3.
        let stream = sample_stream();
        for p in [0usize, 1, 15, 16, 17, 4095] {
            stream.seek(p as u64).unwrap();
            let got = stream.read(16).unwrap();
            let expected_len = 16.min(RESOURCE_PLAIN.len() - p);
            assert_eq!(got, RESOURCE_PLAIN[p..p + expected_len]);
        }
    }

    #[test]
    fn sequential_read_matches_whole_plaintext() {
        let stream = sample_stream();
        let mut out = Vec::new();
        loop {
            let chunk = stream.read(512).unwrap();
            if chunk.is_empty() {
                break;
            }
            out.extend_from_slice(&chunk);
        }
        assert_eq!(out, RESOURCE_PLAIN);
    }

    #[test]
    fn seek_past_end_is_out_of_range() {
        let stream = sample_stream();
        let size = stream.size().unwrap();
        let err = stream.seek(size + 1).unwrap_err();
        assert!(matches!(err, DecryptError::OutOfRange { .. }));
    }
}
