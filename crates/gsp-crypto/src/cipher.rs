//! AES-128-ECB as spoken by GameStream clients.
//!
//! Pairing payloads are always whole blocks (16-byte challenges, 32-byte
//! hashes, 48-byte challenge responses), so no padding is applied in either
//! direction. A ciphertext that is empty or not block-aligned cannot have
//! come from a well-behaved client and is reported as an error.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const BLOCK_LEN: usize = 16;
pub const KEY_LEN: usize = 16;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("input is empty")]
    Empty,
    #[error("input length {0} is not a multiple of {BLOCK_LEN}")]
    Unaligned(usize),
}

/// AES-128 in ECB mode, keyed with the pairing key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AesEcb {
    key: [u8; KEY_LEN],
}

impl AesEcb {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Encrypt whole blocks. Returns a buffer of the same length.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        check_blocks(plaintext)?;
        let cipher = Aes128::new(&self.key.into());
        let mut out = plaintext.to_vec();
        for chunk in out.chunks_exact_mut(BLOCK_LEN) {
            cipher.encrypt_block(aes::Block::from_mut_slice(chunk));
        }
        Ok(out)
    }

    /// Decrypt whole blocks. A wrong key is not detectable here; it yields garbage.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        check_blocks(ciphertext)?;
        let cipher = Aes128::new(&self.key.into());
        let mut out = ciphertext.to_vec();
        for chunk in out.chunks_exact_mut(BLOCK_LEN) {
            cipher.decrypt_block(aes::Block::from_mut_slice(chunk));
        }
        Ok(out)
    }
}

fn check_blocks(data: &[u8]) -> Result<(), CipherError> {
    if data.is_empty() {
        return Err(CipherError::Empty);
    }
    if data.len() % BLOCK_LEN != 0 {
        return Err(CipherError::Unaligned(data.len()));
    }
    Ok(())
}
