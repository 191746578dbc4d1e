//! AES-128-ECB payload encryption
//!
//! The device firmware only understands AES in electronic-codebook mode with
//! PKCS#7 padding. ECB is an interoperability requirement of the wire format,
//! not a design choice: every 16-byte block is encrypted independently, so
//! identical plaintext blocks produce identical ciphertext blocks. The key
//! rotates with every frame timestamp (see [`derive_key`](crate::derive_key)),
//! which limits what an observer can correlate, but this construction must
//! not be reused for anything other than talking to this firmware.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyInit};
use thiserror::Error;

type Aes128EcbEnc = ecb::Encryptor<aes::Aes128>;
type Aes128EcbDec = ecb::Decryptor<aes::Aes128>;

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AesError {
    #[error("Invalid PKCS#7 padding")]
    BadPadding,

    #[error("Invalid key length: expected 16, got {0}")]
    InvalidKeyLength(usize),
}

/// AES-128-ECB cipher wrapper bound to one per-message key
pub struct PayloadCipher {
    key: [u8; 16],
}

impl PayloadCipher {
    /// Create a new cipher from a 16-byte key
    pub fn new(key: &[u8; 16]) -> Self {
        Self { key: *key }
    }

    /// Create a cipher from an arbitrary slice, checking its length
    pub fn from_slice(key: &[u8]) -> Result<Self, AesError> {
        let key: [u8; 16] = key
            .try_into()
            .map_err(|_| AesError::InvalidKeyLength(key.len()))?;
        Ok(Self::new(&key))
    }

    /// PKCS#7-pad and encrypt block by block
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        // PKCS#7 always adds 1..=16 bytes
        let padded_len = (plaintext.len() / BLOCK_SIZE + 1) * BLOCK_SIZE;
        let mut buf = vec![0u8; padded_len];
        buf[..plaintext.len()].copy_from_slice(plaintext);

        Aes128EcbEnc::new(&self.key.into())
            .encrypt_padded_mut::<Pkcs7>(&mut buf, plaintext.len())
            .expect("buffer has room for a full padding block")
            .to_vec()
    }

    /// Decrypt and strip PKCS#7 padding
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, AesError> {
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(AesError::BadPadding);
        }

        let mut buf = ciphertext.to_vec();
        let plaintext = Aes128EcbDec::new(&self.key.into())
            .decrypt_padded_mut::<Pkcs7>(&mut buf)
            .map_err(|_| AesError::BadPadding)?;

        Ok(plaintext.to_vec())
    }
}

/// Encrypt a payload with a one-off key
pub fn encrypt_payload(plaintext: &[u8], key: &[u8; 16]) -> Vec<u8> {
    PayloadCipher::new(key).encrypt(plaintext)
}

/// Decrypt a payload with a one-off key
pub fn decrypt_payload(ciphertext: &[u8], key: &[u8; 16]) -> Result<Vec<u8>, AesError> {
    PayloadCipher::new(key).decrypt(ciphertext)
}
