//! Chunked RSA PKCS#1 v1.5.
//!
//! A single PKCS#1 v1.5 block holds at most `k - 11` plaintext bytes, where
//! `k` is the modulus length in bytes, and always yields `k` bytes of
//! ciphertext. Payloads are split into plaintext chunks of `k - 11`, each
//! encrypted independently, and the ciphertext blocks are concatenated. The
//! receiver splits on `k`.

use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

use crate::protocol::error::{Result, TallyError};

const PKCS1_V15_OVERHEAD: usize = 11;

#[derive(Debug, Clone)]
pub struct Encryptor {
    key: RsaPublicKey,
}

impl Encryptor {
    pub fn new(key: RsaPublicKey) -> Self {
        Self { key }
    }

    pub fn chunk_size(&self) -> usize {
        self.key.size() - PKCS1_V15_OVERHEAD
    }

    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        let chunk = self.chunk_size();
        let mut rng = rand::thread_rng();
        let mut out = Vec::with_capacity(data.len().div_ceil(chunk) * self.key.size());
        for block in data.chunks(chunk) {
            let sealed = self.key.encrypt(&mut rng, Pkcs1v15Encrypt, block)?;
            out.extend_from_slice(&sealed);
        }
        Ok(out)
    }
}

#[derive(Debug, Clone)]
pub struct Decryptor {
    key: RsaPrivateKey,
}

impl Decryptor {
    pub fn new(key: RsaPrivateKey) -> Self {
        Self { key }
    }

    pub fn chunk_size(&self) -> usize {
        self.key.size()
    }

    /// # Errors
    ///
    /// [`TallyError::Decryption`] if the body is not a whole number of
    /// blocks or any block fails to decrypt.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        let chunk = self.chunk_size();
        if data.len() % chunk != 0 {
            return Err(TallyError::Decryption(format!(
                "body length {} is not a multiple of {}",
                data.len(),
                chunk
            )));
        }
        let mut out = Vec::with_capacity(data.len());
        for (i, block) in data.chunks(chunk).enumerate() {
            let plain = self
                .key
                .decrypt(Pkcs1v15Encrypt, block)
                .map_err(|e| TallyError::Decryption(format!("block {}: {}", i, e)))?;
            out.extend_from_slice(&plain);
        }
        Ok(out)
    }
}
