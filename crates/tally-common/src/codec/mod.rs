//! Wire Codec
//!
//! Composes the payload transforms in the one order both ends agree on:
//!
//! ```text
//! encode: json -> tag = hmac(json) -> gzip -> rsa chunks
//! decode: rsa chunks -> gunzip -> verify(tag, json) -> json
//! ```
//!
//! The tag is always computed over the uncompressed JSON so that a receiver
//! can check it after undoing transport-level transforms.

pub mod compression;
pub mod encryption;
pub mod signing;

#[cfg(test)]
pub(crate) mod tests;

use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::protocol::error::Result;
pub use encryption::{Decryptor, Encryptor};
pub use signing::Signer;

/// An encoded body together with the header values that describe it.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedPayload {
    pub body: Vec<u8>,
    /// Hex HMAC of the uncompressed JSON (`HashSHA256`)
    pub hash: Option<String>,
    /// Body is gzip (`Content-Encoding: gzip`)
    pub compressed: bool,
    /// Body is RSA-chunked (`X-Encrypted: 1`)
    pub encrypted: bool,
}

/// Configured encode/decode pipeline.
///
/// Every layer except compression is optional: signing needs a pre-shared
/// key, encryption a public key, decryption a private key.
#[derive(Debug, Clone, Default)]
pub struct WireCodec {
    signer: Option<Signer>,
    encryptor: Option<Encryptor>,
    decryptor: Option<Decryptor>,
}

impl WireCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signing_key(mut self, key: impl AsRef<[u8]>) -> Self {
        self.signer = Some(Signer::new(key));
        self
    }

    pub fn with_public_key(mut self, key: RsaPublicKey) -> Self {
        self.encryptor = Some(Encryptor::new(key));
        self
    }

    pub fn with_private_key(mut self, key: RsaPrivateKey) -> Self {
        self.decryptor = Some(Decryptor::new(key));
        self
    }

    pub fn signer(&self) -> Option<&Signer> {
        self.signer.as_ref()
    }

    pub fn has_decryptor(&self) -> bool {
        self.decryptor.is_some()
    }

    /// Serializes `value` and runs it through every configured layer.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<EncodedPayload> {
        let json = serde_json::to_vec(value)?;
        self.encode_bytes(&json)
    }

    pub fn encode_bytes(&self, json: &[u8]) -> Result<EncodedPayload> {
        let hash = self.sign(json)?;
        let mut body = compression::compress(json)?;

        let encrypted = match &self.encryptor {
            Some(encryptor) => {
                body = encryptor.encrypt(&body)?;
                true
            }
            None => false,
        };

        Ok(EncodedPayload {
            body,
            hash,
            compressed: true,
            encrypted,
        })
    }

    /// Reverses [`WireCodec::encode`] and parses the JSON.
    pub fn decode<T: DeserializeOwned>(&self, payload: &EncodedPayload) -> Result<T> {
        let json = self.decode_bytes(payload)?;
        Ok(serde_json::from_slice(&json)?)
    }

    pub fn decode_bytes(&self, payload: &EncodedPayload) -> Result<Vec<u8>> {
        let mut body = self.decrypt(&payload.body, payload.encrypted)?;
        if payload.compressed {
            body = compression::decompress(&body)?;
        }
        self.verify(&body, payload.hash.as_deref())?;
        Ok(body)
    }

    /// Strips encryption when the body is flagged and a private key is set.
    /// Otherwise the body passes through unchanged.
    pub fn decrypt(&self, body: &[u8], encrypted: bool) -> Result<Vec<u8>> {
        match (&self.decryptor, encrypted) {
            (Some(decryptor), true) => decryptor.decrypt(body),
            _ => Ok(body.to_vec()),
        }
    }

    pub fn sign(&self, json: &[u8]) -> Result<Option<String>> {
        self.signer.as_ref().map(|s| s.sign(json)).transpose()
    }

    /// No-op without a signing key.
    pub fn verify(&self, json: &[u8], tag: Option<&str>) -> Result<()> {
        match &self.signer {
            Some(signer) => signer.verify(json, tag),
            None => Ok(()),
        }
    }
}
