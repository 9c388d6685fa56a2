//! PEM key loading.
//!
//! Public keys are SubjectPublicKeyInfo (`BEGIN PUBLIC KEY`). Private keys
//! may be PKCS#1 (`BEGIN RSA PRIVATE KEY`) or PKCS#8 (`BEGIN PRIVATE KEY`).

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::path::Path;

use crate::protocol::error::{Result, TallyError};

pub fn parse_public_key(pem: &str) -> Result<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem)
        .map_err(|e| TallyError::Key(format!("invalid public key: {}", e)))
}

pub fn parse_private_key(pem: &str) -> Result<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs1_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
        .map_err(|e| TallyError::Key(format!("invalid private key: {}", e)))
}

pub fn load_public_key(path: impl AsRef<Path>) -> Result<RsaPublicKey> {
    let path = path.as_ref();
    let pem = std::fs::read_to_string(path)
        .map_err(|e| TallyError::Key(format!("failed to read {}: {}", path.display(), e)))?;
    parse_public_key(&pem)
}

pub fn load_private_key(path: impl AsRef<Path>) -> Result<RsaPrivateKey> {
    let path = path.as_ref();
    let pem = std::fs::read_to_string(path)
        .map_err(|e| TallyError::Key(format!("failed to read {}: {}", path.display(), e)))?;
    parse_private_key(&pem)
}
