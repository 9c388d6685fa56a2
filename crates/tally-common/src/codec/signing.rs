//! HMAC-SHA256 integrity tags, hex-encoded.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::protocol::error::{Result, TallyError};

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies payloads with a pre-shared key.
#[derive(Clone)]
pub struct Signer {
    key: Vec<u8>,
}

impl Signer {
    pub fn new(key: impl AsRef<[u8]>) -> Self {
        Self {
            key: key.as_ref().to_vec(),
        }
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.key)
            .map_err(|e| TallyError::Key(format!("invalid HMAC key: {}", e)))
    }

    /// Returns `hex(HMAC-SHA256(key, data))`.
    pub fn sign(&self, data: &[u8]) -> Result<String> {
        let mut mac = self.mac()?;
        mac.update(data);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Checks `tag` against `data` in constant time.
    ///
    /// A missing tag, malformed hex and a mismatching digest are all
    /// [`TallyError::Integrity`].
    pub fn verify(&self, data: &[u8], tag: Option<&str>) -> Result<()> {
        let tag = tag.ok_or_else(|| TallyError::Integrity("missing HashSHA256 header".to_string()))?;
        let expected = hex::decode(tag.trim())
            .map_err(|_| TallyError::Integrity("malformed HashSHA256 header".to_string()))?;

        let mut mac = self.mac()?;
        mac.update(data);
        mac.verify_slice(&expected)
            .map_err(|_| TallyError::Integrity("HashSHA256 mismatch".to_string()))
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer").field("key", &"<redacted>").finish()
    }
}
