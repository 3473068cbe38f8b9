//! Common types used across Workbench modules.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

/// Identifier of a stored sample or sample set (hex content fingerprint).
pub type SampleId = String;

/// A 256-bit content fingerprint (SHA3-256).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    /// Create a new fingerprint from bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Fingerprint arbitrary content.
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Fingerprint an ordered list of member ids.
    ///
    /// Members are length-prefixed so that `["ab", "c"]` and `["a", "bc"]`
    /// never collide.
    pub fn of_members<S: AsRef<str>>(members: &[S]) -> Self {
        let mut hasher = Sha3_256::new();
        for member in members {
            let member = member.as_ref();
            hasher.update((member.len() as u64).to_be_bytes());
            hasher.update(member.as_bytes());
        }
        Self(hasher.finalize().into())
    }

    /// Get the bytes of the fingerprint.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Timestamp wrapper for consistent serialization.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Get current UTC timestamp.
pub fn now() -> Timestamp {
    chrono::Utc::now()
}
