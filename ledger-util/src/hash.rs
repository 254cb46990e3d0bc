use std::fmt;
use std::str::FromStr;

/// Transaction hash, persisted in its lowercase hex form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct TxHash([u8; 32]);

impl TxHash {
    pub const LEN: usize = 32;

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for TxHash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        let bytes = hex::decode(s).map_err(|e| format!("Invalid tx hash {}: {}", s, e))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| format!("Invalid tx hash {}: expected {} bytes", s, Self::LEN))?;
        Ok(Self(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_hash_codec() {
        let hash = TxHash::from_bytes([0xab; 32]);
        let s = hash.to_string();
        assert_eq!(s.len(), 64);
        assert_eq!(TxHash::from_str(&s).unwrap(), hash);

        // Round-trip through a mixed-value hash
        let mut bytes = [0u8; 32];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        let hash = TxHash::from_bytes(bytes);
        assert_eq!(TxHash::from_str(&hash.to_string()).unwrap(), hash);
    }

    #[test]
    fn test_tx_hash_rejects_malformed() {
        // Not hex at all
        assert!(TxHash::from_str("not-a-hash").is_err());

        // Valid hex, wrong length
        assert!(TxHash::from_str("abcd").is_err());
        assert!(TxHash::from_str(&"ab".repeat(33)).is_err());

        // Empty
        assert!(TxHash::from_str("").is_err());
    }
}
