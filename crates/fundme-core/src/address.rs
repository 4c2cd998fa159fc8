use core::fmt;
use core::str::FromStr;

use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// A 20-byte account or contract identifier.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Truncates a SHA-256 digest of `data` to 20 bytes.
    pub fn from_digest(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[..20]);
        Address(bytes)
    }

    /// Address of a contract created by `deployer` at `nonce`.
    pub fn create(deployer: &Address, nonce: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"create");
        hasher.update(deployer.0);
        hasher.update(nonce.to_le_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[..20]);
        Address(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AddressParseError {
    #[error("address must start with 0x")]
    MissingPrefix,
    #[error("address must be 20 bytes, got {0}")]
    InvalidLength(usize),
    #[error("invalid hex in address: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

impl FromStr for Address {
    type Err = AddressParseError;

    /// Accepts checksummed (mixed-case) input, the checksum itself is not validated.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or(AddressParseError::MissingPrefix)?;
        let decoded = hex::decode(digits)?;
        if decoded.len() != 20 {
            return Err(AddressParseError::InvalidLength(decoded.len()));
        }
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&decoded);
        Ok(Address(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        encoded.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_checksummed_price_feed() {
        let addr: Address = "0x694AA1769357215DE4FAC081bf1f309aDC325306".parse().unwrap();
        assert_eq!(addr.to_string(), "0x694aa1769357215de4fac081bf1f309adc325306");
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(
            "694aa1769357215de4fac081bf1f309adc325306".parse::<Address>(),
            Err(AddressParseError::MissingPrefix)
        );
        assert_eq!("0x1234".parse::<Address>(), Err(AddressParseError::InvalidLength(2)));
        assert!(matches!("0xzz".parse::<Address>(), Err(AddressParseError::InvalidHex(_))));
    }

    #[test]
    fn create_addresses_depend_on_nonce() {
        let deployer = Address::from_digest(b"deployer");
        assert_ne!(Address::create(&deployer, 0), Address::create(&deployer, 1));
        assert_eq!(Address::create(&deployer, 7), Address::create(&deployer, 7));
    }

    #[test]
    fn serializes_as_hex_string() {
        let addr = Address::from_bytes([0xab; 20]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "ab".repeat(20)));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
