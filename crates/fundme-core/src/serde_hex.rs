use serde::{de::Error, Deserialize, Deserializer, Serializer};

pub fn serialize<S>(value: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format!("0x{}", hex::encode(value)))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
where
    D: Deserializer<'de>,
{
    let encoded = String::deserialize(deserializer)?;
    let digits = encoded.strip_prefix("0x").unwrap_or(&encoded);
    let mut out = [0u8; 32];
    hex::decode_to_slice(digits, &mut out).map_err(D::Error::custom)?;
    Ok(out)
}
