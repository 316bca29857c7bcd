//! Serialize big integers as minimal big-endian hexadecimal text.
//! For use in `#[serde(with = "crate::serde_hex")]`.
use crate::{
    arithmetics::{from_be_bytes, to_minimal_be_bytes},
    BigInt,
};
use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer>(val: &BigInt, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&encode(val))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigInt, D::Error> {
    let text = String::deserialize(deserializer)?;
    decode(&text).map_err(D::Error::custom)
}

/// Render as lowercase hex; zero renders as "00"
pub fn encode(val: &BigInt) -> String {
    let bytes = to_minimal_be_bytes(val);
    if bytes.is_empty() {
        return "00".to_string();
    }
    hex::encode(bytes)
}

/// Parse lowercase or uppercase hex of any length that fits the integer capacity
pub fn decode(text: &str) -> Result<BigInt, String> {
    let padded;
    let text = if text.len() % 2 == 1 {
        padded = format!("0{text}");
        padded.as_str()
    } else {
        text
    };
    let bytes = hex::decode(text).map_err(|e| e.to_string())?;
    // Leading zero bytes do not count against the capacity
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    from_be_bytes(&bytes[start..]).ok_or_else(|| "integer exceeds supported width".to_string())
}
