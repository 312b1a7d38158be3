//! Base64 (standard alphabet, padded) serde adapter for opaque payload bytes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&STANDARD.encode(bytes))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    STANDARD.decode(text.as_bytes()).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "super")]
        data: Vec<u8>,
    }

    #[test]
    fn test_encodes_standard_base64() {
        let json = serde_json::to_string(&Wrapper {
            data: b"hello".to_vec(),
        })
        .unwrap();
        assert_eq!(json, r#"{"data":"aGVsbG8="}"#);
    }

    #[test]
    fn test_rejects_invalid_base64() {
        let result: Result<Wrapper, _> = serde_json::from_str(r#"{"data":"***"}"#);
        assert!(result.is_err());
    }
}
