//! Field encodings used by the TDLib JSON interface.
//!
//! TDLib serialises `int64` values as JSON strings (they do not fit in a
//! double) and `bytes` values as base64 strings.

/// `int64` fields: written as strings, read from either strings or numbers.
pub mod int64 {
    use serde::{Deserialize, Deserializer, Serializer, de};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(i64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(n),
            Repr::Text(s)   => s.parse().map_err(de::Error::custom),
        }
    }
}

/// `bytes` fields: standard base64.
pub mod bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        STANDARD.decode(raw.as_bytes()).map_err(de::Error::custom)
    }
}

/// Arrays whose entries may be `null` (e.g. messages that failed to forward).
pub mod non_null {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        let items = Vec::<Option<T>>::deserialize(deserializer)?;
        Ok(items.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        #[serde(with = "super::int64")]
        id: i64,
        #[serde(with = "super::bytes")]
        data: Vec<u8>,
    }

    #[test]
    fn int64_accepts_string_and_number() {
        let a: Sample = serde_json::from_str(r#"{"id":"9007199254740993","data":""}"#).unwrap();
        let b: Sample = serde_json::from_str(r#"{"id":42,"data":""}"#).unwrap();
        assert_eq!(a.id, 9_007_199_254_740_993);
        assert_eq!(b.id, 42);
    }

    #[test]
    fn bytes_are_base64() {
        let s = Sample { id: 1, data: vec![0xff, 0x00, 0x10] };
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, r#"{"id":"1","data":"/wAQ"}"#);
        assert_eq!(serde_json::from_str::<Sample>(&json).unwrap(), s);
    }
}
