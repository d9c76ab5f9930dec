use serde::{Deserialize, Serialize};

/// On-disk text document at `<texts>/<name>.txt`.
/// `open == true` makes the entry readable without a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextDocument {
    pub content: String,
    pub open: bool,
}

/// Per-name visibility record in the metadata map, persisted wholesale to
/// `.meta.json` as `{"<name>": {"open": 0|1}}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextMeta {
    #[serde(with = "int_bool")]
    pub open: bool,
}

/// One row of the text listing — mirrors the metadata map exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextEntry {
    pub name: String,
    #[serde(with = "int_bool")]
    pub open: bool,
}

/// One row of the upload listing. Size is read from the filesystem at
/// listing time; there is no separate metadata for files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
}

/// The metadata file encodes visibility as `0|1`. Reads also accept plain
/// booleans so hand-edited files stay loadable.
mod int_bool {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(open: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*open))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(u8),
            Bool(bool),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Int(n) => n != 0,
            Raw::Bool(b) => b,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_serializes_open_as_int() {
        let json = serde_json::to_string(&TextMeta { open: true }).unwrap();
        assert_eq!(json, r#"{"open":1}"#);
        let json = serde_json::to_string(&TextMeta { open: false }).unwrap();
        assert_eq!(json, r#"{"open":0}"#);
    }

    #[test]
    fn meta_deserializes_int_and_bool() {
        let m: TextMeta = serde_json::from_str(r#"{"open":1}"#).unwrap();
        assert!(m.open);
        let m: TextMeta = serde_json::from_str(r#"{"open":0}"#).unwrap();
        assert!(!m.open);
        let m: TextMeta = serde_json::from_str(r#"{"open":true}"#).unwrap();
        assert!(m.open);
    }

    #[test]
    fn document_round_trips() {
        let doc = TextDocument {
            content: "hello".into(),
            open: true,
        };
        let json = serde_json::to_string(&doc).unwrap();
        let back: TextDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }
}
