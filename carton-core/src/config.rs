use crate::codec::CodecId;
use crate::error::{CartonError, Result};
use crate::policy::Policy;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiverOptions {
    /// Codec level; `None` uses each codec's default.
    pub level: Option<i32>,
    /// Per-entry codec for formats that compress entries individually.
    #[serde(with = "codec_name")]
    pub entry_codec: CodecId,
    /// When true, zero timestamps for reproducible output.
    pub deterministic: bool,
    /// Archive symlink targets instead of the links themselves.
    pub follow_symlinks: bool,
    pub policy: Policy,
}

impl Default for ArchiverOptions {
    fn default() -> Self {
        Self {
            level: None,
            entry_codec: CodecId::Deflate,
            deterministic: false,
            follow_symlinks: false,
            policy: Policy::default(),
        }
    }
}

impl ArchiverOptions {
    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| CartonError::Config(e.to_string()))
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| CartonError::Config(format!("{}: {e}", path.display())))
    }
}

mod codec_name {
    use crate::codec::CodecId;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &CodecId, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(id.name())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<CodecId, D::Error> {
        let name = String::deserialize(d)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}
