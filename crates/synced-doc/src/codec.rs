//! Serialization seam for documents.

use std::fmt::Display;

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

/// A parse or serialization failure, rendered as text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CodecError(pub String);

impl CodecError {
    /// Wrap any displayable error.
    pub fn new(err: impl Display) -> Self {
        Self(err.to_string())
    }
}

/// A decoded value plus the number of entries that could not be kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded<T> {
    /// The value built from the readable part of the text.
    pub value: T,
    /// Entries left out of `value`.
    pub dropped: usize,
}

impl<T> Decoded<T> {
    /// A value decoded without losses.
    pub fn complete(value: T) -> Self {
        Self { value, dropped: 0 }
    }
}

/// Converts a document value to and from its file text.
pub trait Codec<T>: Send + Sync + 'static {
    /// Render `value` in canonical form.
    fn encode(&self, value: &T) -> Result<String, CodecError>;

    /// Parse file text. Any error marks the file as corrupt.
    fn decode(&self, text: &str) -> Result<T, CodecError>;

    /// Parse file text, reporting entries that were skipped.
    ///
    /// Codecs that read entry by entry override this; a rewrite after a lossy
    /// decode keeps a copy of the text as read.
    fn decode_entries(&self, text: &str) -> Result<Decoded<T>, CodecError> {
        self.decode(text).map(Decoded::complete)
    }
}

/// TOML via `serde`. An empty file decodes like an empty table.
#[derive(Debug, Default, Clone, Copy)]
pub struct TomlCodec;

impl<T> Codec<T> for TomlCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<String, CodecError> {
        toml::to_string_pretty(value).map_err(CodecError::new)
    }

    fn decode(&self, text: &str) -> Result<T, CodecError> {
        toml::from_str(text).map_err(CodecError::new)
    }
}

/// YAML via `serde`. Blank text decodes to the default value.
#[derive(Debug, Default, Clone, Copy)]
pub struct YamlCodec;

impl<T> Codec<T> for YamlCodec
where
    T: Serialize + DeserializeOwned + Default,
{
    fn encode(&self, value: &T) -> Result<String, CodecError> {
        serde_yaml::to_string(value).map_err(CodecError::new)
    }

    fn decode(&self, text: &str) -> Result<T, CodecError> {
        if text.trim().is_empty() {
            return Ok(T::default());
        }
        serde_yaml::from_str(text).map_err(CodecError::new)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize, Default)]
    #[serde(default)]
    struct Sample {
        enabled: bool,
        delay: u32,
    }

    #[test]
    fn toml_blank_text_is_default() {
        let v: Sample = TomlCodec.decode("").unwrap();
        assert_eq!(v, Sample::default());
    }

    #[test]
    fn yaml_blank_text_is_default() {
        let v: Sample = YamlCodec.decode("  \n").unwrap();
        assert_eq!(v, Sample::default());
        let v: Sample = YamlCodec.decode("enabled: true\ndelay: 3\n").unwrap();
        assert_eq!(v, Sample { enabled: true, delay: 3 });
    }

    #[test]
    fn toml_rejects_wrong_types() {
        let r: Result<Sample, _> = TomlCodec.decode("delay = \"soon\"\n");
        assert!(r.is_err());
    }
}
