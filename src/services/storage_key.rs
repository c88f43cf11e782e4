use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::services::aspect::AspectBucket;

/// Bytes of OS randomness behind each key segment (256 bits).
pub const RANDOM_SEGMENT_BYTES: usize = 32;

/// Separator between bucket and key in a persisted locator.
pub const LOCATOR_SEPARATOR: char = ',';

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LocatorError {
    #[error("locator component '{0}' is empty")]
    EmptyComponent(&'static str),

    #[error("locator component '{0}' contains the separator")]
    ContainsSeparator(&'static str),

    #[error("malformed locator: expected 2 fields, found {0}")]
    FieldCount(usize),
}

/// Fresh URL-safe random segment for an object key.
pub fn generate_random_segment() -> String {
    let mut bytes = [0u8; RANDOM_SEGMENT_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// File extension for a `type/subtype` media type, `bin` when malformed.
pub fn extension_for_media_type(media_type: &str) -> &str {
    match media_type.split_once('/') {
        Some((kind, subtype)) if !kind.is_empty() && !subtype.is_empty() && !subtype.contains('/') => {
            subtype
        }
        _ => "bin",
    }
}

/// `{bucket}/{segment}.{extension}`
pub fn derive_storage_key(bucket: AspectBucket, extension: &str, segment: &str) -> String {
    format!("{}/{}.{}", bucket, segment, extension)
}

/// Where the durable bytes of a video live. Persisted as `{bucket},{key}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    bucket: String,
    key: String,
}

impl Locator {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Result<Self, LocatorError> {
        let bucket = bucket.into();
        let key = key.into();
        for (name, value) in [("bucket", &bucket), ("key", &key)] {
            if value.is_empty() {
                return Err(LocatorError::EmptyComponent(name));
            }
            if value.contains(LOCATOR_SEPARATOR) {
                return Err(LocatorError::ContainsSeparator(name));
            }
        }
        Ok(Self { bucket, key })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }

    pub fn decode(value: &str) -> Result<Self, LocatorError> {
        let fields: Vec<&str> = value.split(LOCATOR_SEPARATOR).collect();
        match fields.as_slice() {
            [bucket, key] => Self::new(*bucket, *key),
            _ => Err(LocatorError::FieldCount(fields.len())),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.bucket, LOCATOR_SEPARATOR, self.key)
    }
}

impl FromStr for Locator {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}
