//! The post record exchanged between publishers and persisters, and its
//! wire encoding.
//!
//! A post travels as a JSON object keyed by field name (`userID`, `title`,
//! `content`). Decoding ignores keys it does not know about, so newer
//! publishers may attach extra fields without breaking older persisters.

use core::fmt;

use serde::{Deserialize, Serialize};
use serde_json::error::Category;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Post {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub title: String,
    pub content: String,
}

impl Post {
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            title: title.into(),
            content: content.into(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        serde_json::to_vec(self).map_err(EncodeError)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(DecodeError::Empty);
        }

        serde_json::from_slice(bytes).map_err(|err| match err.classify() {
            Category::Eof => DecodeError::Truncated(err),
            Category::Data => DecodeError::Invalid(err),
            Category::Syntax | Category::Io => DecodeError::Malformed(err),
        })
    }
}

/// Identifier assigned to a post by the persistence tier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(String);

impl PostId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PostId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
#[error("failed to encode post: {0}")]
pub struct EncodeError(#[source] serde_json::Error);

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is empty")]
    Empty,
    #[error("payload ended before the post was complete: {0}")]
    Truncated(#[source] serde_json::Error),
    #[error("payload is not well-formed: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("payload does not describe a post: {0}")]
    Invalid(#[source] serde_json::Error),
}
