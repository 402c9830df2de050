//! Error types for stream extraction.

use thiserror::Error;

/// Everything that can go wrong while resolving a video.
///
/// `Transport` and `PageStructureChanged` abort a whole request. `UnknownEncoding` and
/// `DecipherUnavailable` only ever cost the entries they concern; the resolver logs and
/// drops those entries instead of returning the error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// Fetch failed: network, timeout or non-success status
    #[error("Transport error fetching {url}: {message}")]
    Transport { url: String, message: String },

    /// The embedded player configuration is missing or no longer decodes
    #[error("Page structure changed: {0}")]
    PageStructureChanged(String),

    /// The itag is not in the format catalog
    #[error("Unknown encoding: itag={0}")]
    UnknownEncoding(u32),

    /// The companion script was fetched but no transform program could be derived from it
    #[error("Decipher unavailable: {0}")]
    DecipherUnavailable(String),

    /// The resolution task was cancelled before it completed
    #[error("Extraction cancelled")]
    Cancelled,
}

impl ExtractError {
    pub(crate) fn transport(url: &str, message: impl ToString) -> Self {
        Self::Transport {
            url: url.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn page(message: impl Into<String>) -> Self {
        Self::PageStructureChanged(message.into())
    }

    pub(crate) fn decipher(message: impl Into<String>) -> Self {
        Self::DecipherUnavailable(message.into())
    }
}
