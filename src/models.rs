use serde::Serialize;

use crate::formats::{Container, FormatDescriptor, Resolution};
use crate::thumbnails::Thumbnail;

/// A stream whose URL can be fetched directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedStream {
    pub encoding_id: u32,
    pub container: Container,
    pub resolution: Resolution,
    pub url: String,
    pub byte_size: Option<u64>,
    pub bitrate: Option<u64>,
}

impl ResolvedStream {
    pub fn new(descriptor: FormatDescriptor, url: String, bitrate: Option<u64>) -> Self {
        Self {
            encoding_id: descriptor.encoding_id,
            container: descriptor.container,
            resolution: descriptor.resolution,
            url,
            byte_size: descriptor.approximate_byte_size,
            bitrate,
        }
    }

    pub fn is_audio_only(&self) -> bool {
        self.resolution.is_audio()
    }
}

/// Result of resolving one video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionResult {
    pub video_id: String,
    pub title: Option<String>,
    pub streams: Vec<ResolvedStream>,
    pub thumbnails: Vec<Thumbnail>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub view_count: Option<u64>,
    pub duration_seconds: Option<u64>,
}
