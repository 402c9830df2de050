//! Thumbnail URLs. Pure templating; nothing here checks that an image exists.

use serde::Serialize;

pub const QUALITY_DEFAULT: &str = "default";
pub const QUALITY_MEDIUM: &str = "mqdefault";
pub const QUALITY_HIGH: &str = "hqdefault";
pub const QUALITY_STANDARD: &str = "sddefault";
pub const QUALITY_MAX_RESOLUTION: &str = "maxresdefault";

/// Every quality, smallest first.
pub const QUALITIES: [&str; 5] = [
    QUALITY_DEFAULT,
    QUALITY_MEDIUM,
    QUALITY_HIGH,
    QUALITY_STANDARD,
    QUALITY_MAX_RESOLUTION,
];

const IMAGE_HOST: &str = "https://img.youtube.com/vi";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Thumbnail {
    pub url: String,
    pub quality: String,
}

pub fn thumbnail(video_id: &str, quality: &str) -> Thumbnail {
    Thumbnail {
        url: format!(
            "{}/{}/{}.jpg",
            IMAGE_HOST,
            urlencoding::encode(video_id),
            urlencoding::encode(quality)
        ),
        quality: quality.to_string(),
    }
}

pub fn thumbnails(video_id: &str) -> Vec<Thumbnail> {
    QUALITIES.iter().map(|q| thumbnail(video_id, q)).collect()
}
