//! Static itag table: which container and resolution each encoding id stands for.
//!
//! Ids follow the youtube-dl itag list. The same logical quality shows up under several
//! ids because the site has re-encoded it into new containers over the years.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use serde::Serialize;

use crate::error::ExtractError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Container {
    #[serde(rename = "MPEG-4")]
    Mp4,
    #[serde(rename = "WebM")]
    Webm,
    #[serde(rename = "3GPP")]
    ThreeGpp,
    #[serde(rename = "m4a")]
    M4a,
}

impl Container {
    pub fn as_str(&self) -> &'static str {
        match self {
            Container::Mp4 => "MPEG-4",
            Container::Webm => "WebM",
            Container::ThreeGpp => "3GPP",
            Container::M4a => "m4a",
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Resolution {
    #[serde(rename = "144p")]
    P144,
    #[serde(rename = "240p")]
    P240,
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "720p60")]
    P720F60,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "1080p60")]
    P1080F60,
    #[serde(rename = "1440p")]
    P1440,
    #[serde(rename = "1440p60")]
    P1440F60,
    #[serde(rename = "2160p")]
    P2160,
    #[serde(rename = "2160p60")]
    P2160F60,
    /// Audio-only sentinel
    #[serde(rename = "AUDIO")]
    Audio,
}

impl Resolution {
    pub fn label(&self) -> &'static str {
        match self {
            Resolution::P144 => "144p",
            Resolution::P240 => "240p",
            Resolution::P360 => "360p",
            Resolution::P480 => "480p",
            Resolution::P720 => "720p",
            Resolution::P720F60 => "720p60",
            Resolution::P1080 => "1080p",
            Resolution::P1080F60 => "1080p60",
            Resolution::P1440 => "1440p",
            Resolution::P1440F60 => "1440p60",
            Resolution::P2160 => "2160p",
            Resolution::P2160F60 => "2160p60",
            Resolution::Audio => "AUDIO",
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Resolution::Audio)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

/// What a known itag decodes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FormatDescriptor {
    pub encoding_id: u32,
    pub container: Container,
    pub resolution: Resolution,
    pub approximate_byte_size: Option<u64>,
}

impl FormatDescriptor {
    const fn new(encoding_id: u32, container: Container, resolution: Resolution) -> Self {
        Self {
            encoding_id,
            container,
            resolution,
            approximate_byte_size: None,
        }
    }

    /// Copy of this descriptor carrying the size reported by a catalog entry.
    pub fn with_byte_size(self, byte_size: Option<u64>) -> Self {
        Self {
            approximate_byte_size: byte_size,
            ..self
        }
    }
}

use Container::*;
use Resolution::*;

const TABLE: &[FormatDescriptor] = &[
    FormatDescriptor::new(17, ThreeGpp, P144),
    FormatDescriptor::new(36, ThreeGpp, P240),
    // progressive MP4
    FormatDescriptor::new(18, Mp4, P360),
    FormatDescriptor::new(34, Mp4, P360),
    FormatDescriptor::new(35, Mp4, P480),
    FormatDescriptor::new(59, Mp4, P480),
    FormatDescriptor::new(78, Mp4, P480),
    FormatDescriptor::new(22, Mp4, P720),
    FormatDescriptor::new(37, Mp4, P1080),
    FormatDescriptor::new(38, Mp4, P1080),
    // progressive WebM
    FormatDescriptor::new(43, Webm, P360),
    FormatDescriptor::new(44, Webm, P480),
    FormatDescriptor::new(45, Webm, P720),
    FormatDescriptor::new(46, Webm, P1080),
    // DASH video, MP4
    FormatDescriptor::new(160, Mp4, P144),
    FormatDescriptor::new(133, Mp4, P240),
    FormatDescriptor::new(134, Mp4, P360),
    FormatDescriptor::new(135, Mp4, P480),
    FormatDescriptor::new(212, Mp4, P480),
    FormatDescriptor::new(136, Mp4, P720),
    FormatDescriptor::new(298, Mp4, P720F60),
    FormatDescriptor::new(137, Mp4, P1080),
    FormatDescriptor::new(299, Mp4, P1080F60),
    FormatDescriptor::new(266, Mp4, P2160),
    // DASH video, WebM
    FormatDescriptor::new(278, Webm, P144),
    FormatDescriptor::new(242, Webm, P240),
    FormatDescriptor::new(243, Webm, P360),
    FormatDescriptor::new(244, Webm, P480),
    FormatDescriptor::new(245, Webm, P480),
    FormatDescriptor::new(246, Webm, P480),
    FormatDescriptor::new(247, Webm, P720),
    FormatDescriptor::new(248, Webm, P1080),
    FormatDescriptor::new(271, Webm, P1440),
    FormatDescriptor::new(272, Webm, P2160),
    FormatDescriptor::new(302, Webm, P720F60),
    FormatDescriptor::new(303, Webm, P1080F60),
    FormatDescriptor::new(308, Webm, P1440F60),
    FormatDescriptor::new(313, Webm, P2160),
    FormatDescriptor::new(315, Webm, P2160F60),
    // DASH audio
    FormatDescriptor::new(139, M4a, Audio),
    FormatDescriptor::new(140, M4a, Audio),
    FormatDescriptor::new(141, M4a, Audio),
    FormatDescriptor::new(256, M4a, Audio),
    FormatDescriptor::new(258, M4a, Audio),
    FormatDescriptor::new(325, M4a, Audio),
    FormatDescriptor::new(328, M4a, Audio),
    FormatDescriptor::new(171, Webm, Audio),
    FormatDescriptor::new(172, Webm, Audio),
    FormatDescriptor::new(249, Webm, Audio),
    FormatDescriptor::new(250, Webm, Audio),
    FormatDescriptor::new(251, Webm, Audio),
];

static CATALOG: LazyLock<HashMap<u32, FormatDescriptor>> =
    LazyLock::new(|| TABLE.iter().map(|d| (d.encoding_id, *d)).collect());

pub fn is_known(encoding_id: u32) -> bool {
    CATALOG.contains_key(&encoding_id)
}

/// True only for known ids whose resolution is the audio sentinel.
pub fn is_audio_only(encoding_id: u32) -> bool {
    CATALOG
        .get(&encoding_id)
        .is_some_and(|d| d.resolution.is_audio())
}

pub fn lookup(encoding_id: u32) -> Result<FormatDescriptor, ExtractError> {
    CATALOG
        .get(&encoding_id)
        .copied()
        .ok_or(ExtractError::UnknownEncoding(encoding_id))
}

/// Every catalog entry, in table order.
pub fn all() -> &'static [FormatDescriptor] {
    TABLE
}
