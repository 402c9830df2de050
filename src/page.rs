//! Watch-page parsing.
//!
//! The page embeds its player configuration as a script assignment. Two generations of
//! that payload are in circulation: the current one lists formats inside the player
//! response's `streamingData`, the legacy one ships two comma-separated query-string
//! catalogs under `args`. Both end up as one ordered list of [`RawFormatEntry`].

use std::sync::LazyLock;

use regex::Regex;
use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::ExtractError;
use crate::utils::{parse_query_map, unescape_entities};

/// Query parameter the decoded signature goes under when the entry does not name one.
pub const DEFAULT_SIGNATURE_PARAM: &str = "sig";

static PLAYER_CONFIG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"ytplayer\.config\s*=\s*\{").expect("static config pattern")
});

static INITIAL_PLAYER_RESPONSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"ytInitialPlayerResponse\s*=\s*\{").expect("static response pattern")
});

static JS_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""jsUrl"\s*:\s*"([^"]+)""#).expect("static jsUrl pattern"));

/// Where a stream's bytes can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamLocator {
    /// Ready to fetch as-is
    Direct(String),
    /// Needs `signature` deciphered and appended to `url` under `param`
    Obfuscated {
        url: String,
        signature: String,
        param: String,
    },
}

/// One catalog row before itag lookup and deciphering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFormatEntry {
    pub encoding_id: u32,
    pub bitrate: Option<u64>,
    pub byte_size: Option<u64>,
    pub locator: StreamLocator,
}

impl RawFormatEntry {
    pub fn needs_decipher(&self) -> bool {
        matches!(self.locator, StreamLocator::Obfuscated { .. })
    }

    /// Builds an entry from an entity-free `itag=..&url=..&s=..` sequence.
    fn from_query(query: &str, bitrate: Option<u64>, byte_size: Option<u64>, itag: Option<u32>) -> Option<Self> {
        let fields = parse_query_map(query);

        let encoding_id = match itag {
            Some(id) => id,
            None => fields.get("itag")?.parse().ok()?,
        };
        let url = fields.get("url")?.clone();
        let locator = match fields.get("s") {
            Some(signature) => StreamLocator::Obfuscated {
                url,
                signature: signature.clone(),
                param: fields
                    .get("sp")
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_SIGNATURE_PARAM.to_string()),
            },
            None => StreamLocator::Direct(url),
        };

        Some(Self {
            encoding_id,
            bitrate: bitrate.or_else(|| fields.get("bitrate").and_then(|v| v.parse().ok())),
            byte_size: byte_size.or_else(|| fields.get("clen").and_then(|v| v.parse().ok())),
            locator,
        })
    }
}

/// Descriptive metadata from the player response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDetails {
    pub video_id: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub short_description: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub length_seconds: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub view_count: Option<u64>,
}

/// Everything the resolver needs from the watch page.
#[derive(Debug, Clone)]
pub struct PageConfig {
    pub entries: Vec<RawFormatEntry>,
    /// Which payload generation the catalog came from, `"current"` or `"legacy"`
    pub shape: &'static str,
    pub player_url: Option<String>,
    pub details: VideoDetails,
}

#[derive(Debug, Deserialize)]
struct PlayerConfig {
    args: Option<PlayerArgs>,
    assets: Option<PlayerAssets>,
}

#[derive(Debug, Deserialize)]
struct PlayerArgs {
    url_encoded_fmt_stream_map: Option<String>,
    adaptive_fmts: Option<String>,
    player_response: Option<Embedded<PlayerResponse>>,
}

#[derive(Debug, Deserialize)]
struct PlayerAssets {
    js: Option<String>,
}

/// A nested payload that some page versions JSON-encode into a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Embedded<T> {
    Inline(T),
    Encoded(String),
}

impl<T: DeserializeOwned> Embedded<T> {
    fn decode(self) -> Result<T, serde_json::Error> {
        match self {
            Embedded::Inline(value) => Ok(value),
            Embedded::Encoded(text) => serde_json::from_str(&text),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerResponse {
    video_details: Option<VideoDetails>,
    streaming_data: Option<StreamingData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamingData {
    #[serde(default)]
    formats: Vec<StreamFormat>,
    #[serde(default)]
    adaptive_formats: Vec<StreamFormat>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamFormat {
    itag: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u64")]
    bitrate: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    content_length: Option<u64>,
    url: Option<String>,
    #[serde(alias = "signatureCipher")]
    cipher: Option<String>,
}

impl StreamFormat {
    fn to_entry(&self) -> Option<RawFormatEntry> {
        let itag = self.itag?;
        if let Some(url) = &self.url {
            return Some(RawFormatEntry {
                encoding_id: itag,
                bitrate: self.bitrate,
                byte_size: self.content_length,
                locator: StreamLocator::Direct(url.clone()),
            });
        }
        let cipher = unescape_entities(self.cipher.as_deref()?);
        RawFormatEntry::from_query(&cipher, self.bitrate, self.content_length, Some(itag))
    }
}

/// The stream catalog in whichever wire shape the page carried.
#[derive(Debug)]
enum FormatSource {
    Current(StreamingData),
    Legacy {
        adaptive: Option<String>,
        muxed: Option<String>,
    },
}

impl FormatSource {
    fn name(&self) -> &'static str {
        match self {
            FormatSource::Current(_) => "current",
            FormatSource::Legacy { .. } => "legacy",
        }
    }

    /// Adaptive entries first, then the muxed ones, each in page order.
    fn entries(&self) -> Vec<RawFormatEntry> {
        match self {
            FormatSource::Current(data) => data
                .adaptive_formats
                .iter()
                .chain(data.formats.iter())
                .filter_map(|format| {
                    let entry = format.to_entry();
                    if entry.is_none() {
                        debug!("Skipping unusable format entry (itag {:?})", format.itag);
                    }
                    entry
                })
                .collect(),
            FormatSource::Legacy { adaptive, muxed } => {
                // Entities come off the whole catalog first: `&#44;` is a separator too
                let catalogs: Vec<String> = [adaptive, muxed]
                    .into_iter()
                    .flatten()
                    .map(|catalog| unescape_entities(catalog))
                    .collect();
                catalogs
                    .iter()
                    .flat_map(|catalog| catalog.split(','))
                    .filter(|raw| !raw.trim().is_empty())
                    .filter_map(|raw| {
                        let entry = RawFormatEntry::from_query(raw, None, None, None);
                        if entry.is_none() {
                            debug!("Skipping unusable catalog entry: {}", raw);
                        }
                        entry
                    })
                    .collect()
            }
        }
    }
}

/// Extracts the stream catalog, companion script URL and metadata from a watch page.
///
/// Fails with [`ExtractError::PageStructureChanged`] when the embedded configuration is
/// missing or does not decode. An empty catalog is not an error.
pub fn parse_page(html: &str, video_id: &str, base: &Url) -> Result<PageConfig, ExtractError> {
    let (response, source, asset_js) = if let Some(found) = PLAYER_CONFIG.find(html) {
        let config: PlayerConfig = decode_object_at(html, found.end() - 1)?;
        let args = config
            .args
            .ok_or_else(|| ExtractError::page("player config has no args"))?;

        let response = match args.player_response {
            Some(embedded) => embedded
                .decode()
                .map_err(|e| ExtractError::page(format!("player_response: {}", e)))?,
            None => PlayerResponse::default(),
        };

        let source = match response.streaming_data {
            Some(_) => None,
            None if args.adaptive_fmts.is_some() || args.url_encoded_fmt_stream_map.is_some() => {
                Some(FormatSource::Legacy {
                    adaptive: args.adaptive_fmts,
                    muxed: args.url_encoded_fmt_stream_map,
                })
            }
            None => return Err(ExtractError::page("player config carries no stream catalog")),
        };
        (response, source, config.assets.and_then(|a| a.js))
    } else if let Some(found) = INITIAL_PLAYER_RESPONSE.find(html) {
        let response: PlayerResponse = decode_object_at(html, found.end() - 1)?;
        if response.streaming_data.is_none() {
            return Err(ExtractError::page("player response carries no streamingData"));
        }
        (response, None, None)
    } else {
        return Err(ExtractError::page("embedded player config not found"));
    };

    let PlayerResponse {
        video_details,
        streaming_data,
    } = response;
    let source = match (source, streaming_data) {
        (Some(legacy), _) => legacy,
        (None, Some(data)) => FormatSource::Current(data),
        (None, None) => return Err(ExtractError::page("no stream catalog")),
    };

    let entries = source.entries();

    let details = video_details.unwrap_or_default();
    if let Some(found) = details.video_id.as_deref() {
        if found != video_id {
            warn!("Page describes video {} but {} was requested", found, video_id);
        }
    }

    let player_url = asset_js
        .or_else(|| JS_URL.captures(html).map(|c| c[1].replace("\\/", "/")))
        .and_then(|js| match absolute_url(base, &js) {
            Some(url) => Some(url),
            None => {
                warn!("Ignoring unusable player script reference: {}", js);
                None
            }
        });

    Ok(PageConfig {
        entries,
        shape: source.name(),
        player_url,
        details,
    })
}

/// Resolves a scheme-relative, root-relative or absolute reference against `base`.
pub fn absolute_url(base: &Url, reference: &str) -> Option<String> {
    base.join(reference).ok().map(String::from)
}

// Decodes exactly one JSON object starting at `start`; whatever follows it is ignored.
fn decode_object_at<T: DeserializeOwned>(html: &str, start: usize) -> Result<T, ExtractError> {
    serde_json::Deserializer::from_str(&html[start..])
        .into_iter::<T>()
        .next()
        .ok_or_else(|| ExtractError::page("embedded object is empty"))?
        .map_err(|e| ExtractError::page(format!("embedded object does not decode: {}", e)))
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Url {
        Url::parse("https://www.youtube.com").unwrap()
    }

    fn page_with_config(config: &Value) -> String {
        format!(
            "<html><head><script>var ytplayer = ytplayer || {{}};ytplayer.config = {};ytplayer.load = function() {{}};</script></head><body></body></html>",
            config
        )
    }

    fn current_config() -> Value {
        let response = json!({
            "videoDetails": {
                "videoId": "abc123",
                "title": "A title",
                "author": "Someone",
                "shortDescription": "Words};",
                "lengthSeconds": "212",
                "viewCount": "1000"
            },
            "streamingData": {
                "formats": [
                    {"itag": 18, "bitrate": 500000, "contentLength": "1234", "url": "https://r1.example.com/videoplayback?itag=18"}
                ],
                "adaptiveFormats": [
                    {"itag": 140, "bitrate": 128000, "contentLength": "999",
                     "signatureCipher": "s=ABCDEF&amp;sp=signature&amp;url=https%3A%2F%2Fr1.example.com%2Fvideoplayback%3Fitag%3D140"},
                    {"itag": 137, "url": "https://r1.example.com/videoplayback?itag=137"}
                ]
            }
        });
        json!({
            "args": { "player_response": response.to_string() },
            "assets": { "js": "/s/player/abc/base.js" }
        })
    }

    #[test]
    fn parses_current_shape() {
        let html = page_with_config(&current_config());
        let page = parse_page(&html, "abc123", &base()).unwrap();

        assert_eq!(page.details.title.as_deref(), Some("A title"));
        assert_eq!(page.details.author.as_deref(), Some("Someone"));
        assert_eq!(page.details.short_description.as_deref(), Some("Words};"));
        assert_eq!(page.details.length_seconds, Some(212));
        assert_eq!(page.details.view_count, Some(1000));
        assert_eq!(
            page.player_url.as_deref(),
            Some("https://www.youtube.com/s/player/abc/base.js")
        );

        assert_eq!(page.shape, "current");
        let ids: Vec<u32> = page.entries.iter().map(|e| e.encoding_id).collect();
        assert_eq!(ids, vec![140, 137, 18]);

        assert_eq!(
            page.entries[0].locator,
            StreamLocator::Obfuscated {
                url: "https://r1.example.com/videoplayback?itag=140".to_string(),
                signature: "ABCDEF".to_string(),
                param: "signature".to_string(),
            }
        );
        assert_eq!(page.entries[0].byte_size, Some(999));
        assert_eq!(page.entries[0].bitrate, Some(128000));
        assert_eq!(page.entries[2].byte_size, Some(1234));
        assert!(!page.entries[2].needs_decipher());
    }

    #[test]
    fn parses_legacy_shape() {
        let metadata = json!({"videoDetails": {"title": "Old", "lengthSeconds": 60}});
        let config = json!({
            "args": {
                "url_encoded_fmt_stream_map": "itag=22&amp;url=https%3A%2F%2Fr2.example.com%2Fa%3Fitag%3D22,itag=18&url=https%3A%2F%2Fr2.example.com%2Fa%3Fitag%3D18&s=XYZ",
                "adaptive_fmts": "itag=251&clen=42&bitrate=160000&url=https%3A%2F%2Fr2.example.com%2Fa%3Fitag%3D251",
                "player_response": metadata.to_string()
            },
            "assets": { "js": "//www.youtube.com/yts/jsbin/player.js" }
        });
        let page = parse_page(&page_with_config(&config), "old", &base()).unwrap();

        assert_eq!(page.details.title.as_deref(), Some("Old"));
        assert_eq!(page.details.length_seconds, Some(60));
        assert_eq!(
            page.player_url.as_deref(),
            Some("https://www.youtube.com/yts/jsbin/player.js")
        );

        assert_eq!(page.shape, "legacy");
        let ids: Vec<u32> = page.entries.iter().map(|e| e.encoding_id).collect();
        assert_eq!(ids, vec![251, 22, 18]);
        assert_eq!(page.entries[0].byte_size, Some(42));
        assert_eq!(page.entries[0].bitrate, Some(160000));
        assert_eq!(
            page.entries[1].locator,
            StreamLocator::Direct("https://r2.example.com/a?itag=22".to_string())
        );
        assert_eq!(
            page.entries[2].locator,
            StreamLocator::Obfuscated {
                url: "https://r2.example.com/a?itag=18".to_string(),
                signature: "XYZ".to_string(),
                param: DEFAULT_SIGNATURE_PARAM.to_string(),
            }
        );
    }

    #[test]
    fn legacy_separators_may_be_entity_encoded() {
        let config = json!({
            "args": {
                "url_encoded_fmt_stream_map": "itag=18&amp;url=https%3A%2F%2Fr.example.com%2Fa&#44;itag=22&amp;url=https%3A%2F%2Fr.example.com%2Fb",
                "adaptive_fmts": "itag=140&amp;s=QRS&amp;url=https%3A%2F%2Fr.example.com%2Fc&#x2C;itag=251&amp;url=https%3A%2F%2Fr.example.com%2Fd"
            }
        });
        let page = parse_page(&page_with_config(&config), "x", &base()).unwrap();

        let ids: Vec<u32> = page.entries.iter().map(|e| e.encoding_id).collect();
        assert_eq!(ids, vec![140, 251, 18, 22]);
        assert_eq!(
            page.entries[0].locator,
            StreamLocator::Obfuscated {
                url: "https://r.example.com/c".to_string(),
                signature: "QRS".to_string(),
                param: DEFAULT_SIGNATURE_PARAM.to_string(),
            }
        );
        assert_eq!(
            page.entries[2].locator,
            StreamLocator::Direct("https://r.example.com/a".to_string())
        );
        assert_eq!(
            page.entries[3].locator,
            StreamLocator::Direct("https://r.example.com/b".to_string())
        );
    }

    #[test]
    fn accepts_inline_player_response() {
        let config = json!({
            "args": {
                "player_response": {
                    "videoDetails": {"title": "Inline"},
                    "streamingData": {"formats": []}
                }
            }
        });
        let page = parse_page(&page_with_config(&config), "x", &base()).unwrap();
        assert_eq!(page.details.title.as_deref(), Some("Inline"));
        assert!(page.entries.is_empty());
        assert_eq!(page.player_url, None);
    }

    #[test]
    fn accepts_initial_player_response_with_js_url() {
        let response = json!({
            "videoDetails": {"title": "Modern"},
            "streamingData": {"formats": [{"itag": 18, "url": "https://r3.example.com/v?itag=18"}]}
        });
        let html = format!(
            r#"<script>var ytInitialPlayerResponse = {};var meta = 1;</script><script>ytcfg.set({{"PLAYER_JS_URL":"x","jsUrl":"\/s\/player\/def\/base.js"}});</script>"#,
            response
        );
        let page = parse_page(&html, "m", &base()).unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(
            page.player_url.as_deref(),
            Some("https://www.youtube.com/s/player/def/base.js")
        );
    }

    #[test]
    fn empty_catalog_is_not_an_error() {
        let config = json!({
            "args": { "player_response": json!({"streamingData": {}}).to_string() }
        });
        let page = parse_page(&page_with_config(&config), "x", &base()).unwrap();
        assert!(page.entries.is_empty());
    }

    #[test]
    fn entries_without_usable_locator_are_skipped() {
        let response = json!({
            "streamingData": {
                "formats": [
                    {"bitrate": 1, "url": "https://r.example.com/no-itag"},
                    {"itag": 22},
                    {"itag": 18, "cipher": "s=AAA"},
                    {"itag": 43, "url": "https://r.example.com/ok"}
                ]
            }
        });
        let config = json!({"args": {"player_response": response.to_string()}});
        let page = parse_page(&page_with_config(&config), "x", &base()).unwrap();
        let ids: Vec<u32> = page.entries.iter().map(|e| e.encoding_id).collect();
        assert_eq!(ids, vec![43]);
    }

    #[test]
    fn missing_config_is_page_structure_changed() {
        let err = parse_page("<html><body>nothing here</body></html>", "x", &base()).unwrap_err();
        assert!(matches!(err, ExtractError::PageStructureChanged(_)));
    }

    #[test]
    fn malformed_config_is_page_structure_changed() {
        let html = "<script>ytplayer.config = {\"args\": {\"player_response\": ;</script>";
        let err = parse_page(html, "x", &base()).unwrap_err();
        assert!(matches!(err, ExtractError::PageStructureChanged(_)));
    }

    #[test]
    fn undecodable_player_response_is_page_structure_changed() {
        let config = json!({"args": {"player_response": "{not json"}});
        let err = parse_page(&page_with_config(&config), "x", &base()).unwrap_err();
        assert!(matches!(err, ExtractError::PageStructureChanged(_)));
    }

    #[test]
    fn config_without_catalog_is_page_structure_changed() {
        let config = json!({"args": {"player_response": json!({"videoDetails": {}}).to_string()}});
        let err = parse_page(&page_with_config(&config), "x", &base()).unwrap_err();
        assert!(matches!(err, ExtractError::PageStructureChanged(_)));
    }

    #[test]
    fn absolute_url_normalises_references() {
        let base = base();
        assert_eq!(
            absolute_url(&base, "//cdn.example.com/p.js").as_deref(),
            Some("https://cdn.example.com/p.js")
        );
        assert_eq!(
            absolute_url(&base, "/s/p.js").as_deref(),
            Some("https://www.youtube.com/s/p.js")
        );
        assert_eq!(
            absolute_url(&base, "https://other.example.com/p.js").as_deref(),
            Some("https://other.example.com/p.js")
        );
    }
}
