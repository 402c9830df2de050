use std::collections::HashMap;
use std::process::Command;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

static CARRIER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a").expect("static selector"));

/// Parses an `&`-delimited `key=value` list, percent-decoding the values.
///
/// Pairs without `=` or whose value is not valid UTF-8 after decoding are skipped. Later
/// keys do not overwrite earlier ones.
pub fn parse_query_map(query: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for pair in query.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let Ok(value) = urlencoding::decode(value) else {
            continue;
        };
        map.entry(key.to_string())
            .or_insert_with(|| value.into_owned());
    }
    map
}

/// Removes HTML entity escaping (`&amp;` and friends) from a catalog string.
///
/// The text is decoded as an attribute value, so bare `&key=` sequences are left alone
/// even when `key` happens to prefix a legacy entity name.
pub fn unescape_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }

    let markup = format!("<a title=\"{}\"></a>", raw.replace('"', "&quot;"));
    let fragment = Html::parse_fragment(&markup);
    fragment
        .select(&CARRIER)
        .next()
        .and_then(|el| el.value().attr("title"))
        .map(str::to_string)
        .unwrap_or_else(|| raw.to_string())
}

fn looks_like_video_id(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate.len() <= 64
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Pulls the video id out of a watch URL, short link, embed/shorts path or a bare id.
pub fn parse_video_id(input: &str) -> Option<String> {
    let input = input.trim();
    if looks_like_video_id(input) {
        return Some(input.to_string());
    }

    let url = Url::parse(input).ok()?;
    let host = url.host_str()?.trim_start_matches("www.").trim_start_matches("m.");

    let candidate = if host == "youtu.be" {
        url.path_segments()?.next().map(str::to_string)
    } else if let Some((_, v)) = url.query_pairs().find(|(k, _)| k == "v") {
        Some(v.into_owned())
    } else {
        let mut segments = url.path_segments()?;
        match segments.next() {
            Some("embed") | Some("shorts") | Some("v") | Some("live") => {
                segments.next().map(str::to_string)
            }
            _ => None,
        }
    };

    candidate.filter(|id| looks_like_video_id(id))
}

// Formats seconds as "1h 2m 3s"
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

pub fn is_program_installed(program: &str) -> bool {
    Command::new("which")
        .arg(program)
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_map_decodes_values() {
        let map = parse_query_map("itag=18&url=https%3A%2F%2Fr1.example.com%2Fvideoplayback%3Fid%3D1&s=AB%3DC");
        assert_eq!(map["itag"], "18");
        assert_eq!(map["url"], "https://r1.example.com/videoplayback?id=1");
        assert_eq!(map["s"], "AB=C");
    }

    #[test]
    fn query_map_skips_bare_keys_and_keeps_first() {
        let map = parse_query_map("flag&itag=18&itag=22&");
        assert_eq!(map.len(), 1);
        assert_eq!(map["itag"], "18");
    }

    #[test]
    fn unescape_decodes_amp() {
        assert_eq!(
            unescape_entities("itag=18&amp;url=https%3A%2F%2Fx&amp;sp=sig"),
            "itag=18&url=https%3A%2F%2Fx&sp=sig"
        );
    }

    #[test]
    fn unescape_leaves_plain_query_strings() {
        assert_eq!(unescape_entities("itag=18&url=abc"), "itag=18&url=abc");
        assert_eq!(unescape_entities("no entities here"), "no entities here");
    }

    #[test]
    fn video_id_from_various_inputs() {
        assert_eq!(parse_video_id("dQw4w9WgXcQ").as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(
            parse_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            parse_video_id("https://youtu.be/dQw4w9WgXcQ?si=x").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            parse_video_id("https://www.youtube.com/shorts/abc_DEF-123").as_deref(),
            Some("abc_DEF-123")
        );
        assert_eq!(parse_video_id("https://www.youtube.com/feed"), None);
        assert_eq!(parse_video_id("not a url"), None);
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(5), "5s");
        assert_eq!(format_duration(65), "1m 5s");
        assert_eq!(format_duration(3723), "1h 2m 3s");
    }
}
