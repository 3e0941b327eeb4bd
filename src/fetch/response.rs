//! Decoding of search API response bodies.
//!
//! Proxy and upstream share one response shape. Everything that can go wrong
//! with a body is resolved here into a [`FetchError`], so the session never
//! looks at raw JSON.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::error::FetchError;
use crate::search::{Item, Page};

/// Longest raw body excerpt kept in an HTTP error message.
const MAX_ERROR_EXCERPT: usize = 200;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSearchResponse {
    #[serde(default)]
    items: Vec<RawItem>,
    next_page_token: Option<String>,
    error: Option<RawError>,
}

/// The `error` member, either the upstream's structured object or the
/// proxy's plain string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawError {
    Plain(String),
    Detailed {
        code: Option<u16>,
        message: Option<String>,
        #[serde(default)]
        errors: Vec<RawErrorDetail>,
    },
}

#[derive(Debug, Deserialize)]
struct RawErrorDetail {
    reason: Option<String>,
    message: Option<String>,
}

impl RawError {
    fn code(&self) -> Option<u16> {
        match self {
            RawError::Plain(_) => None,
            RawError::Detailed { code, .. } => *code,
        }
    }

    fn message(self) -> String {
        match self {
            RawError::Plain(message) => message,
            RawError::Detailed {
                message, errors, ..
            } => message
                .filter(|m| !m.trim().is_empty())
                .or_else(|| {
                    errors
                        .into_iter()
                        .find_map(|detail| detail.message.or(detail.reason))
                })
                .unwrap_or_else(|| "unknown error".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawErrorEnvelope {
    error: Option<RawError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawItem {
    id: RawId,
    snippet: RawSnippet,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawId {
    video_id: Option<String>,
    channel_id: Option<String>,
    playlist_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawSnippet {
    title: String,
    description: String,
    published_at: Option<String>,
    thumbnails: RawThumbnails,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawThumbnails {
    high: Option<RawThumbnail>,
    medium: Option<RawThumbnail>,
    default: Option<RawThumbnail>,
}

#[derive(Debug, Deserialize)]
struct RawThumbnail {
    url: String,
}

impl From<RawItem> for Item {
    fn from(raw: RawItem) -> Self {
        let RawItem { id, snippet } = raw;
        let published_at = snippet
            .published_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        let thumbnail_url = snippet
            .thumbnails
            .high
            .or(snippet.thumbnails.medium)
            .or(snippet.thumbnails.default)
            .map(|t| t.url);

        Item {
            id: id
                .video_id
                .or(id.playlist_id)
                .or(id.channel_id)
                .unwrap_or_default(),
            title: unescape_entities(&snippet.title),
            description: unescape_entities(&snippet.description),
            published_at,
            thumbnail_url,
        }
    }
}

/// Turns one HTTP response into a page or a normalized error.
///
/// Checks, in order: non-2xx status, unparseable body, embedded `error`
/// object. The last one matters because some error paths answer 200.
pub(crate) fn decode_page(status: u16, body: &[u8]) -> Result<Page, FetchError> {
    if !(200..300).contains(&status) {
        return Err(FetchError::HttpStatus {
            status,
            message: error_message(status, body),
        });
    }

    let raw: RawSearchResponse =
        serde_json::from_slice(body).map_err(|e| FetchError::Decode(e.to_string()))?;

    if let Some(error) = raw.error {
        return Err(FetchError::Upstream {
            code: error.code(),
            message: error.message(),
        });
    }

    Ok(Page {
        items: raw.items.into_iter().map(Item::from).collect(),
        next_cursor: raw.next_page_token.filter(|t| !t.is_empty()),
    })
}

/// Best-effort message for a non-2xx body: the JSON `error` if present, else
/// a short excerpt of the body, else the status reason phrase.
fn error_message(status: u16, body: &[u8]) -> String {
    if let Ok(RawErrorEnvelope { error: Some(error) }) = serde_json::from_slice(body) {
        return error.message();
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if !text.is_empty() {
        return text.chars().take(MAX_ERROR_EXCERPT).collect();
    }

    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("request failed")
        .to_string()
}

/// Undo the HTML escaping the upstream applies to snippet text.
fn unescape_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TWO_ITEMS: &str = r#"{
        "kind": "youtube#searchListResponse",
        "nextPageToken": "CDIQAA",
        "items": [
            {
                "id": { "kind": "youtube#video", "videoId": "abc123" },
                "snippet": {
                    "title": "Rock &amp; Roll &#39;58",
                    "description": "Live",
                    "publishedAt": "2024-01-05T12:30:00Z",
                    "thumbnails": { "high": { "url": "https://i.ytimg.com/vi/abc123/hqdefault.jpg" } }
                }
            },
            {
                "id": { "videoId": "def456" },
                "snippet": { "title": "No thumbnails" }
            }
        ]
    }"#;

    #[test]
    fn test_decode_page_with_cursor() {
        let page = decode_page(200, TWO_ITEMS.as_bytes()).unwrap();
        assert_eq!(page.next_cursor.as_deref(), Some("CDIQAA"));
        assert_eq!(page.items.len(), 2);

        let first = &page.items[0];
        assert_eq!(first.id, "abc123");
        assert_eq!(first.title, "Rock & Roll '58");
        assert_eq!(
            first.thumbnail_url.as_deref(),
            Some("https://i.ytimg.com/vi/abc123/hqdefault.jpg")
        );
        assert_eq!(
            first.published_at.map(|d| d.to_rfc3339()),
            Some("2024-01-05T12:30:00+00:00".to_string())
        );

        let second = &page.items[1];
        assert_eq!(second.id, "def456");
        assert_eq!(second.thumbnail_url, None);
        assert_eq!(second.published_at, None);
    }

    #[test]
    fn test_last_page_has_no_cursor() {
        let page = decode_page(200, br#"{"items": []}"#).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.next_cursor, None);

        // An empty token counts as absent
        let page = decode_page(200, br#"{"items": [], "nextPageToken": ""}"#).unwrap();
        assert_eq!(page.next_cursor, None);
    }

    #[test]
    fn test_embedded_error_with_ok_status() {
        let body = br#"{"error": {"code": 403, "message": "The request cannot be completed because you have exceeded your quota.", "errors": [{"reason": "quotaExceeded"}]}}"#;
        match decode_page(200, body).unwrap_err() {
            FetchError::Upstream { code, message } => {
                assert_eq!(code, Some(403));
                assert!(message.contains("exceeded your quota"));
            }
            e => panic!("Expected Upstream error, got {:?}", e),
        }
    }

    #[test]
    fn test_embedded_plain_error_from_proxy() {
        let body = br#"{"error": "Failed to fetch data from YouTube API"}"#;
        match decode_page(200, body).unwrap_err() {
            FetchError::Upstream { code, message } => {
                assert_eq!(code, None);
                assert_eq!(message, "Failed to fetch data from YouTube API");
            }
            e => panic!("Expected Upstream error, got {:?}", e),
        }
    }

    #[test]
    fn test_error_detail_reason_used_when_message_missing() {
        let body = br#"{"error": {"code": 400, "errors": [{"reason": "invalidPageToken"}]}}"#;
        let err = decode_page(200, body).unwrap_err();
        assert_eq!(err.to_string(), "API error: invalidPageToken");
    }

    #[test]
    fn test_non_2xx_uses_json_error_message() {
        let body = br#"{"error": "Search query \"q\" is required."}"#;
        match decode_page(400, body).unwrap_err() {
            FetchError::HttpStatus { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Search query \"q\" is required.");
            }
            e => panic!("Expected HttpStatus error, got {:?}", e),
        }
    }

    #[test]
    fn test_non_2xx_falls_back_to_body_then_reason() {
        let err = decode_page(502, b"Bad gateway from edge").unwrap_err();
        assert_eq!(err.to_string(), "HTTP error 502: Bad gateway from edge");

        let err = decode_page(503, b"").unwrap_err();
        assert_eq!(err.to_string(), "HTTP error 503: Service Unavailable");
    }

    #[test]
    fn test_unparseable_body() {
        assert!(matches!(
            decode_page(200, b"<html>not json</html>"),
            Err(FetchError::Decode(_))
        ));
        assert!(matches!(
            decode_page(200, br#"{"items": "nope"}"#),
            Err(FetchError::Decode(_))
        ));
    }

    #[test]
    fn test_unescape_leaves_plain_text_alone() {
        assert_eq!(unescape_entities("plain"), "plain");
        assert_eq!(unescape_entities("&amp;lt;"), "&lt;");
    }
}
