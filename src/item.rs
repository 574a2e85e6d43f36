use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipKind {
    Text,
    Url,
    Rtf,
    Html,
    Image,
    Files,
}

impl ClipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClipKind::Text => "text",
            ClipKind::Url => "url",
            ClipKind::Rtf => "rtf",
            ClipKind::Html => "html",
            ClipKind::Image => "image",
            ClipKind::Files => "files",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ClipKind::Text => "Text",
            ClipKind::Url => "URL",
            ClipKind::Rtf => "RTF",
            ClipKind::Html => "HTML",
            ClipKind::Image => "Image",
            ClipKind::Files => "Files",
        }
    }

    /// Parse a kind name, accepting the aliases users actually type.
    pub fn parse(s: &str) -> Option<ClipKind> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" | "plain" => Some(ClipKind::Text),
            "url" | "urls" | "link" | "links" => Some(ClipKind::Url),
            "rtf" | "richtext" => Some(ClipKind::Rtf),
            "html" | "web" => Some(ClipKind::Html),
            "image" | "images" | "img" | "picture" | "pictures" => Some(ClipKind::Image),
            "files" | "file" | "fileref" => Some(ClipKind::Files),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ItemRecord", into = "ItemRecord")]
pub struct ClipboardItem {
    pub id: Uuid,
    pub kind: ClipKind,
    pub display_text: String,
    pub raw_data: Option<Vec<u8>>,
    pub file_paths: Option<Vec<String>>,
    pub url_title: Option<String>,
    pub url_thumbnail: Option<Vec<u8>>,
    pub copied_at: DateTime<Utc>,
    pub is_pinned: bool,
    pub pinned_order: Option<u32>,
}

impl ClipboardItem {
    pub fn new(kind: ClipKind, display_text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            display_text: display_text.into(),
            raw_data: None,
            file_paths: None,
            url_title: None,
            url_thumbnail: None,
            copied_at: Utc::now(),
            is_pinned: false,
            pinned_order: None,
        }
    }

    pub fn with_raw_data(mut self, data: Vec<u8>) -> Self {
        self.raw_data = Some(data);
        self
    }

    pub fn with_file_paths(mut self, paths: Vec<String>) -> Self {
        self.file_paths = Some(paths);
        self
    }

    /// Fingerprint deciding whether two observations are the same logical
    /// entry: the kind plus joined paths for file lists, a digest of the
    /// raw payload when one is carried, or the display text.
    pub fn dedupe_key(&self) -> String {
        match self.kind {
            ClipKind::Files => {
                let joined = self
                    .file_paths
                    .as_deref()
                    .unwrap_or_default()
                    .join("|");
                format!("{}:{}", self.kind.as_str(), joined)
            }
            _ => match &self.raw_data {
                Some(data) => {
                    format!("{}:{:x}", self.kind.as_str(), Sha256::digest(data))
                }
                None => format!("{}:{}", self.kind.as_str(), self.display_text),
            },
        }
    }

    /// Concatenated text the search engine matches against.
    pub fn searchable_text(&self) -> String {
        let mut parts = vec![self.kind.display_name().to_string(), self.display_text.clone()];
        if let Some(title) = &self.url_title {
            parts.push(title.clone());
        }
        if let Some(paths) = &self.file_paths {
            parts.push(paths.join(" "));
        }
        parts.join(" ")
    }

    pub fn preview_text(&self) -> String {
        if self.kind == ClipKind::Files {
            if let Some(paths) = &self.file_paths {
                if !paths.is_empty() {
                    return paths
                        .iter()
                        .map(|p| {
                            p.rsplit('/').next().filter(|s| !s.is_empty()).unwrap_or(p)
                        })
                        .collect::<Vec<_>>()
                        .join(", ");
                }
            }
        }
        self.display_text.clone()
    }

    pub fn needs_enrichment(&self) -> bool {
        self.kind == ClipKind::Url && self.url_title.is_none()
    }
}

/// True when a trimmed single-token string parses as a URL with an explicit
/// scheme, e.g. `https://example.com` or `file:///tmp/a`.
pub fn is_probable_url(s: &str) -> bool {
    let s = s.trim();
    if s.is_empty() || s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((scheme, rest)) = s.split_once("://") else {
        return false;
    };
    if rest.is_empty() {
        return false;
    }
    let mut chars = scheme.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// On-disk shape of an item. Written with the current field set; reads
/// tolerate records produced by the legacy format, which carried only a
/// `content` string, and fill missing identity fields with defaults.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<ClipKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    display_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    raw_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_paths: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url_thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    copied_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    is_pinned: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pinned_order: Option<u32>,
    /// Legacy format: a bare text payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

impl From<ItemRecord> for ClipboardItem {
    fn from(rec: ItemRecord) -> Self {
        let (kind, display_text, raw_data, file_paths) = match rec.kind {
            Some(kind) => (
                kind,
                rec.display_text.unwrap_or_default(),
                rec.raw_data.and_then(|b| BASE64.decode(b).ok()),
                rec.file_paths,
            ),
            // Legacy record shape: only a `content` string.
            None => (ClipKind::Text, rec.content.unwrap_or_default(), None, None),
        };
        let is_pinned = rec.is_pinned.unwrap_or(false);
        Self {
            id: rec.id.unwrap_or_else(Uuid::new_v4),
            kind,
            display_text,
            raw_data,
            file_paths,
            url_title: rec.url_title,
            url_thumbnail: rec.url_thumbnail.and_then(|b| BASE64.decode(b).ok()),
            copied_at: rec.copied_at.unwrap_or_else(Utc::now),
            is_pinned,
            pinned_order: if is_pinned { rec.pinned_order } else { None },
        }
    }
}

impl From<ClipboardItem> for ItemRecord {
    fn from(item: ClipboardItem) -> Self {
        Self {
            id: Some(item.id),
            kind: Some(item.kind),
            display_text: Some(item.display_text),
            raw_data: item.raw_data.map(|d| BASE64.encode(d)),
            file_paths: item.file_paths,
            url_title: item.url_title,
            url_thumbnail: item.url_thumbnail.map(|d| BASE64.encode(d)),
            copied_at: Some(item.copied_at),
            is_pinned: Some(item.is_pinned),
            pinned_order: item.pinned_order,
            content: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasteQueueEntry {
    pub id: Uuid,
    pub item: ClipboardItem,
    pub added_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_item_id: Option<Uuid>,
}

impl PasteQueueEntry {
    pub fn new(item: ClipboardItem, source_item_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            item,
            added_at: Utc::now(),
            source_item_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_aliases() {
        assert_eq!(ClipKind::parse("img"), Some(ClipKind::Image));
        assert_eq!(ClipKind::parse("images"), Some(ClipKind::Image));
        assert_eq!(ClipKind::parse("link"), Some(ClipKind::Url));
        assert_eq!(ClipKind::parse("TEXT"), Some(ClipKind::Text));
        assert_eq!(ClipKind::parse("bogus"), None);
    }

    #[test]
    fn test_dedupe_key_text_uses_display_text() {
        let a = ClipboardItem::new(ClipKind::Text, "hello");
        let b = ClipboardItem::new(ClipKind::Text, "hello");
        assert_eq!(a.dedupe_key(), b.dedupe_key());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_dedupe_key_distinguishes_kind() {
        let a = ClipboardItem::new(ClipKind::Text, "hello");
        let b = ClipboardItem::new(ClipKind::Url, "hello");
        assert_ne!(a.dedupe_key(), b.dedupe_key());
    }

    #[test]
    fn test_dedupe_key_prefers_raw_payload() {
        let a = ClipboardItem::new(ClipKind::Html, "preview").with_raw_data(b"<p>x</p>".to_vec());
        let b = ClipboardItem::new(ClipKind::Html, "other preview")
            .with_raw_data(b"<p>x</p>".to_vec());
        assert_eq!(a.dedupe_key(), b.dedupe_key());
    }

    #[test]
    fn test_dedupe_key_files_joins_paths() {
        let a = ClipboardItem::new(ClipKind::Files, "2 files")
            .with_file_paths(vec!["/a".into(), "/b".into()]);
        let b = ClipboardItem::new(ClipKind::Files, "two files")
            .with_file_paths(vec!["/a".into(), "/b".into()]);
        let c = ClipboardItem::new(ClipKind::Files, "2 files")
            .with_file_paths(vec!["/b".into(), "/a".into()]);
        assert_eq!(a.dedupe_key(), b.dedupe_key());
        assert_ne!(a.dedupe_key(), c.dedupe_key());
    }

    #[test]
    fn test_preview_text_files_shows_names() {
        let item = ClipboardItem::new(ClipKind::Files, "2 files")
            .with_file_paths(vec!["/tmp/report.pdf".into(), "/home/u/pic.png".into()]);
        assert_eq!(item.preview_text(), "report.pdf, pic.png");
    }

    #[test]
    fn test_is_probable_url() {
        assert!(is_probable_url("https://example.com/a?b=1"));
        assert!(is_probable_url("file:///tmp/x"));
        assert!(is_probable_url("  ftp://host  "));
        assert!(!is_probable_url("example.com"));
        assert!(!is_probable_url("not a url https://x.com"));
        assert!(!is_probable_url("://missing-scheme"));
        assert!(!is_probable_url("1http://bad-scheme.com"));
        assert!(!is_probable_url("https://"));
    }

    #[test]
    fn test_round_trip_serialization() {
        let mut item = ClipboardItem::new(ClipKind::Url, "https://example.com")
            .with_raw_data(vec![1, 2, 3]);
        item.url_title = Some("Example".into());
        item.is_pinned = true;
        item.pinned_order = Some(2);
        let json = serde_json::to_string(&item).unwrap();
        let back: ClipboardItem = serde_json::from_str(&json).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn test_raw_data_encoded_as_base64() {
        let item = ClipboardItem::new(ClipKind::Image, "image").with_raw_data(vec![0xff, 0x00]);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["rawData"], serde_json::json!("/wA="));
    }

    #[test]
    fn test_legacy_record_maps_to_text() {
        let item: ClipboardItem = serde_json::from_str(r#"{"content": "old note"}"#).unwrap();
        assert_eq!(item.kind, ClipKind::Text);
        assert_eq!(item.display_text, "old note");
        assert!(item.raw_data.is_none());
        assert!(!item.is_pinned);
    }

    #[test]
    fn test_decode_defaults_missing_identity_fields() {
        let item: ClipboardItem =
            serde_json::from_str(r#"{"kind": "text", "displayText": "x"}"#).unwrap();
        assert_eq!(item.display_text, "x");
        assert!(!item.is_pinned);
        assert!(item.pinned_order.is_none());
    }

    #[test]
    fn test_decode_drops_pinned_order_when_unpinned() {
        let item: ClipboardItem = serde_json::from_str(
            r#"{"kind": "text", "displayText": "x", "isPinned": false, "pinnedOrder": 3}"#,
        )
        .unwrap();
        assert!(item.pinned_order.is_none());
    }

    #[test]
    fn test_needs_enrichment() {
        let mut item = ClipboardItem::new(ClipKind::Url, "https://example.com");
        assert!(item.needs_enrichment());
        item.url_title = Some("Example".into());
        assert!(!item.needs_enrichment());
        assert!(!ClipboardItem::new(ClipKind::Text, "x").needs_enrichment());
    }
}
