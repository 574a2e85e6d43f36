use clipboard_rs::common::RustImage;
use clipboard_rs::{Clipboard, ClipboardContext, ContentFormat, RustImageData};
use sha2::{Digest, Sha256};

use crate::errors::{ClipError, Result};
use crate::item::{is_probable_url, ClipKind, ClipboardItem};

/// The abstract system clipboard: a monotonically increasing change counter
/// plus per-format read and write access. The engine only ever talks to the
/// clipboard through this trait.
pub trait ClipboardDevice {
    /// Bumps whenever the clipboard content changes. Polling compares
    /// counters, so an unchanged clipboard must be cheap to ask about.
    fn change_count(&mut self) -> u64;

    fn read_file_list(&mut self) -> Option<Vec<String>>;
    fn read_string(&mut self) -> Option<String>;
    fn read_rtf(&mut self) -> Option<String>;
    fn read_html(&mut self) -> Option<String>;
    /// PNG-encoded image bytes.
    fn read_image(&mut self) -> Option<Vec<u8>>;

    fn write_string(&mut self, text: &str) -> Result<()>;
    /// Like `write_string` but additionally tagged as a URL where the
    /// platform supports a URL-typed representation.
    fn write_url(&mut self, url: &str) -> Result<()>;
    fn write_rtf(&mut self, rtf: &str) -> Result<()>;
    fn write_html(&mut self, html: &str) -> Result<()>;
    fn write_image(&mut self, png: &[u8]) -> Result<()>;
    fn write_file_list(&mut self, paths: &[String]) -> Result<()>;
    fn clear(&mut self) -> Result<()>;
}

/// Normalize a file list into a candidate item. Empty lists produce no
/// candidate. Shared by the monitor's probing and by direct imports of
/// raw content, so both take the same path.
pub fn normalize_file_list(paths: Vec<String>) -> Option<ClipboardItem> {
    if paths.is_empty() {
        return None;
    }
    let display = if paths.len() == 1 {
        paths[0].clone()
    } else {
        format!("{} files", paths.len())
    };
    Some(ClipboardItem::new(ClipKind::Files, display).with_file_paths(paths))
}

/// Normalize a raw string: trimmed, classified as a URL when it parses
/// with an explicit scheme. Whitespace-only strings produce no candidate.
pub fn normalize_string(text: &str) -> Option<ClipboardItem> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let kind = if is_probable_url(trimmed) {
        ClipKind::Url
    } else {
        ClipKind::Text
    };
    Some(ClipboardItem::new(kind, trimmed))
}

pub fn normalize_rtf(rtf: String) -> Option<ClipboardItem> {
    if rtf.is_empty() {
        return None;
    }
    let display = format!("RTF ({} bytes)", rtf.len());
    Some(ClipboardItem::new(ClipKind::Rtf, display).with_raw_data(rtf.into_bytes()))
}

pub fn normalize_html(html: String) -> Option<ClipboardItem> {
    if html.is_empty() {
        return None;
    }
    let display = html_summary(&html);
    Some(ClipboardItem::new(ClipKind::Html, display).with_raw_data(html.into_bytes()))
}

pub fn normalize_image(png: Vec<u8>) -> Option<ClipboardItem> {
    if png.is_empty() {
        return None;
    }
    let display = match image::load_from_memory(&png) {
        Ok(img) => format!("{}x{} image", img.width(), img.height()),
        Err(_) => "image".to_string(),
    };
    Some(ClipboardItem::new(ClipKind::Image, display).with_raw_data(png))
}

/// Probe the device's formats in fixed priority order and normalize the
/// first hit into a candidate item. No recognized format is not an error,
/// just no candidate.
pub fn read_candidate(device: &mut dyn ClipboardDevice) -> Option<ClipboardItem> {
    if let Some(item) = device.read_file_list().and_then(normalize_file_list) {
        return Some(item);
    }
    if let Some(item) = device.read_string().as_deref().and_then(normalize_string) {
        return Some(item);
    }
    if let Some(item) = device.read_rtf().and_then(normalize_rtf) {
        return Some(item);
    }
    if let Some(item) = device.read_html().and_then(normalize_html) {
        return Some(item);
    }
    if let Some(item) = device.read_image().and_then(normalize_image) {
        return Some(item);
    }
    None
}

/// Write an item back to the device with its kind-specific representation.
/// Missing or undecodable payloads are skipped silently; the operation
/// reports whether anything was written.
pub fn write_item(device: &mut dyn ClipboardDevice, item: &ClipboardItem) -> Result<bool> {
    match item.kind {
        ClipKind::Text => {
            device.write_string(&item.display_text)?;
            Ok(true)
        }
        ClipKind::Url => {
            device.write_url(&item.display_text)?;
            Ok(true)
        }
        ClipKind::Rtf => match payload_utf8(item) {
            Some(rtf) => {
                device.write_rtf(&rtf)?;
                Ok(true)
            }
            None => Ok(false),
        },
        ClipKind::Html => match payload_utf8(item) {
            Some(html) => {
                device.write_html(&html)?;
                Ok(true)
            }
            None => Ok(false),
        },
        ClipKind::Image => match &item.raw_data {
            Some(png) if image::load_from_memory(png).is_ok() => {
                device.write_image(png)?;
                Ok(true)
            }
            _ => Ok(false),
        },
        ClipKind::Files => match &item.file_paths {
            Some(paths) if !paths.is_empty() => {
                device.write_file_list(paths)?;
                Ok(true)
            }
            _ => Ok(false),
        },
    }
}

fn payload_utf8(item: &ClipboardItem) -> Option<String> {
    item.raw_data
        .as_ref()
        .and_then(|data| String::from_utf8(data.clone()).ok())
}

fn digest_tagged(tag: &str, payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tag.as_bytes());
    hasher.update(payload);
    format!("{:x}", hasher.finalize())
}

/// Collapse an HTML fragment into a short plain-text summary for display.
fn html_summary(html: &str) -> String {
    // A crude strip is fine for a preview line.
    let stripped = regex::Regex::new(r"<[^>]*>")
        .map(|re| re.replace_all(html, " ").into_owned())
        .unwrap_or_else(|_| html.to_string());
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        format!("HTML ({} bytes)", html.len())
    } else if collapsed.chars().count() > 200 {
        collapsed.chars().take(197).collect::<String>() + "..."
    } else {
        collapsed
    }
}

/// Adapter over the real system clipboard. clipboard-rs exposes no change
/// counter, so the adapter fingerprints whatever is readable and bumps an
/// internal counter when the fingerprint moves.
pub struct SystemClipboard {
    ctx: ClipboardContext,
    counter: u64,
    last_fingerprint: Option<String>,
}

impl SystemClipboard {
    pub fn new() -> Result<Self> {
        let ctx = ClipboardContext::new().map_err(|e| ClipError::Clipboard(e.to_string()))?;
        Ok(Self {
            ctx,
            counter: 0,
            last_fingerprint: None,
        })
    }

    fn fingerprint(&self) -> String {
        if self.ctx.has(ContentFormat::Files) {
            if let Ok(files) = self.ctx.get_files() {
                return digest_tagged("files:", files.join("|").as_bytes());
            }
        }
        if self.ctx.has(ContentFormat::Text) {
            if let Ok(text) = self.ctx.get_text() {
                return digest_tagged("text:", text.as_bytes());
            }
        }
        if self.ctx.has(ContentFormat::Rtf) {
            if let Ok(rtf) = self.ctx.get_rich_text() {
                return digest_tagged("rtf:", rtf.as_bytes());
            }
        }
        if self.ctx.has(ContentFormat::Html) {
            if let Ok(html) = self.ctx.get_html() {
                return digest_tagged("html:", html.as_bytes());
            }
        }
        if self.ctx.has(ContentFormat::Image) {
            if let Ok(img) = self.ctx.get_image() {
                // Dimensions only; a PNG re-encode per 600 ms poll is too
                // heavy. A swap between same-size images within one poll
                // window is not detected.
                let (width, height) = img.get_size();
                return digest_tagged("image:", format!("{}x{}", width, height).as_bytes());
            }
        }
        "empty".to_string()
    }
}

impl ClipboardDevice for SystemClipboard {
    fn change_count(&mut self) -> u64 {
        let fp = self.fingerprint();
        if self.last_fingerprint.as_deref() != Some(fp.as_str()) {
            self.last_fingerprint = Some(fp);
            self.counter += 1;
        }
        self.counter
    }

    fn read_file_list(&mut self) -> Option<Vec<String>> {
        if !self.ctx.has(ContentFormat::Files) {
            return None;
        }
        self.ctx.get_files().ok().filter(|files| !files.is_empty())
    }

    fn read_string(&mut self) -> Option<String> {
        if !self.ctx.has(ContentFormat::Text) {
            return None;
        }
        self.ctx.get_text().ok().filter(|text| !text.is_empty())
    }

    fn read_rtf(&mut self) -> Option<String> {
        if !self.ctx.has(ContentFormat::Rtf) {
            return None;
        }
        self.ctx.get_rich_text().ok().filter(|rtf| !rtf.is_empty())
    }

    fn read_html(&mut self) -> Option<String> {
        if !self.ctx.has(ContentFormat::Html) {
            return None;
        }
        self.ctx.get_html().ok().filter(|html| !html.is_empty())
    }

    fn read_image(&mut self) -> Option<Vec<u8>> {
        if !self.ctx.has(ContentFormat::Image) {
            return None;
        }
        let img = self.ctx.get_image().ok()?;
        let png = img.to_png().ok()?;
        Some(png.get_bytes().to_vec())
    }

    fn write_string(&mut self, text: &str) -> Result<()> {
        self.ctx
            .set_text(text.to_string())
            .map_err(|e| ClipError::Clipboard(e.to_string()))
    }

    fn write_url(&mut self, url: &str) -> Result<()> {
        // clipboard-rs has no dedicated URL representation; the plain
        // string form is what other applications paste anyway.
        self.write_string(url)
    }

    fn write_rtf(&mut self, rtf: &str) -> Result<()> {
        self.ctx
            .set_rich_text(rtf.to_string())
            .map_err(|e| ClipError::Clipboard(e.to_string()))
    }

    fn write_html(&mut self, html: &str) -> Result<()> {
        self.ctx
            .set_html(html.to_string())
            .map_err(|e| ClipError::Clipboard(e.to_string()))
    }

    fn write_image(&mut self, png: &[u8]) -> Result<()> {
        let img = RustImageData::from_bytes(png).map_err(|e| ClipError::Image(e.to_string()))?;
        self.ctx
            .set_image(img)
            .map_err(|e| ClipError::Clipboard(e.to_string()))
    }

    fn write_file_list(&mut self, paths: &[String]) -> Result<()> {
        self.ctx
            .set_files(paths.to_vec())
            .map_err(|e| ClipError::Clipboard(e.to_string()))
    }

    fn clear(&mut self) -> Result<()> {
        self.ctx
            .clear()
            .map_err(|e| ClipError::Clipboard(e.to_string()))
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Written {
        Text(String),
        Url(String),
        Rtf(String),
        Html(String),
        Image(Vec<u8>),
        Files(Vec<String>),
    }

    /// Scripted in-memory device: tests place content on it and watch what
    /// the engine writes back.
    #[derive(Default)]
    pub struct MockDevice {
        counter: u64,
        pub files: Option<Vec<String>>,
        pub string: Option<String>,
        pub rtf: Option<String>,
        pub html: Option<String>,
        pub image: Option<Vec<u8>>,
        pub written: Vec<Written>,
    }

    impl MockDevice {
        pub fn new() -> Self {
            Self::default()
        }

        fn bump(&mut self) {
            self.counter += 1;
        }

        pub fn place_string(&mut self, text: &str) {
            self.reset_content();
            self.string = Some(text.to_string());
            self.bump();
        }

        pub fn place_files(&mut self, paths: Vec<String>) {
            self.reset_content();
            self.files = Some(paths);
            self.bump();
        }

        pub fn place_rtf(&mut self, rtf: &str) {
            self.reset_content();
            self.rtf = Some(rtf.to_string());
            self.bump();
        }

        pub fn place_html(&mut self, html: &str) {
            self.reset_content();
            self.html = Some(html.to_string());
            self.bump();
        }

        pub fn place_image(&mut self, png: Vec<u8>) {
            self.reset_content();
            self.image = Some(png);
            self.bump();
        }

        /// A change with nothing recognizable on the clipboard.
        pub fn place_nothing(&mut self) {
            self.reset_content();
            self.bump();
        }

        fn reset_content(&mut self) {
            self.files = None;
            self.string = None;
            self.rtf = None;
            self.html = None;
            self.image = None;
        }
    }

    impl ClipboardDevice for MockDevice {
        fn change_count(&mut self) -> u64 {
            self.counter
        }

        fn read_file_list(&mut self) -> Option<Vec<String>> {
            self.files.clone()
        }

        fn read_string(&mut self) -> Option<String> {
            self.string.clone()
        }

        fn read_rtf(&mut self) -> Option<String> {
            self.rtf.clone()
        }

        fn read_html(&mut self) -> Option<String> {
            self.html.clone()
        }

        fn read_image(&mut self) -> Option<Vec<u8>> {
            self.image.clone()
        }

        fn write_string(&mut self, text: &str) -> Result<()> {
            self.written.push(Written::Text(text.to_string()));
            self.bump();
            Ok(())
        }

        fn write_url(&mut self, url: &str) -> Result<()> {
            self.written.push(Written::Url(url.to_string()));
            self.bump();
            Ok(())
        }

        fn write_rtf(&mut self, rtf: &str) -> Result<()> {
            self.written.push(Written::Rtf(rtf.to_string()));
            self.bump();
            Ok(())
        }

        fn write_html(&mut self, html: &str) -> Result<()> {
            self.written.push(Written::Html(html.to_string()));
            self.bump();
            Ok(())
        }

        fn write_image(&mut self, png: &[u8]) -> Result<()> {
            self.written.push(Written::Image(png.to_vec()));
            self.bump();
            Ok(())
        }

        fn write_file_list(&mut self, paths: &[String]) -> Result<()> {
            self.written.push(Written::Files(paths.to_vec()));
            self.bump();
            Ok(())
        }

        fn clear(&mut self) -> Result<()> {
            self.reset_content();
            self.bump();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{MockDevice, Written};
    use super::*;

    fn tiny_png() -> Vec<u8> {
        // 1x1 white pixel, encoded on the fly so the bytes are valid PNG.
        let mut out = Vec::new();
        let img = image::RgbaImage::from_pixel(1, 1, image::Rgba([255, 255, 255, 255]));
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn test_normalize_string_classifies_and_trims() {
        let url = normalize_string("  https://example.com  ").unwrap();
        assert_eq!(url.kind, ClipKind::Url);
        assert_eq!(url.display_text, "https://example.com");
        let text = normalize_string("plain words").unwrap();
        assert_eq!(text.kind, ClipKind::Text);
        assert!(normalize_string("   \n ").is_none());
    }

    #[test]
    fn test_normalize_empty_inputs_yield_no_candidate() {
        assert!(normalize_file_list(Vec::new()).is_none());
        assert!(normalize_rtf(String::new()).is_none());
        assert!(normalize_html(String::new()).is_none());
        assert!(normalize_image(Vec::new()).is_none());
    }

    #[test]
    fn test_normalize_matches_probe_output() {
        let mut dev = MockDevice::new();
        dev.place_html("<b>bold</b>");
        let probed = read_candidate(&mut dev).unwrap();
        let direct = normalize_html("<b>bold</b>".to_string()).unwrap();
        assert_eq!(probed.kind, direct.kind);
        assert_eq!(probed.display_text, direct.display_text);
        assert_eq!(probed.raw_data, direct.raw_data);
        assert_eq!(probed.dedupe_key(), direct.dedupe_key());
    }

    #[test]
    fn test_digest_tag_separates_formats() {
        assert_ne!(digest_tagged("text:", b"a"), digest_tagged("rtf:", b"a"));
        assert_eq!(digest_tagged("image:", b"4x2"), digest_tagged("image:", b"4x2"));
        assert_ne!(digest_tagged("image:", b"4x2"), digest_tagged("image:", b"2x4"));
    }

    #[test]
    fn test_probe_prefers_file_list() {
        let mut dev = MockDevice::new();
        dev.place_files(vec!["/tmp/a".into()]);
        dev.string = Some("also text".into());
        let item = read_candidate(&mut dev).unwrap();
        assert_eq!(item.kind, ClipKind::Files);
        assert_eq!(item.file_paths, Some(vec!["/tmp/a".to_string()]));
        assert_eq!(item.display_text, "/tmp/a");
    }

    #[test]
    fn test_probe_multiple_files_display() {
        let mut dev = MockDevice::new();
        dev.place_files(vec!["/a".into(), "/b".into(), "/c".into()]);
        let item = read_candidate(&mut dev).unwrap();
        assert_eq!(item.display_text, "3 files");
    }

    #[test]
    fn test_probe_classifies_url() {
        let mut dev = MockDevice::new();
        dev.place_string("  https://example.com/page  ");
        let item = read_candidate(&mut dev).unwrap();
        assert_eq!(item.kind, ClipKind::Url);
        assert_eq!(item.display_text, "https://example.com/page");
    }

    #[test]
    fn test_probe_plain_text() {
        let mut dev = MockDevice::new();
        dev.place_string("just words");
        let item = read_candidate(&mut dev).unwrap();
        assert_eq!(item.kind, ClipKind::Text);
    }

    #[test]
    fn test_probe_whitespace_only_string_falls_through() {
        let mut dev = MockDevice::new();
        dev.place_string("   \n ");
        dev.html = Some("<b>bold</b>".into());
        let item = read_candidate(&mut dev).unwrap();
        assert_eq!(item.kind, ClipKind::Html);
        assert_eq!(item.display_text, "bold");
        assert_eq!(item.raw_data, Some(b"<b>bold</b>".to_vec()));
    }

    #[test]
    fn test_probe_rtf_before_html() {
        let mut dev = MockDevice::new();
        dev.place_rtf(r"{\rtf1 hi}");
        dev.html = Some("<p>hi</p>".into());
        let item = read_candidate(&mut dev).unwrap();
        assert_eq!(item.kind, ClipKind::Rtf);
    }

    #[test]
    fn test_probe_image_reports_dimensions() {
        let mut dev = MockDevice::new();
        dev.place_image(tiny_png());
        let item = read_candidate(&mut dev).unwrap();
        assert_eq!(item.kind, ClipKind::Image);
        assert_eq!(item.display_text, "1x1 image");
    }

    #[test]
    fn test_probe_nothing_recognized() {
        let mut dev = MockDevice::new();
        dev.place_nothing();
        assert!(read_candidate(&mut dev).is_none());
    }

    #[test]
    fn test_write_text_and_url() {
        let mut dev = MockDevice::new();
        let text = ClipboardItem::new(ClipKind::Text, "hello");
        let url = ClipboardItem::new(ClipKind::Url, "https://example.com");
        assert!(write_item(&mut dev, &text).unwrap());
        assert!(write_item(&mut dev, &url).unwrap());
        assert_eq!(
            dev.written,
            vec![
                Written::Text("hello".into()),
                Written::Url("https://example.com".into())
            ]
        );
    }

    #[test]
    fn test_write_image_skips_undecodable_payload() {
        let mut dev = MockDevice::new();
        let bad = ClipboardItem::new(ClipKind::Image, "image").with_raw_data(vec![1, 2, 3]);
        assert!(!write_item(&mut dev, &bad).unwrap());
        let good = ClipboardItem::new(ClipKind::Image, "image").with_raw_data(tiny_png());
        assert!(write_item(&mut dev, &good).unwrap());
        assert_eq!(dev.written.len(), 1);
    }

    #[test]
    fn test_write_skips_missing_payloads() {
        let mut dev = MockDevice::new();
        let rtf = ClipboardItem::new(ClipKind::Rtf, "rtf");
        let files = ClipboardItem::new(ClipKind::Files, "0 files").with_file_paths(Vec::new());
        assert!(!write_item(&mut dev, &rtf).unwrap());
        assert!(!write_item(&mut dev, &files).unwrap());
        assert!(dev.written.is_empty());
    }

    #[test]
    fn test_write_html_round_trip() {
        let mut dev = MockDevice::new();
        let html =
            ClipboardItem::new(ClipKind::Html, "hi").with_raw_data(b"<p>hi</p>".to_vec());
        assert!(write_item(&mut dev, &html).unwrap());
        assert_eq!(dev.written, vec![Written::Html("<p>hi</p>".into())]);
    }

    #[test]
    fn test_html_summary_strips_tags() {
        assert_eq!(html_summary("<div><b>a</b>  b</div>"), "a b");
        assert!(html_summary("<br/>").starts_with("HTML ("));
    }

    #[test]
    fn test_clear_empties_device_and_counts_as_change() {
        let mut dev = MockDevice::new();
        dev.place_string("something");
        let c = dev.change_count();
        dev.clear().unwrap();
        assert!(read_candidate(&mut dev).is_none());
        assert!(dev.change_count() > c);
    }

    #[test]
    fn test_mock_counter_stable_without_changes() {
        let mut dev = MockDevice::new();
        dev.place_string("x");
        let c = dev.change_count();
        assert_eq!(dev.change_count(), c);
        dev.place_string("y");
        assert!(dev.change_count() > c);
    }
}
