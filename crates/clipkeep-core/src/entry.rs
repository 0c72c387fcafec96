//! History entries and the closed set of clipboard payloads they carry.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use time::OffsetDateTime;

/// Upper bound on preview length, in characters.
pub const PREVIEW_MAX_CHARS: usize = 120;

/// Identifier handed out by the store. Monotonic and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(EntryId)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Image,
    FileList,
    Html,
    Other,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Image => "image",
            ContentType::FileList => "filelist",
            ContentType::Html => "html",
            ContentType::Other => "other",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ContentType::Text),
            "image" => Ok(ContentType::Image),
            "filelist" => Ok(ContentType::FileList),
            "html" => Ok(ContentType::Html),
            "other" => Ok(ContentType::Other),
            other => Err(format!("unknown content type `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageRgba {
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

/// Raw captured payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Content {
    Text(String),
    Image(ImageRgba),
    FileList(Vec<PathBuf>),
    Html {
        html: String,
        alt_text: Option<String>,
    },
    Other {
        mime: String,
        bytes: Vec<u8>,
    },
}

impl Content {
    pub fn text<S: Into<String>>(s: S) -> Self {
        Content::Text(s.into())
    }

    pub fn content_type(&self) -> ContentType {
        match self {
            Content::Text(_) => ContentType::Text,
            Content::Image(_) => ContentType::Image,
            Content::FileList(_) => ContentType::FileList,
            Content::Html { .. } => ContentType::Html,
            Content::Other { .. } => ContentType::Other,
        }
    }

    /// Content address over `(type, payload)`. Every field is length-prefixed,
    /// so two variants never hash the same bytes the same way.
    pub fn hash(&self) -> ContentHash {
        let mut hasher = Sha256::new();
        let mut field = |bytes: &[u8]| {
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        };
        field(self.content_type().as_str().as_bytes());
        match self {
            Content::Text(s) => field(s.as_bytes()),
            Content::Image(img) => {
                field(&img.width.to_le_bytes()[..]);
                field(&img.height.to_le_bytes()[..]);
                field(img.bytes.as_slice());
            }
            Content::FileList(paths) => {
                for p in paths {
                    field(p.to_string_lossy().as_bytes());
                }
            }
            Content::Html { html, alt_text } => {
                field(html.as_bytes());
                field(alt_text.as_deref().unwrap_or_default().as_bytes());
            }
            Content::Other { mime, bytes } => {
                field(mime.as_bytes());
                field(bytes.as_slice());
            }
        }
        ContentHash(hasher.finalize().into())
    }

    /// Text that search matches against; binary payloads have none.
    pub fn searchable_text(&self) -> Option<String> {
        match self {
            Content::Text(s) => Some(s.clone()),
            Content::Html { html, alt_text } => Some(match alt_text {
                Some(alt) => format!("{html}\n{alt}"),
                None => html.clone(),
            }),
            Content::FileList(paths) => Some(join_paths(paths)),
            Content::Image(_) | Content::Other { .. } => None,
        }
    }

    pub fn byte_len(&self) -> usize {
        match self {
            Content::Text(s) => s.len(),
            Content::Image(img) => img.bytes.len(),
            Content::FileList(paths) => paths.iter().map(|p| p.as_os_str().len()).sum(),
            Content::Html { html, .. } => html.len(),
            Content::Other { bytes, .. } => bytes.len(),
        }
    }

    /// Bounded, display-safe rendering.
    pub fn preview(&self) -> String {
        match self {
            Content::Text(s) => truncate(&collapse_whitespace(s)),
            Content::Html { html, alt_text } => match alt_text.as_deref() {
                Some(alt) if !alt.trim().is_empty() => truncate(&collapse_whitespace(alt)),
                _ => truncate(&collapse_whitespace(&strip_tags(html))),
            },
            Content::FileList(paths) => match paths.split_first() {
                None => "[no files]".to_string(),
                Some((first, [])) => truncate(&collapse_whitespace(&first.to_string_lossy())),
                Some((first, rest)) => {
                    let more = format!(" (+{} more)", rest.len());
                    let head = collapse_whitespace(&first.to_string_lossy());
                    let budget = PREVIEW_MAX_CHARS.saturating_sub(more.chars().count());
                    format!("{}{more}", truncate_to(&head, budget))
                }
            },
            Content::Image(img) => format!("[image {}x{}]", img.width, img.height),
            Content::Other { mime, bytes } => {
                truncate(&format!("[{}, {} bytes]", collapse_whitespace(mime), bytes.len()))
            }
        }
    }
}

pub(crate) fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len().min(PREVIEW_MAX_CHARS * 4));
    let mut pending_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() || ch.is_control() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(ch);
    }
    out
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

fn truncate(s: &str) -> String {
    truncate_to(s, PREVIEW_MAX_CHARS)
}

fn truncate_to(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// SHA-256 content fingerprint.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..12])
    }
}

impl From<ContentHash> for String {
    fn from(h: ContentHash) -> Self {
        h.to_hex()
    }
}

impl TryFrom<String> for ContentHash {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let bytes = hex::decode(&s).map_err(|e| e.to_string())?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| format!("content hash must be 32 bytes: {s}"))?;
        Ok(ContentHash(arr))
    }
}

/// Content read from the clipboard, fingerprinted but not yet stored.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub content: Content,
    pub hash: ContentHash,
}

impl Candidate {
    pub fn new(content: Content) -> Self {
        let hash = content.hash();
        Self { content, hash }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClipboardEntry {
    pub id: EntryId,
    pub content_type: ContentType,
    pub content: Content,
    pub hash: ContentHash,
    /// Seconds since the Unix epoch of capture or last re-capture.
    pub timestamp: i64,
    pub preview: String,
}

impl ClipboardEntry {
    pub fn new(id: EntryId, candidate: Candidate, timestamp: i64) -> Self {
        let preview = candidate.content.preview();
        Self {
            id,
            content_type: candidate.content.content_type(),
            content: candidate.content,
            hash: candidate.hash,
            timestamp,
            preview,
        }
    }

    /// Age in seconds relative to `now`; negative for future timestamps.
    pub fn age_at(&self, now: i64) -> i64 {
        now - self.timestamp
    }
}

pub fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_distinguishes_types_with_same_bytes() {
        let text = Content::text("a.txt");
        let files = Content::FileList(vec![PathBuf::from("a.txt")]);
        assert_ne!(text.hash(), files.hash());
        assert_eq!(text.hash(), Content::text("a.txt").hash());
    }

    #[test]
    fn html_alt_text_is_part_of_the_hash() {
        let a = Content::Html {
            html: "<b>x</b>".into(),
            alt_text: None,
        };
        let b = Content::Html {
            html: "<b>x</b>".into(),
            alt_text: Some("x".into()),
        };
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn preview_collapses_and_truncates() {
        let p = Content::text("  line one\n\tline two  ").preview();
        assert_eq!(p, "line one line two");

        let long = "x".repeat(500);
        let p = Content::text(long).preview();
        assert_eq!(p.chars().count(), PREVIEW_MAX_CHARS);
        assert!(p.ends_with('…'));
    }

    #[test]
    fn preview_for_binary_and_lists() {
        let img = Content::Image(ImageRgba {
            width: 3,
            height: 2,
            bytes: vec![0; 24],
        });
        assert_eq!(img.preview(), "[image 3x2]");

        let files = Content::FileList(vec!["/tmp/a".into(), "/tmp/b".into(), "/tmp/c".into()]);
        assert_eq!(files.preview(), "/tmp/a (+2 more)");

        let html = Content::Html {
            html: "<p>Hello <i>there</i></p>".into(),
            alt_text: None,
        };
        assert_eq!(html.preview(), "Hello there");

        let other = Content::Other {
            mime: "application/x-thing".into(),
            bytes: vec![1, 2, 3],
        };
        assert_eq!(other.preview(), "[application/x-thing, 3 bytes]");
    }

    #[test]
    fn hash_hex_roundtrips_through_string() {
        let h = Content::text("hello").hash();
        let s: String = h.into();
        assert_eq!(s.len(), 64);
        assert_eq!(ContentHash::try_from(s).unwrap(), h);
    }
}
