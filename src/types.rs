//! Wire data model for the knowledge base API.
//!
//! Everything loosely typed on the wire (int-or-array pages, stringified
//! source lists, the two listing shapes) is decoded into strict values here,
//! once, at the boundary. Downstream code never re-parses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Lifecycle of a document's extraction pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    #[default]
    Pending,
    Processing,
    Done,
    Error,
}

impl ProcessingStatus {
    /// Terminal statuses never change again; polling stops here.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Console glyph for listings and status lines
    pub fn glyph(&self) -> &'static str {
        match self {
            Self::Done => "✅ done",
            Self::Processing => "⏳ processing",
            Self::Pending => "🕒 pending",
            Self::Error => "❌ error",
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// A document row as the knowledge endpoints serialize it
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KnowledgeDocument {
    pub id: i64,

    /// URL of the stored upload, when one survives
    #[serde(default)]
    pub file: Option<String>,

    #[serde(default)]
    pub department: String,

    /// First-chunk preview maintained by the backend
    #[serde(default)]
    pub content: Option<String>,

    /// Chunk count; the wire field is literally named `chunk`
    #[serde(default)]
    pub chunk: Option<u32>,

    #[serde(default)]
    pub author: Option<i64>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Absent on older rows; absent means pending
    #[serde(default)]
    pub processing_status: ProcessingStatus,
}

impl KnowledgeDocument {
    /// Percent-decoded basename of the stored file, for display
    pub fn file_name(&self) -> Option<String> {
        let file = self.file.as_deref()?;
        let segment = file.rsplit('/').next().unwrap_or(file);
        let decoded = percent_encoding::percent_decode_str(segment)
            .decode_utf8()
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| segment.to_string());
        Some(decoded)
    }
}

/// Page reference of a chunk: a single page or a spread of pages.
///
/// The grouping key is the structural identity of the wire value, so page `2`
/// and spread `[2]` never co-group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageRef {
    Single(i64),
    Spread(Vec<i64>),
}

impl PageRef {
    /// Structural grouping key, identical to the wire value's JSON text
    pub fn key(&self) -> String {
        match self {
            PageRef::Single(page) => page.to_string(),
            PageRef::Spread(pages) => {
                let inner = pages
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                format!("[{}]", inner)
            }
        }
    }

    /// Human-readable page label for headers
    pub fn label(&self) -> String {
        match self {
            PageRef::Single(page) => page.to_string(),
            PageRef::Spread(pages) => pages
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// Media class of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Text,
    Image,
    Table,
}

/// Source paths of a chunk, decoded once from the three shapes the backend
/// emits: a JSON array, a plain path string, or a string whose text is itself
/// a serialized JSON array. A malformed inner array falls back to one raw path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SourceRef {
    Single(String),
    Multiple(Vec<String>),
}

impl SourceRef {
    fn from_raw(raw: String) -> Self {
        let trimmed = raw.trim_start();
        if trimmed.starts_with('[') {
            if let Ok(paths) = serde_json::from_str::<Vec<String>>(&raw) {
                return SourceRef::Multiple(paths);
            }
        }
        SourceRef::Single(raw)
    }

    /// All paths, in wire order
    pub fn paths(&self) -> Vec<&str> {
        match self {
            SourceRef::Single(path) => vec![path.as_str()],
            SourceRef::Multiple(paths) => paths.iter().map(|p| p.as_str()).collect(),
        }
    }

    /// First non-empty path, the image sub-group key
    pub fn first_path(&self) -> Option<&str> {
        self.paths().into_iter().find(|p| !p.is_empty())
    }

    /// Display form for source banners
    pub fn join(&self, sep: &str) -> String {
        self.paths().join(sep)
    }
}

impl<'de> Deserialize<'de> for SourceRef {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Many(Vec<String>),
            One(String),
        }

        Ok(match Wire::deserialize(deserializer)? {
            Wire::Many(paths) => SourceRef::Multiple(paths),
            Wire::One(raw) => SourceRef::from_raw(raw),
        })
    }
}

/// One extracted chunk of a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub chunk_index: i64,
    pub page_number: PageRef,
    pub media_type: MediaType,
    #[serde(default)]
    pub source: Option<SourceRef>,
    pub content: String,
}

impl Chunk {
    /// Image sub-group key: first source path, or a per-chunk fallback
    pub fn image_group_key(&self) -> String {
        self.source
            .as_ref()
            .and_then(|s| s.first_path())
            .map(|p| p.to_string())
            .unwrap_or_else(|| format!("unknown-{}", self.id))
    }
}

/// Reply of `GET {corpus}/{id}/chunks/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkListResponse {
    #[serde(default)]
    pub knowledge_id: Option<i64>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub chunks: Vec<Chunk>,
}

/// The paginator's listing shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// Either listing shape the two corpora emit
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ListPayload<T> {
    Paged(Paginated<T>),
    Plain { data: Vec<T>, count: u64 },
}

/// Normalized listing page
#[derive(Debug, Clone, Serialize)]
pub struct DocumentPage {
    pub documents: Vec<KnowledgeDocument>,
    pub count: u64,
    pub page: u32,
    pub total_pages: u32,
}

impl ListPayload<KnowledgeDocument> {
    /// Fold both wire shapes into one page model. The unpaginated shape is a
    /// single page regardless of the requested page number.
    pub fn into_page(self, page: u32, page_size: u32) -> DocumentPage {
        match self {
            ListPayload::Paged(paged) => {
                let size = u64::from(page_size.max(1));
                let total_pages = paged.count.div_ceil(size) as u32;
                DocumentPage {
                    documents: paged.results,
                    count: paged.count,
                    page,
                    total_pages,
                }
            }
            ListPayload::Plain { data, count } => DocumentPage {
                documents: data,
                count,
                page: 1,
                total_pages: 1,
            },
        }
    }
}

/// The backend's `{success, message, data}` reply wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<T>,
}

/// Model backing query answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    #[default]
    Cloud,
    Local,
}

impl FromStr for ModelType {
    type Err = Error;

    fn from_str(value: &str) -> std::result::Result<Self, Error> {
        match value.to_lowercase().as_str() {
            "cloud" => Ok(Self::Cloud),
            "local" => Ok(Self::Local),
            other => Err(Error::Validation(format!(
                "Unknown model type '{}'; expected 'cloud' or 'local'",
                other
            ))),
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cloud => write!(f, "cloud"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// Body of `POST {base}/query_enterprise/` and `{base}/query_user/`
#[derive(Debug, Clone, Serialize)]
pub struct QueryRequest {
    pub query: String,
    pub model_type: ModelType,
    pub use_retrieval: bool,
}

/// Query reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub query: Option<String>,
    pub answer: String,
    #[serde(default)]
    pub retrieved_docs: Vec<RetrievedDoc>,
}

/// One retrieved passage backing an answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedDoc {
    #[serde(default, alias = "filename")]
    pub title: String,
    #[serde(default)]
    pub page_number: PageLabel,
    pub content: String,
}

/// Page of a retrieved passage: a number, or the backend's placeholder label
/// when the page is unknown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageLabel {
    Number(i64),
    Label(String),
}

impl Default for PageLabel {
    fn default() -> Self {
        PageLabel::Number(1)
    }
}

impl PageLabel {
    /// Numeric page for deep links; labels have none
    pub fn page(&self) -> Option<i64> {
        match self {
            PageLabel::Number(page) => Some(*page),
            PageLabel::Label(_) => None,
        }
    }
}

impl fmt::Display for PageLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageLabel::Number(page) => write!(f, "{}", page),
            PageLabel::Label(label) => write!(f, "{}", label),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_ref_decodes_int_and_array() {
        let single: PageRef = serde_json::from_str("2").unwrap();
        assert_eq!(single, PageRef::Single(2));

        let spread: PageRef = serde_json::from_str("[2,3]").unwrap();
        assert_eq!(spread, PageRef::Spread(vec![2, 3]));
    }

    #[test]
    fn test_page_ref_key_is_structural() {
        assert_eq!(PageRef::Single(2).key(), "2");
        assert_eq!(PageRef::Spread(vec![2]).key(), "[2]");
        assert_ne!(PageRef::Single(2).key(), PageRef::Spread(vec![2]).key());
        assert_eq!(PageRef::Spread(vec![2, 3]).key(), "[2,3]");
    }

    #[test]
    fn test_page_ref_label_joins_spreads() {
        assert_eq!(PageRef::Spread(vec![2, 3]).label(), "2, 3");
        assert_eq!(PageRef::Single(7).label(), "7");
    }

    #[test]
    fn test_source_ref_decodes_array() {
        let source: SourceRef = serde_json::from_str(r#"["a.png","b.png"]"#).unwrap();
        assert_eq!(
            source,
            SourceRef::Multiple(vec!["a.png".to_string(), "b.png".to_string()])
        );
    }

    #[test]
    fn test_source_ref_decodes_plain_string() {
        let source: SourceRef = serde_json::from_str(r#""images/p1.png""#).unwrap();
        assert_eq!(source, SourceRef::Single("images/p1.png".to_string()));
    }

    #[test]
    fn test_source_ref_decodes_stringified_array() {
        let source: SourceRef = serde_json::from_str(r#""[\"a.png\",\"b.png\"]""#).unwrap();
        assert_eq!(
            source,
            SourceRef::Multiple(vec!["a.png".to_string(), "b.png".to_string()])
        );
    }

    #[test]
    fn test_source_ref_malformed_inner_array_is_single_path() {
        let source: SourceRef = serde_json::from_str(r#""[not json""#).unwrap();
        assert_eq!(source, SourceRef::Single("[not json".to_string()));
    }

    #[test]
    fn test_document_defaults_status_to_pending() {
        let doc: KnowledgeDocument = serde_json::from_value(serde_json::json!({
            "id": 3,
            "file": "http://h/media/knowledge_files/r%C3%A9sum%C3%A9.pdf",
            "department": "IT 部門",
            "created_at": "2025-04-23T10:00:00Z",
            "updated_at": "2025-04-23T10:05:00Z"
        }))
        .unwrap();

        assert_eq!(doc.processing_status, ProcessingStatus::Pending);
        assert_eq!(doc.file_name().as_deref(), Some("résumé.pdf"));
        assert_eq!(doc.chunk, None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(ProcessingStatus::Done.is_terminal());
        assert!(ProcessingStatus::Error.is_terminal());
        assert!(!ProcessingStatus::Processing.is_terminal());
        assert!(!ProcessingStatus::Pending.is_terminal());
    }

    #[test]
    fn test_list_payload_paged_shape() {
        let payload: ListPayload<KnowledgeDocument> = serde_json::from_value(serde_json::json!({
            "count": 12,
            "next": "http://h/api/knowledge/?page=2",
            "previous": null,
            "results": []
        }))
        .unwrap();

        let page = payload.into_page(1, 5);
        assert_eq!(page.count, 12);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.page, 1);
    }

    #[test]
    fn test_list_payload_plain_shape() {
        let payload: ListPayload<KnowledgeDocument> = serde_json::from_value(serde_json::json!({
            "data": [],
            "count": 0
        }))
        .unwrap();

        let page = payload.into_page(4, 5);
        assert_eq!(page.page, 1);
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn test_retrieved_doc_accepts_string_page() {
        let doc: RetrievedDoc = serde_json::from_value(serde_json::json!({
            "title": "handbook.pdf",
            "page_number": "未知頁碼",
            "content": "..."
        }))
        .unwrap();

        assert_eq!(doc.page_number, PageLabel::Label("未知頁碼".to_string()));
        assert_eq!(doc.page_number.page(), None);
        assert_eq!(doc.page_number.to_string(), "未知頁碼");
    }

    #[test]
    fn test_image_group_key_fallback() {
        let chunk = Chunk {
            id: "c9".to_string(),
            chunk_index: 4,
            page_number: PageRef::Single(1),
            media_type: MediaType::Image,
            source: Some(SourceRef::Multiple(vec!["".to_string()])),
            content: "img".to_string(),
        };
        assert_eq!(chunk.image_group_key(), "unknown-c9");

        let chunk = Chunk {
            source: Some(SourceRef::Single("images/p1.png".to_string())),
            ..chunk
        };
        assert_eq!(chunk.image_group_key(), "images/p1.png");
    }
}
