//! HTTP client for the knowledge base backend.
//!
//! One client serves both corpora: [`Corpus::Enterprise`] maps to the
//! `knowledge/` + `query_enterprise/` endpoint family, [`Corpus::General`]
//! to `document/` + `query_user/`. Requests carry no timeout and are never
//! retried; callers submit exactly once and wait.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::{
    ChunkListResponse, DocumentPage, Envelope, KnowledgeDocument, ListPayload, QueryRequest,
    QueryResponse,
};
use regex::Regex;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;
use url::Url;

/// Which document corpus an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Corpus {
    #[default]
    Enterprise,
    General,
}

impl Corpus {
    /// Path prefix of the document endpoints, with trailing slash
    pub fn documents_path(&self) -> &'static str {
        match self {
            Corpus::Enterprise => "knowledge/",
            Corpus::General => "document/",
        }
    }

    /// Path of the query endpoint
    pub fn query_path(&self) -> &'static str {
        match self {
            Corpus::Enterprise => "query_enterprise/",
            Corpus::General => "query_user/",
        }
    }
}

impl FromStr for Corpus {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "enterprise" => Ok(Self::Enterprise),
            "general" => Ok(Self::General),
            other => Err(Error::Validation(format!(
                "Unknown corpus '{}'; expected 'enterprise' or 'general'",
                other
            ))),
        }
    }
}

impl fmt::Display for Corpus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Corpus::Enterprise => write!(f, "enterprise"),
            Corpus::General => write!(f, "general"),
        }
    }
}

/// Listing filters forwarded to the backend
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub page: u32,
    /// Substring match on the stored file name
    pub title: Option<String>,
    /// Substring match on department (enterprise corpus only)
    pub department: Option<String>,
}

impl ListQuery {
    pub fn page(page: u32) -> Self {
        Self {
            page,
            ..Self::default()
        }
    }
}

/// Multipart upload form
#[derive(Debug, Clone)]
pub struct UploadForm {
    pub file_path: PathBuf,
    pub department: Option<String>,
    pub author: Option<i64>,
    pub content: Option<String>,
}

/// Outcome of an accepted upload
#[derive(Debug, Clone, Serialize)]
pub struct UploadReceipt {
    pub id: i64,
    pub message: String,
    pub document: Option<KnowledgeDocument>,
}

/// Keys the backend variously uses for error messages
#[derive(Debug, Clone, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

impl ApiErrorBody {
    fn message(&self) -> Option<&str> {
        self.error
            .as_deref()
            .or(self.message.as_deref())
            .or(self.detail.as_deref())
    }
}

/// The two reply shapes uploads come back in: the enterprise envelope, or the
/// general corpus's bare serialized document
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UploadReply {
    Wrapped(Envelope<KnowledgeDocument>),
    Plain(KnowledgeDocument),
}

pub struct ApiClient {
    client: Client,
    base_url: Url,
    media_url: Url,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base_url: config.api_url()?,
            media_url: config.media_url()?,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("Invalid API endpoint URL: {}", e)))
    }

    /// Decode a 2xx reply; extract the backend's error message otherwise
    async fn decode<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let (status, message) = read_error(response).await;
            Err(Error::Api { status, message })
        }
    }

    /// Fetch one listing page, normalizing both corpus list shapes
    pub async fn list_documents(
        &self,
        corpus: Corpus,
        query: &ListQuery,
        page_size: u32,
    ) -> Result<DocumentPage> {
        let url = self.endpoint(corpus.documents_path())?;
        let page = query.page.max(1);

        let mut params: Vec<(&str, String)> = vec![("page", page.to_string())];
        if let Some(title) = &query.title {
            let key = match corpus {
                Corpus::Enterprise => "title",
                Corpus::General => "filename",
            };
            params.push((key, title.clone()));
        }
        if corpus == Corpus::Enterprise {
            if let Some(department) = &query.department {
                params.push(("department", department.clone()));
            }
        }

        debug!("Listing {} documents, page {}", corpus, page);
        let response = self.client.get(url).query(&params).send().await?;
        let payload: ListPayload<KnowledgeDocument> = self.decode(response).await?;
        Ok(payload.into_page(page, page_size))
    }

    /// Fetch one document's detail, including its processing status
    pub async fn get_document(&self, corpus: Corpus, id: i64) -> Result<KnowledgeDocument> {
        let url = self.endpoint(&format!("{}{}/", corpus.documents_path(), id))?;
        let response = self.client.get(url).send().await?;

        if response.status().as_u16() == 404 {
            return Err(Error::DocumentNotFound(id.to_string()));
        }
        self.decode(response).await
    }

    /// Upload a document as multipart form data
    pub async fn upload_document(&self, corpus: Corpus, form: &UploadForm) -> Result<UploadReceipt> {
        let url = self.endpoint(corpus.documents_path())?;

        let bytes = tokio::fs::read(&form.file_path).await?;
        let file_name = form
            .file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let mime = mime_guess::from_path(&form.file_path)
            .first_or_octet_stream()
            .to_string();
        let part = Part::bytes(bytes).file_name(file_name).mime_str(&mime)?;

        let mut multipart = Form::new().part("file", part);
        if let Some(department) = &form.department {
            multipart = multipart.text("department", department.clone());
        }
        if let Some(author) = form.author {
            multipart = multipart.text("author", author.to_string());
        }
        if let Some(content) = &form.content {
            multipart = multipart.text("content", content.clone());
        }

        debug!("Uploading {:?} to {} corpus", form.file_path, corpus);
        let response = self.client.post(url).multipart(multipart).send().await?;
        let reply: UploadReply = self.decode(response).await?;

        match reply {
            UploadReply::Wrapped(envelope) => {
                if !envelope.success {
                    return Err(Error::Other(format!("Upload failed: {}", envelope.message)));
                }
                let document = envelope
                    .data
                    .ok_or_else(|| Error::Other("Upload reply carried no document".to_string()))?;
                Ok(UploadReceipt {
                    id: document.id,
                    message: envelope.message,
                    document: Some(document),
                })
            }
            UploadReply::Plain(document) => Ok(UploadReceipt {
                id: document.id,
                message: "uploaded".to_string(),
                document: Some(document),
            }),
        }
    }

    /// Delete a document. Both the enterprise envelope reply and the general
    /// corpus's empty 204 count as success.
    pub async fn delete_document(&self, corpus: Corpus, id: i64) -> Result<String> {
        let url = self.endpoint(&format!("{}{}/", corpus.documents_path(), id))?;
        let response = self.client.delete(url).send().await?;

        if !response.status().is_success() {
            let (status, message) = read_error(response).await;
            return Err(Error::Api { status, message });
        }

        let body = response.text().await?;
        let message = serde_json::from_str::<Envelope<serde_json::Value>>(&body)
            .map(|e| e.message)
            .unwrap_or_default();
        Ok(if message.is_empty() {
            "deleted".to_string()
        } else {
            message
        })
    }

    /// Fetch a document's chunk list
    pub async fn list_chunks(&self, corpus: Corpus, id: i64) -> Result<ChunkListResponse> {
        let url = self.endpoint(&format!("{}{}/chunks/", corpus.documents_path(), id))?;
        let response = self.client.get(url).send().await?;

        if response.status().as_u16() == 404 {
            return Err(Error::DocumentNotFound(id.to_string()));
        }
        self.decode(response).await
    }

    /// Replace one chunk's content
    pub async fn update_chunk(&self, corpus: Corpus, chunk_id: &str, content: &str) -> Result<String> {
        let url = self.endpoint(&format!("{}chunk/{}/", corpus.documents_path(), chunk_id))?;
        let body = serde_json::json!({ "content": content });

        let response = self.client.put(url).json(&body).send().await?;
        let envelope: Envelope<serde_json::Value> = self.decode(response).await?;
        if !envelope.success {
            return Err(Error::Other(format!("Update failed: {}", envelope.message)));
        }
        Ok(envelope.message)
    }

    /// Delete one chunk. The contract is exactly HTTP 204; anything else,
    /// 200 included, is a failure.
    pub async fn delete_chunk(&self, corpus: Corpus, chunk_id: &str) -> Result<()> {
        let url = self.endpoint(&format!("{}chunk/{}/", corpus.documents_path(), chunk_id))?;
        let response = self.client.delete(url).send().await?;

        let status = response.status().as_u16();
        if status != 204 {
            let (status, message) = read_error(response).await;
            return Err(Error::Api { status, message });
        }
        Ok(())
    }

    /// Submit a query against the corpus's query endpoint
    pub async fn query(&self, corpus: Corpus, request: &QueryRequest) -> Result<QueryResponse> {
        let url = self.endpoint(corpus.query_path())?;
        debug!("Querying {} corpus ({} model)", corpus, request.model_type);
        let response = self.client.post(url).json(request).send().await?;
        self.decode(response).await
    }

    /// Deep link to a source PDF page under the media root
    pub fn document_pdf_url(&self, title: &str, page: Option<i64>) -> Result<Url> {
        let mut url = self.media_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config("media URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(["media", "knowledge_files", title]);
        if let Some(page) = page {
            url.set_fragment(Some(&format!("page={}", page)));
        }
        Ok(url)
    }

    /// Media URL of an extracted page asset. Enterprise sources are relative
    /// to the media root; general sources live under the document's
    /// extract_data directory keyed by cleaned title.
    pub fn asset_url(&self, corpus: Corpus, title: &str, src: &str) -> Result<Url> {
        match corpus {
            Corpus::Enterprise => Ok(self.media_url.join(src)?),
            Corpus::General => {
                let clean = clean_title(title);
                let mut url = self.media_url.clone();
                {
                    let mut segments = url.path_segments_mut().map_err(|_| {
                        Error::Config("media URL cannot carry a path".to_string())
                    })?;
                    segments.pop_if_empty();
                    segments.extend(["media", "extract_data", clean.as_str()]);
                    segments.extend(src.split('/'));
                }
                Ok(url)
            }
        }
    }

    /// Download a source PDF
    pub async fn fetch_pdf(&self, title: &str) -> Result<Vec<u8>> {
        let url = self.document_pdf_url(title, None)?;
        debug!("Fetching PDF {}", url);
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let (status, message) = read_error(response).await;
            return Err(Error::Api { status, message });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Strip a trailing .pdf/.PDF suffix from a stored title
pub fn clean_title(title: &str) -> String {
    let re = Regex::new(r"(?i)\.pdf$").unwrap();
    re.replace(title, "").into_owned()
}

async fn read_error(response: reqwest::Response) -> (u16, String) {
    let status = response.status();
    let fallback = status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string();
    let message = match response.text().await {
        Ok(body) if !body.is_empty() => serde_json::from_str::<ApiErrorBody>(&body)
            .ok()
            .and_then(|b| b.message().map(|m| m.to_string()))
            .unwrap_or(fallback),
        _ => fallback,
    };
    (status.as_u16(), message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModelType;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> ApiClient {
        let mut config = Config::default();
        config.api_base_url = format!("{}/api", server.uri());
        config.media_base_url = server.uri();
        ApiClient::new(&config).unwrap()
    }

    fn doc_json(id: i64) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "file": format!("http://files/report-{}.pdf", id),
            "department": "IT 部門",
            "content": "first paragraph",
            "chunk": 7,
            "author": 1,
            "created_at": "2025-04-23T10:00:00Z",
            "updated_at": "2025-04-23T10:05:00Z",
            "processing_status": "done"
        })
    }

    #[tokio::test]
    async fn test_list_documents_paginated_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/knowledge/"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "count": 12,
                "next": null,
                "previous": "http://h/api/knowledge/?page=1",
                "results": [doc_json(6), doc_json(7)]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let page = client
            .list_documents(Corpus::Enterprise, &ListQuery::page(2), 5)
            .await
            .unwrap();

        assert_eq!(page.count, 12);
        assert_eq!(page.page, 2);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.documents.len(), 2);
        assert_eq!(page.documents[0].id, 6);
    }

    #[tokio::test]
    async fn test_list_documents_plain_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/document/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [doc_json(1)],
                "count": 1
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let page = client
            .list_documents(Corpus::General, &ListQuery::page(3), 5)
            .await
            .unwrap();

        assert_eq!(page.count, 1);
        assert_eq!(page.page, 1);
        assert_eq!(page.total_pages, 1);
    }

    #[tokio::test]
    async fn test_upload_reads_envelope_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/knowledge/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "message": "文件上傳成功",
                "data": doc_json(42)
            })))
            .mount(&server)
            .await;

        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"%PDF-1.4 fake").unwrap();

        let client = client_for(&server).await;
        let receipt = client
            .upload_document(
                Corpus::Enterprise,
                &UploadForm {
                    file_path: tmp.path().to_path_buf(),
                    department: Some("IT 部門".to_string()),
                    author: Some(1),
                    content: Some(String::new()),
                },
            )
            .await
            .unwrap();

        assert_eq!(receipt.id, 42);
        assert_eq!(receipt.message, "文件上傳成功");
    }

    #[tokio::test]
    async fn test_upload_error_message_is_extracted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/knowledge/"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "success": false,
                "message": "請上傳文件",
                "data": null
            })))
            .mount(&server)
            .await;

        let tmp = tempfile::NamedTempFile::new().unwrap();
        let client = client_for(&server).await;
        let err = client
            .upload_document(
                Corpus::Enterprise,
                &UploadForm {
                    file_path: tmp.path().to_path_buf(),
                    department: Some("IT 部門".to_string()),
                    author: None,
                    content: None,
                },
            )
            .await
            .unwrap_err();

        match err {
            Error::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "請上傳文件");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_chunk_requires_exactly_204() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/knowledge/chunk/ok-chunk/"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/knowledge/chunk/bad-chunk/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "message": "刪除失敗",
                "data": null
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert!(client
            .delete_chunk(Corpus::Enterprise, "ok-chunk")
            .await
            .is_ok());

        // A 200 reply is a failure under the 204 contract
        let err = client
            .delete_chunk(Corpus::Enterprise, "bad-chunk")
            .await
            .unwrap_err();
        match err {
            Error::Api { status, message } => {
                assert_eq!(status, 200);
                assert_eq!(message, "刪除失敗");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_query_error_extraction() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/query_user/"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": "Gemma3 查詢錯誤: model offline"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client
            .query(
                Corpus::General,
                &QueryRequest {
                    query: "anything".to_string(),
                    model_type: ModelType::Local,
                    use_retrieval: true,
                },
            )
            .await
            .unwrap_err();

        match err {
            Error::Api { status, message } => {
                assert_eq!(status, 500);
                assert!(message.contains("model offline"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_query_decodes_retrieved_docs() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/query_enterprise/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "query": "policy?",
                "answer": "See the handbook.",
                "retrieved_docs": [
                    { "title": "handbook.pdf", "page_number": 3, "content": "..." },
                    { "title": "misc.pdf", "page_number": "未知頁碼", "content": "..." }
                ]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let reply = client
            .query(
                Corpus::Enterprise,
                &QueryRequest {
                    query: "policy?".to_string(),
                    model_type: ModelType::Cloud,
                    use_retrieval: true,
                },
            )
            .await
            .unwrap();

        assert_eq!(reply.retrieved_docs.len(), 2);
        assert_eq!(reply.retrieved_docs[0].page_number.page(), Some(3));
        assert_eq!(reply.retrieved_docs[1].page_number.page(), None);
    }

    #[test]
    fn test_clean_title_strips_pdf_suffix() {
        assert_eq!(clean_title("report.pdf"), "report");
        assert_eq!(clean_title("REPORT.PDF"), "REPORT");
        assert_eq!(clean_title("notes.txt"), "notes.txt");
        assert_eq!(clean_title("archive.pdf.pdf"), "archive.pdf");
    }

    #[tokio::test]
    async fn test_media_urls() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;

        let pdf = client.document_pdf_url("年度 報告.pdf", Some(4)).unwrap();
        assert!(pdf
            .as_str()
            .starts_with(&format!("{}/media/knowledge_files/", server.uri())));
        assert!(pdf.as_str().ends_with("#page=4"));

        let enterprise = client
            .asset_url(Corpus::Enterprise, "whatever", "extract/tables/t1.png")
            .unwrap();
        assert_eq!(
            enterprise.as_str(),
            format!("{}/extract/tables/t1.png", server.uri())
        );

        let general = client
            .asset_url(Corpus::General, "report.pdf", "images/p1.png")
            .unwrap();
        assert_eq!(
            general.as_str(),
            format!("{}/media/extract_data/report/images/p1.png", server.uri())
        );
    }
}
