//! Knowledge document commands: list, show, upload, delete, watch

use crate::client::{ApiClient, Corpus, ListQuery, UploadForm};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::poll::{wait_for_processing, PollOutcome};
use crate::progress;
use crate::types::{DocumentPage, KnowledgeDocument, ProcessingStatus};
use chrono::{DateTime, Local, Utc};
use indicatif::ProgressStyle;
use serde::Serialize;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use unicode_segmentation::UnicodeSegmentation;

/// Listing options
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub corpus: Corpus,
    pub page: u32,
    /// Substring filter on stored file names
    pub title: Option<String>,
    /// Substring filter on department (enterprise corpus)
    pub department: Option<String>,
}

/// One document row prepared for display
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRow {
    pub id: i64,
    pub file_name: String,
    pub department: String,
    pub preview: String,
    pub chunks: Option<u32>,
    pub author: Option<i64>,
    pub status: ProcessingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One listing page prepared for display
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeList {
    pub corpus: Corpus,
    pub page: u32,
    pub total_pages: u32,
    pub count: u64,
    pub documents: Vec<DocumentRow>,
}

/// Fetch and prepare one listing page
pub async fn cmd_list(
    config: &Config,
    client: &ApiClient,
    options: &ListOptions,
) -> Result<KnowledgeList> {
    info!(
        "Listing {} documents, page {}",
        options.corpus,
        options.page.max(1)
    );

    let query = ListQuery {
        page: options.page,
        title: options.title.clone(),
        department: options.department.clone(),
    };
    let page = client
        .list_documents(options.corpus, &query, config.console.page_size)
        .await?;

    Ok(build_list(
        options.corpus,
        page,
        config.console.list_preview_chars,
    ))
}

/// Fetch one document's detail
pub async fn cmd_show(
    client: &ApiClient,
    corpus: Corpus,
    id: i64,
) -> Result<KnowledgeDocument> {
    info!("Fetching {} document {}", corpus, id);
    client.get_document(corpus, id).await
}

/// Upload options
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub corpus: Corpus,
    pub file: PathBuf,
    pub department: Option<String>,
    pub author: Option<i64>,
    pub content: Option<String>,
    /// Poll processing status until terminal after the upload
    pub wait: bool,
}

/// Outcome of an upload, including the final status when waited for
#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub id: i64,
    pub message: String,
    pub status: Option<ProcessingStatus>,
    pub listing: Option<KnowledgeList>,
}

/// Upload a document, optionally waiting out its processing
pub async fn cmd_upload(
    config: &Config,
    client: &ApiClient,
    options: &UploadOptions,
) -> Result<UploadOutcome> {
    // Validation failures must not issue any network request
    validate_upload(config, options)?;

    let form = match options.corpus {
        Corpus::Enterprise => UploadForm {
            file_path: options.file.clone(),
            department: options.department.clone(),
            author: Some(options.author.unwrap_or(config.console.default_author)),
            content: Some(options.content.clone().unwrap_or_default()),
        },
        // The general corpus takes file + author only
        Corpus::General => UploadForm {
            file_path: options.file.clone(),
            department: None,
            author: Some(options.author.unwrap_or(config.console.default_author)),
            content: None,
        },
    };

    let receipt = client.upload_document(options.corpus, &form).await?;
    info!("Uploaded document {}: {}", receipt.id, receipt.message);

    let mut status = None;
    if options.wait {
        status = watch_processing(config, client, options.corpus, receipt.id).await;
    }

    // The console refreshes its listing once the upload settles
    let listing = if options.wait {
        let first_page = ListOptions {
            corpus: options.corpus,
            page: 1,
            ..Default::default()
        };
        match cmd_list(config, client, &first_page).await {
            Ok(list) => Some(list),
            Err(e) => {
                warn!("Could not refresh listing: {}", e);
                None
            }
        }
    } else {
        None
    };

    Ok(UploadOutcome {
        id: receipt.id,
        message: receipt.message,
        status,
        listing,
    })
}

async fn watch_processing(
    config: &Config,
    client: &ApiClient,
    corpus: Corpus,
    id: i64,
) -> Option<ProcessingStatus> {
    let spinner = progress::add_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message("Waiting for processing...");

    let outcome = wait_for_processing(client, corpus, id, config.poll_interval(), |status| {
        spinner.set_message(format!("Processing: {}", status));
    })
    .await;

    match outcome {
        Ok(PollOutcome::Finished(document)) => {
            spinner.finish_with_message(document.processing_status.glyph().to_string());
            Some(document.processing_status)
        }
        Ok(PollOutcome::Interrupted) => {
            spinner.finish_with_message("interrupted; processing continues server-side");
            None
        }
        Err(e) => {
            // A failed status fetch ends the wait but not the upload
            spinner.finish_with_message("status fetch failed");
            warn!("Status polling stopped: {}", e);
            None
        }
    }
}

fn validate_upload(config: &Config, options: &UploadOptions) -> Result<()> {
    if !options.file.exists() {
        return Err(Error::Validation(format!(
            "File not found: {}",
            options.file.display()
        )));
    }

    match options.corpus {
        Corpus::Enterprise => {
            let department = options.department.as_deref().unwrap_or("").trim().to_string();
            if department.is_empty() {
                return Err(Error::Validation(
                    "Upload requires a department (--department)".to_string(),
                ));
            }
            let allowed = &config.console.departments;
            if !allowed.is_empty() && !allowed.iter().any(|d| d == &department) {
                return Err(Error::Validation(format!(
                    "Unknown department '{}'; configured departments: {}",
                    department,
                    allowed.join(", ")
                )));
            }
        }
        Corpus::General => {
            let is_pdf = options
                .file
                .extension()
                .map(|e| e.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false);
            if !is_pdf {
                return Err(Error::Validation(
                    "The general corpus accepts PDF uploads only".to_string(),
                ));
            }
        }
    }

    Ok(())
}

/// Delete options
#[derive(Debug, Clone)]
pub struct DeleteOptions {
    pub corpus: Corpus,
    pub id: i64,
    pub yes: bool,
}

/// Outcome of a delete
#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub id: i64,
    pub deleted: bool,
    pub message: String,
    pub listing: Option<KnowledgeList>,
}

/// Delete a document after confirmation, stronger when it is mid-processing
pub async fn cmd_delete(
    config: &Config,
    client: &ApiClient,
    options: &DeleteOptions,
) -> Result<DeleteOutcome> {
    let document = client.get_document(options.corpus, options.id).await?;
    let name = document
        .file_name()
        .unwrap_or_else(|| format!("document-{}", options.id));

    let prompt = if document.processing_status == ProcessingStatus::Processing {
        format!(
            "'{}' is still processing; deleting now aborts extraction. Delete anyway?",
            name
        )
    } else {
        format!("Delete '{}'?", name)
    };

    if !confirm_action(&prompt, options.yes)? {
        return Ok(DeleteOutcome {
            id: options.id,
            deleted: false,
            message: "cancelled".to_string(),
            listing: None,
        });
    }

    let message = client.delete_document(options.corpus, options.id).await?;
    info!("Deleted document {}: {}", options.id, message);

    let first_page = ListOptions {
        corpus: options.corpus,
        page: 1,
        ..Default::default()
    };
    let listing = match cmd_list(config, client, &first_page).await {
        Ok(list) => Some(list),
        Err(e) => {
            warn!("Could not refresh listing: {}", e);
            None
        }
    };

    Ok(DeleteOutcome {
        id: options.id,
        deleted: true,
        message,
        listing,
    })
}

/// Watch options
#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub corpus: Corpus,
    pub page: u32,
}

/// Render the listing on every poll interval until Ctrl+C
pub async fn cmd_watch(
    config: &Config,
    client: &ApiClient,
    options: &WatchOptions,
) -> Result<()> {
    let mut ticker = tokio::time::interval(config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    println!(
        "Watching {} documents (page {}), Ctrl+C to stop",
        options.corpus,
        options.page.max(1)
    );

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Watch stopped");
                return Ok(());
            }
            _ = ticker.tick() => {
                let list_options = ListOptions {
                    corpus: options.corpus,
                    page: options.page,
                    ..Default::default()
                };
                // A failed refresh is logged, the loop keeps going
                match cmd_list(config, client, &list_options).await {
                    Ok(list) => print_knowledge_list(&list),
                    Err(e) => warn!("List refresh failed: {}", e),
                }
            }
        }
    }
}

fn build_list(corpus: Corpus, page: DocumentPage, preview_chars: usize) -> KnowledgeList {
    let documents = page
        .documents
        .iter()
        .map(|d| document_row(d, preview_chars))
        .collect();
    KnowledgeList {
        corpus,
        page: page.page,
        total_pages: page.total_pages,
        count: page.count,
        documents,
    }
}

fn document_row(document: &KnowledgeDocument, preview_chars: usize) -> DocumentRow {
    DocumentRow {
        id: document.id,
        file_name: document
            .file_name()
            .unwrap_or_else(|| format!("document-{}", document.id)),
        department: document.department.clone(),
        preview: truncate_graphemes(document.content.as_deref().unwrap_or(""), preview_chars),
        chunks: document.chunk,
        author: document.author,
        status: document.processing_status,
        created_at: document.created_at,
        updated_at: document.updated_at,
    }
}

/// Grapheme-safe preview truncation with a `...` suffix
pub(crate) fn truncate_graphemes(text: &str, max: usize) -> String {
    let trimmed = text.trim();
    let graphemes: Vec<&str> = trimmed.graphemes(true).collect();
    if graphemes.len() <= max {
        return trimmed.to_string();
    }
    format!("{}...", graphemes[..max].concat())
}

/// y/N confirmation; `--yes` or a non-TTY stdin auto-accepts
pub(crate) fn confirm_action(prompt: &str, yes: bool) -> Result<bool> {
    if yes || !io::stdin().is_terminal() {
        return Ok(true);
    }

    print!("{} [y/N]: ", prompt);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(matches!(input.trim().to_lowercase().as_str(), "y" | "yes"))
}

pub(crate) fn local_time(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Print a listing page to console
pub fn print_knowledge_list(list: &KnowledgeList) {
    println!(
        "\n📚 Knowledge documents ({}), page {} of {} ({} total)\n",
        list.corpus,
        list.page,
        list.total_pages.max(1),
        list.count
    );

    if list.documents.is_empty() {
        println!("No documents on this page.");
        return;
    }

    for row in &list.documents {
        println!("• [{}] {}  {}", row.id, row.file_name, row.status.glyph());
        if !row.department.is_empty() {
            println!("  Department: {}", row.department);
        }
        if !row.preview.is_empty() {
            println!("  Preview: {}", row.preview);
        }
        println!(
            "  Chunks: {}   Author: {}",
            row.chunks.map(|c| c.to_string()).unwrap_or_else(|| "?".to_string()),
            row.author.map(|a| a.to_string()).unwrap_or_else(|| "-".to_string())
        );
        println!(
            "  Created: {}   Updated: {}",
            local_time(&row.created_at),
            local_time(&row.updated_at)
        );
        println!();
    }
}

/// Print one document's detail to console
pub fn print_document(document: &KnowledgeDocument) {
    let name = document
        .file_name()
        .unwrap_or_else(|| format!("document-{}", document.id));
    println!("\n📄 {} [{}]\n", name, document.id);
    println!("Status: {}", document.processing_status.glyph());
    if !document.department.is_empty() {
        println!("Department: {}", document.department);
    }
    if let Some(file) = &document.file {
        println!("File: {}", file);
    }
    println!(
        "Chunks: {}",
        document
            .chunk
            .map(|c| c.to_string())
            .unwrap_or_else(|| "?".to_string())
    );
    println!(
        "Author: {}",
        document
            .author
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!("Created: {}", local_time(&document.created_at));
    println!("Updated: {}", local_time(&document.updated_at));
    if let Some(content) = &document.content {
        if !content.trim().is_empty() {
            println!("\nPreview:\n{}", content.trim());
        }
    }
}

/// Print an upload outcome to console
pub fn print_upload_outcome(outcome: &UploadOutcome) {
    println!("\n✓ Uploaded document {} ({})", outcome.id, outcome.message);
    match outcome.status {
        Some(status) => println!("Processing finished: {}", status.glyph()),
        None => println!("Processing continues server-side; check 'knowledge show' later."),
    }
    if let Some(listing) = &outcome.listing {
        print_knowledge_list(listing);
    }
}

/// Print a delete outcome to console
pub fn print_delete_outcome(outcome: &DeleteOutcome) {
    if !outcome.deleted {
        println!("Deletion cancelled.");
        return;
    }
    println!("\n✓ Deleted document {} ({})", outcome.id, outcome.message);
    if let Some(listing) = &outcome.listing {
        print_knowledge_list(listing);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer) -> Config {
        let mut config = Config::default();
        config.api_base_url = format!("{}/api", server.uri());
        config.media_base_url = server.uri();
        config
    }

    #[test]
    fn test_truncate_graphemes() {
        assert_eq!(truncate_graphemes("short", 50), "short");
        assert_eq!(truncate_graphemes("abcdef", 3), "abc...");
        // CJK clusters count as one each
        assert_eq!(truncate_graphemes("公司年度報告", 4), "公司年度...");
        assert_eq!(truncate_graphemes("  padded  ", 50), "padded");
    }

    #[test]
    fn test_validate_upload_requires_existing_file() {
        let config = Config::default();
        let options = UploadOptions {
            corpus: Corpus::Enterprise,
            file: PathBuf::from("/definitely/not/here.pdf"),
            department: Some("IT 部門".to_string()),
            author: None,
            content: None,
            wait: false,
        };
        assert!(matches!(
            validate_upload(&config, &options),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_validate_upload_checks_department_choices() {
        let config = Config::default();
        let tmp = tempfile::NamedTempFile::new().unwrap();

        let mut options = UploadOptions {
            corpus: Corpus::Enterprise,
            file: tmp.path().to_path_buf(),
            department: Some("不存在的部門".to_string()),
            author: None,
            content: None,
            wait: false,
        };
        assert!(matches!(
            validate_upload(&config, &options),
            Err(Error::Validation(_))
        ));

        options.department = Some("IT 部門".to_string());
        assert!(validate_upload(&config, &options).is_ok());
    }

    #[test]
    fn test_validate_general_upload_is_pdf_only() {
        let config = Config::default();
        let tmp = tempfile::Builder::new()
            .suffix(".txt")
            .tempfile()
            .unwrap();

        let options = UploadOptions {
            corpus: Corpus::General,
            file: tmp.path().to_path_buf(),
            department: None,
            author: None,
            content: None,
            wait: false,
        };
        assert!(matches!(
            validate_upload(&config, &options),
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_without_department_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/knowledge/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let config = test_config(&server);
        let client = ApiClient::new(&config).unwrap();
        let tmp = tempfile::NamedTempFile::new().unwrap();

        let options = UploadOptions {
            corpus: Corpus::Enterprise,
            file: tmp.path().to_path_buf(),
            department: None,
            author: None,
            content: None,
            wait: false,
        };
        let err = cmd_upload(&config, &client, &options).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        // Dropping the server verifies the zero-call expectation
    }

    #[tokio::test]
    async fn test_list_maps_documents_to_rows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/knowledge/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "count": 1,
                "next": null,
                "previous": null,
                "results": [{
                    "id": 9,
                    "file": "http://files/media/knowledge_files/%E5%A0%B1%E5%91%8A.pdf",
                    "department": "IT 部門",
                    "content": "這是一段非常長的開頭內容預覽，用來驗證截斷行為是否正確運作，超過五十個字之後就要截斷了，所以這裡還要再多寫一些字數來撐過門檻限制才行。",
                    "chunk": 12,
                    "author": 1,
                    "created_at": "2025-04-23T10:00:00Z",
                    "updated_at": "2025-04-23T10:05:00Z",
                    "processing_status": "done"
                }]
            })))
            .mount(&server)
            .await;

        let config = test_config(&server);
        let client = ApiClient::new(&config).unwrap();

        let list = cmd_list(
            &config,
            &client,
            &ListOptions {
                corpus: Corpus::Enterprise,
                page: 1,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(list.count, 1);
        assert_eq!(list.total_pages, 1);
        let row = &list.documents[0];
        assert_eq!(row.file_name, "報告.pdf");
        assert_eq!(row.chunks, Some(12));
        assert_eq!(row.status, ProcessingStatus::Done);
        assert!(row.preview.ends_with("..."));
        assert_eq!(row.preview.graphemes(true).count(), 53);
    }
}
