//! Status command: configuration, backend reachability, staged sessions

use crate::client::{ApiClient, Corpus, ListQuery};
use crate::commands::chunks::{cmd_sessions, SessionRow};
use crate::commands::knowledge::local_time;
use crate::config::Config;
use crate::error::Result;
use crate::session::SessionStore;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};

/// Status information
#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub config_path: PathBuf,
    pub api_base_url: String,
    pub media_base_url: String,
    pub page_size: u32,
    pub poll_interval_secs: u64,
    pub corpora: Vec<CorpusStatus>,
    pub sessions: Vec<SessionRow>,
}

/// Reachability of one corpus endpoint
#[derive(Debug, Clone, Serialize)]
pub struct CorpusStatus {
    pub corpus: Corpus,
    pub reachable: bool,
    pub documents: Option<u64>,
    pub error: Option<String>,
}

/// Get system status. Unreachable corpora are reported, not fatal.
pub async fn cmd_status(
    config: &Config,
    client: &ApiClient,
    store: &SessionStore,
) -> Result<StatusInfo> {
    info!("Getting status");

    let mut corpora = Vec::new();
    for corpus in [Corpus::Enterprise, Corpus::General] {
        let probe = client
            .list_documents(corpus, &ListQuery::page(1), config.console.page_size)
            .await;
        corpora.push(match probe {
            Ok(page) => CorpusStatus {
                corpus,
                reachable: true,
                documents: Some(page.count),
                error: None,
            },
            Err(e) => {
                debug!("{} corpus probe failed: {}", corpus, e);
                CorpusStatus {
                    corpus,
                    reachable: false,
                    documents: None,
                    error: Some(e.to_string()),
                }
            }
        });
    }

    let sessions = cmd_sessions(store)?;

    Ok(StatusInfo {
        config_path: config.paths.config_file.clone(),
        api_base_url: config.api_base_url.clone(),
        media_base_url: config.media_base_url.clone(),
        page_size: config.console.page_size,
        poll_interval_secs: config.poll.interval_secs,
        corpora,
        sessions,
    })
}

/// Print status to console
pub fn print_status(info: &StatusInfo) {
    println!("\n📊 kbctl Status\n");
    println!("Config: {}", info.config_path.display());
    println!("API: {}", info.api_base_url);
    println!("Media: {}", info.media_base_url);
    println!(
        "Page size: {}   Poll interval: {}s",
        info.page_size, info.poll_interval_secs
    );

    println!("\nCorpora:");
    for status in &info.corpora {
        match status.documents {
            Some(count) => println!("  ✓ {}: {} documents", status.corpus, count),
            None => println!(
                "  ✗ {}: unreachable ({})",
                status.corpus,
                status.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }

    println!("\nEdit sessions: {}", info.sessions.len());
    for row in &info.sessions {
        println!(
            "  • {} document {} '{}': {} chunks, {} modified, pulled {}",
            row.corpus,
            row.document_id,
            row.title,
            row.chunks,
            row.modified,
            local_time(&row.pulled_at)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_status_tolerates_unreachable_corpus() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/knowledge/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "count": 3,
                "results": []
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/document/"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": "維護中"
            })))
            .mount(&server)
            .await;

        let mut config = Config::default();
        config.api_base_url = format!("{}/api", server.uri());
        config.media_base_url = server.uri();
        let client = ApiClient::new(&config).unwrap();

        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());

        let info = cmd_status(&config, &client, &store).await.unwrap();

        let enterprise = &info.corpora[0];
        assert!(enterprise.reachable);
        assert_eq!(enterprise.documents, Some(3));

        let general = &info.corpora[1];
        assert!(!general.reachable);
        assert!(general.error.as_deref().unwrap().contains("維護中"));

        assert!(info.sessions.is_empty());
    }
}
