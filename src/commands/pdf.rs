//! PDF commands: resolve deep links and read page text in the terminal

use crate::client::ApiClient;
use crate::error::Result;
use crate::pdf::page_view;
use serde::Serialize;
use tracing::info;

/// PDF link options
#[derive(Debug, Clone)]
pub struct PdfUrlOptions {
    /// Stored file name, e.g. `報告.pdf`
    pub title: String,
    /// Page to deep-link with a `#page=N` fragment
    pub page: Option<i64>,
}

/// A resolved link into a stored PDF
#[derive(Debug, Clone, Serialize)]
pub struct PdfLink {
    pub title: String,
    pub page: Option<i64>,
    pub url: String,
}

/// Resolve the media URL of a stored PDF. No network involved.
pub fn cmd_pdf_url(client: &ApiClient, options: &PdfUrlOptions) -> Result<PdfLink> {
    let url = client.document_pdf_url(&options.title, options.page)?;
    Ok(PdfLink {
        title: options.title.clone(),
        page: options.page,
        url: url.to_string(),
    })
}

/// PDF view options
#[derive(Debug, Clone)]
pub struct PdfViewOptions {
    pub title: String,
    /// 1-based page, defaults to the first
    pub page: Option<usize>,
}

/// One PDF page's text with its link
#[derive(Debug, Clone, Serialize)]
pub struct PdfPageView {
    pub title: String,
    pub url: String,
    pub page: usize,
    pub total_pages: usize,
    pub text: String,
}

/// Download a stored PDF and show one page's text.
///
/// The link is logged before the download starts so a failed fetch or a
/// scanned page with no text layer still leaves the reader somewhere to go.
pub async fn cmd_pdf_view(client: &ApiClient, options: &PdfViewOptions) -> Result<PdfPageView> {
    let page = options.page.unwrap_or(1);
    let url = client
        .document_pdf_url(&options.title, Some(page as i64))?
        .to_string();
    info!("PDF at {}", url);

    let bytes = client.fetch_pdf(&options.title).await?;
    let view = page_view(&bytes, page)?;

    Ok(PdfPageView {
        title: options.title.clone(),
        url,
        page: view.page,
        total_pages: view.total,
        text: view.text,
    })
}

/// Print a resolved PDF link to console
pub fn print_pdf_link(link: &PdfLink) {
    println!("{}", link.url);
}

/// Print one PDF page's text to console
pub fn print_pdf_page(view: &PdfPageView) {
    println!("\n📄 {} (page {} of {})", view.title, view.page, view.total_pages);
    println!("{}\n", view.url);
    if view.text.is_empty() {
        println!("(no text layer on this page)");
    } else {
        println!("{}", view.text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::Error;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ApiClient {
        let mut config = Config::default();
        config.api_base_url = format!("{}/api", server.uri());
        config.media_base_url = server.uri();
        ApiClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_pdf_url_encodes_title_and_fragment() {
        let server = MockServer::start().await;
        let client = client_for(&server);

        let link = cmd_pdf_url(
            &client,
            &PdfUrlOptions {
                title: "年度報告.pdf".to_string(),
                page: Some(4),
            },
        )
        .unwrap();

        assert!(link.url.contains("/media/knowledge_files/"));
        assert!(link.url.ends_with("#page=4"));
        // Fragment-free without a page
        let bare = cmd_pdf_url(
            &client,
            &PdfUrlOptions {
                title: "年度報告.pdf".to_string(),
                page: None,
            },
        )
        .unwrap();
        assert!(!bare.url.contains('#'));
    }

    #[tokio::test]
    async fn test_view_surfaces_missing_documents() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/knowledge_files/gone.pdf"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = cmd_pdf_view(
            &client,
            &PdfViewOptions {
                title: "gone.pdf".to_string(),
                page: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Api { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_view_rejects_unparseable_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/knowledge_files/bad.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"not a pdf".to_vec()))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = cmd_pdf_view(
            &client,
            &PdfViewOptions {
                title: "bad.pdf".to_string(),
                page: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Pdf(_)));
    }
}
