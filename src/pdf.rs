//! Source PDF text preview.
//!
//! Downloads stay raw bytes; this module turns them into per-page text for
//! terminal display. Extraction uses pdf-extract, which separates pages with
//! form feeds, so page numbers here line up with the numbers the backend
//! reports for chunks.

use crate::error::{Error, Result};

/// One page of extracted text
#[derive(Debug, Clone)]
pub struct PageView {
    pub page: usize,
    pub total: usize,
    pub text: String,
}

/// Extract per-page text from PDF bytes
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<String>> {
    #[cfg(feature = "pdf")]
    {
        let text = pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| Error::Pdf(format!("PDF extraction failed: {}", e)))?;
        Ok(split_pages(&text))
    }
    #[cfg(not(feature = "pdf"))]
    {
        let _ = bytes;
        Err(Error::Pdf(
            "PDF text preview requires the 'pdf' feature".to_string(),
        ))
    }
}

/// Extract one page, 1-based
pub fn page_view(bytes: &[u8], page: usize) -> Result<PageView> {
    select_page(extract_pages(bytes)?, page)
}

/// Split extracted text on form feeds. Interior empty pages stay so page
/// numbering keeps matching the document; trailing empties are dropped.
fn split_pages(text: &str) -> Vec<String> {
    let mut pages: Vec<String> = text
        .split('\u{000C}')
        .map(|p| p.trim().to_string())
        .collect();
    while pages.last().is_some_and(|p| p.is_empty()) {
        pages.pop();
    }
    pages
}

fn select_page(pages: Vec<String>, page: usize) -> Result<PageView> {
    let total = pages.len();
    if page == 0 || page > total {
        return Err(Error::Pdf(format!(
            "page {} out of range (document has {} page{})",
            page,
            total,
            if total == 1 { "" } else { "s" }
        )));
    }
    Ok(PageView {
        page,
        total,
        text: pages[page - 1].clone(),
    })
}
