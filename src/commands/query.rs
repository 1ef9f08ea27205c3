//! Question answering against the document corpus

use crate::client::{ApiClient, Corpus};
use crate::commands::knowledge::truncate_graphemes;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::{ModelType, QueryRequest};
use crate::voice::create_transcriber;
use serde::Serialize;
use tracing::{debug, info};

/// Query options
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub corpus: Corpus,
    /// Question text; omitted when `--voice` supplies it
    pub text: Option<String>,
    /// Model override; falls back to the configured default
    pub model: Option<ModelType>,
    /// Disable retrieval for this query even when configured on
    pub no_retrieval: bool,
    /// Transcribe the question from the configured voice command
    pub voice: bool,
}

/// An answer with the passages that backed it
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub corpus: Corpus,
    pub query: String,
    pub model: ModelType,
    pub use_retrieval: bool,
    pub answer: String,
    pub sources: Vec<SourceHit>,
}

/// One retrieved passage prepared for display
#[derive(Debug, Clone, Serialize)]
pub struct SourceHit {
    pub title: String,
    /// Numeric page when the backend reported one
    pub page: Option<i64>,
    /// Page text as reported, placeholder labels included
    pub page_label: String,
    pub snippet: String,
    /// Deep link into the stored PDF, numeric pages only
    pub link: Option<String>,
}

/// Ask a question, optionally transcribing it first
pub async fn cmd_query(
    config: &Config,
    client: &ApiClient,
    options: &QueryOptions,
) -> Result<Answer> {
    let text = if options.voice {
        let transcriber = create_transcriber(&config.voice)?;
        let transcript = transcriber.transcribe().await?;
        info!("Transcribed query: {}", transcript);
        transcript
    } else {
        options.text.clone().unwrap_or_default()
    };

    let query = text.trim().to_string();
    if query.is_empty() {
        return Err(Error::Validation("Query text is empty".to_string()));
    }

    let model = match options.model {
        Some(model) => model,
        None => config.query.model.parse()?,
    };
    let use_retrieval = config.query.use_retrieval && !options.no_retrieval;

    let request = QueryRequest {
        query: query.clone(),
        model_type: model,
        use_retrieval,
    };
    let response = client.query(options.corpus, &request).await?;
    debug!(
        "Answer of {} chars, {} retrieved passages",
        response.answer.len(),
        response.retrieved_docs.len()
    );

    // With retrieval off, anything the backend echoes back is not context
    let sources = if use_retrieval {
        response
            .retrieved_docs
            .iter()
            .map(|doc| {
                let page = doc.page_number.page();
                let link = page
                    .and_then(|p| client.document_pdf_url(&doc.title, Some(p)).ok())
                    .map(|url| url.to_string());
                SourceHit {
                    title: doc.title.clone(),
                    page,
                    page_label: doc.page_number.to_string(),
                    snippet: truncate_graphemes(
                        &doc.content,
                        config.console.snippet_preview_chars,
                    ),
                    link,
                }
            })
            .collect()
    } else {
        Vec::new()
    };

    Ok(Answer {
        corpus: options.corpus,
        query,
        model,
        use_retrieval,
        answer: response.answer,
        sources,
    })
}

/// Print an answer to console
pub fn print_answer(answer: &Answer) {
    println!(
        "\n🔍 {} ({} corpus, {} model)\n",
        answer.query, answer.corpus, answer.model
    );
    println!("{}", answer.answer.trim());

    if !answer.use_retrieval {
        println!("\n• Retrieval disabled; the answer used no corpus passages.");
        return;
    }

    if answer.sources.is_empty() {
        println!("\n⚠ No relevant passages were retrieved for this query.");
        return;
    }

    println!("\n📚 Sources:\n");
    for hit in &answer.sources {
        println!("• {} (page {})", hit.title, hit.page_label);
        if !hit.snippet.is_empty() {
            println!("  {}", hit.snippet);
        }
        if let Some(link) = &hit.link {
            println!("  {}", link);
        }
    }
}
