//! Processing-status polling.
//!
//! After an upload the backend parses, chunks, and embeds the document in the
//! background. [`status_stream`] re-fetches the document detail on a fixed
//! interval; [`wait_for_processing`] consumes it until the status turns
//! terminal (`done` or `error`), and a Ctrl+C stops the wait without touching
//! the document.

use crate::client::{ApiClient, Corpus};
use crate::error::Result;
use crate::types::{KnowledgeDocument, ProcessingStatus};
use futures::stream::{self, Stream, StreamExt};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// How a poll loop ended
#[derive(Debug)]
pub enum PollOutcome {
    /// Status reached `done` or `error`
    Finished(KnowledgeDocument),
    /// The user interrupted the wait; processing continues server-side
    Interrupted,
}

/// Endless stream of document-detail fetches, one per interval tick.
///
/// The first fetch fires immediately; consumers decide when to stop.
pub fn status_stream(
    client: &ApiClient,
    corpus: Corpus,
    document_id: i64,
    interval: Duration,
) -> impl Stream<Item = Result<KnowledgeDocument>> + '_ {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    stream::unfold(ticker, move |mut ticker| async move {
        ticker.tick().await;
        let fetched = client.get_document(corpus, document_id).await;
        Some((fetched, ticker))
    })
}

/// Poll a document's detail until its processing status is terminal.
///
/// `on_status` runs after every fetch so callers can drive a spinner. Fetch
/// errors end the loop and propagate.
pub async fn wait_for_processing<F>(
    client: &ApiClient,
    corpus: Corpus,
    document_id: i64,
    interval: Duration,
    mut on_status: F,
) -> Result<PollOutcome>
where
    F: FnMut(ProcessingStatus),
{
    let updates = status_stream(client, corpus, document_id, interval);
    tokio::pin!(updates);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                debug!("Stopped watching document {} on Ctrl+C", document_id);
                return Ok(PollOutcome::Interrupted);
            }
            Some(fetched) = updates.next() => {
                let document = fetched?;
                let status = document.processing_status;
                debug!("Document {} status: {}", document_id, status);
                on_status(status);
                if status.is_terminal() {
                    return Ok(PollOutcome::Finished(document));
                }
            }
        }
    }
}
