//! Chunk editing commands: pull, show, edit, delete, push, sessions
//!
//! Edits are staged locally in a session file and only reach the backend on
//! `push`, so a broken save can be retried without re-typing anything.

use crate::client::{ApiClient, Corpus};
use crate::commands::knowledge::{
    cmd_list, confirm_action, local_time, print_knowledge_list, KnowledgeList, ListOptions,
};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::group::{filter_groups, partition_group, ChunkGroup};
use crate::progress;
use crate::session::{EditSession, SessionStore};
use crate::types::Chunk;
use chrono::{DateTime, Utc};
use indicatif::ProgressStyle;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Pull options
#[derive(Debug, Clone)]
pub struct PullOptions {
    pub corpus: Corpus,
    pub id: i64,
}

/// Outcome of a pull: where the session landed plus the pulled view
#[derive(Debug, Clone, Serialize)]
pub struct PullReport {
    pub session_path: PathBuf,
    pub view: ChunksView,
}

/// Download a document's chunks and stage them as an edit session.
///
/// Pulling again overwrites any existing session for the document, dropping
/// unpushed edits in favor of the server state.
pub async fn cmd_pull(
    client: &ApiClient,
    store: &SessionStore,
    options: &PullOptions,
) -> Result<PullReport> {
    info!("Pulling chunks for {} document {}", options.corpus, options.id);

    let response = client.list_chunks(options.corpus, options.id).await?;
    let groups = crate::group::group_by_page(response.chunks);
    let session = EditSession::new(options.corpus, options.id, response.title, groups);
    let session_path = store.save(&session)?;

    info!(
        "Staged {} chunks across {} pages in {:?}",
        session.chunk_total(),
        session.groups.len(),
        session_path
    );

    let view = build_view(client, &session, &session.groups);
    Ok(PullReport { session_path, view })
}

/// Show options
#[derive(Debug, Clone)]
pub struct ShowOptions {
    pub corpus: Corpus,
    pub id: i64,
    /// Case-insensitive content filter
    pub search: Option<String>,
}

/// A staged document rendered page by page
#[derive(Debug, Clone, Serialize)]
pub struct ChunksView {
    pub corpus: Corpus,
    pub document_id: i64,
    pub title: String,
    pub chunk_total: usize,
    pub modified: usize,
    pub pulled_at: DateTime<Utc>,
    pub pages: Vec<PageSection>,
}

/// One page group split into text, image, and table sections
#[derive(Debug, Clone, Serialize)]
pub struct PageSection {
    pub page: String,
    pub text: Vec<ChunkRow>,
    pub images: Vec<ImageSection>,
    pub tables: Vec<ChunkRow>,
    /// Resolved table asset URLs, raw paths where resolution failed
    pub table_assets: Vec<String>,
}

/// Image chunks sharing a source, with the source resolved to a media URL
#[derive(Debug, Clone, Serialize)]
pub struct ImageSection {
    pub source: String,
    pub asset: Option<String>,
    pub chunks: Vec<ChunkRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkRow {
    pub id: String,
    pub chunk_index: i64,
    pub modified: bool,
    pub content: String,
}

/// Render the staged session, optionally filtered by a content search
pub fn cmd_chunks_show(
    client: &ApiClient,
    store: &SessionStore,
    options: &ShowOptions,
) -> Result<ChunksView> {
    let session = store.load(options.corpus, options.id)?;

    let search = options
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let groups = match search {
        Some(search) => filter_groups(&session.groups, search),
        None => session.groups.clone(),
    };

    Ok(build_view(client, &session, &groups))
}

fn build_view(client: &ApiClient, session: &EditSession, groups: &[ChunkGroup]) -> ChunksView {
    let modified_ids: BTreeSet<String> =
        session.modified().iter().map(|c| c.id.clone()).collect();

    let pages = groups
        .iter()
        .map(|group| {
            let partition = partition_group(group);

            let images = partition
                .images
                .iter()
                .map(|image| ImageSection {
                    source: image.source.clone(),
                    asset: resolve_asset(client, session, &image.source),
                    chunks: rows(&image.chunks, &modified_ids),
                })
                .collect();

            let table_assets = partition
                .table_sources
                .iter()
                .map(|source| {
                    resolve_asset(client, session, source).unwrap_or_else(|| source.clone())
                })
                .collect();

            PageSection {
                page: group.page_number.label(),
                text: rows(&partition.text, &modified_ids),
                images,
                tables: rows(&partition.tables, &modified_ids),
                table_assets,
            }
        })
        .collect();

    ChunksView {
        corpus: session.corpus,
        document_id: session.document_id,
        title: session.title.clone(),
        chunk_total: session.chunk_total(),
        modified: modified_ids.len(),
        pulled_at: session.pulled_at,
        pages,
    }
}

fn resolve_asset(client: &ApiClient, session: &EditSession, source: &str) -> Option<String> {
    match client.asset_url(session.corpus, &session.title, source) {
        Ok(url) => Some(url.to_string()),
        Err(e) => {
            warn!("Could not resolve asset '{}': {}", source, e);
            None
        }
    }
}

fn rows(chunks: &[&Chunk], modified_ids: &BTreeSet<String>) -> Vec<ChunkRow> {
    chunks
        .iter()
        .map(|c| ChunkRow {
            id: c.id.clone(),
            chunk_index: c.chunk_index,
            modified: modified_ids.contains(&c.id),
            content: c.content.clone(),
        })
        .collect()
}

/// Edit options; exactly one content source must be set
#[derive(Debug, Clone, Default)]
pub struct EditOptions {
    pub corpus: Corpus,
    pub id: i64,
    pub chunk_id: String,
    pub content: Option<String>,
    pub file: Option<PathBuf>,
    pub editor: bool,
}

/// Outcome of a staged edit
#[derive(Debug, Clone, Serialize)]
pub struct EditReport {
    pub chunk_id: String,
    /// Whether the chunk now differs from its pulled baseline
    pub modified: bool,
    pub session_path: PathBuf,
}

/// Stage new content for one chunk. Nothing is sent until `push`.
pub fn cmd_edit(store: &SessionStore, options: &EditOptions) -> Result<EditReport> {
    let mut session = store.load(options.corpus, options.id)?;

    let current = session
        .find_chunk(&options.chunk_id)
        .ok_or_else(|| Error::ChunkNotFound(options.chunk_id.clone()))?
        .content
        .clone();

    let content = resolve_edit_content(options, &current)?;
    session.update_content(&options.chunk_id, &content);
    let session_path = store.save(&session)?;

    let modified = session
        .modified()
        .iter()
        .any(|c| c.id == options.chunk_id);
    info!(
        "Staged chunk {} ({})",
        options.chunk_id,
        if modified { "modified" } else { "matches baseline" }
    );

    Ok(EditReport {
        chunk_id: options.chunk_id.clone(),
        modified,
        session_path,
    })
}

fn resolve_edit_content(options: &EditOptions, current: &str) -> Result<String> {
    let sources =
        [options.content.is_some(), options.file.is_some(), options.editor];
    match sources.iter().filter(|set| **set).count() {
        0 => {
            return Err(Error::Validation(
                "Provide new content via --content, --file, or --editor".to_string(),
            ))
        }
        1 => {}
        _ => {
            return Err(Error::Validation(
                "--content, --file, and --editor are mutually exclusive".to_string(),
            ))
        }
    }

    if let Some(content) = &options.content {
        return Ok(content.clone());
    }
    if let Some(file) = &options.file {
        return Ok(std::fs::read_to_string(file)?);
    }
    edit_in_editor(&options.chunk_id, current)
}

fn edit_in_editor(chunk_id: &str, current: &str) -> Result<String> {
    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    let path = std::env::temp_dir().join(format!("kbctl-edit-{}.md", std::process::id()));
    std::fs::write(&path, current)?;

    info!("Opening chunk {} in {}", chunk_id, editor);
    let status = std::process::Command::new(&editor)
        .arg(&path)
        .status()
        .map_err(|e| Error::Other(format!("Could not launch editor '{}': {}", editor, e)))?;

    if !status.success() {
        let _ = std::fs::remove_file(&path);
        return Err(Error::Other(format!(
            "Editor '{}' exited with {}",
            editor, status
        )));
    }

    let content = std::fs::read_to_string(&path)?;
    let _ = std::fs::remove_file(&path);
    Ok(content)
}

/// Chunk delete options
#[derive(Debug, Clone)]
pub struct ChunkDeleteOptions {
    pub corpus: Corpus,
    pub chunk_id: String,
    pub yes: bool,
}

/// Outcome of a chunk delete
#[derive(Debug, Clone, Serialize)]
pub struct ChunkDeleteReport {
    pub chunk_id: String,
    pub deleted: bool,
    /// Document whose staged session was synced, when one held the chunk
    pub document_id: Option<i64>,
}

/// Delete one chunk on the backend, then sync any staged session holding it.
///
/// Unlike edits this takes effect immediately; the session update is
/// best-effort bookkeeping.
pub async fn cmd_chunk_delete(
    client: &ApiClient,
    store: &SessionStore,
    options: &ChunkDeleteOptions,
) -> Result<ChunkDeleteReport> {
    let prompt = format!(
        "Delete chunk {} from the backend immediately?",
        options.chunk_id
    );
    if !confirm_action(&prompt, options.yes)? {
        return Ok(ChunkDeleteReport {
            chunk_id: options.chunk_id.clone(),
            deleted: false,
            document_id: None,
        });
    }

    client.delete_chunk(options.corpus, &options.chunk_id).await?;
    info!("Deleted chunk {}", options.chunk_id);

    let document_id = match sync_sessions_after_delete(store, options) {
        Ok(synced) => synced,
        Err(e) => {
            warn!("Could not sync sessions after delete: {}", e);
            None
        }
    };

    Ok(ChunkDeleteReport {
        chunk_id: options.chunk_id.clone(),
        deleted: true,
        document_id,
    })
}

fn sync_sessions_after_delete(
    store: &SessionStore,
    options: &ChunkDeleteOptions,
) -> Result<Option<i64>> {
    for mut session in store.list()? {
        if session.corpus != options.corpus {
            continue;
        }
        if session.remove_chunk(&options.chunk_id).is_some() {
            store.save(&session)?;
            return Ok(Some(session.document_id));
        }
    }
    Ok(None)
}

/// Push options
#[derive(Debug, Clone)]
pub struct PushOptions {
    pub corpus: Corpus,
    pub id: i64,
}

/// Outcome of a push, partial or complete
#[derive(Debug, Clone, Serialize)]
pub struct SaveReport {
    pub corpus: Corpus,
    pub document_id: i64,
    pub title: String,
    pub updated: Vec<String>,
    pub failed: Option<FailedSave>,
    pub remaining: Vec<String>,
    pub session_removed: bool,
    pub listing: Option<KnowledgeList>,
}

/// The chunk a push stopped at
#[derive(Debug, Clone, Serialize)]
pub struct FailedSave {
    pub chunk_id: String,
    pub error: String,
}

/// Save every staged chunk back to the backend, one PUT per chunk in display
/// order. The first failure stops the run; the session survives so the push
/// can be repeated after the failure is fixed.
pub async fn cmd_push(
    config: &Config,
    client: &ApiClient,
    store: &SessionStore,
    options: &PushOptions,
) -> Result<SaveReport> {
    let session = store.load(options.corpus, options.id)?;

    // Display order: page groups as pulled, chunks by index within each
    let mut ordered: Vec<&Chunk> = Vec::new();
    for group in &session.groups {
        let mut chunks: Vec<&Chunk> = group.chunks.iter().collect();
        chunks.sort_by_key(|c| c.chunk_index);
        ordered.extend(chunks);
    }

    info!(
        "Pushing {} chunks of '{}' ({} document {})",
        ordered.len(),
        session.title,
        options.corpus,
        options.id
    );

    let pb = progress::add_progress_bar(ordered.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}",
        )
        .unwrap()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let mut updated = Vec::new();
    let mut failed = None;
    let mut remaining = Vec::new();

    for (at, chunk) in ordered.iter().enumerate() {
        pb.set_message(format!("chunk {}", chunk.id));
        match client
            .update_chunk(options.corpus, &chunk.id, &chunk.content)
            .await
        {
            Ok(_) => {
                updated.push(chunk.id.clone());
                pb.inc(1);
            }
            Err(e) => {
                warn!("Push stopped at chunk {}: {}", chunk.id, e);
                failed = Some(FailedSave {
                    chunk_id: chunk.id.clone(),
                    error: e.to_string(),
                });
                remaining = ordered[at + 1..].iter().map(|c| c.id.clone()).collect();
                break;
            }
        }
    }

    if failed.is_none() {
        pb.finish_with_message("saved");
    } else {
        pb.abandon_with_message("stopped");
    }

    let session_removed = if failed.is_none() {
        store.delete(options.corpus, options.id)?
    } else {
        false
    };

    let listing = if failed.is_none() {
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

    Ok(SaveReport {
        corpus: options.corpus,
        document_id: options.id,
        title: session.title.clone(),
        updated,
        failed,
        remaining,
        session_removed,
        listing,
    })
}

/// One staged session summarized for the sessions listing
#[derive(Debug, Clone, Serialize)]
pub struct SessionRow {
    pub corpus: Corpus,
    pub document_id: i64,
    pub title: String,
    pub chunks: usize,
    pub modified: usize,
    pub pulled_at: DateTime<Utc>,
}

/// List staged edit sessions, newest first
pub fn cmd_sessions(store: &SessionStore) -> Result<Vec<SessionRow>> {
    let sessions = store.list()?;
    Ok(sessions
        .iter()
        .map(|s| SessionRow {
            corpus: s.corpus,
            document_id: s.document_id,
            title: s.title.clone(),
            chunks: s.chunk_total(),
            modified: s.modified().len(),
            pulled_at: s.pulled_at,
        })
        .collect())
}

/// Print a pull outcome to console
pub fn print_pull_report(report: &PullReport) {
    println!(
        "\n✓ Pulled {} chunks across {} pages from '{}'",
        report.view.chunk_total,
        report.view.pages.len(),
        report.view.title
    );
    println!("Session: {}", report.session_path.display());
    print_chunks_view(&report.view);
}

/// Print a staged document view to console
pub fn print_chunks_view(view: &ChunksView) {
    println!(
        "\n📑 {} [{}] ({} corpus): {} chunks, {} modified",
        view.title, view.document_id, view.corpus, view.chunk_total, view.modified
    );
    println!("Pulled: {}", local_time(&view.pulled_at));

    if view.pages.is_empty() {
        println!("\nNo chunks to show.");
        return;
    }

    for page in &view.pages {
        println!("\n• Page {}", page.page);

        for row in &page.text {
            print_chunk_row(row);
        }

        for image in &page.images {
            println!("  🖼 {}", image.source);
            if let Some(asset) = &image.asset {
                println!("    {}", asset);
            }
            for row in &image.chunks {
                print_chunk_row(row);
            }
        }

        if !page.tables.is_empty() {
            println!("  📋 Tables");
            for asset in &page.table_assets {
                println!("    {}", asset);
            }
            for row in &page.tables {
                print_chunk_row(row);
            }
        }
    }
}

fn print_chunk_row(row: &ChunkRow) {
    let marker = if row.modified { " [modified]" } else { "" };
    println!("  [{}] chunk {}{}", row.id, row.chunk_index, marker);
    for line in row.content.lines() {
        println!("    {}", line);
    }
}

/// Print an edit outcome to console
pub fn print_edit_report(report: &EditReport) {
    if report.modified {
        println!(
            "\n✓ Staged chunk {}; run 'kbctl chunks push' to save",
            report.chunk_id
        );
    } else {
        println!(
            "\n✓ Chunk {} now matches its pulled baseline",
            report.chunk_id
        );
    }
    println!("Session: {}", report.session_path.display());
}

/// Print a chunk delete outcome to console
pub fn print_chunk_delete_report(report: &ChunkDeleteReport) {
    if !report.deleted {
        println!("Deletion cancelled.");
        return;
    }
    println!("\n✓ Deleted chunk {}", report.chunk_id);
    if let Some(document_id) = report.document_id {
        println!("Staged session for document {} updated.", document_id);
    }
}

/// Print a push outcome to console
pub fn print_save_report(report: &SaveReport) {
    match &report.failed {
        None => {
            println!(
                "\n✓ Saved {} chunks to '{}'",
                report.updated.len(),
                report.title
            );
            if report.session_removed {
                println!("Edit session removed.");
            }
            if let Some(listing) = &report.listing {
                print_knowledge_list(listing);
            }
        }
        Some(failed) => {
            println!(
                "\n✗ Push stopped at chunk {}: {}",
                failed.chunk_id, failed.error
            );
            println!("✓ Saved {} chunks before the failure", report.updated.len());
            println!("⚠ {} chunks not pushed", report.remaining.len());
            println!("Session kept; fix the failure and push again.");
        }
    }
}

/// Print the sessions listing to console
pub fn print_sessions(rows: &[SessionRow]) {
    println!("\n🗂 Edit sessions\n");
    if rows.is_empty() {
        println!("No edit sessions. Run 'kbctl chunks pull <id>' to stage one.");
        return;
    }
    for row in rows {
        println!(
            "• {} document {} '{}': {} chunks, {} modified, pulled {}",
            row.corpus,
            row.document_id,
            row.title,
            row.chunks,
            row.modified,
            local_time(&row.pulled_at)
        );
    }
}
