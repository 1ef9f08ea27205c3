//! Local edit sessions for chunk editing.
//!
//! `chunks pull` snapshots a document's chunk groups into a JSON file under
//! the sessions directory. Edits and deletions rewrite the snapshot, and
//! `chunks push` uploads only the chunks whose content diverged from the
//! pulled baseline. Divergence is tracked by content hash, so re-saving a
//! chunk with its original text costs nothing at push time.

use crate::client::Corpus;
use crate::error::{Error, Result};
use crate::group::{self, ChunkGroup};
use crate::types::Chunk;
use blake3::Hasher;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One pulled document's editable chunk snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditSession {
    pub corpus: Corpus,
    pub document_id: i64,
    /// Stored file name of the document
    pub title: String,
    /// Page groups in backend chunk-list order
    pub groups: Vec<ChunkGroup>,
    /// Content hash per chunk id at pull time
    pub baseline: BTreeMap<String, String>,
    pub pulled_at: DateTime<Utc>,
}

impl EditSession {
    pub fn new(
        corpus: Corpus,
        document_id: i64,
        title: String,
        groups: Vec<ChunkGroup>,
    ) -> Self {
        let baseline = groups
            .iter()
            .flat_map(|g| g.chunks.iter())
            .map(|c| (c.id.clone(), content_hash(&c.content)))
            .collect();
        Self {
            corpus,
            document_id,
            title,
            groups,
            baseline,
            pulled_at: Utc::now(),
        }
    }

    /// Chunks whose content differs from the pulled baseline, in group order
    /// with each group's chunks in stored order
    pub fn modified(&self) -> Vec<&Chunk> {
        self.groups
            .iter()
            .flat_map(|g| g.chunks.iter())
            .filter(|c| {
                self.baseline
                    .get(&c.id)
                    .map(|hash| *hash != content_hash(&c.content))
                    .unwrap_or(true)
            })
            .collect()
    }

    /// Replace one chunk's content in place. Returns false when the id is
    /// not part of this session.
    pub fn update_content(&mut self, chunk_id: &str, content: &str) -> bool {
        let groups = std::mem::take(&mut self.groups);
        let (groups, touched) = group::update_chunk_content(groups, chunk_id, content);
        self.groups = groups;
        touched
    }

    /// Drop one chunk from the snapshot, discarding its group if emptied
    pub fn remove_chunk(&mut self, chunk_id: &str) -> Option<Chunk> {
        let groups = std::mem::take(&mut self.groups);
        let (groups, removed) = group::remove_chunk(groups, chunk_id);
        self.groups = groups;
        removed
    }

    pub fn find_chunk(&self, chunk_id: &str) -> Option<&Chunk> {
        group::find_chunk(&self.groups, chunk_id)
    }

    pub fn chunk_total(&self) -> usize {
        group::chunk_count(&self.groups)
    }
}

/// Compute a stable hash for chunk content
pub fn content_hash(text: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(text.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Directory of session files, one JSON file per pulled document
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn session_file(&self, corpus: Corpus, document_id: i64) -> PathBuf {
        self.dir.join(format!("{}-{}.json", corpus, document_id))
    }

    pub fn save(&self, session: &EditSession) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.session_file(session.corpus, session.document_id);
        let content = serde_json::to_string_pretty(session)?;
        fs::write(&path, content)?;
        debug!("Saved edit session to {:?}", path);
        Ok(path)
    }

    pub fn load(&self, corpus: Corpus, document_id: i64) -> Result<EditSession> {
        let path = self.session_file(corpus, document_id);
        if !path.exists() {
            return Err(Error::SessionMissing(document_id.to_string()));
        }
        let content = fs::read_to_string(&path)?;
        let session = serde_json::from_str(&content)
            .map_err(|e| Error::Session(format!("Corrupt session file {:?}: {}", path, e)))?;
        Ok(session)
    }

    /// Remove a session file. Returns whether one existed.
    pub fn delete(&self, corpus: Corpus, document_id: i64) -> Result<bool> {
        let path = self.session_file(corpus, document_id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        info!("Deleted edit session {:?}", path);
        Ok(true)
    }

    /// All readable sessions, newest pull first. Unreadable files are
    /// skipped with a warning.
    pub fn list(&self) -> Result<Vec<EditSession>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut sessions = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_session(&path) {
                Ok(session) => sessions.push(session),
                Err(e) => warn!("Skipping unreadable session {:?}: {}", path, e),
            }
        }
        sessions.sort_by(|a, b| b.pulled_at.cmp(&a.pulled_at));
        Ok(sessions)
    }
}

fn read_session(path: &Path) -> Result<EditSession> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MediaType, PageRef};
    use tempfile::TempDir;

    fn chunk(id: &str, index: i64, page: i64, content: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            chunk_index: index,
            page_number: PageRef::Single(page),
            media_type: MediaType::Text,
            source: None,
            content: content.to_string(),
        }
    }

    fn sample_session() -> EditSession {
        let groups = group::group_by_page(vec![
            chunk("a", 0, 1, "alpha"),
            chunk("b", 1, 1, "beta"),
            chunk("c", 2, 2, "gamma"),
        ]);
        EditSession::new(Corpus::Enterprise, 7, "report.pdf".to_string(), groups)
    }

    #[test]
    fn test_save_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());

        let session = sample_session();
        store.save(&session).unwrap();

        let loaded = store.load(Corpus::Enterprise, 7).unwrap();
        assert_eq!(loaded.document_id, 7);
        assert_eq!(loaded.title, "report.pdf");
        assert_eq!(loaded.chunk_total(), 3);
        assert_eq!(loaded.baseline.len(), 3);
        assert!(loaded.modified().is_empty());
    }

    #[test]
    fn test_load_missing_session() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());

        let err = store.load(Corpus::Enterprise, 99).unwrap_err();
        assert!(matches!(err, Error::SessionMissing(_)));
    }

    #[test]
    fn test_modified_tracks_content_hashes() {
        let mut session = sample_session();
        assert!(session.modified().is_empty());

        assert!(session.update_content("b", "beta v2"));
        let modified: Vec<&str> = session.modified().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(modified, vec!["b"]);

        // Restoring the original text clears the divergence
        assert!(session.update_content("b", "beta"));
        assert!(session.modified().is_empty());

        assert!(!session.update_content("nope", "x"));
    }

    #[test]
    fn test_remove_chunk_drops_emptied_group() {
        let mut session = sample_session();
        let removed = session.remove_chunk("c").unwrap();
        assert_eq!(removed.id, "c");
        assert_eq!(session.groups.len(), 1);
        assert_eq!(session.chunk_total(), 2);
        assert!(session.remove_chunk("c").is_none());
    }

    #[test]
    fn test_delete_and_list() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path());

        store.save(&sample_session()).unwrap();
        let mut other = sample_session();
        other.corpus = Corpus::General;
        other.document_id = 8;
        store.save(&other).unwrap();

        assert_eq!(store.list().unwrap().len(), 2);
        assert!(store.delete(Corpus::Enterprise, 7).unwrap());
        assert!(!store.delete(Corpus::Enterprise, 7).unwrap());
        assert_eq!(store.list().unwrap().len(), 1);
    }
}
