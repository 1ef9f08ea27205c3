//! Page grouping and media partitioning of document chunks.
//!
//! Chunks arrive as a flat list; the console renders them grouped by page,
//! with each page split into text, image and table sections. Grouping keys on
//! the structural identity of the page reference ([`PageRef::key`]), so page
//! `2` and spread `[2]` form distinct groups. Group order is first appearance
//! in the wire list; stored order inside a group is wire order, and only the
//! rendered partition sorts by `chunk_index`.
//!
//! Everything here is a pure function: inputs are taken by value or borrowed,
//! outputs are fresh collections.

use crate::types::{Chunk, MediaType, PageRef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Chunks sharing one page reference, in wire order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkGroup {
    pub page_number: PageRef,
    pub chunks: Vec<Chunk>,
}

/// A page group split for rendering: text first, then image sub-groups, then
/// the table section with its collected table image paths
#[derive(Debug)]
pub struct PagePartition<'a> {
    pub text: Vec<&'a Chunk>,
    pub images: Vec<ImageGroup<'a>>,
    pub tables: Vec<&'a Chunk>,
    /// Distinct `tables/` paths from table-chunk sources, insertion-ordered
    pub table_sources: Vec<String>,
}

/// Image chunks sharing a first source path
#[derive(Debug)]
pub struct ImageGroup<'a> {
    pub source: String,
    pub chunks: Vec<&'a Chunk>,
}

/// Group a wire chunk list by page, preserving first-appearance group order.
pub fn group_by_page(chunks: Vec<Chunk>) -> Vec<ChunkGroup> {
    let mut groups: Vec<ChunkGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for chunk in chunks {
        let key = chunk.page_number.key();
        match index.get(&key) {
            Some(&at) => groups[at].chunks.push(chunk),
            None => {
                index.insert(key, groups.len());
                groups.push(ChunkGroup {
                    page_number: chunk.page_number.clone(),
                    chunks: vec![chunk],
                });
            }
        }
    }

    groups
}

/// Split one group for rendering.
///
/// Chunks are ordered by `chunk_index` and split by media type: text chunks,
/// then image sub-groups keyed by each chunk's first source path (sourceless
/// image chunks get a per-chunk `unknown-{id}` key), then table chunks with
/// the deduplicated `tables/` paths their sources mention.
pub fn partition_group(group: &ChunkGroup) -> PagePartition<'_> {
    let mut ordered: Vec<&Chunk> = group.chunks.iter().collect();
    ordered.sort_by_key(|c| c.chunk_index);

    let mut text = Vec::new();
    let mut tables = Vec::new();
    let mut images: Vec<ImageGroup<'_>> = Vec::new();
    let mut image_index: HashMap<String, usize> = HashMap::new();
    let mut table_sources: Vec<String> = Vec::new();

    for chunk in ordered {
        match chunk.media_type {
            MediaType::Text => text.push(chunk),
            MediaType::Image => {
                let key = chunk.image_group_key();
                match image_index.get(&key) {
                    Some(&at) => images[at].chunks.push(chunk),
                    None => {
                        image_index.insert(key.clone(), images.len());
                        images.push(ImageGroup {
                            source: key,
                            chunks: vec![chunk],
                        });
                    }
                }
            }
            MediaType::Table => {
                if let Some(source) = &chunk.source {
                    for path in source.paths() {
                        if path.contains("tables/") && !table_sources.iter().any(|s| s == path) {
                            table_sources.push(path.to_string());
                        }
                    }
                }
                tables.push(chunk);
            }
        }
    }

    PagePartition {
        text,
        images,
        tables,
        table_sources,
    }
}

/// Filter groups by a case-insensitive content search.
///
/// Matching is per chunk; groups left empty disappear. An empty search
/// reproduces the input.
pub fn filter_groups(groups: &[ChunkGroup], search: &str) -> Vec<ChunkGroup> {
    if search.is_empty() {
        return groups.to_vec();
    }

    let needle = search.to_lowercase();
    groups
        .iter()
        .filter_map(|group| {
            let chunks: Vec<Chunk> = group
                .chunks
                .iter()
                .filter(|c| c.content.to_lowercase().contains(&needle))
                .cloned()
                .collect();
            if chunks.is_empty() {
                None
            } else {
                Some(ChunkGroup {
                    page_number: group.page_number.clone(),
                    chunks,
                })
            }
        })
        .collect()
}

/// Remove one chunk. A group left empty disappears. Returns the new groups
/// and the removed chunk, if the id existed.
pub fn remove_chunk(groups: Vec<ChunkGroup>, chunk_id: &str) -> (Vec<ChunkGroup>, Option<Chunk>) {
    let mut removed = None;
    let groups = groups
        .into_iter()
        .filter_map(|mut group| {
            if let Some(at) = group.chunks.iter().position(|c| c.id == chunk_id) {
                removed = Some(group.chunks.remove(at));
            }
            if group.chunks.is_empty() {
                None
            } else {
                Some(group)
            }
        })
        .collect();
    (groups, removed)
}

/// Replace one chunk's content. Returns the new groups and whether the id
/// existed. No other chunk is touched.
pub fn update_chunk_content(
    groups: Vec<ChunkGroup>,
    chunk_id: &str,
    content: &str,
) -> (Vec<ChunkGroup>, bool) {
    let mut touched = false;
    let groups = groups
        .into_iter()
        .map(|mut group| {
            for chunk in &mut group.chunks {
                if chunk.id == chunk_id {
                    chunk.content = content.to_string();
                    touched = true;
                }
            }
            group
        })
        .collect();
    (groups, touched)
}

/// Look up a chunk by id
pub fn find_chunk<'a>(groups: &'a [ChunkGroup], chunk_id: &str) -> Option<&'a Chunk> {
    groups
        .iter()
        .flat_map(|g| g.chunks.iter())
        .find(|c| c.id == chunk_id)
}

/// Total chunks across all groups
pub fn chunk_count(groups: &[ChunkGroup]) -> usize {
    groups.iter().map(|g| g.chunks.len()).sum()
}
