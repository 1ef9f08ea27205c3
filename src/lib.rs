//! kbctl - A CLI admin console for a document knowledge base
//!
//! This crate provides:
//! - CLI commands for browsing, uploading, and deleting knowledge documents
//! - A local edit-session workflow for reviewing and fixing extracted chunks
//! - RAG question answering against the enterprise and general corpora
//! - PDF deep links and in-terminal page text for source checking

pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod group;
pub mod pdf;
pub mod poll;
pub mod progress;
pub mod session;
pub mod types;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
