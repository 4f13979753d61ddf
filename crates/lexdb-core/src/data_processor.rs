//! Turns a directory of `.txt` files into documents ready for writing.
//!
//! Document ids are the file path relative to the data directory. The parent
//! directory becomes the `category` metadata field; long files may optionally
//! be split into paragraph chunks.

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{Document, Meta};

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub max_words: usize,
    pub overlap_percent: f32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_words: 300, overlap_percent: 0.2 }
    }
}

#[derive(Default)]
pub struct DataProcessor {
    chunking: Option<ChunkingConfig>,
}

impl DataProcessor {
    pub fn new() -> Self { Self::default() }

    pub fn with_chunking(chunking: ChunkingConfig) -> Self { Self { chunking: Some(chunking) } }

    /// All `.txt` files under `root`, sorted.
    pub fn list_txt_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut txt_files = Vec::new();
        for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("txt") { txt_files.push(path.to_path_buf()); }
        }
        txt_files.sort();
        txt_files
    }

    /// Documents for one file, in namespace `namespace`.
    pub fn documents_from_file(&self, file_path: &Path, data_dir: &Path, namespace: &str) -> Result<Vec<Document>> {
        let content = read_file_content(file_path)?;
        let relative = file_path.strip_prefix(data_dir).unwrap_or(file_path);
        let doc_id = relative.to_string_lossy().replace('\\', "/");
        let mut meta = Meta::new();
        meta.insert("category".into(), Value::String(category_from_path(relative)));
        meta.insert("path".into(), Value::String(file_path.to_string_lossy().to_string()));

        let pieces = match &self.chunking {
            Some(cfg) => split_paragraphs(&content, cfg),
            None => vec![content],
        };
        let total = pieces.len();
        debug!(file = %file_path.display(), chunks = total, "prepared documents");
        Ok(pieces
            .into_iter()
            .enumerate()
            .map(|(i, piece)| {
                let id = if total == 1 { doc_id.clone() } else { format!("{}:{}", doc_id, i) };
                let mut doc = Document::new(id, piece).with_namespace(namespace);
                doc.meta = meta.clone();
                if total > 1 {
                    doc.meta.insert("chunk_index".into(), Value::from(i));
                    doc.meta.insert("total_chunks".into(), Value::from(total));
                }
                doc
            })
            .collect())
    }

    pub fn process_directory(&self, data_dir: &Path, namespace: &str) -> Result<Vec<Document>> {
        let mut docs = Vec::new();
        for file in self.list_txt_files(data_dir) { docs.extend(self.documents_from_file(&file, data_dir, namespace)?); }
        Ok(docs)
    }
}

fn read_file_content(file_path: &Path) -> Result<String> {
    match fs::read_to_string(file_path) {
        Ok(content) => Ok(content),
        Err(_) => {
            let bytes = fs::read(file_path).map_err(|e| Error::InvalidInput(format!("{}: {}", file_path.display(), e)))?;
            Ok(String::from_utf8_lossy(&bytes).to_string())
        }
    }
}

fn category_from_path(relative: &Path) -> String {
    match relative.parent().and_then(|p| p.to_str()) {
        Some(parent) if !parent.is_empty() => format!("/{}", parent.replace('\\', "/")),
        _ => "/misc".to_string(),
    }
}

/// Paragraph chunks of at most `max_words` words; oversized paragraphs are
/// split with `overlap_percent` word overlap.
fn split_paragraphs(content: &str, cfg: &ChunkingConfig) -> Vec<String> {
    let max_words = cfg.max_words.max(1);
    let overlap = ((max_words as f32 * cfg.overlap_percent) as usize).min(max_words - 1);
    let mut chunks = Vec::new();
    for paragraph in content.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        if words.len() <= max_words { chunks.push(paragraph.to_string()); continue; }
        let mut start = 0;
        while start < words.len() {
            let end = (start + max_words).min(words.len());
            chunks.push(words[start..end].join(" "));
            if end >= words.len() { break; }
            start = end - overlap;
        }
    }
    if chunks.is_empty() { chunks.push(String::new()); }
    chunks
}
