use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::{row_from_json, Row};

/// Reads document rows from `.json` and `.jsonl` files.
///
/// - `.json`: a single object or an array of objects
/// - `.jsonl`: one object per non-blank line
///
/// Non-object entries are skipped; malformed JSON is an error naming the file.
#[derive(Debug, Default)]
pub struct DocumentLoader;

impl DocumentLoader {
    pub fn new() -> Self {
        Self
    }

    /// Loads a single file, or every document file under a directory.
    pub fn load_path(&self, path: &Path) -> Result<Vec<Row>> {
        self.load_files(&self.list_document_files(path))
    }

    pub fn load_path_limited(&self, path: &Path, limit: usize) -> Result<Vec<Row>> {
        let mut files = self.list_document_files(path);
        if files.len() > limit {
            files.truncate(limit);
            tracing::debug!(limit, "limited document files");
        }
        self.load_files(&files)
    }

    pub fn load_files(&self, files: &[PathBuf]) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        for file in files {
            rows.extend(self.load_file(file)?);
        }
        tracing::debug!(files = files.len(), rows = rows.len(), "loaded documents");
        Ok(rows)
    }

    pub fn load_file(&self, file: &Path) -> Result<Vec<Row>> {
        let content = fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
        if has_extension(file, "jsonl") {
            let mut rows = Vec::new();
            for (line_no, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let value: serde_json::Value = serde_json::from_str(line)
                    .with_context(|| format!("parse {} line {}", file.display(), line_no + 1))?;
                rows.extend(row_from_json(value));
            }
            return Ok(rows);
        }
        let value: serde_json::Value =
            serde_json::from_str(&content).with_context(|| format!("parse {}", file.display()))?;
        Ok(match value {
            serde_json::Value::Array(items) => items.into_iter().filter_map(row_from_json).collect(),
            other => row_from_json(other).into_iter().collect(),
        })
    }

    /// Document files under `root` sorted by path; `root` itself when it is a file.
    pub fn list_document_files(&self, root: &Path) -> Vec<PathBuf> {
        if root.is_file() {
            return vec![root.to_path_buf()];
        }
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| has_extension(p, "json") || has_extension(p, "jsonl"))
            .collect();
        files.sort();
        files
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some(ext)
}
