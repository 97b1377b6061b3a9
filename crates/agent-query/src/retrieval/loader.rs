//! Markdown documentation loading

use super::Document;
use crate::error::{QueryError, Result};
use ignore::WalkBuilder;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Load every `*.md` file under `root`, recursively, sorted by path
///
/// Hidden entries and gitignored paths are skipped; symlinks are not followed.
pub fn load_markdown_dir(root: impl AsRef<Path>) -> Result<Vec<Document>> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(QueryError::Retrieval(format!(
            "documentation directory not found: {}",
            root.display()
        )));
    }

    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .follow_links(false)
        .build();

    let mut documents = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| QueryError::Retrieval(e.to_string()))?;
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("md") {
            continue;
        }
        documents.push(read_document(root, path)?);
    }
    documents.sort_by(|a, b| a.path.cmp(&b.path));

    info!(root = %root.display(), count = documents.len(), "Loaded documentation");
    Ok(documents)
}

fn read_document(root: &Path, path: &Path) -> Result<Document> {
    let text = fs::read_to_string(path)?;
    let relative = path
        .strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let title = first_heading(&text).unwrap_or(stem);

    debug!(path = %relative, title = %title, "Loaded document");
    Ok(Document::new(relative, title, text))
}

fn first_heading(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim_start)
        .find(|line| line.starts_with('#'))
        .map(|line| line.trim_start_matches('#').trim().to_string())
        .filter(|title| !title.is_empty())
}
