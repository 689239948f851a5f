//! Loading scraped pages from a data directory.

use crate::corpus::Document;
use crate::error::{RagError, RagResult};
use std::path::Path;
use walkdir::WalkDir;

/// Read every `*.json` page directly under `dir`, in file-name order.
///
/// Files that fail to parse are skipped with a warning, as are pages with no
/// usable text. A missing directory is an error.
pub fn load_documents(dir: &Path) -> RagResult<Vec<Document>> {
    if !dir.is_dir() {
        return Err(RagError::storage(
            dir,
            std::io::Error::new(std::io::ErrorKind::NotFound, "data directory not found"),
        ));
    }

    let mut documents = Vec::new();
    let mut skipped = 0usize;

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            RagError::storage(path, e.into())
        })?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }

        let raw = std::fs::read_to_string(path).map_err(|e| RagError::storage(path, e))?;
        let document: Document = match serde_json::from_str(&raw) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(target: "corpus", path = %path.display(), error = %e, "skipping malformed page");
                skipped += 1;
                continue;
            }
        };

        if document.body().is_none() {
            tracing::debug!(target: "corpus", path = %path.display(), "skipping page without text");
            skipped += 1;
            continue;
        }
        documents.push(document);
    }

    tracing::info!(
        target: "corpus",
        dir = %dir.display(),
        loaded = documents.len(),
        skipped,
        "loaded documents"
    );
    Ok(documents)
}
