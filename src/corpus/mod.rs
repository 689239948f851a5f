//! Scraped support pages and the chunks cut from them.

mod chunker;
mod documents;

pub use chunker::{Chunker, ChunkerConfig, chunk_documents};
pub(crate) use chunker::split_sentences;
pub use documents::load_documents;

use serde::{Deserialize, Serialize};

/// One scraped page as written by the crawler.
///
/// Only `text` matters for indexing; pages without it are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    /// Which fetcher produced the page (`bs4`, `playwright`, ...).
    #[serde(default)]
    pub method: Option<String>,
}

impl Document {
    /// Page text, if present and not blank.
    pub fn body(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }

    /// Title for display, falling back to the url.
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.url)
    }
}

/// A retrievable passage and the metadata record stored beside its vector.
///
/// Serialized exactly as `{url, title, text}` in `meta.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub url: String,
    pub title: String,
    pub text: String,
}

impl Chunk {
    pub fn new(url: impl Into<String>, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            text: text.into(),
        }
    }
}
