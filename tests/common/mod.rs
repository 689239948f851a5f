//! Shared fixtures for integration tests.
//!
//! `KeywordLoader` stands in for fastembed: it maps each known keyword to a
//! fixed axis of a model-sized vector, so similarity is predictable and no
//! weights are downloaded.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use support_rag::vector::VectorDimension;
use support_rag::{
    Chunk, Embedder, EmbeddingBackend, EmbeddingModelName, IndexBuilder, IndexStore, ModelCache,
    ModelLoader, RagResult, Retriever,
};

/// Words with their own axis; other words are ignored.
const KEYWORDS: &[&str] = &[
    "refund", "refunds", "days", "upi", "kyc", "aadhaar", "wallet", "cashback", "support", "chat",
    "merchant", "limit", "bill", "recharge", "contact", "app",
];

pub struct KeywordBackend {
    dimension: VectorDimension,
}

impl EmbeddingBackend for KeywordBackend {
    fn embed_raw(&self, texts: &[&str]) -> RagResult<Vec<Vec<f32>>> {
        let dim = self.dimension.get();
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0; dim];
                for word in text
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                    .map(str::to_lowercase)
                {
                    if let Some(axis) = KEYWORDS.iter().position(|k| *k == word) {
                        vector[axis] += 1.0;
                    }
                }
                vector
            })
            .collect())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}

/// Loader producing model-sized keyword vectors and counting its loads.
#[derive(Default)]
pub struct KeywordLoader {
    loads: Arc<AtomicUsize>,
}

impl KeywordLoader {
    pub fn loads(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.loads)
    }
}

impl ModelLoader for KeywordLoader {
    fn load(&self, model: EmbeddingModelName) -> RagResult<Arc<dyn EmbeddingBackend>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(KeywordBackend {
            dimension: model.dimension(),
        }))
    }
}

/// Embedder over a fresh cache, plus its load counter.
pub fn keyword_embedder() -> (Embedder, Arc<AtomicUsize>) {
    let loader = KeywordLoader::default();
    let loads = loader.loads();
    let cache = ModelCache::new(Arc::new(loader));
    (Embedder::new(Arc::new(cache)), loads)
}

pub fn jiopay_chunks() -> Vec<Chunk> {
    vec![
        Chunk::new(
            "https://jiopay.com/faq",
            "FAQ",
            "JioPay refunds take 5-7 days.",
        ),
        Chunk::new(
            "https://jiopay.com/contact",
            "Contact",
            "Contact support via the app chat.",
        ),
        Chunk::new(
            "https://jiopay.com/kyc",
            "KYC",
            "Complete KYC with your Aadhaar number to raise the wallet limit.",
        ),
        Chunk::new(
            "https://jiopay.com/upi",
            "UPI",
            "Link a UPI id to pay any merchant.",
        ),
    ]
}

pub fn builder(root: &Path) -> IndexBuilder {
    IndexBuilder::new(keyword_embedder().0, IndexStore::new(root))
}

pub fn retriever(root: &Path) -> Retriever {
    Retriever::new(keyword_embedder().0, IndexStore::new(root))
}

/// Write one scraped page the way the crawler leaves it on disk.
pub fn write_page(dir: &Path, file: &str, url: &str, title: &str, text: &str) {
    let page = serde_json::json!({
        "url": url,
        "title": title,
        "text": text,
        "method": "bs4",
    });
    std::fs::write(dir.join(file), page.to_string()).expect("Failed to write page");
}
