//! Query-time behavior: ranking, answering and model handling.

use crate::common::{KeywordLoader, builder, jiopay_chunks, retriever};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use support_rag::answer::{AnswerGenerator, ExtractiveAnswerer, PromptConfig, build_prompt};
use support_rag::{Embedder, IndexBuilder, IndexStore, ModelCache, RagError, Retriever};
use tempfile::TempDir;

#[test]
fn test_refund_question_is_answered_from_faq() {
    let tmp = TempDir::new().unwrap();
    builder(tmp.path())
        .build_index(jiopay_chunks(), "all-MiniLM-L6-v2")
        .unwrap();

    let results = retriever(tmp.path())
        .retrieve("How long do refunds take?", "all-MiniLM-L6-v2", 3)
        .unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].meta.url, "https://jiopay.com/faq");
    assert_eq!(results[0].meta.text, "JioPay refunds take 5-7 days.");
    assert!(results[0].score > results[1].score);

    let answer = ExtractiveAnswerer::default()
        .generate("How long do refunds take?", &results)
        .unwrap();
    assert!(answer.contains("5-7 days"));
    assert!(answer.contains("https://jiopay.com/faq"));

    let prompt = build_prompt("How long do refunds take?", &results, &PromptConfig::default());
    assert!(prompt.contains("Source: https://jiopay.com/faq"));
    assert!(prompt.contains("How long do refunds take?"));
}

#[test]
fn test_unrelated_question_gets_fallback() {
    let tmp = TempDir::new().unwrap();
    builder(tmp.path())
        .build_index(jiopay_chunks(), "all-MiniLM-L6-v2")
        .unwrap();

    let results = retriever(tmp.path())
        .retrieve("Who won the cricket match?", "all-MiniLM-L6-v2", 3)
        .unwrap();
    let answerer = ExtractiveAnswerer::default();
    let answer = answerer.generate("Who won the cricket match?", &results).unwrap();
    assert_eq!(answer, answerer.config().fallback);
}

#[test]
fn test_query_model_must_match_index_model() {
    let tmp = TempDir::new().unwrap();
    builder(tmp.path())
        .build_index(jiopay_chunks(), "e5-small")
        .unwrap();

    match retriever(tmp.path()).retrieve("refunds", "e5-large", 3) {
        Err(err @ RagError::ModelMismatch { .. }) => {
            let msg = err.to_string();
            assert!(msg.contains("e5-small"), "message was: {msg}");
            assert!(msg.contains("e5-large"), "message was: {msg}");
        }
        other => panic!("Expected ModelMismatch, got {other:?}"),
    }
}

#[test]
fn test_unknown_model_lists_supported_names() {
    let tmp = TempDir::new().unwrap();
    match retriever(tmp.path()).retrieve("refunds", "text-embedding-3", 3) {
        Err(err @ RagError::ModelNotFound { .. }) => {
            assert!(err.to_string().contains("all-MiniLM-L6-v2"));
        }
        other => panic!("Expected ModelNotFound, got {other:?}"),
    }
}

#[test]
fn test_model_loaded_once_across_build_and_queries() {
    let tmp = TempDir::new().unwrap();
    let loader = KeywordLoader::default();
    let loads = loader.loads();
    let cache = Arc::new(ModelCache::new(Arc::new(loader)));

    IndexBuilder::new(Embedder::new(Arc::clone(&cache)), IndexStore::new(tmp.path()))
        .build_index(jiopay_chunks(), "all-MiniLM-L6-v2")
        .unwrap();
    let retriever = Arc::new(Retriever::new(
        Embedder::new(Arc::clone(&cache)),
        IndexStore::new(tmp.path()),
    ));

    let handles: Vec<_> = ["refunds", "upi merchant", "kyc aadhaar", "support chat"]
        .into_iter()
        .map(|query| {
            let retriever = Arc::clone(&retriever);
            thread::spawn(move || retriever.retrieve(query, "all-MiniLM-L6-v2", 2).unwrap())
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap().len(), 2);
    }

    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(cache.load_count(), 1);

    // A second model is a separate load; the first stays cached.
    retriever.retrieve("refunds", "all-MiniLM-L6-v2", 1).unwrap();
    Embedder::new(Arc::clone(&cache))
        .embed(&["refunds"], "e5-small")
        .unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 2);
}

#[test]
fn test_failed_query_leaves_retriever_usable() {
    let tmp = TempDir::new().unwrap();
    builder(tmp.path())
        .build_index(jiopay_chunks(), "e5-small")
        .unwrap();
    let retriever = retriever(tmp.path());

    assert!(retriever.retrieve("", "e5-small", 3).is_err());
    assert!(retriever.retrieve("refunds", "e5-large", 3).is_err());
    assert!(retriever.retrieve("refunds", "nope", 3).is_err());

    let results = retriever.retrieve("refunds", "e5-small", 3).unwrap();
    assert_eq!(results[0].meta.url, "https://jiopay.com/faq");
}
