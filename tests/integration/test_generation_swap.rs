//! Publishing new generations while queries are running.

use crate::common::{builder, jiopay_chunks, retriever};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use support_rag::vector::CURRENT_FILE;
use support_rag::{Chunk, IndexStore, RagError};
use tempfile::TempDir;

fn small_corpus() -> Vec<Chunk> {
    jiopay_chunks().into_iter().take(2).collect()
}

#[test]
fn test_queries_see_whole_generations_during_rebuilds() {
    let tmp = TempDir::new().unwrap();
    let builder = builder(tmp.path());
    builder.build_index(jiopay_chunks(), "e5-small").unwrap();

    let retriever = Arc::new(retriever(tmp.path()));
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let retriever = Arc::clone(&retriever);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut seen = Vec::new();
                while !done.load(Ordering::SeqCst) {
                    let results = retriever.retrieve("refunds", "e5-small", 10).unwrap();
                    seen.push(results.len());
                }
                seen
            })
        })
        .collect();

    for round in 0..6 {
        let corpus = if round % 2 == 0 {
            small_corpus()
        } else {
            jiopay_chunks()
        };
        builder.build_index(corpus, "e5-small").unwrap();
    }
    done.store(true, Ordering::SeqCst);

    for reader in readers {
        for len in reader.join().unwrap() {
            assert!(len == 2 || len == 4, "query saw a partial index of {len} chunks");
        }
    }

    // The last build was the full corpus.
    assert_eq!(retriever.retrieve("refunds", "e5-small", 10).unwrap().len(), 4);
}

#[test]
fn test_retriever_swaps_to_latest_generation() {
    let tmp = TempDir::new().unwrap();
    let builder = builder(tmp.path());
    let first = builder.build_index(small_corpus(), "e5-small").unwrap();

    let retriever = retriever(tmp.path());
    assert_eq!(retriever.retrieve("refunds", "e5-small", 10).unwrap().len(), 2);
    assert_eq!(retriever.loaded_generation(), Some(first.generation.clone()));

    let second = builder.build_index(jiopay_chunks(), "e5-small").unwrap();
    assert_ne!(first.generation, second.generation);
    assert_eq!(retriever.retrieve("refunds", "e5-small", 10).unwrap().len(), 4);
    assert_eq!(retriever.loaded_generation(), Some(second.generation));
}

#[test]
fn test_old_generations_are_pruned() {
    let tmp = TempDir::new().unwrap();
    let builder = builder(tmp.path());
    let mut last = String::new();
    for _ in 0..4 {
        last = builder.build_index(small_corpus(), "e5-small").unwrap().generation;
    }

    let store = IndexStore::new(tmp.path());
    let generations = store.list_generations().unwrap();
    assert_eq!(generations.len(), 2);
    assert_eq!(generations.last(), Some(&last));
    assert_eq!(store.current_generation().unwrap(), Some(last));
}

#[test]
fn test_dangling_pointer_is_reported_as_corruption() {
    let tmp = TempDir::new().unwrap();
    builder(tmp.path())
        .build_index(small_corpus(), "e5-small")
        .unwrap();
    std::fs::write(tmp.path().join(CURRENT_FILE), "gen-19700101T000000.000000Z\n").unwrap();

    assert!(matches!(
        retriever(tmp.path()).retrieve("refunds", "e5-small", 3),
        Err(RagError::IndexCorrupted { .. })
    ));
}
