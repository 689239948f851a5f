//! Building, persisting and reloading indexes through the public API.

use crate::common::{builder, jiopay_chunks, keyword_embedder, retriever, write_page};
use support_rag::vector::{ModelInfo, VectorDimension, inner_product};
use support_rag::{Chunk, Chunker, EmbeddingModelName, IndexStore, RagError, VectorIndex};
use tempfile::TempDir;

#[test]
fn test_round_trip_preserves_vectors_and_metadata() {
    let tmp = TempDir::new().unwrap();
    let report = builder(tmp.path())
        .build_index(jiopay_chunks(), "all-MiniLM-L6-v2")
        .unwrap();
    assert_eq!(report.dimension, 384);

    let loaded = IndexStore::new(tmp.path()).load().unwrap().unwrap();
    assert_eq!(loaded.len(), 4);
    assert_eq!(loaded.dimension().get(), 384);
    assert_eq!(loaded.model().name, EmbeddingModelName::AllMiniLmL6V2);
    assert_eq!(loaded.chunks(), jiopay_chunks().as_slice());

    let (embedder, _) = keyword_embedder();
    let chunks = jiopay_chunks();
    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    let expected = embedder.embed(&texts, "all-MiniLM-L6-v2").unwrap();
    for (position, vector) in expected.iter().enumerate() {
        assert_eq!(loaded.vector(position).unwrap(), vector.as_slice());
    }
}

#[test]
fn test_positions_stay_aligned_after_reload() {
    let tmp = TempDir::new().unwrap();
    builder(tmp.path())
        .build_index(jiopay_chunks(), "e5-small")
        .unwrap();
    let loaded = IndexStore::new(tmp.path()).load().unwrap().unwrap();

    // Each chunk's own text must rank its row first.
    let (embedder, _) = keyword_embedder();
    for (position, chunk) in jiopay_chunks().iter().enumerate() {
        let query = embedder
            .embed(&[chunk.text.as_str()], "e5-small")
            .unwrap()
            .remove(0);
        let hits = loaded.search(&query, 1).unwrap();
        assert_eq!(hits[0].position, position, "chunk {position} misaligned");
        assert_eq!(loaded.chunk(hits[0].position), Some(chunk));
        assert!((hits[0].score - 1.0).abs() < 1e-4);
    }
}

#[test]
fn test_dimension_is_enforced() {
    let model = ModelInfo::new(EmbeddingModelName::E5Small, VectorDimension::dimension_384());
    let chunk = Chunk::new("https://jiopay.com/faq", "FAQ", "Refunds take 5-7 days.");

    match VectorIndex::from_parts(model, vec![vec![0.1; 1024]], vec![chunk.clone()]) {
        Err(RagError::DimensionMismatch {
            expected,
            actual,
            position,
        }) => {
            assert_eq!(expected, 384);
            assert_eq!(actual, 1024);
            assert_eq!(position, 0);
        }
        other => panic!("Expected DimensionMismatch, got {other:?}"),
    }

    let mut unit = vec![0.0; 384];
    unit[0] = 1.0;
    let index = VectorIndex::from_parts(model, vec![unit], vec![chunk]).unwrap();
    assert!(matches!(
        index.search(&[1.0; 16], 1),
        Err(RagError::DimensionMismatch { .. })
    ));
}

#[test]
fn test_vector_and_record_counts_must_match() {
    let model = ModelInfo::new(EmbeddingModelName::E5Small, VectorDimension::dimension_384());
    let result = VectorIndex::from_parts(model, vec![vec![0.0; 384]; 2], jiopay_chunks());
    assert!(matches!(
        result,
        Err(RagError::LengthMismatch {
            vectors: 2,
            records: 4
        })
    ));
}

#[test]
fn test_top_k_is_capped_by_index_size() {
    let tmp = TempDir::new().unwrap();
    builder(tmp.path())
        .build_index(jiopay_chunks(), "e5-small")
        .unwrap();
    let retriever = retriever(tmp.path());

    assert_eq!(retriever.retrieve("refunds", "e5-small", 1).unwrap().len(), 1);
    assert_eq!(retriever.retrieve("refunds", "e5-small", 4).unwrap().len(), 4);

    let all = retriever.retrieve("refunds", "e5-small", 50).unwrap();
    assert_eq!(all.len(), 4);
    assert!(all.windows(2).all(|w| w[0].score >= w[1].score));

    assert!(matches!(
        retriever.retrieve("refunds", "e5-small", 0),
        Err(RagError::InvalidArgument { .. })
    ));
}

#[test]
fn test_empty_corpus_is_queryable() {
    let tmp = TempDir::new().unwrap();
    let report = builder(tmp.path()).build_index(Vec::new(), "e5-large").unwrap();
    assert_eq!(report.chunk_count, 0);
    assert_eq!(report.dimension, 1024);

    let manifest = IndexStore::new(tmp.path()).current_manifest().unwrap().unwrap();
    assert_eq!(manifest.vector_count, 0);
    assert_eq!(manifest.dimension, 1024);

    let results = retriever(tmp.path()).retrieve("refund", "e5-large", 5).unwrap();
    assert!(results.is_empty());
}

#[test]
fn test_missing_index_reports_not_built() {
    let tmp = TempDir::new().unwrap();
    let result = retriever(&tmp.path().join("never-built")).retrieve("refunds", "e5-small", 3);
    match result {
        Err(err @ RagError::IndexNotBuilt { .. }) => {
            assert_eq!(err.status_code(), "INDEX_NOT_BUILT");
        }
        other => panic!("Expected IndexNotBuilt, got {other:?}"),
    }
}

#[test]
fn test_build_from_scraped_pages() {
    let data = TempDir::new().unwrap();
    write_page(
        data.path(),
        "faq.json",
        "https://jiopay.com/faq",
        "FAQ",
        "JioPay refunds take 5-7 days.\n\nCashback is credited to the wallet.",
    );
    write_page(
        data.path(),
        "upi.json",
        "https://jiopay.com/upi",
        "UPI",
        "Link a UPI id to pay any merchant.",
    );
    std::fs::write(data.path().join("notes.txt"), "not a page").unwrap();

    let out = TempDir::new().unwrap();
    let report = builder(out.path())
        .build_from_corpus(data.path(), &Chunker::default(), "all-MiniLM-L6-v2")
        .unwrap();
    assert_eq!(report.chunk_count, 2);

    let loaded = IndexStore::new(out.path()).load().unwrap().unwrap();
    let urls: Vec<&str> = loaded.chunks().iter().map(|c| c.url.as_str()).collect();
    assert_eq!(urls, ["https://jiopay.com/faq", "https://jiopay.com/upi"]);

    let (embedder, _) = keyword_embedder();
    let query = embedder.embed(&["cashback wallet"], "all-MiniLM-L6-v2").unwrap();
    let score = inner_product(loaded.vector(0).unwrap(), &query[0]);
    assert!(score > 0.0);
}
