//! Settings written by `init` drive a full build and query.

use crate::common::keyword_embedder;
use support_rag::{Chunker, IndexBuilder, IndexStore, Retriever, Settings};
use tempfile::TempDir;

#[test]
fn test_initialized_settings_drive_build_and_query() {
    let workspace = TempDir::new().unwrap();
    let config_path = Settings::init_config_file_in(workspace.path(), false).unwrap();

    let mut settings = Settings::load_from(&config_path).unwrap();
    settings.validate().unwrap();
    settings.workspace_root = Some(workspace.path().to_path_buf());

    let data_dir = settings.resolve_path(&settings.data_dir);
    std::fs::create_dir_all(&data_dir).unwrap();
    std::fs::write(
        data_dir.join("faq.json"),
        r#"{"url": "https://jiopay.com/faq", "title": "FAQ", "text": "JioPay refunds take 5-7 days."}"#,
    )
    .unwrap();

    let index_dir = settings.resolve_path(&settings.index_path);
    let report = IndexBuilder::new(keyword_embedder().0, IndexStore::new(&index_dir))
        .with_batch_size(settings.embedding.batch_size)
        .build_from_corpus(
            &data_dir,
            &Chunker::new(settings.chunking.clone()).unwrap(),
            &settings.embedding.model,
        )
        .unwrap();
    assert_eq!(report.chunk_count, 1);
    assert!(index_dir.starts_with(workspace.path()));

    let results = Retriever::new(keyword_embedder().0, IndexStore::new(&index_dir))
        .with_load_timeout(settings.retrieval.load_timeout())
        .retrieve("refunds", &settings.embedding.model, settings.retrieval.top_k)
        .unwrap();
    assert_eq!(results.len(), 1);
}

#[test]
fn test_second_init_requires_force() {
    let workspace = TempDir::new().unwrap();
    Settings::init_config_file_in(workspace.path(), false).unwrap();
    assert!(Settings::init_config_file_in(workspace.path(), false).is_err());
    assert!(Settings::init_config_file_in(workspace.path(), true).is_ok());
}
