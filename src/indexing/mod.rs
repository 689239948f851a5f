//! Building and publishing indexes from a document corpus.

mod builder;

pub use builder::{BuildReport, IndexBuilder};
