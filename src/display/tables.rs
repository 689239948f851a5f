//! Table formatting utilities for structured output.

use crate::indexing::BuildReport;
use crate::retrieve::RetrievalResult;
use crate::vector::IndexManifest;
use comfy_table::{
    Attribute, Cell, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
};

/// Longest snippet shown in a results table cell.
const SNIPPET_CHARS: usize = 160;

/// Builder for creating formatted tables.
pub struct TableBuilder {
    table: Table,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    /// Create a new table builder.
    pub fn new() -> Self {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        // Apply rounded corners
        table.apply_modifier(UTF8_ROUND_CORNERS);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        Self { table }
    }

    /// Set the table headers.
    pub fn set_headers(mut self, headers: Vec<&str>) -> Self {
        let header_cells: Vec<Cell> = headers
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect();
        self.table.set_header(header_cells);
        self
    }

    /// Add a row to the table.
    pub fn add_row(mut self, row: Vec<String>) -> Self {
        self.table.add_row(row);
        self
    }

    /// Build and return the formatted table.
    pub fn build(self) -> String {
        self.table.to_string()
    }
}

/// Ranked retrieval results: rank, score, source and a text snippet.
pub fn create_results_table(results: &[RetrievalResult]) -> String {
    results
        .iter()
        .enumerate()
        .fold(
            TableBuilder::new().set_headers(vec!["#", "Score", "Source", "Text"]),
            |table, (rank, result)| {
                table.add_row(vec![
                    (rank + 1).to_string(),
                    format!("{:.3}", result.score),
                    format!("{}\n{}", result.meta.title, result.meta.url),
                    snippet(&result.meta.text),
                ])
            },
        )
        .build()
}

/// Summary of a finished build.
pub fn create_build_table(report: &BuildReport) -> String {
    TableBuilder::new()
        .set_headers(vec!["Metric", "Value"])
        .add_row(vec!["Generation".into(), report.generation.clone()])
        .add_row(vec!["Model".into(), report.model.to_string()])
        .add_row(vec!["Dimension".into(), report.dimension.to_string()])
        .add_row(vec!["Chunks".into(), report.chunk_count.to_string()])
        .add_row(vec!["Time".into(), format!("{:.2?}", report.elapsed)])
        .build()
}

/// Details of the active generation.
pub fn create_manifest_table(generation: &str, manifest: &IndexManifest) -> String {
    TableBuilder::new()
        .set_headers(vec!["Field", "Value"])
        .add_row(vec!["Generation".into(), generation.to_string()])
        .add_row(vec!["Model".into(), manifest.model_name.clone()])
        .add_row(vec!["Dimension".into(), manifest.dimension.to_string()])
        .add_row(vec!["Vectors".into(), manifest.vector_count.to_string()])
        .add_row(vec!["Created".into(), manifest.created_at.clone()])
        .add_row(vec!["Metadata SHA-256".into(), manifest.metadata_sha256.clone()])
        .build()
}

fn snippet(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= SNIPPET_CHARS {
        return flat;
    }
    let mut cut: String = flat.chars().take(SNIPPET_CHARS).collect();
    cut.push('…');
    cut
}
