//! Rich terminal display utilities for enhanced CLI output.
//!
//! Provides styled tables, progress bars, and formatted output
//! for a professional command-line experience.

pub mod help;
pub mod progress;
pub mod tables;
pub mod theme;

pub use help::create_help_text;
pub use progress::{create_progress_bar, create_spinner, with_spinner};
pub use tables::{TableBuilder, create_build_table, create_manifest_table, create_results_table};
pub use theme::{THEME, Theme};
