//! Custom help formatting for consistent CLI display.

use crate::display::theme::Theme;
use console::style;

/// Format help text with consistent styling
pub fn format_help_section(title: &str, content: &str, indent: bool) -> String {
    let mut output = String::new();

    // Section header
    if Theme::should_disable_colors() {
        output.push_str(&format!("{title}\n"));
    } else {
        output.push_str(&format!("{}\n", style(title).cyan().bold()));
    }

    for line in content.lines() {
        if line.trim().is_empty() {
            output.push('\n');
        } else if indent && !line.starts_with("    ") {
            output.push_str(&format!("    {line}\n"));
        } else {
            output.push_str(&format!("{line}\n"));
        }
    }

    output
}

/// Create styled help text for the CLI
pub fn create_help_text() -> String {
    let mut help = String::new();

    let quick_start = r#"$ support-rag init                         # Write .support-rag/settings.toml
$ support-rag index --progress             # Build from data/jiopay
$ support-rag ask "How long do refunds take?""#;

    help.push_str(&format_help_section("QUICK START", quick_start, true));
    help.push('\n');

    let examples = r#"# Rebuild with another embedding model
$ support-rag index --model e5-small

# Inspect the top chunks for a query as JSON
$ support-rag retrieve "KYC documents" --top-k 3 --json

# Show the active index generation
$ support-rag info

# Serve POST /chat for the web widget
$ support-rag serve --bind 0.0.0.0:8000"#;

    help.push_str(&format_help_section("EXAMPLES", examples, true));
    help.push('\n');

    let env = r#"RAG_EMBEDDING__MODEL=e5-small    overrides embedding.model
RAG_RETRIEVAL__TOP_K=8            overrides retrieval.top_k"#;

    help.push_str(&format_help_section("ENVIRONMENT", env, true));

    help
}
