//! Color theme for terminal output.

use console::Style;
use owo_colors::OwoColorize;
use std::sync::LazyLock;

/// Global theme instance shared by every command.
pub static THEME: LazyLock<Theme> = LazyLock::new(Theme::default);

/// Scores at or above this read as a confident match.
const STRONG_SCORE: f32 = 0.6;
/// Scores below this are unlikely to ground an answer.
const WEAK_SCORE: f32 = 0.3;

#[derive(Debug, Clone)]
pub struct Theme {
    pub success: Style,
    pub error: Style,
    pub warning: Style,
    pub header: Style,
    /// The generated answer text
    pub answer: Style,
    pub dim: Style,
    /// Source URLs and filesystem paths
    pub source: Style,
    pub number: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            success: Style::new().green().bright(),
            error: Style::new().red().bright(),
            warning: Style::new().yellow().bright(),
            header: Style::new().cyan().bold(),
            answer: Style::new().bold(),
            dim: Style::new().dim(),
            source: Style::new().magenta(),
            number: Style::new().cyan(),
        }
    }
}

impl Theme {
    pub fn success_with_icon(&self, text: &str) -> String {
        if Self::should_disable_colors() {
            format!("✓ {text}")
        } else {
            format!("{} {}", "✓".green(), self.success.apply_to(text))
        }
    }

    pub fn error_with_icon(&self, text: &str) -> String {
        if Self::should_disable_colors() {
            format!("✗ {text}")
        } else {
            format!("{} {}", "✗".red(), self.error.apply_to(text))
        }
    }

    pub fn warning_with_icon(&self, text: &str) -> String {
        if Self::should_disable_colors() {
            format!("⚠ {text}")
        } else {
            format!("{} {}", "⚠".yellow(), self.warning.apply_to(text))
        }
    }

    /// Similarity score, colored by how well it grounds an answer.
    pub fn score(&self, score: f32) -> String {
        let text = format!("{score:.3}");
        if Self::should_disable_colors() {
            text
        } else if score >= STRONG_SCORE {
            text.green().to_string()
        } else if score >= WEAK_SCORE {
            text.yellow().to_string()
        } else {
            text.red().to_string()
        }
    }

    /// Respects `NO_COLOR` and plain pipes.
    pub fn should_disable_colors() -> bool {
        use is_terminal::IsTerminal;
        std::env::var_os("NO_COLOR").is_some() || !std::io::stdout().is_terminal()
    }

    pub fn apply<T: std::fmt::Display>(&self, style: &Style, text: T) -> String {
        if Self::should_disable_colors() {
            text.to_string()
        } else {
            style.apply_to(text).to_string()
        }
    }
}
