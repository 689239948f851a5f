//! Grounded prompt construction for a downstream text generator.

use crate::retrieve::RetrievalResult;
use serde::{Deserialize, Serialize};

const SOURCE_SEPARATOR: &str = "\n\n---\n\n";

/// Answer settings, also the `[answer]` settings section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Product named in the instructions.
    pub product: String,
    /// Sentence returned when the sources do not contain the answer.
    pub fallback: String,
    /// Stop adding sources once this many snippet characters are in.
    pub max_context_chars: usize,
    /// Characters taken from the start of each chunk.
    pub snippet_chars: usize,
    /// Best score below which the extractive answerer refuses.
    pub min_score: f32,
    pub max_sentences: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            product: "JioPay".to_string(),
            fallback: "I don't know, please check JioPay official support.".to_string(),
            max_context_chars: 3000,
            snippet_chars: 500,
            min_score: 0.3,
            max_sentences: 3,
        }
    }
}

/// Join `Source: <url>` blocks for the retrieved chunks.
///
/// The snippet that crosses `max_context_chars` is still included; the ones
/// after it are not.
pub fn build_context(results: &[RetrievalResult], config: &PromptConfig) -> String {
    let mut pieces = Vec::new();
    let mut added = 0usize;
    for result in results {
        let snippet: String = result.meta.text.chars().take(config.snippet_chars).collect();
        added += snippet.chars().count();
        pieces.push(format!("Source: {}\n{snippet}", result.meta.url));
        if added > config.max_context_chars {
            break;
        }
    }
    pieces.join(SOURCE_SEPARATOR)
}

/// Full instruction prompt for `query` grounded in `results`.
pub fn build_prompt(query: &str, results: &[RetrievalResult], config: &PromptConfig) -> String {
    let context = build_context(results, config);
    format!(
        "You are a helpful customer support assistant for {product}. \
         Answer the user's question using ONLY the provided sources. \
         If the answer is not in the sources, say: '{fallback}'\n\n\
         User question: {query}\n\n\
         Sources:\n{context}\n\n\
         Answer:",
        product = config.product,
        fallback = config.fallback,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Chunk;

    fn result(url: &str, text: &str) -> RetrievalResult {
        RetrievalResult {
            score: 0.9,
            meta: Chunk::new(url, url, text),
        }
    }

    #[test]
    fn test_prompt_contains_sources_and_fallback() {
        let results = vec![
            result("https://jiopay.com/faq", "Refunds take 5-7 days."),
            result("https://jiopay.com/contact", "Contact support via the app chat."),
        ];
        let prompt = build_prompt("How long do refunds take?", &results, &PromptConfig::default());

        assert!(prompt.contains("User question: How long do refunds take?"));
        assert!(prompt.contains("Source: https://jiopay.com/faq\nRefunds take 5-7 days."));
        assert!(prompt.contains("\n\n---\n\nSource: https://jiopay.com/contact"));
        assert!(prompt.contains("I don't know, please check JioPay official support."));
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn test_snippets_are_truncated() {
        let config = PromptConfig {
            snippet_chars: 10,
            ..Default::default()
        };
        let context = build_context(&[result("u", "0123456789abcdef")], &config);
        assert_eq!(context, "Source: u\n0123456789");
    }

    #[test]
    fn test_context_stops_after_budget_is_crossed() {
        let config = PromptConfig {
            snippet_chars: 10,
            max_context_chars: 15,
            ..Default::default()
        };
        let results: Vec<_> = (0..5).map(|i| result(&format!("u{i}"), "0123456789")).collect();
        let context = build_context(&results, &config);
        assert_eq!(context.matches("Source:").count(), 2);
    }

    #[test]
    fn test_no_results_gives_empty_context() {
        assert!(build_context(&[], &PromptConfig::default()).is_empty());
    }
}
