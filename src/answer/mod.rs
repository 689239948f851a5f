//! Turning retrieved chunks into an answer.
//!
//! Generation sits behind [`AnswerGenerator`]. The built-in
//! [`ExtractiveAnswerer`] quotes the retrieved sentences that best overlap the
//! question and refuses when the retrieval is too weak to ground an answer.
//! [`PromptedAnswerer`] sends the grounded prompt to any [`TextGenerator`],
//! which is where a hosted or local LLM plugs in.

mod prompt;

pub use prompt::{PromptConfig, build_context, build_prompt};

use crate::corpus::split_sentences;
use crate::error::RagResult;
use crate::retrieve::RetrievalResult;
use std::collections::HashSet;
use std::sync::Arc;

/// Produces an answer for `query` from ranked retrieval results.
pub trait AnswerGenerator: Send + Sync {
    fn generate(&self, query: &str, results: &[RetrievalResult]) -> RagResult<String>;
}

/// Completes a prompt. Implemented by whatever language model is deployed.
pub trait TextGenerator: Send + Sync {
    fn complete(&self, prompt: &str) -> RagResult<String>;
}

/// Answers by handing [`build_prompt`] output to a [`TextGenerator`].
///
/// Weak or empty retrieval is refused before the generator is called, and a
/// blank completion becomes the fallback sentence.
#[derive(Clone)]
pub struct PromptedAnswerer {
    generator: Arc<dyn TextGenerator>,
    config: PromptConfig,
}

impl PromptedAnswerer {
    pub fn new(generator: Arc<dyn TextGenerator>, config: PromptConfig) -> Self {
        Self { generator, config }
    }

    pub fn config(&self) -> &PromptConfig {
        &self.config
    }
}

impl AnswerGenerator for PromptedAnswerer {
    fn generate(&self, query: &str, results: &[RetrievalResult]) -> RagResult<String> {
        let grounded: Vec<RetrievalResult> = results
            .iter()
            .filter(|r| r.score >= self.config.min_score)
            .cloned()
            .collect();
        if grounded.is_empty() {
            tracing::debug!(target: "answer", "no result above min_score, refusing");
            return Ok(self.config.fallback.clone());
        }

        let prompt = build_prompt(query, &grounded, &self.config);
        tracing::debug!(
            target: "answer",
            sources = grounded.len(),
            prompt_chars = prompt.chars().count(),
            "calling text generator"
        );
        let completion = self.generator.complete(&prompt)?;
        let completion = completion.trim();
        if completion.is_empty() {
            return Ok(self.config.fallback.clone());
        }
        Ok(completion.to_string())
    }
}

impl std::fmt::Debug for PromptedAnswerer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptedAnswerer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Words too common to signal relevance.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "can", "do", "does", "for", "from", "how", "i", "in", "is", "it",
    "me", "my", "of", "on", "or", "the", "to", "what", "when", "where", "which", "who", "why",
    "will", "with", "you", "your",
];

/// Answers by quoting retrieved sentences.
#[derive(Debug, Clone, Default)]
pub struct ExtractiveAnswerer {
    config: PromptConfig,
}

impl ExtractiveAnswerer {
    pub fn new(config: PromptConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PromptConfig {
        &self.config
    }
}

struct Candidate<'a> {
    overlap: usize,
    rank: usize,
    order: usize,
    sentence: &'a str,
    url: &'a str,
}

impl AnswerGenerator for ExtractiveAnswerer {
    fn generate(&self, query: &str, results: &[RetrievalResult]) -> RagResult<String> {
        let best = results.iter().map(|r| r.score).fold(f32::NEG_INFINITY, f32::max);
        if results.is_empty() || best < self.config.min_score {
            tracing::debug!(target: "answer", best, "retrieval too weak, refusing");
            return Ok(self.config.fallback.clone());
        }

        let query_terms = terms(query);
        let mut candidates = Vec::new();
        for (rank, result) in results
            .iter()
            .enumerate()
            .filter(|(_, r)| r.score >= self.config.min_score)
        {
            for (order, sentence) in split_sentences(&result.meta.text).into_iter().enumerate() {
                let overlap = terms(sentence).intersection(&query_terms).count();
                if overlap > 0 {
                    candidates.push(Candidate {
                        overlap,
                        rank,
                        order,
                        sentence,
                        url: &result.meta.url,
                    });
                }
            }
        }

        candidates.sort_by(|a, b| {
            b.overlap
                .cmp(&a.overlap)
                .then(a.rank.cmp(&b.rank))
                .then(a.order.cmp(&b.order))
        });

        let mut seen = HashSet::new();
        let mut picked: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| seen.insert(c.sentence))
            .take(self.config.max_sentences.max(1))
            .collect();
        if picked.is_empty() {
            return Ok(self.config.fallback.clone());
        }
        // Read in source order rather than score order.
        picked.sort_by_key(|c| (c.rank, c.order));

        let mut urls: Vec<&str> = Vec::new();
        for candidate in &picked {
            if !urls.contains(&candidate.url) {
                urls.push(candidate.url);
            }
        }

        let body = picked
            .iter()
            .map(|c| c.sentence)
            .collect::<Vec<_>>()
            .join(" ");
        Ok(format!("{body}\n\nSources: {}", urls.join(", ")))
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}
