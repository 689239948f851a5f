//! Paragraph-first text chunking.
//!
//! Paragraphs are packed greedily up to `max_chars`. A paragraph that alone
//! exceeds the limit is cut at sentence ends, then at whitespace, and each
//! piece after the first repeats up to `overlap_chars` of the previous one.
//! All lengths count Unicode scalar values, not bytes.

use crate::corpus::{Chunk, Document};
use crate::error::{RagError, RagResult};
use serde::{Deserialize, Serialize};

/// Chunking limits, also the `[chunking]` settings section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
    pub min_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chars: 800,
            overlap_chars: 100,
            min_chars: 20,
        }
    }
}

impl ChunkerConfig {
    pub fn validate(&self) -> RagResult<()> {
        if self.max_chars == 0 {
            return Err(RagError::invalid_argument("chunking.max_chars must be positive"));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(RagError::invalid_argument(format!(
                "chunking.overlap_chars ({}) must be smaller than chunking.max_chars ({})",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            config: ChunkerConfig::default(),
        }
    }
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> RagResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split raw page text into chunk texts.
    pub fn chunk(&self, raw: &str) -> Vec<String> {
        let max = self.config.max_chars;
        let mut pieces = Vec::new();
        let mut current = String::new();

        for paragraph in paragraphs(raw) {
            let len = char_len(&paragraph);
            if len > max {
                flush(&mut current, &mut pieces);
                pieces.extend(self.split_long(&paragraph));
                continue;
            }

            if current.is_empty() {
                current = paragraph;
            } else if char_len(&current) + 2 + len <= max {
                current.push_str("\n\n");
                current.push_str(&paragraph);
            } else {
                flush(&mut current, &mut pieces);
                current = paragraph;
            }
        }
        flush(&mut current, &mut pieces);

        if pieces.len() > 1 {
            pieces.retain(|p| char_len(p) >= self.config.min_chars);
        }
        pieces
    }

    fn split_long(&self, paragraph: &str) -> Vec<String> {
        let max = self.config.max_chars;
        let overlap = self.config.overlap_chars;
        // Room left in a piece after the carried overlap and its separator.
        let budget = max.saturating_sub(overlap + 1).max(1);

        let units = split_sentences(paragraph).into_iter().flat_map(|sentence| {
            if char_len(sentence) > budget {
                word_windows(sentence, budget)
            } else {
                vec![sentence.to_string()]
            }
        });

        let mut pieces = Vec::new();
        let mut current = String::new();
        for unit in units {
            if current.is_empty() {
                current = unit;
            } else if char_len(&current) + 1 + char_len(&unit) <= max {
                current.push(' ');
                current.push_str(&unit);
            } else {
                let tail = overlap_tail(&current, overlap);
                pieces.push(std::mem::take(&mut current));
                current = if tail.is_empty() {
                    unit
                } else {
                    format!("{tail} {unit}")
                };
            }
        }
        flush(&mut current, &mut pieces);
        pieces
    }
}

/// Chunk every document, attaching its url and title.
pub fn chunk_documents(documents: &[Document], chunker: &Chunker) -> Vec<Chunk> {
    documents
        .iter()
        .filter_map(|doc| doc.body().map(|body| (doc, body)))
        .flat_map(|(doc, body)| {
            chunker
                .chunk(body)
                .into_iter()
                .map(move |text| Chunk::new(doc.url.clone(), doc.display_title(), text))
        })
        .collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn flush(current: &mut String, pieces: &mut Vec<String>) {
    if !current.is_empty() {
        pieces.push(std::mem::take(current));
    }
}

/// Blank-line separated paragraphs, lines joined by single spaces.
fn paragraphs(raw: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut lines: Vec<&str> = Vec::new();
    for line in raw.lines().map(str::trim) {
        if line.is_empty() {
            if !lines.is_empty() {
                out.push(lines.join(" "));
                lines.clear();
            }
        } else {
            lines.push(line);
        }
    }
    if !lines.is_empty() {
        out.push(lines.join(" "));
    }
    out
}

/// Sentences end at `.`, `!` or `?` followed by whitespace.
pub(crate) fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        if let Some(&(next_idx, next)) = chars.peek()
            && next.is_whitespace()
        {
            let sentence = text[start..i + c.len_utf8()].trim();
            if !sentence.is_empty() {
                out.push(sentence);
            }
            start = next_idx;
        }
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        out.push(rest);
    }
    out
}

/// Pack whitespace-separated words into windows of at most `limit` chars.
/// A single word longer than `limit` is hard-split.
fn word_windows(text: &str, limit: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let word_len = char_len(word);
        if word_len > limit {
            flush(&mut current, &mut out);
            let chars: Vec<char> = word.chars().collect();
            out.extend(chars.chunks(limit).map(|c| c.iter().collect::<String>()));
            continue;
        }
        if current.is_empty() {
            current.push_str(word);
        } else if char_len(&current) + 1 + word_len <= limit {
            current.push(' ');
            current.push_str(word);
        } else {
            flush(&mut current, &mut out);
            current.push_str(word);
        }
    }
    flush(&mut current, &mut out);
    out
}

/// Last `n` chars of `text`, starting at a word boundary when one exists.
fn overlap_tail(text: &str, n: usize) -> String {
    if n == 0 {
        return String::new();
    }
    let total = char_len(text);
    let tail: String = text.chars().skip(total.saturating_sub(n)).collect();
    if total <= n {
        return tail.trim().to_string();
    }
    match tail.find(char::is_whitespace) {
        Some(idx) => tail[idx..].trim().to_string(),
        None => tail.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(max: usize, overlap: usize, min: usize) -> Chunker {
        Chunker::new(ChunkerConfig {
            max_chars: max,
            overlap_chars: overlap,
            min_chars: min,
        })
        .unwrap()
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let pieces = Chunker::default().chunk("Refunds take 5-7 days.");
        assert_eq!(pieces, ["Refunds take 5-7 days."]);
    }

    #[test]
    fn test_paragraphs_are_packed_up_to_limit() {
        let text = "First paragraph here.\n\nSecond one.\n\n\nThird paragraph is a bit longer.";
        let pieces = chunker(40, 5, 1).chunk(text);
        assert_eq!(
            pieces,
            [
                "First paragraph here.\n\nSecond one.",
                "Third paragraph is a bit longer."
            ]
        );
    }

    #[test]
    fn test_long_paragraph_split_with_overlap() {
        let sentence = "Customers can request a refund from the app. ";
        let text = sentence.repeat(10);
        let pieces = chunker(120, 30, 1).chunk(&text);

        assert!(pieces.len() > 1);
        for piece in &pieces {
            assert!(char_len(piece) <= 120, "piece too long: {piece}");
        }
        // Every piece after the first starts with the tail of its predecessor
        for pair in pieces.windows(2) {
            let head: String = pair[1].split_whitespace().take(2).collect::<Vec<_>>().join(" ");
            assert!(pair[0].contains(&head), "no overlap between {pair:?}");
        }
    }

    #[test]
    fn test_sentence_without_spaces_is_hard_split() {
        let text = "x".repeat(250);
        let pieces = chunker(100, 10, 1).chunk(&text);
        assert!(pieces.iter().all(|p| char_len(p) <= 100));
        let joined: usize = pieces.iter().map(|p| p.matches('x').count()).sum();
        assert!(joined >= 250);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        // Devanagari letters are three bytes each
        let text = "भुगतान ".repeat(30);
        let pieces = chunker(60, 10, 1).chunk(&text);
        assert!(pieces.iter().all(|p| char_len(p) <= 60));
    }

    #[test]
    fn test_tiny_pieces_dropped_unless_alone() {
        let text = format!("{}\n\nok", "a long enough paragraph. ".repeat(4));
        let pieces = chunker(100, 10, 20).chunk(&text);
        assert!(pieces.iter().all(|p| p != "ok"));

        assert_eq!(chunker(100, 10, 20).chunk("ok"), ["ok"]);
    }

    #[test]
    fn test_blank_text_yields_nothing() {
        assert!(Chunker::default().chunk("  \n\n \n").is_empty());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_max() {
        let bad = ChunkerConfig {
            max_chars: 100,
            overlap_chars: 100,
            min_chars: 0,
        };
        assert!(matches!(
            Chunker::new(bad),
            Err(RagError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_chunk_documents_attaches_metadata() {
        let docs = vec![
            Document {
                url: "https://jiopay.com/faq".into(),
                title: Some("FAQ".into()),
                text: Some("Refunds take 5-7 days.".into()),
                method: Some("bs4".into()),
            },
            Document {
                url: "https://jiopay.com/contact".into(),
                title: None,
                text: Some("Contact support via the app chat.".into()),
                method: None,
            },
            Document {
                url: "https://jiopay.com/empty".into(),
                ..Default::default()
            },
        ];

        let chunks = chunk_documents(&docs, &Chunker::default());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].title, "FAQ");
        assert_eq!(chunks[1].title, "https://jiopay.com/contact");
        assert_eq!(chunks[1].text, "Contact support via the app chat.");
    }
}
