//! Text chunker with fixed-window, paragraph, and semantic strategies.
//!
//! All sizes are measured in characters (Unicode scalar values), never
//! bytes, so multi-byte text is windowed the same way as ASCII.
//!
//! | Strategy | Boundaries | Overlap |
//! |----------|------------|---------|
//! | [`Fixed`](ChunkStrategy::Fixed) | every `chunk_size - overlap` chars | last `overlap` chars |
//! | [`Paragraph`](ChunkStrategy::Paragraph) | blank lines, then sentences | one carried sentence |
//! | [`Semantic`](ChunkStrategy::Semantic) | sentence similarity drops | none |
//!
//! Text of at most `chunk_size` characters is always returned unchanged as
//! a single chunk, and blank text produces no chunks at all.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::config::ChunkingConfig;
use crate::error::ChunkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    Fixed,
    #[default]
    Paragraph,
    Semantic,
}

impl ChunkStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStrategy::Fixed => "fixed",
            ChunkStrategy::Paragraph => "paragraph",
            ChunkStrategy::Semantic => "semantic",
        }
    }
}

impl fmt::Display for ChunkStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkStrategy {
    type Err = ChunkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(ChunkStrategy::Fixed),
            "paragraph" => Ok(ChunkStrategy::Paragraph),
            "semantic" => Ok(ChunkStrategy::Semantic),
            other => Err(ChunkError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Parameters for a single [`chunk_text`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkOptions {
    pub chunk_size: usize,
    pub overlap: usize,
    pub strategy: ChunkStrategy,
    /// Minimum token-overlap score for two consecutive sentences to stay in
    /// the same chunk (semantic strategy only).
    pub semantic_threshold: f64,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self::from_config(&ChunkingConfig::default())
    }
}

impl ChunkOptions {
    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            overlap: config.overlap,
            strategy: config.strategy,
            semantic_threshold: config.semantic_threshold,
        }
    }

    pub fn validate(&self) -> Result<(), ChunkError> {
        if self.chunk_size == 0 {
            return Err(ChunkError::ZeroChunkSize);
        }
        if self.overlap >= self.chunk_size {
            return Err(ChunkError::OverlapTooLarge {
                overlap: self.overlap,
                chunk_size: self.chunk_size,
            });
        }
        if !(0.0..=1.0).contains(&self.semantic_threshold) {
            return Err(ChunkError::ThresholdOutOfRange(self.semantic_threshold));
        }
        Ok(())
    }
}

/// Split `text` into ordered chunks according to `opts.strategy`.
pub fn chunk_text(text: &str, opts: &ChunkOptions) -> Result<Vec<String>, ChunkError> {
    opts.validate()?;

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    if char_len(text) <= opts.chunk_size {
        return Ok(vec![text.to_string()]);
    }

    let chunks = match opts.strategy {
        ChunkStrategy::Fixed => chunk_fixed(text, opts.chunk_size, opts.overlap),
        ChunkStrategy::Paragraph => chunk_paragraphs(text, opts),
        ChunkStrategy::Semantic => chunk_semantic(text, opts),
    };

    Ok(chunks)
}

/// Split text into sentences on `.`, `!` or `?` followed by whitespace.
///
/// A trailing fragment without terminal punctuation is kept as the last
/// sentence. Sentences are trimmed; empty ones are dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().is_some_and(|n| n.is_whitespace()) {
            push_trimmed(&mut sentences, &current);
            current.clear();
        }
    }
    push_trimmed(&mut sentences, &current);

    sentences
}

fn push_trimmed(out: &mut Vec<String>, s: &str) {
    let trimmed = s.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn chunk_fixed(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let step = size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}

/// Paragraphs are runs of non-blank lines separated by one or more blank
/// (whitespace-only) lines.
fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut lines: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !lines.is_empty() {
                paragraphs.push(lines.join("\n"));
                lines.clear();
            }
        } else {
            lines.push(line);
        }
    }
    if !lines.is_empty() {
        paragraphs.push(lines.join("\n"));
    }

    paragraphs
}

fn chunk_paragraphs(text: &str, opts: &ChunkOptions) -> Vec<String> {
    let size = opts.chunk_size;
    let mut chunks = Vec::new();
    let mut buf = String::new();
    let mut buf_len = 0usize;

    for para in split_paragraphs(text) {
        let para_len = char_len(&para);

        if para_len > size {
            if !buf.is_empty() {
                chunks.push(std::mem::take(&mut buf));
                buf_len = 0;
            }
            chunks.extend(split_long_paragraph(&para, size, opts.overlap));
            continue;
        }

        // +2 for the blank-line separator
        if !buf.is_empty() && buf_len + 2 + para_len > size {
            chunks.push(std::mem::take(&mut buf));
            buf_len = 0;
        }

        if !buf.is_empty() {
            buf.push_str("\n\n");
            buf_len += 2;
        }
        buf.push_str(&para);
        buf_len += para_len;
    }

    if !buf.is_empty() {
        chunks.push(buf);
    }

    chunks
}

/// Greedy sentence packing for a paragraph larger than one chunk. When a
/// chunk closes, its last sentence opens the next one.
fn split_long_paragraph(para: &str, size: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0usize;

    for sentence in split_sentences(para) {
        let s_len = char_len(&sentence);

        if s_len > size {
            if !current.is_empty() {
                chunks.push(current.join(" "));
                current.clear();
                current_len = 0;
            }
            chunks.extend(chunk_fixed(&sentence, size, overlap));
            continue;
        }

        if !current.is_empty() && current_len + 1 + s_len > size {
            let closed = current.join(" ");
            let carry = current
                .pop()
                .filter(|last| char_len(last) + 1 + s_len <= size);
            chunks.push(closed);
            current.clear();
            current_len = 0;
            if let Some(last) = carry {
                current_len = char_len(&last);
                current.push(last);
            }
        }

        current_len += if current.is_empty() { s_len } else { 1 + s_len };
        current.push(sentence);
    }

    if !current.is_empty() {
        chunks.push(current.join(" "));
    }

    chunks
}

fn chunk_semantic(text: &str, opts: &ChunkOptions) -> Vec<String> {
    let size = opts.chunk_size;
    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0usize;
    let mut prev_tokens: Option<HashSet<String>> = None;

    for sentence in split_sentences(text) {
        let tokens = token_set(&sentence);
        let s_len = char_len(&sentence);

        if s_len > size {
            if !current.is_empty() {
                chunks.push(current.join(" "));
                current.clear();
                current_len = 0;
            }
            chunks.extend(chunk_fixed(&sentence, size, opts.overlap));
            prev_tokens = Some(tokens);
            continue;
        }

        if !current.is_empty() {
            let similar = prev_tokens
                .as_ref()
                .map(|prev| token_overlap(prev, &tokens) >= opts.semantic_threshold)
                .unwrap_or(true);
            if !similar || current_len + 1 + s_len > size {
                chunks.push(current.join(" "));
                current.clear();
                current_len = 0;
            }
        }

        current_len += if current.is_empty() { s_len } else { 1 + s_len };
        current.push(sentence);
        prev_tokens = Some(tokens);
    }

    if !current.is_empty() {
        chunks.push(current.join(" "));
    }

    chunks
}

fn token_set(sentence: &str) -> HashSet<String> {
    sentence
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Jaccard similarity of two token sets; `0.0` when both are empty.
fn token_overlap(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}
