//! Budgeted context assembly.
//!
//! [`pack`] walks ranked results in order and appends each one as a
//! labeled block:
//!
//! ```text
//! [/path/to/file.md#3]
//! chunk text...
//! ```
//!
//! Blocks are separated by a newline. A block is only added if the running
//! text stays within `max_chars` and, when set, `max_tokens`; a block that
//! does not fit is left out whole and packing moves on to the next result.
//! Nothing is ever truncated mid-chunk: blocks carry the full chunk
//! content, never the preview snippet.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::debug;

use crate::config::PackConfig;
use crate::models::SearchResult;

#[derive(Debug, Clone, PartialEq)]
pub struct PackOptions {
    pub max_chars: usize,
    pub max_tokens: Option<usize>,
    /// Characters per token for the default token estimate.
    pub token_chars_ratio: f64,
    /// Skip results whose normalized text was already included.
    pub dedup: bool,
    /// Estimate tokens per block from word counts instead of characters.
    pub token_aware: bool,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self::from_config(&PackConfig::default())
    }
}

impl PackOptions {
    pub fn from_config(config: &PackConfig) -> Self {
        Self {
            max_chars: config.max_chars,
            max_tokens: config.max_tokens,
            token_chars_ratio: config.token_chars_ratio,
            dedup: config.dedup,
            token_aware: config.token_aware,
        }
    }

    pub fn with_max_chars(max_chars: usize) -> Self {
        Self {
            max_chars,
            ..Self::default()
        }
    }
}

/// Where an included block came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackedRef {
    pub chunk_id: i64,
    pub path: String,
    pub chunk_index: i64,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PackedContext {
    pub packed_text: String,
    pub included_refs: Vec<PackedRef>,
    /// Length of `packed_text` in characters.
    pub chars: usize,
    /// Estimated token count of `packed_text`.
    pub tokens: usize,
}

pub fn pack(query: &str, results: &[SearchResult], opts: &PackOptions) -> PackedContext {
    let mut packed = PackedContext::default();
    let mut seen: HashSet<String> = HashSet::new();

    for result in results {
        let content_key = opts.dedup.then(|| normalized_hash(&result.content));
        if let Some(key) = &content_key {
            if seen.contains(key) {
                debug!(chunk_id = result.chunk_id, "skipping duplicate chunk");
                continue;
            }
        }

        let block = format_block(result);
        let separator = usize::from(!packed.packed_text.is_empty());
        let chars = packed.chars + separator + block.chars().count();
        if chars > opts.max_chars {
            continue;
        }

        let tokens = if opts.token_aware {
            packed.tokens + word_token_estimate(&block)
        } else {
            char_token_estimate(chars, opts.token_chars_ratio)
        };
        if opts.max_tokens.is_some_and(|max| tokens > max) {
            continue;
        }

        if separator == 1 {
            packed.packed_text.push('\n');
        }
        packed.packed_text.push_str(&block);
        packed.chars = chars;
        packed.tokens = tokens;
        packed.included_refs.push(PackedRef {
            chunk_id: result.chunk_id,
            path: result.path.clone(),
            chunk_index: result.chunk_index,
            score: result.score,
        });
        if let Some(key) = content_key {
            seen.insert(key);
        }
    }

    debug!(
        query = %query,
        candidates = results.len(),
        included = packed.included_refs.len(),
        chars = packed.chars,
        tokens = packed.tokens,
        "packed context"
    );

    packed
}

fn format_block(result: &SearchResult) -> String {
    format!(
        "[{}#{}]\n{}\n",
        result.path,
        result.chunk_index,
        result.content.trim()
    )
}

fn char_token_estimate(chars: usize, ratio: f64) -> usize {
    (chars as f64 / ratio).ceil() as usize
}

/// Roughly four tokens per three words, plus one for the block label.
fn word_token_estimate(block: &str) -> usize {
    let words = block.split_whitespace().count();
    (words * 4).div_ceil(3) + 1
}

fn normalized_hash(text: &str) -> String {
    let normalized = text
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}
