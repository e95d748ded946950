//! Recursive character chunker for long documents.
//!
//! Text is split on a priority list of separators (paragraph break, line
//! break, sentence terminator, whitespace), trying the coarsest first and
//! descending only for spans that still exceed the size limit. The resulting
//! pieces are then merged back together greedily up to `chunk_size`, with up
//! to `chunk_overlap` characters of trailing context repeated at the start
//! of the next fragment so retrieval never loses a sentence to a boundary.
//!
//! Splitting is deterministic: identical input and policy always produce
//! identical fragment boundaries. Lengths are counted in Unicode scalar
//! values, not bytes.

use crate::models::{Fragment, RawDocument};

/// Splitting policy. Separators are tried in order, coarsest first.
#[derive(Debug, Clone)]
pub struct ChunkPolicy {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub separators: Vec<String>,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 100,
            separators: vec![
                "\n\n".to_string(),
                "\n".to_string(),
                ".".to_string(),
                " ".to_string(),
            ],
        }
    }
}

/// Split every document into fragments, each inheriting its parent's
/// metadata. Pre-chunked inputs should not pass through here.
pub fn split_documents(docs: &[RawDocument], policy: &ChunkPolicy) -> Vec<Fragment> {
    let mut fragments = Vec::new();
    for doc in docs {
        for piece in split_text(&doc.content, policy) {
            fragments.push(Fragment::new(piece, doc.meta.clone()));
        }
    }
    fragments
}

/// Split one text into fragments of at most `chunk_size` characters.
///
/// A span with none of the separators left to try is kept whole, so a single
/// indivisible unit longer than `chunk_size` produces one oversized fragment
/// rather than being cut mid-word.
pub fn split_text(text: &str, policy: &ChunkPolicy) -> Vec<String> {
    let pieces = split_recursive(text, &policy.separators, policy.chunk_size);
    merge_pieces(&pieces, policy)
        .into_iter()
        .map(|chunk| chunk.trim().to_string())
        .filter(|chunk| !chunk.is_empty())
        .collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

// Separators stay attached to the end of the piece they terminate, so the
// pieces concatenate back to the original text with no gaps.
fn split_recursive<'a>(text: &'a str, separators: &[String], max: usize) -> Vec<&'a str> {
    if char_len(text) <= max {
        return vec![text];
    }
    let found = separators
        .iter()
        .enumerate()
        .find(|(_, sep)| text.contains(sep.as_str()));
    let Some((idx, sep)) = found else {
        // No separator left: indivisible.
        return vec![text];
    };

    let mut pieces = Vec::new();
    for piece in text.split_inclusive(sep.as_str()) {
        if char_len(piece) <= max {
            pieces.push(piece);
        } else {
            pieces.extend(split_recursive(piece, &separators[idx + 1..], max));
        }
    }
    pieces
}

// Greedy merge: fill a window up to `chunk_size`, flush it, then seed the
// next window with trailing pieces totalling at most `chunk_overlap`.
fn merge_pieces(pieces: &[&str], policy: &ChunkPolicy) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut window: Vec<&str> = Vec::new();
    let mut window_len = 0usize;

    for &piece in pieces {
        let piece_len = char_len(piece);
        if window_len + piece_len > policy.chunk_size && !window.is_empty() {
            chunks.push(window.concat());
            while window_len > policy.chunk_overlap
                || (window_len + piece_len > policy.chunk_size && window_len > 0)
            {
                let dropped = window.remove(0);
                window_len -= char_len(dropped);
            }
        }
        window.push(piece);
        window_len += piece_len;
    }
    if !window.is_empty() {
        chunks.push(window.concat());
    }
    chunks
}
