//! Boundary-aware overlapping text chunker.
//!
//! Advances a fixed-size window over the document. Before cutting, it
//! searches backward within the second half of the window for the last
//! sentence terminator or line break and cuts there, falling back to a
//! hard cut at the window boundary. Consecutive chunks share an overlap
//! region so retrieval keeps local context across cut points.
//!
//! Structural markup (markdown headers, separator rules) is stripped
//! before chunking so retrieved passages never leak it downstream.
//!
//! Chunking is deterministic: identical text and parameters always yield
//! identical chunk sequences and ids, which is what lets re-indexing a
//! source fully supersede the prior version.

use promptloom_core::DocumentChunk;

/// Splits raw document text into overlapping, boundary-aware chunks.
#[derive(Debug, Clone)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a chunker with a target window `size` and `overlap`, both in
    /// characters. The overlap is clamped below the size so the window
    /// always advances.
    pub fn new(size: usize, overlap: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            overlap: overlap.min(size - 1),
        }
    }

    /// Chunk `text`, tagging every chunk with `source`.
    ///
    /// Whitespace-only chunks are discarded; ids are `{source}::{n}` with
    /// `n` counting kept chunks from 0.
    pub fn chunk(&self, text: &str, source: &str) -> Vec<DocumentChunk> {
        let normalized = normalize(text);
        let chars: Vec<char> = normalized.chars().collect();

        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut index = 0usize;

        while start < chars.len() {
            let hard_end = (start + self.size).min(chars.len());
            let end = if hard_end < chars.len() {
                boundary_cut(&chars, start, hard_end)
            } else {
                hard_end
            };

            let piece: String = chars[start..end].iter().collect();
            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                chunks.push(DocumentChunk {
                    id: format!("{source}::{index}"),
                    text: trimmed.to_string(),
                    source: source.to_string(),
                });
                index += 1;
            }

            if end >= chars.len() {
                break;
            }

            // Advance from the actual cut point, keeping `overlap` chars of
            // trailing context in the next window.
            let next = end.saturating_sub(self.overlap);
            start = if next > start { next } else { end };
        }

        chunks
    }
}

/// Find a cut point at or before `hard_end`: the position just past the
/// last sentence terminator or line break in the second half of the
/// window, else `hard_end`.
fn boundary_cut(chars: &[char], start: usize, hard_end: usize) -> usize {
    let midpoint = start + (hard_end - start) / 2;
    for i in (midpoint..hard_end).rev() {
        if matches!(chars[i], '.' | '!' | '?' | '\n') {
            return i + 1;
        }
    }
    hard_end
}

/// Strip structural markup: markdown header markers and separator rules.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.len() >= 3
            && trimmed
                .chars()
                .all(|c| matches!(c, '-' | '=' | '*' | '_'))
        {
            continue;
        }
        out.push_str(strip_header_marker(trimmed));
        out.push('\n');
    }
    out
}

/// Remove a leading `#`-run header marker, keeping the heading text.
fn strip_header_marker(line: &str) -> &str {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if hashes > 0 {
        line[hashes..].trim_start()
    } else {
        line
    }
}
