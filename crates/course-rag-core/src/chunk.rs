//! Sentence-boundary text chunker with overlap.
//!
//! Splits lesson text into chunks of at most `chunk_size` bytes. Splitting
//! happens on sentence boundaries so each chunk stays readable on its own,
//! and consecutive chunks share trailing sentences (up to `chunk_overlap`
//! bytes) so that context spanning a boundary is retrievable from either
//! side.
//!
//! # Algorithm
//!
//! 1. Collapse runs of whitespace into single spaces.
//! 2. Split into sentences after `.`, `!` or `?` followed by whitespace.
//! 3. Hard-split any sentence longer than `chunk_size` at the nearest space
//!    (or char boundary when there is none).
//! 4. Accumulate sentences until adding the next would exceed `chunk_size`,
//!    then flush the chunk.
//! 5. Start the next chunk with the trailing sentences of the previous one
//!    whose combined length fits in `chunk_overlap`.
//!
//! # Example
//!
//! ```rust
//! use course_rag_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("First sentence. Second sentence.", 800, 100);
//! assert_eq!(chunks, vec!["First sentence. Second sentence.".to_string()]);
//! ```

/// Split text into overlapping chunks on sentence boundaries.
///
/// Returns an empty vector for empty or whitespace-only text. Every
/// returned chunk is non-empty and at most `chunk_size` bytes long.
pub fn chunk_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return Vec::new();
    }

    let sentences: Vec<&str> = split_sentences(&normalized)
        .into_iter()
        .flat_map(|s| hard_split(s, chunk_size))
        .collect();

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < sentences.len() {
        let mut len = 0;
        let mut end = start;
        while end < sentences.len() {
            let add = if end == start {
                sentences[end].len()
            } else {
                sentences[end].len() + 1
            };
            if len + add > chunk_size && end > start {
                break;
            }
            len += add;
            end += 1;
        }

        chunks.push(sentences[start..end].join(" "));

        if end >= sentences.len() {
            break;
        }

        // Trailing sentences that fit in the overlap budget.
        let mut overlap_len = 0;
        let mut carried = 0;
        for s in sentences[start..end].iter().rev() {
            let add = if carried == 0 { s.len() } else { s.len() + 1 };
            if overlap_len + add > chunk_overlap {
                break;
            }
            overlap_len += add;
            carried += 1;
        }

        let next = end - carried;
        start = if next > start { next } else { end };
    }

    chunks
}

/// Split normalized text after sentence-ending punctuation.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut begin = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(next_i, next_c)) = chars.peek() {
                if next_c.is_whitespace() {
                    let sentence = text[begin..i + c.len_utf8()].trim();
                    if !sentence.is_empty() {
                        sentences.push(sentence);
                    }
                    begin = next_i;
                }
            }
        }
    }

    let tail = text[begin..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Break a sentence longer than `max` bytes into pieces of at most `max`.
fn hard_split(sentence: &str, max: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut remaining = sentence;

    while remaining.len() > max {
        let cut = snap_to_char_boundary(remaining, max);
        let cut = remaining[..cut]
            .rfind(' ')
            .filter(|&pos| pos > 0)
            .unwrap_or(cut);
        let cut = if cut == 0 {
            remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len())
        } else {
            cut
        };
        let piece = remaining[..cut].trim();
        if !piece.is_empty() {
            pieces.push(piece);
        }
        remaining = remaining[cut..].trim_start();
    }

    if !remaining.is_empty() {
        pieces.push(remaining);
    }
    pieces
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
