use crate::config::PerformanceConfig;

/// A chunk of document text ready for embedding
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub index: usize,
    pub text: String,
    pub tokens: usize,
}

/// Split extracted document text into overlapping chunks.
///
/// Sizes are in approximate tokens (~4 characters per token). Chunk ends are
/// pulled back to the nearest whitespace or sentence punctuation within the
/// last fifth of the window, so words are not cut in half where avoidable.
pub fn chunk_document(text: &str, config: &PerformanceConfig) -> Vec<TextChunk> {
    chunk_text(text, config.chunk_size_tokens, config.chunk_overlap_tokens)
        .into_iter()
        .enumerate()
        .map(|(index, text)| TextChunk {
            index,
            tokens: estimate_tokens(&text),
            text,
        })
        .collect()
}

fn chunk_text(text: &str, size_tokens: usize, overlap_tokens: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let window = (size_tokens * 4).max(1);
    let overlap = overlap_tokens * 4;

    // Work in characters so slicing never lands inside a multi-byte sequence
    let offsets: Vec<(usize, char)> = text.char_indices().collect();
    let total = offsets.len();
    let byte_at = |char_idx: usize| -> usize {
        offsets.get(char_idx).map(|(b, _)| *b).unwrap_or(text.len())
    };

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < total {
        let mut end = (start + window).min(total);

        if end < total {
            let search_from = end.saturating_sub(window / 5).max(start + 1);
            if let Some(boundary) = (search_from..end)
                .rev()
                .find(|&i| is_break(offsets[i].1))
            {
                end = boundary + 1;
            }
        }

        let piece = text[byte_at(start)..byte_at(end)].trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }

        if end >= total {
            break;
        }

        // Overlap starts at a word boundary
        let mut next = end.saturating_sub(overlap);
        while next > 0 && next < end && !offsets[next - 1].1.is_whitespace() {
            next += 1;
        }
        start = if next <= start { end } else { next };
    }

    chunks
}

fn is_break(c: char) -> bool {
    c.is_whitespace() || matches!(c, '.' | '!' | '?')
}

/// Estimate token count from text (1 token ≈ 4 bytes, rounded up)
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}
