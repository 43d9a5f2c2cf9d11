//! Token-bounded chunking for embedding
//!
//! Tokens are whitespace-separated words, not model tokens. A model
//! tokenizer usually produces more tokens than there are words, so 512 words
//! can exceed a 512-token model budget. The default embedding model accepts
//! 8192 tokens, so the default is safe there; lower `retrieval.chunk_tokens`
//! for models with a small context. Chunks are slices of
//! the source text, so paragraph breaks inside a chunk survive.

/// Default upper bound of words per stored chunk
pub const MAX_CHUNK_TOKENS: usize = 512;

/// Byte spans of each whitespace-separated token
fn token_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;

    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

/// Number of tokens in `text`
pub fn token_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Split `text` into chunks of at most `max_tokens` tokens.
///
/// Empty or whitespace-only text yields no chunks. A `max_tokens` of zero is
/// treated as one.
pub fn chunk_by_tokens(text: &str, max_tokens: usize) -> Vec<String> {
    let max_tokens = max_tokens.max(1);
    token_spans(text)
        .chunks(max_tokens)
        .map(|window| {
            let start = window[0].0;
            let end = window[window.len() - 1].1;
            text[start..end].to_string()
        })
        .collect()
}

/// First `max_tokens` tokens of `text` (leading whitespace dropped)
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> &str {
    let spans = token_spans(text);
    if spans.is_empty() || max_tokens == 0 {
        return "";
    }
    if spans.len() <= max_tokens {
        return &text[spans[0].0..spans[spans.len() - 1].1];
    }
    &text[spans[0].0..spans[max_tokens - 1].1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(chunk_by_tokens("", 10).is_empty());
        assert!(chunk_by_tokens(" \n\t ", 10).is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_by_tokens("Diabetes is a chronic condition.", 512);
        assert_eq!(chunks, vec!["Diabetes is a chronic condition."]);
    }

    #[test]
    fn test_chunks_respect_limit() {
        let chunks = chunk_by_tokens("one two three four five six seven", 3);
        assert_eq!(chunks, vec!["one two three", "four five six", "seven"]);
    }

    #[test]
    fn test_chunk_keeps_inner_formatting() {
        let chunks = chunk_by_tokens("Symptoms:\n\n- thirst\n- fatigue", 10);
        assert_eq!(chunks, vec!["Symptoms:\n\n- thirst\n- fatigue"]);
    }

    #[test]
    fn test_multibyte_text() {
        let chunks = chunk_by_tokens("café naïve résumé über", 2);
        assert_eq!(chunks, vec!["café naïve", "résumé über"]);
    }

    #[test]
    fn test_truncate_to_tokens() {
        assert_eq!(truncate_to_tokens("  a b c d", 2), "a b");
        assert_eq!(truncate_to_tokens("a b", 5), "a b");
        assert_eq!(truncate_to_tokens("a b", 0), "");
    }

    proptest! {
        #[test]
        fn prop_chunks_bounded_and_cover_all_tokens(
            words in proptest::collection::vec("[a-zA-Zé0-9]{1,8}", 0..200),
            max in 1usize..64,
        ) {
            let text = words.join(" ");
            let chunks = chunk_by_tokens(&text, max);

            for chunk in &chunks {
                prop_assert!(token_count(chunk) <= max);
                prop_assert!(token_count(chunk) > 0);
            }

            let rejoined: Vec<&str> = chunks.iter().flat_map(|c| c.split_whitespace()).collect();
            let original: Vec<&str> = text.split_whitespace().collect();
            prop_assert_eq!(rejoined, original);
        }

        #[test]
        fn prop_truncate_is_prefix(text in "\\PC{0,300}", max in 0usize..50) {
            let truncated = truncate_to_tokens(&text, max);
            prop_assert!(token_count(truncated) <= max);
            prop_assert!(text.trim_start().starts_with(truncated));
        }
    }
}
