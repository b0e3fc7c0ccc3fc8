//! Plain-text splitter: fixed word-count windows, no overlap.

/// Split text into consecutive windows of at most `words_per_chunk` words.
/// Whitespace-only input yields no segments.
pub fn split_words(text: &str, words_per_chunk: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    words
        .chunks(words_per_chunk.max(1))
        .map(|window| window.join(" "))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_text_single_segment() {
        let segments = split_words("hello wide world", 400);
        assert_eq!(segments, vec!["hello wide world"]);
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(split_words("", 400).is_empty());
        assert!(split_words("   \n\t ", 400).is_empty());
    }

    #[test]
    fn windows_are_exact_and_sequential() {
        let text = (0..1000).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let segments = split_words(&text, 400);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].split_whitespace().count(), 400);
        assert_eq!(segments[1].split_whitespace().count(), 400);
        assert_eq!(segments[2].split_whitespace().count(), 200);
        assert!(segments[0].starts_with("w0 "));
        assert!(segments[1].starts_with("w400 "));
        assert!(segments[2].starts_with("w800 "));
    }

    #[test]
    fn collapses_internal_whitespace() {
        let segments = split_words("a\n\nb\t c", 400);
        assert_eq!(segments, vec!["a b c"]);
    }
}
