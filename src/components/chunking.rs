//! Document chunking for ingestion.

/// Split `text` into windows of `chunk_size` characters, each starting
/// `chunk_size - overlap` characters after the previous one.
///
/// Callers guarantee `overlap < chunk_size`; the snapshot validates this.
/// Empty or whitespace-only text yields no chunks.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.iter().all(|c| c.is_whitespace()) {
        return Vec::new();
    }

    let chunk_size = chunk_size.max(1);
    let step = chunk_size.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(chars.len());
        let chunk: String = chars[start..end].iter().collect();
        let trimmed = chunk.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_short_text_is_one_chunk() {
        assert_eq!(split_text("hello", 10, 2), vec!["hello".to_string()]);
    }

    #[test]
    fn test_windows_overlap() {
        let chunks = split_text("abcdefghij", 4, 1);
        assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn test_blank_text_has_no_chunks() {
        assert!(split_text("   \n", 4, 1).is_empty());
        assert!(split_text("", 4, 1).is_empty());
    }

    #[test]
    fn test_multibyte_characters_are_not_split() {
        let chunks = split_text("héllo wörld", 5, 0);
        assert_eq!(chunks, vec!["héllo", "wörl", "d"]);
    }
}
