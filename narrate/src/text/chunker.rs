//! Sentence-aware chunking for TTS processing.

use super::TextChunk;

/// Default maximum chunk size in characters.
pub const DEFAULT_MAX_CHUNK_LEN: usize = 3000;

/// Split text into ordered chunks of at most `max_len` characters.
///
/// Sentences end at `.`, `!` or `?` followed by whitespace and are packed
/// greedily. A chunk that is still too long (one run-on sentence) is re-packed
/// at word boundaries. A single word longer than `max_len` is emitted as its
/// own chunk rather than cut.
pub fn split(text: &str, max_len: usize) -> Vec<TextChunk> {
    split_text(text, max_len)
        .into_iter()
        .enumerate()
        .map(|(index, text)| TextChunk::new(index, text))
        .collect()
}

/// Split text into chunk strings; see [`split`].
pub fn split_text(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let text = text.trim();

    if text.is_empty() {
        return Vec::new();
    }

    if char_len(text) <= max_len {
        return vec![text.to_string()];
    }

    let sentences = split_into_sentences(text);
    let packed = pack(sentences.iter().map(String::as_str), max_len);

    let mut chunks = Vec::with_capacity(packed.len());
    for chunk in packed {
        if char_len(&chunk) > max_len {
            chunks.extend(pack(chunk.split_whitespace(), max_len));
        } else {
            chunks.push(chunk);
        }
    }

    chunks
}

/// Split text into sentences at boundary punctuation followed by whitespace.
///
/// The punctuation stays with its sentence; the separating whitespace is
/// dropped.
pub fn split_into_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let Some(&(_, next)) = chars.peek() else {
            continue;
        };
        if !next.is_whitespace() {
            continue;
        }

        let end = i + c.len_utf8();
        push_trimmed(&mut sentences, &text[start..end]);

        // Consume the separating whitespace
        start = end;
        while let Some(&(j, w)) = chars.peek() {
            if !w.is_whitespace() {
                break;
            }
            start = j + w.len_utf8();
            chars.next();
        }
    }

    push_trimmed(&mut sentences, &text[start..]);
    sentences
}

/// Greedily accumulate pieces into space-joined chunks.
///
/// A chunk is closed when appending the next piece would exceed `max_len`;
/// a piece that alone exceeds `max_len` becomes its own chunk.
fn pack<'a>(pieces: impl IntoIterator<Item = &'a str>, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for piece in pieces {
        let piece_len = char_len(piece);

        if current.is_empty() {
            current.push_str(piece);
            current_len = piece_len;
        } else if current_len + 1 + piece_len <= max_len {
            current.push(' ');
            current.push_str(piece);
            current_len += 1 + piece_len;
        } else {
            chunks.push(std::mem::take(&mut current));
            current.push_str(piece);
            current_len = piece_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

fn push_trimmed(out: &mut Vec<String>, piece: &str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        out.push(piece.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn texts(chunks: &[TextChunk]) -> Vec<&str> {
        chunks.iter().map(TextChunk::text).collect()
    }

    fn without_whitespace(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn test_empty_text() {
        assert!(split("", 100).is_empty());
    }

    #[test]
    fn test_whitespace_only() {
        assert!(split("   \n\n   ", 100).is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let text = "Hello world. How are you?";
        let chunks = split(text, 280);
        assert_eq!(texts(&chunks), vec![text]);
        assert_eq!(chunks[0].index(), 0);
    }

    #[test]
    fn test_exactly_max_len_single_chunk() {
        let text = "abcde fghij";
        assert_eq!(texts(&split(text, 11)), vec![text]);
    }

    #[test]
    fn test_three_sentences_at_fifteen() {
        let text = "Sentence one. Sentence two. Sentence three.";
        let chunks = split(text, 15);
        assert_eq!(
            texts(&chunks),
            vec!["Sentence one.", "Sentence two.", "Sentence three."]
        );
        for chunk in &chunks {
            assert!(chunk.len() <= 15);
        }
    }

    #[test]
    fn test_sentences_are_packed() {
        let text = "One. Two. Three. Four.";
        assert_eq!(texts(&split(text, 10)), vec!["One. Two.", "Three.", "Four."]);
    }

    #[test]
    fn test_boundary_requires_whitespace() {
        let sentences = split_into_sentences("Pi is 3.14 exactly! Really?Yes. End");
        assert_eq!(sentences, vec!["Pi is 3.14 exactly!", "Really?Yes.", "End"]);
    }

    #[test]
    fn test_run_on_sentence_split_at_words() {
        let text = "one two three four five six seven";
        assert_eq!(
            texts(&split(text, 10)),
            vec!["one two", "three four", "five six", "seven"]
        );
    }

    #[test]
    fn test_oversized_token_kept_whole() {
        let text = "tiny supercalifragilistic word";
        let chunks = split(text, 8);
        assert_eq!(texts(&chunks), vec!["tiny", "supercalifragilistic", "word"]);
    }

    #[test]
    fn test_ordinals_are_dense() {
        let text = "First sentence. Second sentence. Third sentence. Fourth sentence. Fifth sentence.";
        let chunks = split(text, 30);
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index(), i);
        }
    }

    #[test]
    fn test_length_counts_characters() {
        // 5 chars, 10 bytes
        let text = "ééééé";
        assert_eq!(texts(&split(text, 5)), vec![text]);
    }

    #[test]
    fn test_zero_max_len_treated_as_one() {
        assert_eq!(texts(&split("a b", 0)), vec!["a", "b"]);
    }

    proptest! {
        #[test]
        fn prop_short_text_is_one_chunk(text in "[a-zA-Z]{1}[a-zA-Z .!?]{0,40}[a-zA-Z.]{1}") {
            let chunks = split(&text, 60);
            prop_assert_eq!(chunks.len(), 1);
            prop_assert_eq!(chunks[0].text(), text.as_str());
        }

        #[test]
        fn prop_chunks_bounded_unless_single_token(
            text in "[a-z]{1,12}([.!?]? [a-z]{1,12}){0,60}",
            max_len in 1usize..50,
        ) {
            for chunk in split(&text, max_len) {
                let single_token = !chunk.text().contains(char::is_whitespace);
                prop_assert!(chunk.len() <= max_len || single_token);
            }
        }

        #[test]
        fn prop_order_and_content_preserved(
            text in "[a-z]{1,12}([.!?]?[ \n]{1,2}[a-z]{1,12}){0,60}",
            max_len in 1usize..80,
        ) {
            let joined: String = split(&text, max_len)
                .iter()
                .map(TextChunk::text)
                .collect();
            prop_assert_eq!(without_whitespace(&joined), without_whitespace(&text));
        }
    }
}
