//! Text cleanup for extracted document text before chunking.

/// Options for [`clean_text`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanOptions {
    /// Apply OCR character substitutions (`|` -> `I`, `0` -> `O`).
    ///
    /// Lossy: corrupts legitimate digits and bars, so it is off unless asked for.
    pub ocr_fixes: bool,
}

/// Typographic characters mapped to plain equivalents.
const TYPOGRAPHIC: &[(char, &str)] = &[
    ('\u{2018}', "'"),
    ('\u{2019}', "'"),
    ('\u{201c}', "\""),
    ('\u{201d}', "\""),
    ('\u{2013}', "-"),
    ('\u{2014}', "-"),
    ('\u{2026}', "..."),
    ('\u{00a0}', " "),
];

/// Punctuation kept as-is; any other non-alphanumeric, non-whitespace
/// character is treated as an extraction artifact and dropped.
const KEPT_PUNCTUATION: &str = ".,!?;:-()[]{}\"'";

/// Clean extracted text for TTS processing.
///
/// - Maps typographic quotes and dashes to ASCII
/// - Drops extraction artifacts (symbols other than common punctuation)
/// - Drops lines holding nothing but a number (page numbers)
/// - Collapses all whitespace, including newlines, to single spaces
/// - Inserts a space after `.`, `!` or `?` glued to a capital letter
/// - Optionally applies OCR substitutions
pub fn clean_text(text: &str, options: CleanOptions) -> String {
    let mut mapped = String::with_capacity(text.len());

    for c in strip_page_numbers(text).chars() {
        if let Some((_, r)) = TYPOGRAPHIC.iter().find(|(ch, _)| *ch == c) {
            mapped.push_str(r);
        } else if c.is_alphanumeric() || c.is_whitespace() || KEPT_PUNCTUATION.contains(c) {
            mapped.push(c);
        } else if options.ocr_fixes && c == '|' {
            mapped.push('I');
        }
    }

    if options.ocr_fixes {
        mapped = mapped.replace('0', "O");
    }

    let collapsed = collapse_whitespace(&mapped);
    space_after_sentences(&collapsed)
}

/// Collapse whitespace and make sure the text ends like a sentence.
pub fn prepare_for_tts(text: &str) -> String {
    let mut text = collapse_whitespace(text);
    if let Some(last) = text.chars().last() {
        if !matches!(last, '.' | '!' | '?') {
            text.push('.');
        }
    }
    text
}

fn strip_page_numbers(text: &str) -> String {
    text.lines()
        .filter(|line| !is_page_number(line.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_page_number(line: &str) -> bool {
    !line.is_empty() && line.chars().all(|c| c.is_ascii_digit())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn space_after_sentences(text: &str) -> String {
    let mut result = String::with_capacity(text.len() + 16);
    let mut prev: Option<char> = None;

    for c in text.chars() {
        if c.is_uppercase() && matches!(prev, Some('.' | '!' | '?')) {
            result.push(' ');
        }
        result.push(c);
        prev = Some(c);
    }

    result
}
