//! Outbound text formatting for Messenger.
//!
//! Messenger renders plain text only, so model output is cleaned of
//! markdown markup before sending, then split into chunks that fit the
//! platform's message length limit. Chunk boundaries prefer paragraph
//! breaks, then sentence breaks.

use regex::Regex;
use std::sync::LazyLock;

/// Messenger's maximum message length.
pub const MAX_MESSAGE_LENGTH: usize = 2000;

// ============================================================================
// Regex Patterns
// ============================================================================

static CODE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[a-zA-Z0-9]*\n?([\s\S]*?)```").unwrap());
static LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").unwrap());
static BOLD_DOUBLE_ASTERISK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
static STRIKETHROUGH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"~~(.+?)~~").unwrap());
// Single asterisk is handled after double asterisk replacement to avoid
// conflicts.
static ITALIC_SINGLE_ASTERISK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*\n]+?)\*").unwrap());
static ITALIC_UNDERSCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_([^_\n]+?)_").unwrap());
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`\n]+?)`").unwrap());
static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#{1,6}[ \t]+(.+)$").unwrap());
static BLOCKQUOTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^>\s?(.*)$").unwrap());
static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

// ============================================================================
// Response Cleaning
// ============================================================================

/// Strip markdown markup from model output for a plain-text surface.
///
/// Bold/italic/strikethrough/code/heading/link/blockquote markers are
/// removed (content kept), runs of blank lines collapse to one, and outer
/// whitespace is trimmed. Pure text transform, no I/O.
pub fn clean_response(input: &str) -> String {
    let mut text = CODE_BLOCK.replace_all(input, "$1").into_owned();
    text = LINK.replace_all(&text, "$1").into_owned();
    text = BOLD_DOUBLE_ASTERISK.replace_all(&text, "$1").into_owned();
    text = STRIKETHROUGH.replace_all(&text, "$1").into_owned();
    text = ITALIC_SINGLE_ASTERISK.replace_all(&text, "$1").into_owned();
    text = ITALIC_UNDERSCORE.replace_all(&text, "$1").into_owned();
    text = INLINE_CODE.replace_all(&text, "$1").into_owned();
    text = HEADING.replace_all(&text, "$1").into_owned();
    text = BLOCKQUOTE.replace_all(&text, "$1").into_owned();
    text = BLANK_LINES.replace_all(&text, "\n\n").into_owned();
    text.trim().to_string()
}

// ============================================================================
// Message Chunking
// ============================================================================

/// Split a message into chunks that fit within the platform limit.
///
/// Paragraphs are accumulated into a chunk until adding the next one would
/// overflow `max_len`. A paragraph that alone exceeds the limit is split on
/// sentence boundaries with the same rule; a single sentence longer than
/// `max_len` is emitted as its own oversized chunk rather than cut
/// mid-sentence.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        if paragraph.len() > max_len {
            flush(&mut chunks, &mut current);
            split_paragraph(paragraph, max_len, &mut chunks);
        } else if current.is_empty() {
            current.push_str(paragraph);
        } else if current.len() + 2 + paragraph.len() <= max_len {
            current.push_str("\n\n");
            current.push_str(paragraph);
        } else {
            flush(&mut chunks, &mut current);
            current.push_str(paragraph);
        }
    }

    flush(&mut chunks, &mut current);
    chunks
}

fn flush(chunks: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        chunks.push(std::mem::take(current));
    }
}

/// Split an oversized paragraph on sentence boundaries.
fn split_paragraph(paragraph: &str, max_len: usize, chunks: &mut Vec<String>) {
    let mut current = String::new();

    for sentence in sentences(paragraph) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }

        if sentence.len() > max_len {
            // Accepted boundary violation: never cut inside a sentence
            flush(chunks, &mut current);
            chunks.push(sentence.to_string());
        } else if current.is_empty() {
            current.push_str(sentence);
        } else if current.len() + 1 + sentence.len() <= max_len {
            current.push(' ');
            current.push_str(sentence);
        } else {
            flush(chunks, &mut current);
            current.push_str(sentence);
        }
    }

    flush(chunks, &mut current);
}

/// Split a paragraph into sentences, keeping terminal punctuation.
///
/// A boundary is `.`, `!`, or `?` followed by whitespace or end of input,
/// so decimals and ellipses stay intact.
fn sentences(paragraph: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut iter = paragraph.char_indices().peekable();

    while let Some((i, c)) = iter.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = iter
                .peek()
                .map_or(true, |&(_, next)| next.is_whitespace());
            if at_boundary {
                let end = i + c.len_utf8();
                out.push(&paragraph[start..end]);
                start = end;
            }
        }
    }

    if start < paragraph.len() {
        out.push(&paragraph[start..]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    // ── clean_response ──────────────────────────────────────────────────

    #[test_case("**bold** text", "bold text" ; "double asterisk bold")]
    #[test_case("*emphasis* here", "emphasis here" ; "single asterisk italic")]
    #[test_case("_underscored_ word", "underscored word" ; "underscore italic")]
    #[test_case("~~gone~~ kept", "gone kept" ; "strikethrough")]
    #[test_case("`inline` code", "inline code" ; "inline code")]
    #[test_case("# Title", "Title" ; "h1 heading")]
    #[test_case("### Deep heading", "Deep heading" ; "h3 heading")]
    #[test_case("[docs](https://example.com)", "docs" ; "link keeps label")]
    #[test_case("> quoted line", "quoted line" ; "blockquote")]
    #[test_case("  padded  ", "padded" ; "outer trim")]
    fn clean_strips_markup(input: &str, expected: &str) {
        assert_eq!(clean_response(input), expected);
    }

    #[test]
    fn clean_keeps_code_block_content() {
        let input = "Before\n```rust\nlet x = 1;\n```\nAfter";
        let cleaned = clean_response(input);
        assert!(cleaned.contains("let x = 1;"));
        assert!(!cleaned.contains("```"));
    }

    #[test]
    fn clean_collapses_blank_line_runs() {
        let input = "one\n\n\n\ntwo";
        assert_eq!(clean_response(input), "one\n\ntwo");
    }

    #[test]
    fn clean_is_deterministic() {
        let input = "**a** _b_ `c`";
        assert_eq!(clean_response(input), clean_response(input));
    }

    // ── split_message ───────────────────────────────────────────────────

    #[test]
    fn split_short_message() {
        let result = split_message("Hello, World!", 2000);
        assert_eq!(result, vec!["Hello, World!".to_string()]);
    }

    #[test]
    fn split_empty_message() {
        assert!(split_message("   ", 2000).is_empty());
    }

    #[test]
    fn split_groups_paragraphs_within_limit() {
        let text = "First paragraph.\n\nSecond paragraph.";
        let result = split_message(text, 2000);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0], text);
    }

    #[test]
    fn split_flushes_at_paragraph_boundary() {
        let para_a = "a".repeat(60);
        let para_b = "b".repeat(60);
        let text = format!("{para_a}\n\n{para_b}");

        let result = split_message(&text, 100);
        assert_eq!(result, vec![para_a, para_b]);
    }

    #[test]
    fn split_oversized_paragraph_at_sentences() {
        let text = format!("{} {} {}", "First sentence here.", "x".repeat(80), "Last one.");
        let result = split_message(&text, 100);

        assert!(result.len() >= 2);
        assert!(result[0].starts_with("First sentence here."));
        for chunk in &result {
            assert!(chunk.len() <= 100, "chunk too long: {}", chunk.len());
        }
    }

    #[test]
    fn split_oversized_sentence_emitted_whole() {
        // A single sentence longer than the limit is the documented
        // exception to the length bound.
        let long_sentence = format!("{}.", "y".repeat(150));
        let result = split_message(&long_sentence, 100);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0], long_sentence);
    }

    #[test]
    fn split_preserves_paragraph_order() {
        let paragraphs: Vec<String> = (0..8).map(|i| format!("Paragraph number {i}.")).collect();
        let text = paragraphs.join("\n\n");

        let result = split_message(&text, 50);
        let rejoined = result.join("\n\n");
        for (i, para) in paragraphs.iter().enumerate() {
            let pos = rejoined.find(para.as_str());
            assert!(pos.is_some(), "paragraph {i} missing");
            if i > 0 {
                let prev = rejoined.find(paragraphs[i - 1].as_str()).unwrap();
                assert!(prev < pos.unwrap(), "paragraph {i} out of order");
            }
        }
    }

    #[test]
    fn split_respects_limit_for_all_regular_chunks() {
        let text = (0..30)
            .map(|i| format!("Sentence number {i} is right here. And another short one follows!"))
            .collect::<Vec<_>>()
            .join("\n\n");

        for chunk in split_message(&text, 120) {
            assert!(chunk.len() <= 120);
            assert!(!chunk.trim().is_empty());
        }
    }

    #[test]
    fn split_handles_multibyte_text() {
        let text = "Grüße aus München! Schöne Stadt. ".repeat(20);
        let result = split_message(&text, 100);
        assert!(!result.is_empty());
        for chunk in &result {
            assert!(chunk.len() <= 100 || !chunk.contains(' '));
        }
    }

    // ── sentences ───────────────────────────────────────────────────────

    #[test]
    fn sentences_split_on_terminal_punctuation() {
        let s = sentences("One here. Two there! Three maybe?");
        assert_eq!(s.len(), 3);
        assert_eq!(s[0], "One here.");
        assert_eq!(s[1].trim(), "Two there!");
    }

    #[test]
    fn sentences_keep_decimals_intact() {
        let s = sentences("Pi is 3.14 roughly. Euler has 2.71 too.");
        assert_eq!(s.len(), 2);
        assert!(s[0].contains("3.14"));
    }

    #[test]
    fn sentences_keep_trailing_fragment() {
        let s = sentences("Done. trailing words without period");
        assert_eq!(s.len(), 2);
        assert_eq!(s[1].trim(), "trailing words without period");
    }
}
