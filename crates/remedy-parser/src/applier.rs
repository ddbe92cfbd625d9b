// ABOUTME: Splices synthesized text into a source at a byte span
// ABOUTME: Bytes outside the span are carried over untouched; the result is never re-parsed

use remedy_core::{RemedyError, Result, Span};

/// `text[..span.start] + replacement + text[span.end..]`.
pub fn apply_span(text: &str, span: Span, replacement: &str) -> Result<String> {
    if span.start_byte > span.end_byte
        || span.end_byte > text.len()
        || !text.is_char_boundary(span.start_byte)
        || !text.is_char_boundary(span.end_byte)
    {
        return Err(RemedyError::InvalidOperation(format!(
            "span {}..{} does not fit a {}-byte source",
            span.start_byte,
            span.end_byte,
            text.len()
        )));
    }

    let mut out = String::with_capacity(text.len() - span.len() + replacement.len());
    out.push_str(&text[..span.start_byte]);
    out.push_str(replacement);
    out.push_str(&text[span.end_byte..]);
    Ok(out)
}

/// Insert `insertion` at `offset`; an empty-span splice.
pub fn insert_at(text: &str, offset: usize, insertion: &str) -> Result<String> {
    apply_span(text, Span::new(offset, offset), insertion)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_exactly_the_span() {
        let text = "head\nold body\ntail\n";
        let span = Span::new(5, 14);
        let patched = apply_span(text, span, "new\n").unwrap();
        assert_eq!(patched, "head\nnew\ntail\n");
        assert_eq!(&patched[..span.start_byte], &text[..span.start_byte]);
        assert_eq!(&patched[span.start_byte + 4..], &text[span.end_byte..]);
    }

    #[test]
    fn identical_replacement_is_a_no_op() {
        let text = "def f():\n    return 1\n";
        let span = Span::new(0, text.len());
        assert_eq!(apply_span(text, span, text).unwrap(), text);
    }

    #[test]
    fn replacement_is_not_validated() {
        let patched = apply_span("x = 1\n", Span::new(0, 5), "x = (").unwrap();
        assert_eq!(patched, "x = (\n");
    }

    #[test]
    fn rejects_out_of_range_and_split_characters() {
        assert!(apply_span("abc", Span::new(1, 9), "").is_err());
        assert!(apply_span("abc", Span::new(2, 1), "").is_err());
        // "é" is two bytes; offset 1 splits it
        assert!(apply_span("é = 1", Span::new(1, 2), "").is_err());
    }

    #[test]
    fn insert_keeps_both_sides() {
        assert_eq!(insert_at("ac", 1, "b").unwrap(), "abc");
        assert_eq!(insert_at("ab", 2, "c").unwrap(), "abc");
    }
}
