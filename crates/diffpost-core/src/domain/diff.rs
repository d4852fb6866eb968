//! Diff normalizer: validates and canonicalizes the simplified diff format.
//!
//! A diff document is line-structured text:
//! - `#` comment lines
//! - `+` / `-` addition and removal lines
//! - blank separator lines
//!
//! Anything else is rejected. The function is pure and holds no state, so it
//! can be called from any number of request handlers at once.

use thiserror::Error;

/// Classification of a single input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineKind {
    Comment,
    Addition,
    Removal,
    Blank,
    Invalid,
}

impl LineKind {
    /// The leading marker character, if this kind has one.
    pub fn marker(self) -> Option<char> {
        match self {
            LineKind::Comment => Some('#'),
            LineKind::Addition => Some('+'),
            LineKind::Removal => Some('-'),
            LineKind::Blank | LineKind::Invalid => None,
        }
    }
}

/// Validation failure. `Display` is the message shown to the submitter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("Invalid line at {line}. No content after {marker}.")]
    MissingContent { line: usize, marker: char },

    #[error("Invalid line at {line}. Must start with +, -, or #.")]
    UnknownPrefix { line: usize },
}

impl NormalizeError {
    /// 1-based line number of the offending line.
    pub fn line(&self) -> usize {
        match self {
            NormalizeError::MissingContent { line, .. } | NormalizeError::UnknownPrefix { line } => {
                *line
            }
        }
    }
}

/// Whitespace as the chat front-end sees it: Unicode whitespace plus the
/// ASCII information separators U+001C..=U+001F.
fn is_blank_char(c: char) -> bool {
    c.is_whitespace() || ('\u{1c}'..='\u{1f}').contains(&c)
}

pub fn classify(line: &str) -> LineKind {
    if line.starts_with('#') {
        LineKind::Comment
    } else if line.starts_with('+') {
        LineKind::Addition
    } else if line.starts_with('-') {
        LineKind::Removal
    } else if line.chars().all(is_blank_char) {
        LineKind::Blank
    } else {
        LineKind::Invalid
    }
}

/// Validate `text` and return its canonical form.
///
/// Rules, applied line by line:
/// - `#`: whitespace after the marker collapses to exactly one space; the rest
///   of the comment is kept verbatim.
/// - `+` / `-`: whitespace after the marker collapses to one space, content is
///   upper-cased and right-trimmed. Empty content is an error.
/// - blank or whitespace-only: becomes an empty line; runs collapse to one.
/// - anything else is an error.
///
/// Processing stops at the first invalid line. Leading and trailing blank
/// lines are dropped from the output.
pub fn normalize(text: &str) -> Result<String, NormalizeError> {
    let mut fixed: Vec<String> = Vec::new();
    let mut previous_blank = false;

    for (index, line) in text.split('\n').enumerate() {
        let line_number = index + 1;
        let kind = classify(line);
        match kind {
            LineKind::Comment => {
                // markers are ASCII, so slicing past the first byte is safe
                fixed.push(format!("# {}", line[1..].trim_start_matches(is_blank_char)));
                previous_blank = false;
            }
            LineKind::Addition | LineKind::Removal => {
                let marker = if kind == LineKind::Addition { '+' } else { '-' };
                let content = line[1..].trim_start_matches(is_blank_char);
                if content.is_empty() {
                    return Err(NormalizeError::MissingContent {
                        line: line_number,
                        marker,
                    });
                }
                let content = content.to_uppercase();
                fixed.push(format!("{marker} {}", content.trim_end_matches(is_blank_char)));
                previous_blank = false;
            }
            LineKind::Blank => {
                if !previous_blank {
                    fixed.push(String::new());
                    previous_blank = true;
                }
            }
            LineKind::Invalid => {
                return Err(NormalizeError::UnknownPrefix { line: line_number });
            }
        }
    }

    let start = fixed
        .iter()
        .position(|line| !line.is_empty())
        .unwrap_or(fixed.len());
    let end = fixed
        .iter()
        .rposition(|line| !line.is_empty())
        .map_or(start, |last| last + 1);

    Ok(fixed[start..end].join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::basic("# hello\n+foo\n-bar", "# hello\n+ FOO\n- BAR")]
    #[case::blank_run("+a\n\n   \n\n+b", "+ A\n\n+ B")]
    #[case::outer_blanks("\n\n+a\n\n", "+ A")]
    #[case::comment_spacing("#    spaced   out  ", "# spaced   out  ")]
    #[case::comment_case_kept("#Keep Case", "# Keep Case")]
    #[case::bare_comment("#", "# ")]
    #[case::marker_spacing("+\t  sword of fire   ", "+ SWORD OF FIRE")]
    #[case::crlf("+foo\r\n# note\r", "+ FOO\n# note\r")]
    #[case::empty("", "")]
    #[case::only_blanks("\n \n\t\n", "")]
    #[case::separator_char_is_blank("+a\n\u{1f}\n+b", "+ A\n\n+ B")]
    #[case::separator_char_after_marker("#\u{1c}note", "# note")]
    fn normalizes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize(input).unwrap(), expected);
    }

    #[rstest]
    #[case::empty_addition("+   \n", "Invalid line at 1. No content after +.")]
    #[case::empty_removal("+ ok\n-", "Invalid line at 2. No content after -.")]
    #[case::no_marker("foo", "Invalid line at 1. Must start with +, -, or #.")]
    #[case::separator_char_only("+\u{1f}", "Invalid line at 1. No content after +.")]
    #[case::indented_marker("+ a\n\n  + b", "Invalid line at 3. Must start with +, -, or #.")]
    fn rejects(#[case] input: &str, #[case] message: &str) {
        let err = normalize(input).unwrap_err();
        assert_eq!(err.to_string(), message);
    }

    #[test]
    fn stops_at_first_invalid_line() {
        let err = normalize("bad\n+").unwrap_err();
        assert_eq!(err, NormalizeError::UnknownPrefix { line: 1 });
        assert_eq!(err.line(), 1);
    }

    #[test]
    fn normalized_output_is_a_fixed_point() {
        let inputs = [
            "# hello\n+foo\n-bar",
            "\n\n#   title\n+ a  \n\n\n\n- b\n#\n",
            "+ straße\n-\tmixed Case ",
            "+a\n\n   \n\n+b",
            "+foo\r\n# note\r",
            "+ ß\n\n\n- groß",
            "+a\n\u{1f}\n+b",
        ];
        for input in inputs {
            let once = normalize(input).unwrap();
            let twice = normalize(&once).unwrap();
            assert_eq!(once, twice, "input: {input:?}");
        }
    }

    #[test]
    fn classify_covers_every_kind() {
        assert_eq!(classify("# c"), LineKind::Comment);
        assert_eq!(classify("+x"), LineKind::Addition);
        assert_eq!(classify("-x"), LineKind::Removal);
        assert_eq!(classify(" \t"), LineKind::Blank);
        assert_eq!(classify(" +x"), LineKind::Invalid);
        assert_eq!(LineKind::Removal.marker(), Some('-'));
        assert_eq!(LineKind::Blank.marker(), None);
    }
}
