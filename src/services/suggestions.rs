//! Heuristic extraction of actionable suggestions from a free-text reply.
//!
//! A line qualifies when it contains one of the list markers anywhere in it,
//! not only at the start. `"Option 1. something"` therefore qualifies and is
//! kept verbatim, since the marker is not leading.

use regex::Regex;
use std::sync::OnceLock;

use crate::models::SuggestionList;

/// Upper bound on extracted suggestions
pub const MAX_SUGGESTIONS: usize = 4;

/// Substrings that mark a line as a list item
const MARKERS: [&str; 4] = ["•", "-", "1.", "2."];

static MARKER_PREFIX: OnceLock<Regex> = OnceLock::new();

/// Leading bullet, hyphen or numbered prefix plus trailing whitespace
fn marker_prefix() -> &'static Regex {
    MARKER_PREFIX
        .get_or_init(|| Regex::new(r"^(?:•|-|\d+\.)\s*").expect("marker prefix regex is valid"))
}

fn is_list_line(line: &str) -> bool {
    MARKERS.iter().any(|marker| line.contains(marker))
}

/// Derives up to [`MAX_SUGGESTIONS`] suggestions from `text`.
///
/// The first four qualifying lines are taken in order; each loses one leading
/// marker and is trimmed, and lines left empty are dropped afterwards, so the
/// result can hold fewer than four entries even when more lines qualify.
pub fn extract(text: &str) -> SuggestionList {
    text.split('\n')
        .filter(|line| is_list_line(line))
        .take(MAX_SUGGESTIONS)
        .map(|line| marker_prefix().replace(line, "").trim().to_string())
        .filter(|suggestion| !suggestion.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PICKS: &str =
        "Here are some picks:\n• Inception\n- The Matrix\n1. Arrival\nSomething with no marker\n2. Her";

    #[test]
    fn test_mixed_markers() {
        assert_eq!(extract(PICKS), vec!["Inception", "The Matrix", "Arrival", "Her"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(extract("").is_empty());
    }

    #[test]
    fn test_no_markers() {
        assert!(extract("I'd suggest Inception.\nIt is great").is_empty());
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(extract(PICKS), extract(PICKS));
    }

    #[test]
    fn test_caps_at_four() {
        let text = "- A\n- B\n- C\n- D\n- E\n- F";
        assert_eq!(extract(text), vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_mid_line_marker_qualifies() {
        let text = "Option 1. something\nplain line";
        assert_eq!(extract(text), vec!["Option 1. something"]);
    }

    #[test]
    fn test_hyphenated_word_qualifies() {
        let text = "Try Spider-Man: Into the Spider-Verse";
        assert_eq!(extract(text), vec!["Try Spider-Man: Into the Spider-Verse"]);
    }

    #[test]
    fn test_strips_only_one_marker() {
        assert_eq!(extract("- - nested"), vec!["- nested"]);
        assert_eq!(extract("1. 2. Twice"), vec!["2. Twice"]);
    }

    #[test]
    fn test_indented_marker_not_stripped() {
        assert_eq!(extract("   - Heat (1995)"), vec!["- Heat (1995)"]);
    }

    #[test]
    fn test_empty_after_strip_dropped_without_backfill() {
        let text = "-\n•\n- Alien\n- Aliens\n- Prometheus";
        assert_eq!(extract(text), vec!["Alien", "Aliens"]);
    }

    #[test]
    fn test_crlf_lines() {
        let text = "• Alien\r\n• Aliens\r\n";
        assert_eq!(extract(text), vec!["Alien", "Aliens"]);
    }

    #[test]
    fn test_multi_digit_numbering() {
        let text = "12. The Thing\n21. They Live";
        assert_eq!(extract(text), vec!["The Thing", "They Live"]);
    }
}
