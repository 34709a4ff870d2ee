//! Length bounds and filler checks shared by the generating stages and assembly.

use serde::Serialize;
use thiserror::Error;

/// Phrases a generated section must never contain (case-insensitive, whole tokens).
pub const FILLER_DENYLIST: &[&str] = &[
    "to whom it may concern",
    "dynamic team",
    "fast-paced environment",
    "team player",
    "think outside the box",
    "hit the ground running",
    "go-getter",
    "synergy",
    "perfect fit",
    "results-driven",
    "detail-oriented",
];

/// Maximum words per section kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LengthBounds {
    pub opening_closing_words: usize,
    pub experience_words: usize,
}

impl Default for LengthBounds {
    fn default() -> Self {
        Self {
            opening_closing_words: 150,
            experience_words: 180,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("section is empty")]
    Empty,

    #[error("{words} words exceeds the bound of {max}")]
    TooLong { words: usize, max: usize },

    #[error("contains filler phrase '{0}'")]
    Filler(&'static str),
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Checks the word bound only. Assembly uses this; content quality is the
/// generating stage's concern.
pub fn check_length(text: &str, max_words: usize) -> Result<(), Rejection> {
    let words = word_count(text);
    if words == 0 {
        return Err(Rejection::Empty);
    }
    if words > max_words {
        return Err(Rejection::TooLong {
            words,
            max: max_words,
        });
    }
    Ok(())
}

/// First denylisted phrase in `text`, matched on whole tokens. Occurrences that
/// fall inside one of the `exempt` strings (company name, job title) don't count.
pub fn find_filler(text: &str, exempt: &[&str]) -> Option<&'static str> {
    let mut words: Vec<Option<String>> = tokens(text).into_iter().map(Some).collect();
    for name in exempt {
        let name_tokens = tokens(name);
        if name_tokens.is_empty() {
            continue;
        }
        for start in 0..words.len() {
            let end = start + name_tokens.len();
            if end > words.len() {
                break;
            }
            let hit = words[start..end]
                .iter()
                .zip(&name_tokens)
                .all(|(w, n)| w.as_deref() == Some(n.as_str()));
            if hit {
                words[start..end].iter_mut().for_each(|w| *w = None);
            }
        }
    }

    FILLER_DENYLIST.iter().copied().find(|phrase| {
        let phrase_tokens = tokens(phrase);
        words.windows(phrase_tokens.len()).any(|window| {
            window
                .iter()
                .zip(&phrase_tokens)
                .all(|(w, p)| w.as_deref() == Some(p.as_str()))
        })
    })
}

/// Checks a generated section against its bound and the denylist.
pub fn check_section(text: &str, max_words: usize, exempt: &[&str]) -> Result<(), Rejection> {
    check_length(text, max_words)?;
    match find_filler(text, exempt) {
        Some(phrase) => Err(Rejection::Filler(phrase)),
        None => Ok(()),
    }
}

/// Lowercase alphanumeric tokens. Shared by the classifier and the duplicate check.
pub fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Canonical form used for duplicate-paragraph detection.
pub fn normalize(text: &str) -> String {
    tokens(text).join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_section_accepts_text_within_bound() {
        assert!(check_section("I build retrieval systems for analysts.", 10, &[]).is_ok());
    }

    #[test]
    fn test_check_section_rejects_overlong_text() {
        let text = "word ".repeat(12);
        assert_eq!(
            check_section(&text, 10, &[]),
            Err(Rejection::TooLong { words: 12, max: 10 })
        );
    }

    #[test]
    fn test_check_section_rejects_filler_case_insensitively() {
        let err = check_section("I am a proven Team Player.", 50, &[]).unwrap_err();
        assert_eq!(err, Rejection::Filler("team player"));
    }

    #[test]
    fn test_check_section_rejects_blank() {
        assert_eq!(check_section("   \n", 50, &[]), Err(Rejection::Empty));
    }

    #[test]
    fn test_filler_matches_whole_tokens_only() {
        assert_eq!(find_filler("We reward synergistic thinking.", &[]), None);
        assert_eq!(
            find_filler("A fast paced environment awaits.", &[]),
            Some("fast-paced environment")
        );
    }

    #[test]
    fn test_company_and_title_words_are_exempt() {
        let text = "I am applying to Synergy Labs as a Team Player Coach.";
        assert_eq!(find_filler(text, &[]), Some("team player"));
        assert_eq!(find_filler(text, &["Synergy Labs", "Team Player Coach"]), None);
        // the same phrase outside the name still counts
        assert_eq!(
            find_filler("Synergy Labs values synergy.", &["Synergy Labs"]),
            Some("synergy")
        );
    }

    #[test]
    fn test_check_length_ignores_filler() {
        assert!(check_length("a true team player", 10).is_ok());
        assert_eq!(check_length("", 10), Err(Rejection::Empty));
    }

    #[test]
    fn test_normalize_ignores_case_and_punctuation() {
        assert_eq!(
            normalize("Hello,   World!\nIt's me."),
            normalize("hello world it s me")
        );
    }
}
