use crate::error::{AppError, Result};
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Trailing token runs that name an edition rather than a different game.
/// Longest first, so "digital deluxe edition" wins over "deluxe edition".
const EDITION_SUFFIXES: &[&[&str]] = &[
    &["game", "of", "the", "year", "edition"],
    &["digital", "deluxe", "edition"],
    &["game", "of", "the", "year"],
    &["goty", "edition"],
    &["deluxe", "edition"],
    &["definitive", "edition"],
    &["complete", "edition"],
    &["gold", "edition"],
    &["ultimate", "edition"],
    &["premium", "edition"],
    &["standard", "edition"],
    &["enhanced", "edition"],
    &["anniversary", "edition"],
    &["collectors", "edition"],
    &["goty"],
];

const JOINING_CHARS: [char; 4] = ['\'', '’', '`', '´'];
const TRADEMARKS: [char; 3] = ['®', '™', '©'];

pub struct TitleNormalizer;

impl TitleNormalizer {
    /// Join key for reconciliation: `"Half-Life 2: Deluxe Edition"` becomes
    /// `"half-life-2"`. Applying it to its own output changes nothing.
    pub fn key(title: &str) -> String {
        // Decompose before lower-casing: compatibility forms like 'ℌ' only
        // gain a lowercase once decomposed. Lower-casing can emit new
        // combining marks ('İ'), hence the second fold.
        let folded: String = title
            .nfkd()
            .filter(|c| !is_combining_mark(*c) && !TRADEMARKS.contains(c))
            .collect::<String>()
            .to_lowercase()
            .nfkd()
            .filter(|c| !is_combining_mark(*c))
            .collect();

        let mut tokens: Vec<String> = Vec::new();
        let mut current = String::new();
        for c in folded.chars() {
            if c.is_alphanumeric() {
                current.push(c);
            } else if JOINING_CHARS.contains(&c) {
                continue;
            } else if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            tokens.push(current);
        }

        Self::strip_edition_suffixes(&mut tokens);
        tokens.join("-")
    }

    fn strip_edition_suffixes(tokens: &mut Vec<String>) {
        'outer: loop {
            for suffix in EDITION_SUFFIXES {
                if tokens.len() > suffix.len() && tokens.ends_with_tokens(suffix) {
                    tokens.truncate(tokens.len() - suffix.len());
                    continue 'outer;
                }
            }
            break;
        }
    }

    /// Human-facing title: trademark signs dropped, whitespace collapsed.
    pub fn format_for_display(title: &str) -> String {
        title
            .chars()
            .filter(|c| !TRADEMARKS.contains(c))
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

trait EndsWithTokens {
    fn ends_with_tokens(&self, suffix: &[&str]) -> bool;
}

impl EndsWithTokens for Vec<String> {
    fn ends_with_tokens(&self, suffix: &[&str]) -> bool {
        self.len() >= suffix.len()
            && self[self.len() - suffix.len()..]
                .iter()
                .zip(suffix)
                .all(|(token, expected)| token == expected)
    }
}

/// Drops store entries that are not full games (demos, soundtracks, ...).
#[derive(Debug, Clone)]
pub struct TitleFilter {
    pattern: Option<Regex>,
}

impl TitleFilter {
    pub fn new(keywords: &[String]) -> Result<Self> {
        let alternatives: Vec<String> = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(regex::escape)
            .collect();

        if alternatives.is_empty() {
            return Ok(Self { pattern: None });
        }

        let pattern = Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|")))
            .map_err(|e| AppError::Config(format!("invalid excluded keyword: {e}")))?;
        Ok(Self {
            pattern: Some(pattern),
        })
    }

    pub fn allow_all() -> Self {
        Self { pattern: None }
    }

    pub fn is_excluded(&self, title: &str) -> bool {
        self.pattern
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(title))
    }
}
