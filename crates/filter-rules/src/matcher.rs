//! Plain or regex text conditions.

use std::fmt;

use regex::Regex;

use crate::{Error, Result};

/// A text condition: exact equality or a full-string regex match.
#[derive(Clone)]
pub enum TextMatcher {
    /// Exact equality.
    Plain(String),
    /// Regex that must match the whole text.
    Regex(Regex),
}

impl TextMatcher {
    /// Exact-equality matcher.
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain(text.into())
    }

    /// Full-match regex matcher.
    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::new(&format!("^(?:{pattern})$"))
            .map(Self::Regex)
            .map_err(|source| Error::InvalidRegex {
                pattern: pattern.to_string(),
                source,
            })
    }

    /// Build from the two optional halves of a condition. Plain text wins
    /// when both are set; an empty pattern counts as unset.
    pub fn from_parts(plain: Option<&str>, pattern: Option<&str>) -> Result<Option<Self>> {
        match (plain, pattern) {
            (Some(text), _) => Ok(Some(Self::plain(text))),
            (None, Some(p)) if !p.is_empty() => Self::regex(p).map(Some),
            _ => Ok(None),
        }
    }

    /// Test one string.
    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Self::Plain(plain) => plain == text,
            Self::Regex(re) => re.is_match(text),
        }
    }

    /// True when any of `texts` matches.
    pub fn matches_any<'a, I>(&self, texts: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        texts.into_iter().any(|t| self.is_match(t))
    }
}

impl fmt::Debug for TextMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(text) => f.debug_tuple("Plain").field(text).finish(),
            Self::Regex(re) => f.debug_tuple("Regex").field(&re.as_str()).finish(),
        }
    }
}
