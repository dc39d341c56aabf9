//! Entity tags
//!
//! Tags are the upstream identifiers of clans and players, written like
//! `#2PP`. A [`Tag`] always holds the normalized form: uppercase, without
//! the leading `#` (or its URL-encoded `%23`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Characters the game uses when minting tags
pub const TAG_ALPHABET: &str = "0289PYLQGRJCUV";

/// Normalized entity tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tag(String);

impl Tag {
    /// Normalize a raw tag
    ///
    /// Accepts `#2pp`, `%232PP` and `2PP` alike. Fails when the remainder is
    /// empty or contains anything but ASCII letters and digits.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let stripped = trimmed
            .strip_prefix('#')
            .or_else(|| trimmed.strip_prefix("%23"))
            .unwrap_or(trimmed);
        let normalized = stripped.to_ascii_uppercase();

        if normalized.is_empty() {
            return Err(Error::invalid_tag(format!("empty tag: {raw:?}")));
        }
        if !normalized.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::invalid_tag(format!(
                "tag contains invalid characters: {raw:?}"
            )));
        }

        Ok(Self(normalized))
    }

    /// Normalize a raw tag and check it against the game's tag alphabet
    ///
    /// Used where a human typed the tag, so obvious typos are rejected
    /// before a request is spent on them.
    pub fn parse_strict(raw: &str) -> Result<Self> {
        let tag = Self::parse(raw)?;
        if !tag.0.chars().all(|c| TAG_ALPHABET.contains(c)) {
            return Err(Error::invalid_tag(format!(
                "{raw:?} contains characters outside {TAG_ALPHABET}"
            )));
        }
        Ok(tag)
    }

    /// Normalized tag without the leading `#`
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Tag in URL path form (`%23` prefix)
    pub fn url_encoded(&self) -> String {
        format!("%23{}", self.0)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl FromStr for Tag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Tag {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.to_string()
    }
}
