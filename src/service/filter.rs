//! Text filtering for chat messages and lobby names.

use regex::Regex;

use crate::error::{RelayError, Result};

/// Replacement glyph for every filtered character.
pub const MASK_CHAR: char = '\u{F004}';

/// Rewrites user-supplied text before it is stored or broadcast.
pub trait TextFilter: Send + Sync + std::fmt::Debug {
    fn filter(&self, text: &str) -> String;

    /// Short description for the admin console.
    fn describe(&self) -> String;
}

/// Leaves text untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl TextFilter for PassThrough {
    fn filter(&self, text: &str) -> String {
        text.to_owned()
    }

    fn describe(&self) -> String {
        "none".to_string()
    }
}

/// Masks each character of every match with [`MASK_CHAR`].
#[derive(Debug, Clone)]
pub struct RegexFilter {
    pattern: Regex,
}

impl RegexFilter {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| RelayError::ConfigError(format!("Invalid text filter '{pattern}': {e}")))?;
        Ok(Self { pattern })
    }
}

impl TextFilter for RegexFilter {
    fn filter(&self, text: &str) -> String {
        self.pattern
            .replace_all(text, |caps: &regex::Captures<'_>| {
                let count = caps[0].chars().count();
                std::iter::repeat(MASK_CHAR).take(count).collect::<String>()
            })
            .into_owned()
    }

    fn describe(&self) -> String {
        self.pattern.as_str().to_string()
    }
}
