//! Pattern module: compiled regular expressions for the `matches` operator.

use std::fmt;
use regex::bytes::Regex;

use crate::WirevmError;

/// A regex compiled once, ahead of evaluation, and matched against raw bytes.
#[derive(Debug, Clone)]
pub struct Pattern {
    regex: Regex,
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self, WirevmError> {
        Ok(Self { regex: Regex::new(source)? })
    }

    pub fn source(&self) -> &str {
        self.regex.as_str()
    }

    pub fn is_match(&self, haystack: &[u8]) -> bool {
        self.regex.is_match(haystack)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source())
    }
}
