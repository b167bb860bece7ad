//! Helpers shared across the facade crates.

use std::fmt::Debug;

/// Debug wrapper that keeps credential material out of logs.
///
/// Account keys and SAS tokens land in `Debug` output through this type.
/// Anything shorter than 12 characters renders entirely as `***`; longer
/// values keep their first and last three characters, enough to tell two
/// keys apart without exposing either.
pub struct Redact<'a>(&'a str);

impl<'a> From<&'a str> for Redact<'a> {
    fn from(value: &'a str) -> Self {
        Redact(value)
    }
}

impl<'a> From<&'a String> for Redact<'a> {
    fn from(value: &'a String) -> Self {
        Redact(value.as_str())
    }
}

impl Debug for Redact<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.len() {
            0 => f.write_str("EMPTY"),
            n if n < 12 => f.write_str("***"),
            n => write!(f, "{}***{}", &self.0[..3], &self.0[n - 3..]),
        }
    }
}
