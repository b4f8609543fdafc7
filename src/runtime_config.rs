//! # Runtime Configuration Module
//!
//! Environment variable-based configuration for table compilation and
//! request matching.
//!
//! ## Environment Variables
//!
//! ### `BRRTMATCH_REGEX_SIZE_LIMIT`
//!
//! Upper bound, in bytes, on the compiled size of one chunk regex. Chunks
//! over the limit are split in half and recompiled. Accepts values in:
//! - Decimal: `10485760` (10 MiB)
//! - Hexadecimal: `0xA00000` (10 MiB)
//!
//! Default: `0xA00000` (10 MiB, the regex crate's own default)
//!
//! ### `BRRTMATCH_CHUNK_LIMIT`
//!
//! Maximum number of routes per chunk before any size-based splitting.
//! Unset means all dynamic routes start in one chunk.
//!
//! ### `BRRTMATCH_REDIRECTS`
//!
//! `true` (default) lets GET/HEAD requests resolve to trailing-slash and
//! scheme redirects. `false` gives a plain matcher.
//!
//! ### `BRRTMATCH_SLOW_MATCH_US`
//!
//! Matches slower than this many microseconds are logged at `warn`.
//! Default: `1000`.
//!
//! ## Usage
//!
//! ```rust
//! use brrtmatch::runtime_config::{CompilerConfig, MatcherOptions};
//!
//! let compiler = CompilerConfig::from_env();
//! let options = MatcherOptions::from_env().redirects(false);
//! assert!(!options.redirects_enabled());
//! println!("regex size limit: {} bytes", compiler.regex_size_limit);
//! ```

use std::env;
use std::time::Duration;

/// Default regex size limit: 10 MiB.
pub const DEFAULT_REGEX_SIZE_LIMIT: usize = 0xA0_0000;

/// Default slow-match warning threshold in microseconds.
pub const DEFAULT_SLOW_MATCH_US: u64 = 1000;

/// Parse a size given in decimal or `0x` hexadecimal.
fn parse_size(value: &str) -> Option<usize> {
    let value = value.trim();
    if let Some(hex) = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        usize::from_str_radix(hex, 16).ok()
    } else {
        value.parse().ok()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Settings for building tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Compiled size limit of one chunk regex, in bytes.
    pub regex_size_limit: usize,
    /// Initial routes per chunk. `None` starts with a single chunk.
    pub chunk_limit: Option<usize>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            regex_size_limit: DEFAULT_REGEX_SIZE_LIMIT,
            chunk_limit: None,
        }
    }
}

impl CompilerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let regex_size_limit = env::var("BRRTMATCH_REGEX_SIZE_LIMIT")
            .ok()
            .and_then(|v| parse_size(&v))
            .unwrap_or(defaults.regex_size_limit);
        let chunk_limit = env::var("BRRTMATCH_CHUNK_LIMIT")
            .ok()
            .and_then(|v| parse_size(&v))
            .filter(|limit| *limit > 0);
        CompilerConfig {
            regex_size_limit,
            chunk_limit,
        }
    }

    #[must_use]
    pub fn with_regex_size_limit(mut self, limit: usize) -> Self {
        self.regex_size_limit = limit;
        self
    }

    #[must_use]
    pub fn with_chunk_limit(mut self, limit: usize) -> Self {
        self.chunk_limit = Some(limit.max(1));
        self
    }
}

/// Settings for a [`Matcher`](crate::matcher::Matcher).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatcherOptions {
    redirects: bool,
    slow_match_threshold: Duration,
    regex_size_limit: usize,
}

impl Default for MatcherOptions {
    fn default() -> Self {
        Self {
            redirects: true,
            slow_match_threshold: Duration::from_micros(DEFAULT_SLOW_MATCH_US),
            regex_size_limit: DEFAULT_REGEX_SIZE_LIMIT,
        }
    }
}

impl MatcherOptions {
    /// Load options from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let redirects = env::var("BRRTMATCH_REDIRECTS")
            .ok()
            .and_then(|v| parse_bool(&v))
            .unwrap_or(defaults.redirects);
        let slow_match_threshold = env::var("BRRTMATCH_SLOW_MATCH_US")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .map(Duration::from_micros)
            .unwrap_or(defaults.slow_match_threshold);
        let regex_size_limit = env::var("BRRTMATCH_REGEX_SIZE_LIMIT")
            .ok()
            .and_then(|v| parse_size(&v))
            .unwrap_or(defaults.regex_size_limit);
        Self {
            redirects,
            slow_match_threshold,
            regex_size_limit,
        }
    }

    /// Enable or disable redirect resolution.
    #[must_use]
    pub fn redirects(mut self, enabled: bool) -> Self {
        self.redirects = enabled;
        self
    }

    #[must_use]
    pub fn slow_match_threshold(mut self, threshold: Duration) -> Self {
        self.slow_match_threshold = threshold;
        self
    }

    #[must_use]
    pub fn regex_size_limit(mut self, limit: usize) -> Self {
        self.regex_size_limit = limit;
        self
    }

    pub fn redirects_enabled(&self) -> bool {
        self.redirects
    }

    pub fn slow_match(&self) -> Duration {
        self.slow_match_threshold
    }

    pub fn size_limit(&self) -> usize {
        self.regex_size_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("16384"), Some(16384));
        assert_eq!(parse_size("0x4000"), Some(0x4000));
        assert_eq!(parse_size(" 0X10 "), Some(16));
        assert_eq!(parse_size("lots"), None);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_defaults() {
        let compiler = CompilerConfig::default();
        assert_eq!(compiler.regex_size_limit, DEFAULT_REGEX_SIZE_LIMIT);
        assert_eq!(compiler.chunk_limit, None);

        let options = MatcherOptions::default();
        assert!(options.redirects_enabled());
        assert_eq!(options.slow_match(), Duration::from_millis(1));
    }

    #[test]
    fn test_builders() {
        let compiler = CompilerConfig::default()
            .with_chunk_limit(0)
            .with_regex_size_limit(1024);
        assert_eq!(compiler.chunk_limit, Some(1));
        assert_eq!(compiler.regex_size_limit, 1024);

        let options = MatcherOptions::default()
            .redirects(false)
            .slow_match_threshold(Duration::from_micros(5));
        assert!(!options.redirects_enabled());
        assert_eq!(options.slow_match(), Duration::from_micros(5));
    }
}
