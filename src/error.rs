//! Error types for route compilation, table loading and request matching.
//!
//! Three families exist:
//!
//! - [`ConfigError`] - raised while compiling routes into tables. These are
//!   fatal: a route set that produces one cannot be served.
//! - [`MatchError`] - the well-defined "no match" outcomes of a request.
//! - [`ArtifactError`] - reading, writing or rendering a compiled artifact.

use thiserror::Error;

/// A route definition that cannot be compiled.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable requirement is not a valid regex.
    #[error("route \"{path}\": requirement for \"{variable}\" is invalid: {source}")]
    InvalidRequirement {
        path: String,
        variable: String,
        #[source]
        source: Box<regex::Error>,
    },

    /// Structural problem with a path or host pattern.
    #[error("route pattern \"{pattern}\": {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A condition expression failed to parse.
    #[error("condition \"{expression}\" cannot be compiled: {reason}")]
    InvalidCondition { expression: String, reason: String },

    /// A single route produced a regex over the engine's size limit.
    #[error("route regex exceeds the size limit even with one route per chunk (limit {limit} bytes)")]
    RegexTooLarge { limit: usize },

    /// Any other regex construction failure.
    #[error("failed to build route regex: {0}")]
    Regex(#[from] regex::Error),
}

impl ConfigError {
    pub(crate) fn pattern(pattern: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}

/// Outcome of a request that did not resolve to a route.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MatchError {
    /// Nothing matched the path.
    #[error("No routes found for \"{path}\".")]
    NotFound { path: String },

    /// The path matched but none of the candidates accepts the method.
    ///
    /// `allowed` keeps first-seen order without duplicates.
    #[error("Method not allowed (allowed: {})", allowed.join(", "))]
    MethodNotAllowed { allowed: Vec<String> },

    /// The tables contain no routes at all and the request was for `/`.
    #[error("No routes are configured.")]
    NoConfiguration,
}

/// Failure to persist, load or render compiled tables.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed tables artifact: {0}")]
    Json(#[from] serde_json::Error),

    #[error("template rendering failed: {0}")]
    Render(#[from] askama::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
