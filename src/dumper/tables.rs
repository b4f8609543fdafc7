//! The compiled artifact: everything the matcher needs at request time.
//!
//! Tables are plain data. They are produced once by
//! [`MatcherDumper`](super::MatcherDumper), persisted as JSON or as generated
//! Rust source, and loaded read-only by [`Matcher`](crate::matcher::Matcher).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::condition::ConditionSource;
use crate::error::ArtifactError;
use crate::runtime_config::DEFAULT_REGEX_SIZE_LIMIT;

/// Host constraint of a static route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredHost {
    /// Exact, lowercased host.
    Literal(String),
    /// Anchored regex with unnamed groups, one per variable.
    Pattern { regex: String, variables: Vec<String> },
}

/// What the matcher needs to accept or reject one route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRecord {
    /// Route defaults with `_route` set to the reported route name.
    pub defaults: BTreeMap<String, Value>,
    /// Capture names in group order (host variables first).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<RequiredHost>,
    /// Uppercase methods; empty accepts any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
    /// Lowercase schemes; empty accepts any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schemes: Vec<String>,
    #[serde(default)]
    pub has_trailing_slash: bool,
    #[serde(default)]
    pub has_trailing_var: bool,
    /// Non-zero condition id, negative when the condition reads `request`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<i32>,
}

impl RouteRecord {
    /// Reported route name.
    pub fn name(&self) -> &str {
        self.defaults
            .get("_route")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn accepts_method(&self, method: &str) -> bool {
        self.methods.is_empty() || self.methods.iter().any(|m| m == method)
    }

    pub fn accepts_scheme(&self, scheme: &str) -> bool {
        self.schemes.is_empty() || self.schemes.iter().any(|s| s == scheme)
    }
}

/// An entry under a mark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkEntry {
    Route(RouteRecord),
    /// Last entry of a chunk: when reached, no route of the chunk matched
    /// and the matcher moves on to the next chunk.
    Terminator,
}

/// Where a leaf lives inside its chunk regex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkLeaf {
    pub mark: usize,
    /// Capture group of the (empty) marker group.
    pub group: usize,
    /// Capture group of each variable, in record order.
    pub var_groups: Vec<usize>,
    /// The leaf on its own, anchored, with groups numbered like
    /// `var_groups` would be in a fresh regex (1, 2, ...).
    pub pattern: String,
}

/// Static table, chunked regexes and per-mark route records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledMatcherTables {
    /// Whether the dynamic subject is `host.path` rather than `path`.
    pub match_host: bool,
    /// Literal paths (trailing slash removed) to candidates in order.
    pub static_routes: BTreeMap<String, Vec<RouteRecord>>,
    /// Chunk regexes keyed by their offset in the concatenated list.
    pub regexp_list: BTreeMap<usize, String>,
    /// Route records keyed by mark.
    pub dynamic_routes: BTreeMap<usize, Vec<MarkEntry>>,
    /// Leaves of each chunk, keyed like `regexp_list`.
    pub chunk_leaves: BTreeMap<usize, Vec<ChunkLeaf>>,
    pub conditions: Vec<ConditionSource>,
    /// Size limit the chunk regexes were built under. Loading never uses
    /// a smaller one.
    #[serde(default = "default_regex_size_limit")]
    pub regex_size_limit: usize,
}

fn default_regex_size_limit() -> usize {
    DEFAULT_REGEX_SIZE_LIMIT
}

impl Default for CompiledMatcherTables {
    fn default() -> Self {
        Self {
            match_host: false,
            static_routes: BTreeMap::new(),
            regexp_list: BTreeMap::new(),
            dynamic_routes: BTreeMap::new(),
            chunk_leaves: BTreeMap::new(),
            conditions: Vec::new(),
            regex_size_limit: DEFAULT_REGEX_SIZE_LIMIT,
        }
    }
}

impl CompiledMatcherTables {
    pub fn from_json(json: &str) -> Result<Self, ArtifactError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ArtifactError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ArtifactError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn static_route_count(&self) -> usize {
        self.static_routes.values().map(Vec::len).sum()
    }

    pub fn dynamic_route_count(&self) -> usize {
        self.dynamic_routes
            .values()
            .flatten()
            .filter(|entry| matches!(entry, MarkEntry::Route(_)))
            .count()
    }

    pub fn route_count(&self) -> usize {
        self.static_route_count() + self.dynamic_route_count()
    }

    pub fn chunk_count(&self) -> usize {
        self.regexp_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.route_count() == 0
    }

    /// Names of all routes, static ones first.
    pub fn route_names(&self) -> Vec<&str> {
        let statics = self.static_routes.values().flatten().map(RouteRecord::name);
        let dynamics = self
            .dynamic_routes
            .values()
            .flatten()
            .filter_map(|entry| match entry {
                MarkEntry::Route(record) => Some(record.name()),
                MarkEntry::Terminator => None,
            });
        statics.chain(dynamics).collect()
    }
}
