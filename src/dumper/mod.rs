//! # Matcher Dumper
//!
//! Compiles a [`RouteCollection`] into [`CompiledMatcherTables`].
//!
//! ## Pipeline
//!
//! 1. When any route has a host, routes are regrouped through a prefix tree
//!    keyed by their reversed host so routes of the same host end up next to
//!    each other without reordering routes that could overlap.
//! 2. The partitioner splits the routes into a static table (hash lookup on
//!    the literal path) and the dynamic list.
//! 3. Dynamic routes are cut into chunks (by regex flags and a chunk size
//!    limit). Each chunk becomes one anchored regex:
//!
//! ```text
//! (?s-u)^(?:/foo/(?:([^/]+)(?P<_M24>)|bar(?P<_M47>))|/qux/([^/]+)(?P<_M70>))/?$
//! ```
//!
//! Every leaf ends in an empty marker group named after its mark: the byte
//! offset of that group in the concatenation of all chunk regexes. Marks are
//! unique and increase with declaration order. The records under a mark tell
//! the matcher which variables the leaf captured and which constraints still
//! apply (methods, schemes, conditions, trailing slash).
//!
//! When the host is part of matching, the subject is `host.path` and each
//! group of same-host routes is prefixed by `(?i:hostregex)\.`, or by
//! `(?:[^./]*\.)+` for routes without a host.
//!
//! 4. A chunk whose regex is too large for the engine halves the chunk limit
//!    and the dynamic routes are compiled again.

mod codegen;
pub mod tables;
#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::time::Instant;

use regex::bytes::RegexBuilder;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::compiler::class_head_len;
use crate::condition::ConditionRegistry;
use crate::error::{ArtifactError, ConfigError};
use crate::partition::{group_static_routes, StaticRoute};
use crate::prefix_tree::{PrefixItem, StaticPrefixCollection};
use crate::route::{Route, RouteCollection};
use crate::runtime_config::CompilerConfig;

pub use codegen::render_rust;
pub use tables::{ChunkLeaf, CompiledMatcherTables, MarkEntry, RequiredHost, RouteRecord};

/// Host group prefix of routes without a host.
const ANY_HOST: &str = "(?:[^./]*\\.)+";

/// Builds [`CompiledMatcherTables`] from routes.
pub struct MatcherDumper<'a> {
    routes: &'a RouteCollection,
    config: CompilerConfig,
}

enum ChunkError {
    TooBig,
    Config(ConfigError),
}

impl From<ConfigError> for ChunkError {
    fn from(e: ConfigError) -> Self {
        ChunkError::Config(e)
    }
}

#[derive(Default)]
struct DynamicTables {
    regexp_list: BTreeMap<usize, String>,
    dynamic_routes: BTreeMap<usize, Vec<MarkEntry>>,
    chunk_leaves: BTreeMap<usize, Vec<ChunkLeaf>>,
}

impl<'a> MatcherDumper<'a> {
    pub fn new(routes: &'a RouteCollection) -> Self {
        Self {
            routes,
            config: CompilerConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: CompilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the tables.
    ///
    /// # Errors
    ///
    /// Any route that fails to compile, an invalid condition, or a single
    /// route whose regex exceeds the size limit on its own.
    pub fn compiled_routes(&self) -> Result<CompiledMatcherTables, ConfigError> {
        let started = Instant::now();

        let mut match_host = false;
        let mut host_tree = StaticPrefixCollection::new("/");
        for (name, route) in self.routes.iter() {
            let key = if route.host().is_empty() {
                String::from("/(.*)")
            } else {
                match_host = true;
                format!("/{}", reverse_host(route.host()))
            };
            host_tree.add_route(&key, (name, route));
        }
        let ordered: Vec<(&str, &Route)> = if match_host {
            host_tree.into_routes()
        } else {
            self.routes.iter().collect()
        };

        let grouped = group_static_routes(&ordered)?;
        let mut conditions = ConditionRegistry::new();
        let static_routes = compile_static_routes(&grouped.static_routes, &mut conditions)?;
        let (dynamic, conditions) =
            self.compile_dynamic_with_backoff(&grouped.dynamic_routes, match_host, conditions)?;

        let tables = CompiledMatcherTables {
            match_host,
            static_routes,
            regexp_list: dynamic.regexp_list,
            dynamic_routes: dynamic.dynamic_routes,
            chunk_leaves: dynamic.chunk_leaves,
            conditions: conditions.into_sources(),
            regex_size_limit: self.config.regex_size_limit,
        };

        info!(
            routes = self.routes.len(),
            static_routes = tables.static_route_count(),
            dynamic_routes = tables.dynamic_route_count(),
            chunks = tables.chunk_count(),
            conditions = tables.conditions.len(),
            match_host,
            elapsed_us = started.elapsed().as_micros() as u64,
            "Compiled matcher tables"
        );
        Ok(tables)
    }

    /// Tables as pretty-printed JSON.
    pub fn dump_json(&self) -> Result<String, ArtifactError> {
        self.compiled_routes()?.to_json()
    }

    /// Tables as a Rust module exposing `compiled_tables()`.
    pub fn dump_rust(&self) -> Result<String, ArtifactError> {
        render_rust(&self.compiled_routes()?)
    }

    fn compile_dynamic_with_backoff(
        &self,
        routes: &[(&str, &Route)],
        match_host: bool,
        conditions: ConditionRegistry,
    ) -> Result<(DynamicTables, ConditionRegistry), ConfigError> {
        if routes.is_empty() {
            return Ok((DynamicTables::default(), conditions));
        }

        let mut chunk_limit = self
            .config
            .chunk_limit
            .unwrap_or(routes.len())
            .clamp(1, routes.len());
        loop {
            let mut attempt = conditions.clone();
            match self.compile_dynamic_routes(routes, match_host, chunk_limit, &mut attempt) {
                Ok(tables) => return Ok((tables, attempt)),
                Err(ChunkError::TooBig) if chunk_limit > 1 => {
                    let next = chunk_limit.div_ceil(2);
                    warn!(
                        chunk_limit,
                        next_chunk_limit = next,
                        regex_size_limit = self.config.regex_size_limit,
                        "Route regex too large, retrying with smaller chunks"
                    );
                    chunk_limit = next;
                }
                Err(ChunkError::TooBig) => {
                    return Err(ConfigError::RegexTooLarge {
                        limit: self.config.regex_size_limit,
                    })
                }
                Err(ChunkError::Config(e)) => return Err(e),
            }
        }
    }

    fn compile_dynamic_routes(
        &self,
        routes: &[(&str, &Route)],
        match_host: bool,
        chunk_limit: usize,
        conditions: &mut ConditionRegistry,
    ) -> Result<DynamicTables, ChunkError> {
        let mut chunks: Vec<&[(&str, &Route)]> = Vec::new();
        let mut start = 0;
        for i in 1..=routes.len() {
            let split = i == routes.len()
                || i - start >= chunk_limit
                || routes[i].1.compile()?.modifiers() != routes[start].1.compile()?.modifiers();
            if split {
                chunks.push(&routes[start..i]);
                start = i;
            }
        }

        let mut tables = DynamicTables::default();
        let mut offset = 0;
        for chunk in chunks {
            let mut emitter = ChunkEmitter::new(offset, match_host, &mut *conditions);
            let text = emitter.emit_chunk(chunk)?;

            RegexBuilder::new(&text)
                .size_limit(self.config.regex_size_limit)
                .build()
                .map_err(|e| match e {
                    regex::Error::CompiledTooBig(_) => ChunkError::TooBig,
                    other => ChunkError::Config(ConfigError::Regex(other)),
                })?;

            debug!(
                offset,
                routes = chunk.len(),
                regex_len = text.len(),
                "Compiled route chunk"
            );
            let ChunkEmitter {
                leaves, entries, ..
            } = emitter;
            tables.dynamic_routes.extend(entries);
            tables.chunk_leaves.insert(offset, leaves);
            let length = text.len();
            tables.regexp_list.insert(offset, text);
            offset += length;
        }
        Ok(tables)
    }
}

/// `{locale}.example.com` -> `moc/elpmaxe/(elacol)`
///
/// Placeholders become balanced groups so the prefix tree never splits one.
fn reverse_host(host: &str) -> String {
    host.chars()
        .rev()
        .map(|c| match c {
            '}' => '(',
            '.' => '/',
            '{' => ')',
            c => c,
        })
        .collect()
}

/// Regex body between the leading `^` and trailing `$`.
fn strip_anchors(regex: &str) -> &str {
    let regex = regex.strip_prefix('^').unwrap_or(regex);
    regex.strip_suffix('$').unwrap_or(regex)
}

/// Number of capturing groups opened in a regex fragment.
fn count_capture_groups(fragment: &str) -> usize {
    let bytes = fragment.as_bytes();
    let mut count = 0;
    let mut class_depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'[' => {
                class_depth += 1;
                i += class_head_len(&fragment[i + 1..]);
            }
            b']' if class_depth > 0 => class_depth -= 1,
            b'(' if class_depth == 0 && bytes.get(i + 1) != Some(&b'?') => count += 1,
            _ => {}
        }
        i += 1;
    }
    count
}

fn compile_static_routes(
    static_routes: &BTreeMap<String, Vec<StaticRoute<'_>>>,
    conditions: &mut ConditionRegistry,
) -> Result<BTreeMap<String, Vec<RouteRecord>>, ConfigError> {
    let mut out = BTreeMap::new();
    for (url, entries) in static_routes {
        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            let compiled = entry.route.compile()?;
            let host = match compiled.unnamed_host_regex() {
                None => None,
                Some(_) if compiled.host_variables().is_empty() => Some(RequiredHost::Literal(
                    entry.route.host().to_ascii_lowercase(),
                )),
                Some(regex) => Some(RequiredHost::Pattern {
                    regex: format!("{}(?i){}", compiled.modifiers().flags(), regex),
                    variables: compiled.host_variables().to_vec(),
                }),
            };
            records.push(compile_route(
                entry.route,
                entry.name,
                Vec::new(),
                host,
                entry.has_trailing_slash,
                false,
                conditions,
            )?);
        }
        out.insert(url.clone(), records);
    }
    Ok(out)
}

fn compile_route(
    route: &Route,
    name: &str,
    variables: Vec<String>,
    host: Option<RequiredHost>,
    has_trailing_slash: bool,
    has_trailing_var: bool,
    conditions: &mut ConditionRegistry,
) -> Result<RouteRecord, ConfigError> {
    let mut defaults = route.defaults().clone();
    let reported = match defaults.remove("_canonical_route") {
        Some(Value::String(canonical)) => canonical,
        _ => name.to_string(),
    };
    defaults.insert("_route".to_string(), Value::String(reported));

    let condition = route
        .condition()
        .map(|expression| conditions.register(expression))
        .transpose()?;

    Ok(RouteRecord {
        defaults,
        variables,
        host,
        methods: route.methods().to_vec(),
        schemes: route.schemes().to_vec(),
        has_trailing_slash,
        has_trailing_var,
        condition,
    })
}

/// A dynamic route placed in a chunk's prefix tree.
struct Leaf<'a> {
    name: &'a str,
    route: &'a Route,
    /// Regex body without anchors or trailing slash.
    body: String,
    has_trailing_slash: bool,
    has_trailing_var: bool,
}

/// Writes one chunk regex and collects its marks.
struct ChunkEmitter<'c> {
    text: String,
    offset: usize,
    match_host: bool,
    flags: &'static str,
    host_part: String,
    group_count: usize,
    last_mark: Option<usize>,
    leaves: Vec<ChunkLeaf>,
    entries: BTreeMap<usize, Vec<MarkEntry>>,
    conditions: &'c mut ConditionRegistry,
}

impl<'c> ChunkEmitter<'c> {
    fn new(offset: usize, match_host: bool, conditions: &'c mut ConditionRegistry) -> Self {
        Self {
            text: String::new(),
            offset,
            match_host,
            flags: "",
            host_part: String::new(),
            group_count: 0,
            last_mark: None,
            leaves: Vec::new(),
            entries: BTreeMap::new(),
            conditions,
        }
    }

    fn emit_chunk(&mut self, routes: &[(&str, &Route)]) -> Result<String, ConfigError> {
        let Some(&(_, first)) = routes.first() else {
            return Ok(String::new());
        };
        self.flags = first.compile()?.modifiers().flags();
        self.text.push_str(self.flags);
        self.text.push_str("^(?:");

        // Consecutive routes sharing a host regex form one host group.
        let mut host_groups: Vec<(Option<&str>, Vec<(&str, &Route)>)> = Vec::new();
        for &(name, route) in routes {
            let host = route.compile()?.unnamed_host_regex();
            match host_groups.last_mut() {
                Some((last_host, members)) if *last_host == host => members.push((name, route)),
                _ => host_groups.push((host, vec![(name, route)])),
            }
        }

        for (index, (host, members)) in host_groups.into_iter().enumerate() {
            if index > 0 {
                self.text.push('|');
            }

            self.host_part = if !self.match_host {
                String::new()
            } else {
                match host {
                    Some(regex) => format!("(?i:{})\\.", strip_anchors(regex)),
                    None => ANY_HOST.to_string(),
                }
            };
            let host_groups = self.open_groups(&self.host_part.clone());
            if self.match_host {
                self.text.push_str("(?:");
            }

            let mut tree = StaticPrefixCollection::new("/");
            for (name, route) in members {
                let compiled = route.compile()?;
                let mut body = strip_anchors(compiled.unnamed_regex()).to_string();
                let has_trailing_slash = body != "/" && body.ends_with('/');
                if has_trailing_slash {
                    body.pop();
                }
                let prefix = body.clone();
                tree.add_route(
                    &prefix,
                    Leaf {
                        name,
                        route,
                        body,
                        has_trailing_slash,
                        has_trailing_var: compiled.has_trailing_var(),
                    },
                );
            }
            self.emit_collection(&tree, 0, &host_groups)?;

            if self.match_host {
                self.text.push(')');
            }
        }

        self.text.push_str(")/?$");

        if let Some(mark) = self.last_mark {
            self.entries.entry(mark).or_default().push(MarkEntry::Terminator);
        }
        Ok(std::mem::take(&mut self.text))
    }

    /// Append `fragment` and number the capture groups it opens.
    fn open_groups(&mut self, fragment: &str) -> Vec<usize> {
        self.text.push_str(fragment);
        let count = count_capture_groups(fragment);
        let groups = (self.group_count + 1..=self.group_count + count).collect();
        self.group_count += count;
        groups
    }

    fn emit_collection(
        &mut self,
        tree: &StaticPrefixCollection<Leaf<'_>>,
        prefix_len: usize,
        inherited: &[usize],
    ) -> Result<(), ConfigError> {
        let mut previous_regex: Option<&str> = None;
        let mut first = true;

        for item in tree.items() {
            match item {
                PrefixItem::Collection(child) => {
                    previous_regex = None;
                    if !first {
                        self.text.push('|');
                    }
                    first = false;

                    let fragment = &child.prefix()[prefix_len..];
                    let mut groups = inherited.to_vec();
                    groups.extend(self.open_groups(fragment));
                    self.text.push_str("(?:");
                    self.emit_collection(child, child.prefix().len(), &groups)?;
                    self.text.push(')');
                }
                PrefixItem::Route(leaf) => {
                    let compiled = leaf.route.compile()?;
                    let record = compile_route(
                        leaf.route,
                        leaf.name,
                        compiled.variables().to_vec(),
                        None,
                        leaf.has_trailing_slash,
                        leaf.has_trailing_var,
                        self.conditions,
                    )?;

                    // Identical regexes share the previous mark.
                    if previous_regex == Some(compiled.regex()) {
                        if let Some(mark) = self.last_mark {
                            self.entries
                                .entry(mark)
                                .or_default()
                                .push(MarkEntry::Route(record));
                            continue;
                        }
                    }

                    if !first {
                        self.text.push('|');
                    }
                    first = false;

                    let mut var_groups = inherited.to_vec();
                    var_groups.extend(self.open_groups(&leaf.body[prefix_len..]));
                    if var_groups.len() != compiled.variables().len() {
                        return Err(ConfigError::pattern(
                            leaf.route.path(),
                            format!(
                                "{} capture groups for {} variables",
                                var_groups.len(),
                                compiled.variables().len()
                            ),
                        ));
                    }

                    let mark = self.offset + self.text.len();
                    self.group_count += 1;
                    let group = self.group_count;
                    self.text.push_str("(?P<_M");
                    self.text.push_str(&mark.to_string());
                    self.text.push_str(">)");

                    self.leaves.push(ChunkLeaf {
                        mark,
                        group,
                        var_groups,
                        pattern: format!("{}^{}{}/?$", self.flags, self.host_part, leaf.body),
                    });
                    self.entries.insert(mark, vec![MarkEntry::Route(record)]);
                    self.last_mark = Some(mark);
                    previous_regex = Some(compiled.regex());
                }
            }
        }
        Ok(())
    }
}
