//! Matcher core - request-time lookup against compiled tables.
//!
//! Nothing here mutates the tables. Per-request state (accumulated allowed
//! methods and schemes, excluded leaves, a lazily built [`Request`]) lives on
//! the stack of [`Matcher::match_path`].

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use http::Method;
use once_cell::sync::OnceCell;
use regex::bytes::{Regex, RegexBuilder};
use serde_json::Value;
use smallvec::SmallVec;
use tracing::{debug, warn};

use super::outcome::{MatchOutcome, Parameters};
use super::redirect::{redirect, RedirectState};
use crate::condition::ConditionEvaluator;
use crate::context::{Request, RequestContext};
use crate::dumper::{
    ChunkLeaf, CompiledMatcherTables, MarkEntry, MatcherDumper, RequiredHost, RouteRecord,
};
use crate::error::{ConfigError, MatchError};
use crate::route::RouteCollection;
use crate::runtime_config::{CompilerConfig, MatcherOptions};

/// Captured variables stay inline up to this count.
pub const MAX_INLINE_VARS: usize = 8;

type Captured<'s> = SmallVec<[Option<&'s [u8]>; MAX_INLINE_VARS]>;

enum HostCheck {
    Any,
    Literal(String),
    Pattern { regex: Regex, variables: Vec<String> },
}

struct StaticCandidate {
    record: RouteRecord,
    host: HostCheck,
}

struct LeafMatcher {
    leaf: ChunkLeaf,
    entries: Vec<MarkEntry>,
    standalone: OnceCell<Option<Regex>>,
}

impl LeafMatcher {
    /// The leaf's own regex, compiled on first use.
    fn standalone(&self, size_limit: usize) -> Option<&Regex> {
        self.standalone
            .get_or_init(|| {
                match RegexBuilder::new(&self.leaf.pattern)
                    .size_limit(size_limit)
                    .build()
                {
                    Ok(regex) => Some(regex),
                    Err(e) => {
                        warn!(
                            mark = self.leaf.mark,
                            error = %e,
                            "Leaf regex failed to compile, leaf is skipped on rescans"
                        );
                        None
                    }
                }
            })
            .as_ref()
    }
}

struct Chunk {
    offset: usize,
    regex: Regex,
    leaves: Vec<LeafMatcher>,
}

struct LeafHit<'s> {
    index: usize,
    values: Captured<'s>,
}

impl Chunk {
    /// First leaf at or after `from` that matches `subject`, skipping
    /// `excluded`. The chunk regex answers the unrestricted scan; restricted
    /// scans walk the standalone leaf regexes in alternation order.
    fn scan<'s>(
        &self,
        subject: &'s [u8],
        from: usize,
        excluded: &[usize],
        size_limit: usize,
    ) -> Option<LeafHit<'s>> {
        if from == 0 && excluded.is_empty() {
            let caps = self.regex.captures(subject)?;
            let index = self
                .leaves
                .iter()
                .position(|leaf| caps.get(leaf.leaf.group).is_some())?;
            let values = self.leaves[index]
                .leaf
                .var_groups
                .iter()
                .map(|group| caps.get(*group).map(|m| m.as_bytes()))
                .collect();
            return Some(LeafHit { index, values });
        }

        self.leaves
            .iter()
            .enumerate()
            .skip(from)
            .filter(|(index, _)| !excluded.contains(index))
            .find_map(|(index, leaf)| {
                let caps = leaf.standalone(size_limit)?.captures(subject)?;
                let values = (1..=leaf.leaf.var_groups.len())
                    .map(|group| caps.get(group).map(|m| m.as_bytes()))
                    .collect();
                Some(LeafHit { index, values })
            })
    }
}

/// Methods and schemes of candidates that matched the path but not the
/// request, in first-seen order.
#[derive(Default)]
struct Accumulator {
    allow: SmallVec<[String; 4]>,
    allow_schemes: SmallVec<[String; 4]>,
}

impl Accumulator {
    fn add_methods(&mut self, methods: &[String]) {
        for method in methods {
            if !self.allow.contains(method) {
                self.allow.push(method.clone());
            }
        }
    }

    fn add_schemes(&mut self, schemes: &[String]) {
        for scheme in schemes {
            if !self.allow_schemes.contains(scheme) {
                self.allow_schemes.push(scheme.clone());
            }
        }
    }

    fn clear(&mut self) {
        self.allow.clear();
        self.allow_schemes.clear();
    }
}

enum Attempt {
    Found(Parameters),
    /// A GET-capable candidate differs only by its trailing slash.
    RedirectCandidate,
    Miss,
}

/// Matches requests against [`CompiledMatcherTables`].
///
/// A `Matcher` is immutable once built and can be shared across threads.
pub struct Matcher {
    match_host: bool,
    static_routes: HashMap<String, Vec<StaticCandidate>>,
    chunks: Vec<Chunk>,
    conditions: ConditionEvaluator,
    options: MatcherOptions,
    /// Size limit for chunk, host and leaf regexes.
    size_limit: usize,
    route_count: usize,
}

impl Matcher {
    /// Load compiled tables.
    ///
    /// # Errors
    ///
    /// A chunk or host regex that does not compile, or a chunk without leaf
    /// metadata. Regexes are built under the larger of
    /// `options.size_limit()` and the limit the tables were compiled with.
    pub fn new(tables: CompiledMatcherTables, options: MatcherOptions) -> Result<Self, ConfigError> {
        let route_count = tables.route_count();
        let CompiledMatcherTables {
            match_host,
            static_routes,
            regexp_list,
            mut dynamic_routes,
            mut chunk_leaves,
            conditions,
            regex_size_limit,
        } = tables;
        let size_limit = options.size_limit().max(regex_size_limit);

        let mut statics = HashMap::with_capacity(static_routes.len());
        for (path, records) in static_routes {
            let mut candidates = Vec::with_capacity(records.len());
            for mut record in records {
                let host = match record.host.take() {
                    None => HostCheck::Any,
                    Some(RequiredHost::Literal(host)) => {
                        HostCheck::Literal(host.to_ascii_lowercase())
                    }
                    Some(RequiredHost::Pattern { regex, variables }) => HostCheck::Pattern {
                        regex: RegexBuilder::new(&regex)
                            .size_limit(size_limit)
                            .build()?,
                        variables,
                    },
                };
                candidates.push(StaticCandidate { record, host });
            }
            statics.insert(path, candidates);
        }

        let mut chunks = Vec::with_capacity(regexp_list.len());
        for (offset, text) in regexp_list {
            let leaves = chunk_leaves
                .remove(&offset)
                .ok_or_else(|| ConfigError::pattern(&text, "chunk has no leaf table"))?;
            let regex = RegexBuilder::new(&text)
                .size_limit(size_limit)
                .build()?;
            let leaves = leaves
                .into_iter()
                .map(|leaf| LeafMatcher {
                    entries: dynamic_routes.remove(&leaf.mark).unwrap_or_default(),
                    leaf,
                    standalone: OnceCell::new(),
                })
                .collect();
            chunks.push(Chunk {
                offset,
                regex,
                leaves,
            });
        }

        let conditions = ConditionEvaluator::new(&conditions);
        debug!(
            routes = route_count,
            static_paths = statics.len(),
            chunks = chunks.len(),
            conditions = conditions.len(),
            match_host,
            size_limit,
            "Matcher loaded"
        );

        Ok(Self {
            match_host,
            static_routes: statics,
            chunks,
            conditions,
            options,
            size_limit,
            route_count,
        })
    }

    /// Compile `routes` and load the result.
    pub fn from_routes(
        routes: &RouteCollection,
        config: CompilerConfig,
        options: MatcherOptions,
    ) -> Result<Self, ConfigError> {
        let tables = MatcherDumper::new(routes)
            .with_config(config)
            .compiled_routes()?;
        Self::new(tables, options)
    }

    pub fn options(&self) -> &MatcherOptions {
        &self.options
    }

    pub fn route_count(&self) -> usize {
        self.route_count
    }

    /// Match `path` (the raw, percent-encoded path info) in `context`.
    ///
    /// Conditions that read `request` see one built from `context`.
    pub fn match_path(
        &self,
        path: &str,
        context: &RequestContext,
    ) -> Result<MatchOutcome, MatchError> {
        self.resolve(path, context, None)
    }

    /// Match a full request. Its path info is the path to match.
    pub fn match_request(&self, request: &Request) -> Result<MatchOutcome, MatchError> {
        let context = request.context();
        self.resolve(context.path_info(), context, Some(request))
    }

    fn resolve(
        &self,
        path: &str,
        context: &RequestContext,
        request: Option<&Request>,
    ) -> Result<MatchOutcome, MatchError> {
        debug!(
            method = %context.method(),
            host = %context.host(),
            scheme = %context.scheme(),
            path = %path,
            "Route match attempt"
        );
        let started = Instant::now();
        let result = self.run(path, context, request);
        let elapsed = started.elapsed();

        if elapsed > self.options.slow_match() {
            warn!(
                method = %context.method(),
                path = %path,
                duration_us = elapsed.as_micros() as u64,
                "Slow route matching detected"
            );
        }
        match &result {
            Ok(MatchOutcome::Found(parameters)) => debug!(
                path = %path,
                route = %parameters.route(),
                duration_us = elapsed.as_micros() as u64,
                "Route matched"
            ),
            Ok(MatchOutcome::Redirect(redirect)) => debug!(
                path = %path,
                route = %redirect.parameters.route(),
                target = %redirect.url,
                "Route matched with redirect"
            ),
            Err(e) => debug!(path = %path, error = %e, "No route matched"),
        }
        result
    }

    fn run(
        &self,
        path: &str,
        context: &RequestContext,
        request: Option<&Request>,
    ) -> Result<MatchOutcome, MatchError> {
        let not_found = || MatchError::NotFound {
            path: path.to_string(),
        };
        let idempotent = *context.method() == Method::GET || *context.method() == Method::HEAD;

        let mut state = RedirectState::Initial;
        loop {
            state = match state {
                RedirectState::Initial => {
                    let mut acc = Accumulator::default();
                    let attempt = self.attempt(path, context, request, &mut acc);
                    if let Attempt::Found(parameters) = attempt {
                        return Ok(MatchOutcome::Found(parameters));
                    }
                    if !acc.allow.is_empty() {
                        return Err(MatchError::MethodNotAllowed {
                            allowed: acc.allow.into_vec(),
                        });
                    }
                    if matches!(attempt, Attempt::Miss)
                        && acc.allow_schemes.is_empty()
                        && self.route_count == 0
                        && is_root(path)
                    {
                        return Err(MatchError::NoConfiguration);
                    }
                    if !self.options.redirects_enabled() || !idempotent {
                        return Err(not_found());
                    }
                    RedirectState::after_miss(path, acc.allow_schemes.first())
                        .ok_or_else(not_found)?
                }
                RedirectState::RetryWithSlash { path: toggled } => {
                    let mut acc = Accumulator::default();
                    match self.attempt(&toggled, context, request, &mut acc) {
                        Attempt::Found(parameters) => {
                            return Ok(MatchOutcome::Redirect(redirect(
                                context, toggled, None, parameters,
                            )))
                        }
                        _ => match acc.allow_schemes.into_iter().next() {
                            Some(scheme) => RedirectState::RetryWithScheme {
                                path: toggled,
                                scheme,
                            },
                            None => return Err(not_found()),
                        },
                    }
                }
                RedirectState::RetryWithScheme {
                    path: target,
                    scheme,
                } => {
                    let swapped = context.clone().with_scheme(&scheme);
                    let mut acc = Accumulator::default();
                    return match self.attempt(&target, &swapped, request, &mut acc) {
                        Attempt::Found(parameters) => Ok(MatchOutcome::Redirect(redirect(
                            context,
                            target,
                            Some(scheme),
                            parameters,
                        ))),
                        _ => Err(not_found()),
                    };
                }
            };
        }
    }

    /// One pass over the static table and the chunks.
    fn attempt(
        &self,
        raw_path: &str,
        context: &RequestContext,
        request: Option<&Request>,
        acc: &mut Accumulator,
    ) -> Attempt {
        let decoded = urlencoding::decode_binary(raw_path.as_bytes());
        let pathinfo: &[u8] = if decoded.is_empty() { b"/" } else { &decoded };
        let trimmed = trim_trailing_slashes(pathinfo);
        let has_slash = trimmed.len() != pathinfo.len();

        let method = context.method().as_str();
        let canonical = if method == "HEAD" { "GET" } else { method };
        let supports_redirections = canonical == "GET" && self.options.redirects_enabled();
        let host = context.host();
        let mut created: Option<Request> = None;

        let candidates = std::str::from_utf8(trimmed)
            .ok()
            .and_then(|p| self.static_routes.get(p));
        for candidate in candidates.into_iter().flatten() {
            let record = &candidate.record;
            let mut params = record.defaults.clone();
            match &candidate.host {
                HostCheck::Any => {}
                HostCheck::Literal(required) => {
                    if required != host {
                        continue;
                    }
                }
                HostCheck::Pattern { regex, variables } => {
                    let Some(caps) = regex.captures(host.as_bytes()) else {
                        continue;
                    };
                    for (i, name) in variables.iter().enumerate() {
                        if let Some(m) = caps.get(i + 1) {
                            params.insert(name.clone(), captured_value(m.as_bytes()));
                        }
                    }
                }
            }

            if let Some(id) = record.condition {
                if !self.check_condition(id, context, request, &mut created, raw_path, &params) {
                    continue;
                }
            }

            if pathinfo != b"/" && record.has_trailing_slash != has_slash {
                if supports_redirections && record.accepts_method("GET") {
                    acc.clear();
                    return Attempt::RedirectCandidate;
                }
                continue;
            }

            let scheme_ok = record.accepts_scheme(context.scheme());
            if scheme_ok && !record.accepts_method(canonical) && !record.accepts_method(method) {
                acc.add_methods(&record.methods);
                continue;
            }
            if !scheme_ok {
                acc.add_schemes(&record.schemes);
                continue;
            }

            return Attempt::Found(Parameters::from(params));
        }

        let (subject, trimmed_subject): (Cow<'_, [u8]>, Cow<'_, [u8]>) = if self.match_host {
            (
                Cow::Owned(host_subject(host, pathinfo)),
                Cow::Owned(host_subject(host, trimmed)),
            )
        } else {
            (Cow::Borrowed(pathinfo), Cow::Borrowed(trimmed))
        };
        let size_limit = self.size_limit;

        for chunk in &self.chunks {
            let mut excluded: SmallVec<[usize; 8]> = SmallVec::new();
            let mut hit = chunk.scan(&subject, 0, &excluded, size_limit);

            'scan: while let Some(current) = hit {
                let leaf = &chunk.leaves[current.index];
                for entry in &leaf.entries {
                    let record = match entry {
                        MarkEntry::Route(record) => record,
                        MarkEntry::Terminator => break 'scan,
                    };

                    let mut has_trailing_var = has_slash && record.has_trailing_var;
                    let mut values = current.values.clone();
                    if has_trailing_var
                        && (record.has_trailing_slash || !last_value_ends_with_slash(&values))
                    {
                        let retry = chunk
                            .scan(&trimmed_subject, 0, &excluded, size_limit)
                            .filter(|retry| retry.index == current.index);
                        if let Some(retry) = retry {
                            if record.has_trailing_slash {
                                values = retry.values;
                            } else {
                                has_trailing_var = false;
                            }
                        }
                    }

                    let mut params = record.defaults.clone();
                    for (name, value) in record.variables.iter().zip(&values) {
                        if let Some(value) = value {
                            params.insert(name.clone(), captured_value(value));
                        }
                    }

                    if let Some(id) = record.condition {
                        if !self.check_condition(id, context, request, &mut created, raw_path, &params)
                        {
                            continue;
                        }
                    }

                    if pathinfo != b"/"
                        && !has_trailing_var
                        && record.has_trailing_slash != has_slash
                    {
                        if supports_redirections && record.accepts_method("GET") {
                            acc.clear();
                            return Attempt::RedirectCandidate;
                        }
                        continue;
                    }

                    let scheme_ok = record.accepts_scheme(context.scheme());
                    if !record.accepts_method(canonical) && !record.accepts_method(method) {
                        if scheme_ok {
                            acc.add_methods(&record.methods);
                        }
                        continue;
                    }
                    if !scheme_ok {
                        acc.add_schemes(&record.schemes);
                        continue;
                    }

                    return Attempt::Found(Parameters::from(params));
                }

                debug!(
                    chunk = chunk.offset,
                    mark = leaf.leaf.mark,
                    "Candidate rejected, rescanning chunk"
                );
                excluded.push(current.index);
                hit = chunk.scan(&subject, current.index + 1, &excluded, size_limit);
            }
        }

        Attempt::Miss
    }

    fn check_condition(
        &self,
        id: i32,
        context: &RequestContext,
        request: Option<&Request>,
        created: &mut Option<Request>,
        path: &str,
        params: &BTreeMap<String, Value>,
    ) -> bool {
        if id >= 0 {
            return self.conditions.check(id, context, None, params);
        }
        let request = match request {
            Some(request) => request,
            None => &*created.get_or_insert_with(|| {
                Request::new(context.clone().with_path_info(path))
            }),
        };
        self.conditions.check(id, context, Some(request), params)
    }
}

fn trim_trailing_slashes(path: &[u8]) -> &[u8] {
    let end = path.iter().rposition(|b| *b != b'/').map_or(0, |i| i + 1);
    if end == 0 {
        b"/"
    } else {
        &path[..end]
    }
}

fn host_subject(host: &str, path: &[u8]) -> Vec<u8> {
    let mut subject = Vec::with_capacity(host.len() + 1 + path.len());
    subject.extend_from_slice(host.as_bytes());
    subject.push(b'.');
    subject.extend_from_slice(path);
    subject
}

/// Whether the last variable captured a value ending in `/`. An empty value
/// counts, an unset one does not.
fn last_value_ends_with_slash(values: &[Option<&[u8]>]) -> bool {
    match values.last() {
        Some(Some(value)) => value.last().is_none_or(|b| *b == b'/'),
        _ => false,
    }
}

fn captured_value(bytes: &[u8]) -> Value {
    Value::String(String::from_utf8_lossy(bytes).into_owned())
}

fn is_root(path: &str) -> bool {
    let decoded = urlencoding::decode_binary(path.as_bytes());
    decoded.is_empty() || &*decoded == b"/"
}
