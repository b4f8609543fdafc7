//! Route definitions and the ordered collection the compiler consumes.
//!
//! A [`Route`] is a path pattern such as `/blog/{slug}` plus the constraints
//! that narrow it down: methods, schemes, a host pattern, per-variable regex
//! requirements, defaults and an optional condition expression. Routes are
//! registered by name in a [`RouteCollection`] whose order is the matching
//! precedence: the first declared route that accepts a request wins.
//!
//! Patterns accept inline shorthands which are folded into the route when the
//! path or host is set:
//!
//! - `{page<\d+>}` sets the requirement of `page`
//! - `{page?1}` sets the default of `page` (`{page?}` defaults to null)
//! - `{!page}` marks `page` as important so it is never made optional
//!
//! ```rust
//! use brrtmatch::route::{Route, RouteCollection};
//!
//! let mut routes = RouteCollection::new();
//! routes.add(
//!     "blog_show",
//!     Route::new("/blog/{slug<[a-z0-9-]+>}").with_methods(["GET"]),
//! );
//! assert_eq!(routes.get("blog_show").map(|r| r.path()), Some("/blog/{slug}"));
//! ```

use std::collections::BTreeMap;

use once_cell::sync::{Lazy, OnceCell};
use regex::{Captures, Regex};
use serde_json::Value;

use crate::compiler::{CompiledRoute, RouteCompiler};
use crate::error::ConfigError;

static INLINE_VARIABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{(!?)(\w+)(<.*?>)?(\?[^}]*)?\}").expect("inline variable regex should be valid")
});

/// A single route definition.
///
/// Setters invalidate the memoised [`CompiledRoute`], so a route can be
/// adjusted (for example by [`RouteCollection::add_prefix`]) after it has
/// been compiled once.
#[derive(Debug, Clone)]
pub struct Route {
    path: String,
    host: String,
    schemes: Vec<String>,
    methods: Vec<String>,
    defaults: BTreeMap<String, Value>,
    requirements: BTreeMap<String, String>,
    condition: Option<String>,
    utf8: bool,
    compiled: OnceCell<CompiledRoute>,
}

impl Route {
    pub fn new(path: &str) -> Self {
        let mut route = Route {
            path: String::from("/"),
            host: String::new(),
            schemes: Vec::new(),
            methods: Vec::new(),
            defaults: BTreeMap::new(),
            requirements: BTreeMap::new(),
            condition: None,
            utf8: false,
            compiled: OnceCell::new(),
        };
        route.set_path(path);
        route
    }

    #[must_use]
    pub fn with_host(mut self, host: &str) -> Self {
        self.set_host(host);
        self
    }

    #[must_use]
    pub fn with_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.set_methods(methods);
        self
    }

    #[must_use]
    pub fn with_schemes<I, S>(mut self, schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.set_schemes(schemes);
        self
    }

    #[must_use]
    pub fn with_default(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set_default(name, value);
        self
    }

    #[must_use]
    pub fn with_defaults<I, K, V>(mut self, defaults: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.add_defaults(defaults);
        self
    }

    #[must_use]
    pub fn with_requirement(mut self, name: &str, regex: &str) -> Self {
        self.set_requirement(name, regex);
        self
    }

    #[must_use]
    pub fn with_requirements<I, K, V>(mut self, requirements: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        self.add_requirements(requirements);
        self
    }

    #[must_use]
    pub fn with_condition(mut self, expression: &str) -> Self {
        self.set_condition(Some(expression));
        self
    }

    /// Switch the route to Unicode regex mode.
    ///
    /// Byte mode is the default; patterns or requirements containing
    /// non-ASCII text are rejected at compile time unless this is set.
    #[must_use]
    pub fn with_utf8(mut self, utf8: bool) -> Self {
        self.set_utf8(utf8);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    pub fn schemes(&self) -> &[String] {
        &self.schemes
    }

    pub fn defaults(&self) -> &BTreeMap<String, Value> {
        &self.defaults
    }

    pub fn default_value(&self, name: &str) -> Option<&Value> {
        self.defaults.get(name)
    }

    pub fn has_default(&self, name: &str) -> bool {
        self.defaults.contains_key(name)
    }

    pub fn requirements(&self) -> &BTreeMap<String, String> {
        &self.requirements
    }

    pub fn requirement(&self, name: &str) -> Option<&str> {
        self.requirements.get(name).map(String::as_str)
    }

    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    pub fn is_utf8(&self) -> bool {
        self.utf8
    }

    /// Set the path pattern. Leading slashes collapse to exactly one.
    pub fn set_path(&mut self, path: &str) {
        let normalized = format!("/{}", path.trim().trim_start_matches('/'));
        self.path = self.extract_inline(&normalized);
        self.invalidate();
    }

    pub fn set_host(&mut self, host: &str) {
        self.host = self.extract_inline(host.trim());
        self.invalidate();
    }

    pub fn set_methods<I, S>(&mut self, methods: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.methods = unique(methods.into_iter().map(|m| m.as_ref().to_ascii_uppercase()));
        self.invalidate();
    }

    pub fn set_schemes<I, S>(&mut self, schemes: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.schemes = unique(schemes.into_iter().map(|s| s.as_ref().to_ascii_lowercase()));
        self.invalidate();
    }

    pub fn set_default(&mut self, name: &str, value: impl Into<Value>) {
        self.defaults.insert(name.to_string(), value.into());
        self.invalidate();
    }

    pub fn add_defaults<I, K, V>(&mut self, defaults: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (name, value) in defaults {
            self.defaults.insert(name.into(), value.into());
        }
        self.invalidate();
    }

    pub fn set_requirement(&mut self, name: &str, regex: &str) {
        self.requirements
            .insert(name.to_string(), sanitize_requirement(regex));
        self.invalidate();
    }

    pub fn add_requirements<I, K, V>(&mut self, requirements: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        for (name, regex) in requirements {
            self.requirements
                .insert(name.into(), sanitize_requirement(regex.as_ref()));
        }
        self.invalidate();
    }

    pub fn set_condition(&mut self, expression: Option<&str>) {
        self.condition = expression
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string);
        self.invalidate();
    }

    pub fn set_utf8(&mut self, utf8: bool) {
        self.utf8 = utf8;
        self.invalidate();
    }

    /// Compile the route, reusing the previous result when nothing changed.
    pub fn compile(&self) -> Result<&CompiledRoute, ConfigError> {
        self.compiled.get_or_try_init(|| RouteCompiler::compile(self))
    }

    fn invalidate(&mut self) {
        self.compiled = OnceCell::new();
    }

    fn extract_inline(&mut self, pattern: &str) -> String {
        if !pattern.contains(['?', '<']) {
            return pattern.to_string();
        }

        let mut defaults = Vec::new();
        let mut requirements = Vec::new();
        let rewritten = INLINE_VARIABLE.replace_all(pattern, |caps: &Captures<'_>| {
            let name = caps[2].to_string();
            if let Some(default) = caps.get(4) {
                let value = match &default.as_str()[1..] {
                    "" => Value::Null,
                    text => Value::from(text),
                };
                defaults.push((name.clone(), value));
            }
            if let Some(requirement) = caps.get(3) {
                let raw = requirement.as_str();
                requirements.push((name.clone(), raw[1..raw.len() - 1].to_string()));
            }
            format!("{{{}{}}}", &caps[1], name)
        });
        let rewritten = rewritten.into_owned();

        for (name, value) in defaults {
            self.defaults.insert(name, value);
        }
        for (name, regex) in requirements {
            self.requirements.insert(name, sanitize_requirement(&regex));
        }
        rewritten
    }
}

fn unique(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

/// Strip anchors a requirement may carry; the compiler adds its own.
fn sanitize_requirement(regex: &str) -> String {
    let mut regex = regex;
    if let Some(rest) = regex.strip_prefix('^') {
        regex = rest;
    } else if let Some(rest) = regex.strip_prefix("\\A") {
        regex = rest;
    }
    if let Some(rest) = regex.strip_suffix("\\z") {
        regex = rest;
    } else if regex.ends_with('$') && !regex.ends_with("\\$") {
        regex = &regex[..regex.len() - 1];
    }
    regex.to_string()
}

/// Routes keyed by name, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct RouteCollection {
    routes: Vec<(String, Route)>,
}

impl RouteCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `route` under `name`.
    ///
    /// A name that is already registered is removed first, so the new
    /// definition takes the last position.
    pub fn add(&mut self, name: impl Into<String>, route: Route) {
        let name = name.into();
        self.routes.retain(|(existing, _)| *existing != name);
        self.routes.push((name, route));
    }

    pub fn get(&self, name: &str) -> Option<&Route> {
        self.routes
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, route)| route)
    }

    pub fn remove(&mut self, name: &str) -> Option<Route> {
        let index = self.routes.iter().position(|(existing, _)| existing == name)?;
        Some(self.routes.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Route)> {
        self.routes.iter().map(|(name, route)| (name.as_str(), route))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|(name, _)| name.as_str())
    }

    /// Append every route of `other`, in its order.
    pub fn add_collection(&mut self, other: RouteCollection) {
        for (name, route) in other.routes {
            self.add(name, route);
        }
    }

    /// Prepend `prefix` to every path. Blank prefixes are ignored.
    pub fn add_prefix(&mut self, prefix: &str) {
        let prefix = prefix.trim().trim_matches('/');
        if prefix.is_empty() {
            return;
        }
        for (_, route) in &mut self.routes {
            let path = format!("/{}{}", prefix, route.path());
            route.set_path(&path);
        }
    }

    pub fn set_host(&mut self, host: &str) {
        for (_, route) in &mut self.routes {
            route.set_host(host);
        }
    }

    pub fn add_defaults<K, V>(&mut self, defaults: &[(K, V)])
    where
        K: AsRef<str>,
        V: Clone + Into<Value>,
    {
        for (_, route) in &mut self.routes {
            route.add_defaults(
                defaults
                    .iter()
                    .map(|(k, v)| (k.as_ref().to_string(), v.clone())),
            );
        }
    }

    pub fn add_requirements<K, V>(&mut self, requirements: &[(K, V)])
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (_, route) in &mut self.routes {
            route.add_requirements(
                requirements
                    .iter()
                    .map(|(k, v)| (k.as_ref().to_string(), v.as_ref())),
            );
        }
    }

    pub fn set_schemes(&mut self, schemes: &[&str]) {
        for (_, route) in &mut self.routes {
            route.set_schemes(schemes.iter().copied());
        }
    }

    pub fn set_methods(&mut self, methods: &[&str]) {
        for (_, route) in &mut self.routes {
            route.set_methods(methods.iter().copied());
        }
    }

    pub fn set_condition(&mut self, expression: &str) {
        for (_, route) in &mut self.routes {
            route.set_condition(Some(expression));
        }
    }
}

impl<S: Into<String>> FromIterator<(S, Route)> for RouteCollection {
    fn from_iter<T: IntoIterator<Item = (S, Route)>>(iter: T) -> Self {
        let mut collection = RouteCollection::new();
        for (name, route) in iter {
            collection.add(name, route);
        }
        collection
    }
}
