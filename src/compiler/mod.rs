//! # Route Compiler
//!
//! Turns a [`Route`] into a [`CompiledRoute`]: an anchored regex per pattern
//! (path and, when set, host), the literal static prefix of the path, and
//! the ordered variable names.
//!
//! ## Placeholders
//!
//! `{name}` becomes a named capture group. Without an explicit requirement a
//! path variable matches `[^/]+` and a host variable matches `[^.]+`. When the
//! next static character after the placeholder is a separator from
//! [`SEPARATORS`], that character is excluded as well, so in
//! `/{page}.{_format}` the `page` variable becomes `[^/.]+`.
//!
//! A separator directly before a placeholder belongs to the variable token.
//! That is how optional trailing variables drop their separator:
//!
//! ```text
//! /blog/{page}      with default page=1   ^/blog(?:/(?P<page>[^/]+))?$
//! ```
//!
//! ## Modes
//!
//! Routes compile in byte mode unless [`Route::with_utf8`] is set, in which
//! case the regex runs in Unicode mode. Non-ASCII text in a byte-mode route
//! is rejected.


use once_cell::sync::Lazy;
use regex::bytes::RegexBuilder;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::route::Route;

/// Characters that act as variable separators.
pub const SEPARATORS: &str = "/,;.:-_~+*=@|";

/// Longest accepted variable name, in bytes.
pub const VARIABLE_MAXIMUM_LENGTH: usize = 32;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{(!)?(\w+)\}").expect("placeholder regex should be valid")
});

static PLAIN_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\w+\}").expect("plain placeholder regex should be valid")
});

static TRAILING_VARIABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\w+\}/?$").expect("trailing variable regex should be valid")
});

static GROUP_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\(\?P<\w+>").expect("group name regex should be valid")
});

/// Regex flags a compiled route runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modifiers {
    /// `(?s-u)`: classes and `.` match single bytes.
    Bytes,
    /// `(?s)`: classes and `.` match UTF-8 encoded codepoints.
    Unicode,
}

impl Modifiers {
    pub fn flags(self) -> &'static str {
        match self {
            Modifiers::Bytes => "(?s-u)",
            Modifiers::Unicode => "(?s)",
        }
    }
}

/// A piece of a tokenised pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Text(String),
    Variable {
        /// Separator character preceding the placeholder, or empty.
        separator: String,
        regex: String,
        name: String,
        /// `{!name}`: never optional, even with a default.
        important: bool,
    },
}

/// The compiled form of a [`Route`].
#[derive(Debug, Clone)]
pub struct CompiledRoute {
    static_prefix: String,
    regex: String,
    unnamed_regex: String,
    tokens: Vec<Token>,
    path_variables: Vec<String>,
    host_regex: Option<String>,
    unnamed_host_regex: Option<String>,
    host_tokens: Vec<Token>,
    host_variables: Vec<String>,
    variables: Vec<String>,
    modifiers: Modifiers,
    has_trailing_var: bool,
}

impl CompiledRoute {
    /// Literal text every matching path starts with.
    pub fn static_prefix(&self) -> &str {
        &self.static_prefix
    }

    /// Anchored path regex with named groups, e.g. `^/foo/(?P<bar>[^/]+)$`.
    pub fn regex(&self) -> &str {
        &self.regex
    }

    /// [`regex`](Self::regex) with group names removed. Groups keep their
    /// positions, so capture `n` is the `n`th path variable.
    pub fn unnamed_regex(&self) -> &str {
        &self.unnamed_regex
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn path_variables(&self) -> &[String] {
        &self.path_variables
    }

    /// Anchored host regex when the route has a host. Hosts are matched
    /// case-insensitively, so consumers apply `(?i)`.
    pub fn host_regex(&self) -> Option<&str> {
        self.host_regex.as_deref()
    }

    pub fn unnamed_host_regex(&self) -> Option<&str> {
        self.unnamed_host_regex.as_deref()
    }

    pub fn host_tokens(&self) -> &[Token] {
        &self.host_tokens
    }

    pub fn host_variables(&self) -> &[String] {
        &self.host_variables
    }

    /// Host variables followed by path variables.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    /// Whether the path ends in a variable, optionally followed by `/`.
    pub fn has_trailing_var(&self) -> bool {
        self.has_trailing_var
    }

    /// Build a standalone matcher for the path regex.
    pub fn path_matcher(&self) -> Result<regex::bytes::Regex, ConfigError> {
        Ok(RegexBuilder::new(&format!("{}{}", self.modifiers.flags(), self.regex)).build()?)
    }

    /// Build a standalone matcher for the host regex, if any.
    pub fn host_matcher(&self) -> Result<Option<regex::bytes::Regex>, ConfigError> {
        self.host_regex
            .as_deref()
            .map(|host| {
                RegexBuilder::new(&format!("{}(?i){}", self.modifiers.flags(), host))
                    .build()
                    .map_err(ConfigError::from)
            })
            .transpose()
    }
}

struct CompiledPattern {
    static_prefix: String,
    regex: String,
    tokens: Vec<Token>,
    variables: Vec<String>,
}

/// Stateless compiler from [`Route`] to [`CompiledRoute`].
pub struct RouteCompiler;

impl RouteCompiler {
    /// Compile a route.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a requirement is not a valid regex, a
    /// variable name is invalid or repeated, the reserved `_fragment`
    /// variable appears in the path, or non-ASCII text is used without the
    /// `utf8` option.
    pub fn compile(route: &Route) -> Result<CompiledRoute, ConfigError> {
        let modifiers = if route.is_utf8() {
            Modifiers::Unicode
        } else {
            Modifiers::Bytes
        };

        let mut host_variables = Vec::new();
        let mut host_tokens = Vec::new();
        let mut host_regex = None;
        if !route.host().is_empty() {
            let host = compile_pattern(route, route.host(), true, modifiers)?;
            host_variables = host.variables;
            host_tokens = host.tokens;
            host_regex = Some(host.regex);
        }

        let path = compile_pattern(route, route.path(), false, modifiers)?;
        if path.variables.iter().any(|v| v == "_fragment") {
            return Err(ConfigError::pattern(
                route.path(),
                "the \"_fragment\" variable is reserved and cannot be used in a path",
            ));
        }

        let mut variables = host_variables.clone();
        for name in &path.variables {
            if variables.contains(name) {
                return Err(ConfigError::pattern(
                    route.path(),
                    format!("variable \"{name}\" is used in both the host and the path"),
                ));
            }
            variables.push(name.clone());
        }

        let unnamed_regex = strip_group_names(&path.regex);
        let unnamed_host_regex = host_regex.as_deref().map(strip_group_names);

        Ok(CompiledRoute {
            static_prefix: path.static_prefix,
            unnamed_regex,
            regex: path.regex,
            tokens: path.tokens,
            path_variables: path.variables,
            host_regex,
            unnamed_host_regex,
            host_tokens,
            host_variables,
            variables,
            modifiers,
            has_trailing_var: TRAILING_VARIABLE.is_match(route.path()),
        })
    }
}

fn compile_pattern(
    route: &Route,
    pattern: &str,
    is_host: bool,
    modifiers: Modifiers,
) -> Result<CompiledPattern, ConfigError> {
    let utf8 = modifiers == Modifiers::Unicode;
    if !utf8 && !pattern.is_ascii() {
        return Err(ConfigError::pattern(
            pattern,
            "non-ASCII text requires the utf8 option on the route",
        ));
    }

    let default_separator = if is_host { '.' } else { '/' };
    let mut tokens = Vec::new();
    let mut variables: Vec<String> = Vec::new();
    let mut pos = 0;

    for caps in PLACEHOLDER.captures_iter(pattern) {
        let Some(whole) = caps.get(0) else { continue };
        let important = caps.get(1).is_some();
        let name = &caps[2];

        let preceding = &pattern[pos..whole.start()];
        pos = whole.end();

        let (text, separator) = match preceding.chars().last() {
            Some(c) if SEPARATORS.contains(c) => {
                (&preceding[..preceding.len() - c.len_utf8()], c.to_string())
            }
            _ => (preceding, String::new()),
        };
        if !text.is_empty() {
            tokens.push(Token::Text(text.to_string()));
        }

        if name.as_bytes().first().is_some_and(u8::is_ascii_digit) {
            return Err(ConfigError::pattern(
                pattern,
                format!("variable name \"{name}\" cannot start with a digit"),
            ));
        }
        if name.len() > VARIABLE_MAXIMUM_LENGTH {
            return Err(ConfigError::pattern(
                pattern,
                format!(
                    "variable name \"{name}\" cannot be longer than {VARIABLE_MAXIMUM_LENGTH} bytes"
                ),
            ));
        }
        if variables.iter().any(|v| v == name) {
            return Err(ConfigError::pattern(
                pattern,
                format!("variable \"{name}\" is referred to more than once"),
            ));
        }

        let regex = match route.requirement(name) {
            Some(requirement) => {
                validate_requirement(route, name, requirement, modifiers)?;
                transform_capturing_groups(requirement).map_err(|reason| {
                    ConfigError::pattern(pattern, format!("requirement of \"{name}\": {reason}"))
                })?
            }
            None => {
                let next = next_separator(&pattern[pos..]);
                let mut class = regex::escape(&default_separator.to_string());
                if let Some(next) = next.filter(|c| *c != default_separator) {
                    class.push_str(&regex::escape(&next.to_string()));
                }
                format!("[^{class}]+")
            }
        };

        tokens.push(Token::Variable {
            separator,
            regex,
            name: name.to_string(),
            important,
        });
        variables.push(name.to_string());
    }

    if pos < pattern.len() {
        tokens.push(Token::Text(pattern[pos..].to_string()));
    }

    // Trailing run of variables with defaults, path only.
    let mut first_optional = usize::MAX;
    if !is_host {
        for (index, token) in tokens.iter().enumerate().rev() {
            match token {
                Token::Variable {
                    name, important, ..
                } if !important && route.has_default(name) => first_optional = index,
                _ => break,
            }
        }
    }

    let mut body = String::new();
    for index in 0..tokens.len() {
        body.push_str(&token_regex(&tokens, index, first_optional));
    }

    Ok(CompiledPattern {
        static_prefix: static_prefix(route, &tokens),
        regex: format!("^{body}$"),
        tokens,
        variables,
    })
}

fn token_regex(tokens: &[Token], index: usize, first_optional: usize) -> String {
    match &tokens[index] {
        Token::Text(text) => regex::escape(text),
        Token::Variable {
            separator,
            regex,
            name,
            ..
        } => {
            let separator = regex::escape(separator);
            if index == 0 && first_optional == 0 {
                // A lone optional variable keeps its separator mandatory.
                return format!("{separator}(?P<{name}>{regex})?");
            }
            let mut out = format!("{separator}(?P<{name}>{regex})");
            if index >= first_optional {
                out = format!("(?:{out}");
                let count = tokens.len();
                if index == count - 1 {
                    let closing = count - first_optional - usize::from(first_optional == 0);
                    out.push_str(&")?".repeat(closing));
                }
            }
            out
        }
    }
}

fn static_prefix(route: &Route, tokens: &[Token]) -> String {
    match tokens.first() {
        None => String::new(),
        Some(Token::Variable {
            separator, name, ..
        }) => {
            if route.has_default(name) || separator == "/" {
                String::new()
            } else {
                separator.clone()
            }
        }
        Some(Token::Text(text)) => {
            let mut prefix = text.clone();
            if let Some(Token::Variable {
                separator, name, ..
            }) = tokens.get(1)
            {
                if separator != "/" && !route.has_default(name) {
                    prefix.push_str(separator);
                }
            }
            prefix
        }
    }
}

/// First static character after the placeholder, if it is a separator.
fn next_separator(following: &str) -> Option<char> {
    let stripped = PLAIN_PLACEHOLDER.replace_all(following, "");
    stripped.chars().next().filter(|c| SEPARATORS.contains(*c))
}

fn validate_requirement(
    route: &Route,
    name: &str,
    requirement: &str,
    modifiers: Modifiers,
) -> Result<(), ConfigError> {
    if requirement.is_empty() {
        return Err(ConfigError::pattern(
            route.path(),
            format!("requirement of \"{name}\" cannot be empty"),
        ));
    }
    if modifiers == Modifiers::Bytes && !requirement.is_ascii() {
        return Err(ConfigError::pattern(
            route.path(),
            format!("requirement of \"{name}\" contains non-ASCII text; set the utf8 option"),
        ));
    }
    RegexBuilder::new(&format!("{}^(?:{})$", modifiers.flags(), requirement))
        .build()
        .map(|_| ())
        .map_err(|source| ConfigError::InvalidRequirement {
            path: route.path().to_string(),
            variable: name.to_string(),
            source: Box::new(source),
        })
}

/// Rewrite `(...)` groups in a requirement to `(?:...)`.
///
/// Named groups are rejected: they would collide with the variable groups.
pub(crate) fn transform_capturing_groups(regex: &str) -> Result<String, String> {
    let mut out = String::with_capacity(regex.len() + 8);
    let mut class_depth = 0usize;
    let mut chars = regex.char_indices().peekable();

    while let Some((index, c)) = chars.next() {
        match c {
            '\\' => {
                out.push(c);
                if let Some((_, escaped)) = chars.next() {
                    out.push(escaped);
                }
            }
            '[' => {
                out.push(c);
                class_depth += 1;
                let head = class_head_len(&regex[index + 1..]);
                out.push_str(&regex[index + 1..index + 1 + head]);
                for _ in 0..head {
                    chars.next();
                }
            }
            ']' if class_depth > 0 => {
                out.push(c);
                class_depth -= 1;
            }
            '(' if class_depth == 0 => {
                out.push(c);
                let rest = &regex[index + 1..];
                if rest.starts_with("?P<")
                    || (rest.starts_with("?<") && !rest.starts_with("?<=") && !rest.starts_with("?<!"))
                {
                    return Err("named capture groups are not allowed".to_string());
                }
                if !rest.starts_with('?') {
                    out.push_str("?:");
                }
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

/// Bytes after a class's opening `[` that are literal: an optional `^`, then
/// a `]` in first position.
pub(crate) fn class_head_len(rest: &str) -> usize {
    let negated = usize::from(rest.starts_with('^'));
    negated + usize::from(rest[negated..].starts_with(']'))
}

/// Remove `?P<name>` from variable groups, leaving plain capture groups.
pub(crate) fn strip_group_names(regex: &str) -> String {
    GROUP_NAME.replace_all(regex, "(").into_owned()
}
