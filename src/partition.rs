//! Split routes into a static lookup table and a dynamic (regex) list.
//!
//! A route without path variables can be answered by a hash lookup on its
//! literal path, but only if that does not let it overtake an earlier regex
//! route that would also match it. Such routes are kept in the dynamic list
//! so declaration order decides.

use std::collections::BTreeMap;

use regex::bytes::{Regex, RegexBuilder};

use crate::error::ConfigError;
use crate::route::Route;

/// A route answered from the static table.
#[derive(Debug, Clone, Copy)]
pub struct StaticRoute<'a> {
    pub name: &'a str,
    pub route: &'a Route,
    pub has_trailing_slash: bool,
}

/// Result of [`group_static_routes`].
#[derive(Debug, Default)]
pub struct GroupedRoutes<'a> {
    /// Keyed by literal path without its trailing slash, declaration order
    /// kept per key.
    pub static_routes: BTreeMap<String, Vec<StaticRoute<'a>>>,
    pub dynamic_routes: Vec<(&'a str, &'a Route)>,
}

struct DynamicPattern {
    host: Option<Regex>,
    path: Regex,
    static_prefix: String,
}

/// Partition `routes`, which must be in matching order.
pub fn group_static_routes<'a>(
    routes: &[(&'a str, &'a Route)],
) -> Result<GroupedRoutes<'a>, ConfigError> {
    let mut grouped = GroupedRoutes::default();
    let mut dynamic_patterns: Vec<DynamicPattern> = Vec::new();

    'routes: for &(name, route) in routes {
        let compiled = route.compile()?;
        let regex = compiled.unnamed_regex();
        let has_trailing_slash = route.path() != "/" && regex.ends_with("/$");

        let pattern = DynamicPattern {
            host: compiled.host_matcher()?,
            path: RegexBuilder::new(&format!(
                "{}{}",
                compiled.modifiers().flags(),
                optional_trailing_slash(route.path(), regex, has_trailing_slash)
            ))
            .build()?,
            static_prefix: compiled.static_prefix().trim_end_matches('/').to_string(),
        };

        if !compiled.path_variables().is_empty() {
            dynamic_patterns.push(pattern);
            grouped.dynamic_routes.push((name, route));
            continue;
        }

        let host = if compiled.host_variables().is_empty() {
            route.host()
        } else {
            ""
        };
        let url = if has_trailing_slash {
            &route.path()[..route.path().len() - 1]
        } else {
            route.path()
        };

        for earlier in &dynamic_patterns {
            let prefix_ok = earlier.static_prefix.is_empty() || url.starts_with(&earlier.static_prefix);
            if !prefix_ok {
                continue;
            }
            let path_ok = earlier.path.is_match(url.as_bytes())
                || earlier.path.is_match(format!("{url}/").as_bytes());
            let host_ok = host.is_empty()
                || earlier
                    .host
                    .as_ref()
                    .is_none_or(|h| h.is_match(host.as_bytes()));
            if path_ok && host_ok {
                dynamic_patterns.push(pattern);
                grouped.dynamic_routes.push((name, route));
                continue 'routes;
            }
        }

        grouped
            .static_routes
            .entry(url.to_string())
            .or_default()
            .push(StaticRoute {
                name,
                route,
                has_trailing_slash,
            });
    }

    Ok(grouped)
}

/// Make the trailing slash of an anchored regex optional: `^/a/$` and `^/a$`
/// both become `^/a/?$`. The root path is left alone.
fn optional_trailing_slash(path: &str, regex: &str, has_trailing_slash: bool) -> String {
    if path == "/" {
        return regex.to_string();
    }
    let cut = regex.len() - if has_trailing_slash { 2 } else { 1 };
    format!("{}/?$", &regex[..cut])
}
