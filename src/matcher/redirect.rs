//! Redirect resolution for GET/HEAD requests that did not match directly.

use url::Url;

use super::outcome::{Parameters, Redirect};
use crate::context::RequestContext;

/// Progress of one request through redirect resolution.
///
/// `Initial` is the plain match. A miss may move to `RetryWithSlash` (the
/// path with its trailing slash toggled) or `RetryWithScheme` (the first
/// scheme a candidate asked for). A slash retry that only finds routes
/// wanting another scheme moves on to `RetryWithScheme` at the toggled path.
/// Every other transition ends resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum RedirectState {
    Initial,
    RetryWithSlash { path: String },
    RetryWithScheme { path: String, scheme: String },
}

impl RedirectState {
    /// Next state after the initial attempt missed.
    pub(super) fn after_miss(path: &str, allowed_scheme: Option<&String>) -> Option<Self> {
        if let Some(scheme) = allowed_scheme {
            return Some(RedirectState::RetryWithScheme {
                path: path.to_string(),
                scheme: scheme.clone(),
            });
        }
        toggle_trailing_slash(path).map(|path| RedirectState::RetryWithSlash { path })
    }
}

/// `/foo` -> `/foo/`, `/foo//` -> `/foo`. The root path has no variant.
pub(super) fn toggle_trailing_slash(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.len() == path.len() {
        Some(format!("{path}/"))
    } else {
        Some(trimmed.to_string())
    }
}

pub(super) fn redirect(
    context: &RequestContext,
    path: String,
    scheme: Option<String>,
    parameters: Parameters,
) -> Redirect {
    let url = absolute_url(context, scheme.as_deref().unwrap_or(context.scheme()), &path);
    Redirect {
        path,
        scheme,
        url,
        parameters,
    }
}

/// `scheme://host[:port]{base_url}{path}[?query]`, with the port left out
/// when it is the scheme's default.
pub(super) fn absolute_url(context: &RequestContext, scheme: &str, path: &str) -> String {
    let target = format!("{}{}", context.base_url(), path);
    let port = match scheme {
        "http" if context.http_port() != 80 => Some(context.http_port()),
        "https" if context.https_port() != 443 => Some(context.https_port()),
        _ => None,
    };

    let Ok(mut url) = Url::parse(&format!("{scheme}://{}/", context.host())) else {
        return target;
    };
    if url.set_port(port).is_err() {
        return target;
    }
    url.set_path(&target);
    if !context.query_string().is_empty() {
        url.set_query(Some(context.query_string()));
    }
    url.to_string()
}
