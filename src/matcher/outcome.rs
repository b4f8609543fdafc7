use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parameters of a matched route: its defaults, `_route`, and every
/// variable that captured a value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(BTreeMap<String, Value>);

impl Parameters {
    /// Name of the matched route.
    #[must_use]
    pub fn route(&self) -> &str {
        self.get_str("_route").unwrap_or_default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// String value of `name`; `None` when absent or not a string.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl From<BTreeMap<String, Value>> for Parameters {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

/// Where a GET/HEAD request should be sent instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Redirect {
    /// Path info of the redirect target, as requested (not decoded).
    pub path: String,
    /// Target scheme when it differs from the request's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    /// Absolute target URL, query string included.
    pub url: String,
    /// Parameters the target resolves to.
    pub parameters: Parameters,
}

/// Successful result of a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchOutcome {
    Found(Parameters),
    Redirect(Redirect),
}

impl MatchOutcome {
    /// Name of the matched route, or of the redirect target's route.
    pub fn route(&self) -> &str {
        self.parameters().route()
    }

    pub fn parameters(&self) -> &Parameters {
        match self {
            MatchOutcome::Found(parameters) => parameters,
            MatchOutcome::Redirect(redirect) => &redirect.parameters,
        }
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self, MatchOutcome::Redirect(_))
    }

    pub fn into_parameters(self) -> Parameters {
        match self {
            MatchOutcome::Found(parameters) => parameters,
            MatchOutcome::Redirect(redirect) => redirect.parameters,
        }
    }
}
