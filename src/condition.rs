//! Route conditions.
//!
//! A condition is a [minijinja] expression that must evaluate to a truthy
//! value for its route to match. Three variables are in scope:
//!
//! - `context`: the [`RequestContext`] (`context.method`, `context.host`, ...)
//! - `request`: the [`Request`] (headers, client ip), or none
//! - `params`: the parameters matched so far, `_route` included
//!
//! ```text
//! context.method in ['GET', 'HEAD'] and params.page != '0'
//! request.headers['x-debug'] == '1'
//! ```
//!
//! Expressions are parsed when tables are built, so syntax errors surface as
//! configuration errors, and compiled again once when a matcher loads them. Each distinct expression gets a non-zero id; the id
//! is negative when the expression refers to `request`, which tells the
//! matcher to provide one.

use std::collections::{BTreeMap, HashMap};

use minijinja::{context, Environment, Expression};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::context::{Request, RequestContext};
use crate::error::ConfigError;

/// Shared environment all condition expressions compile against.
static ENVIRONMENT: Lazy<Environment<'static>> = Lazy::new(Environment::new);

static REQUEST_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\brequest\b").expect("request reference regex should be valid")
});

/// A condition expression as stored in the compiled tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionSource {
    pub id: i32,
    pub expression: String,
}

/// Whether `expression` needs the `request` variable.
pub fn uses_request(expression: &str) -> bool {
    REQUEST_REFERENCE.is_match(expression)
}

/// Check that `expression` parses.
pub fn validate(expression: &str) -> Result<(), ConfigError> {
    ENVIRONMENT
        .compile_expression_owned(expression.to_string())
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidCondition {
            expression: expression.to_string(),
            reason: e.to_string(),
        })
}

fn eval(
    expression: &Expression<'_, '_>,
    context: &RequestContext,
    request: Option<&Request>,
    params: &BTreeMap<String, Value>,
) -> Result<bool, minijinja::Error> {
    let result = expression.eval(context! {
        context => context,
        request => request,
        params => params,
    })?;
    Ok(result.is_true())
}

/// Assigns ids to condition expressions while tables are built.
#[derive(Debug, Clone, Default)]
pub struct ConditionRegistry {
    sources: Vec<ConditionSource>,
}

impl ConditionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of `expression`, registering it on first use.
    pub fn register(&mut self, expression: &str) -> Result<i32, ConfigError> {
        if let Some(existing) = self.sources.iter().find(|s| s.expression == expression) {
            return Ok(existing.id);
        }
        validate(expression)?;

        let magnitude = i32::try_from(self.sources.len() + 1).map_err(|_| {
            ConfigError::InvalidCondition {
                expression: expression.to_string(),
                reason: "too many distinct conditions".to_string(),
            }
        })?;
        let id = if uses_request(expression) {
            -magnitude
        } else {
            magnitude
        };
        self.sources.push(ConditionSource {
            id,
            expression: expression.to_string(),
        });
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn into_sources(self) -> Vec<ConditionSource> {
        self.sources
    }
}

struct CompiledCondition {
    source: String,
    expression: Expression<'static, 'static>,
}

/// Condition expressions compiled once and looked up by id.
#[derive(Default)]
pub struct ConditionEvaluator {
    compiled: HashMap<i32, CompiledCondition>,
}

impl ConditionEvaluator {
    /// Compile every source. An expression that does not compile is logged
    /// and then treated like an unknown id.
    pub fn new(sources: &[ConditionSource]) -> Self {
        let mut compiled = HashMap::with_capacity(sources.len());
        for source in sources {
            match ENVIRONMENT.compile_expression_owned(source.expression.clone()) {
                Ok(expression) => {
                    compiled.insert(
                        source.id,
                        CompiledCondition {
                            source: source.expression.clone(),
                            expression,
                        },
                    );
                }
                Err(e) => warn!(
                    condition_id = source.id,
                    expression = %source.expression,
                    error = %e,
                    "Route condition failed to compile"
                ),
            }
        }
        Self { compiled }
    }

    /// Number of conditions that compiled.
    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    /// Whether condition `id` holds. Unknown ids and evaluation errors
    /// count as false.
    pub fn check(
        &self,
        id: i32,
        context: &RequestContext,
        request: Option<&Request>,
        params: &BTreeMap<String, Value>,
    ) -> bool {
        let Some(condition) = self.compiled.get(&id) else {
            warn!(condition_id = id, "Unknown route condition");
            return false;
        };
        match eval(&condition.expression, context, request, params) {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    condition_id = id,
                    expression = %condition.source,
                    error = %e,
                    "Route condition failed to evaluate"
                );
                false
            }
        }
    }
}
