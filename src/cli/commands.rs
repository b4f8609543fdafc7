use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use http::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::context::RequestContext;
use crate::dumper::{render_rust, CompiledMatcherTables, MarkEntry, MatcherDumper};
use crate::error::MatchError;
use crate::matcher::Matcher;
use crate::route::{Route, RouteCollection};
use crate::runtime_config::{CompilerConfig, MatcherOptions};

/// Command-line interface for brrtmatch
#[derive(Parser, Debug)]
#[command(name = "brrtmatch", version)]
#[command(about = "Compile route tables and match requests against them", long_about = None)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile route definitions (JSON) into matcher tables
    Compile {
        /// JSON file holding an ordered list of route definitions
        #[arg(short, long)]
        routes: PathBuf,

        /// Where to write the tables (default: stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Regex size limit in bytes (overrides BRRTMATCH_REGEX_SIZE_LIMIT)
        #[arg(long)]
        regex_size_limit: Option<usize>,

        /// Maximum routes per chunk regex (overrides BRRTMATCH_CHUNK_LIMIT)
        #[arg(long)]
        chunk_limit: Option<usize>,
    },
    /// Summarise compiled tables
    Inspect {
        /// Compiled tables (JSON)
        #[arg(short, long)]
        tables: PathBuf,
    },
    /// Match one request against compiled tables
    Match {
        /// Compiled tables (JSON)
        #[arg(short, long)]
        tables: PathBuf,

        /// Path info to match, percent-encoded
        #[arg(short, long)]
        path: String,

        #[arg(short, long, default_value = "GET")]
        method: String,

        #[arg(long, default_value = "localhost")]
        host: String,

        #[arg(long, default_value = "http")]
        scheme: String,

        /// Base URL prepended to redirect targets
        #[arg(long, default_value = "")]
        base_url: String,

        /// Query string appended to redirect targets
        #[arg(long, default_value = "")]
        query: String,

        /// Report misses instead of resolving redirects
        #[arg(long, default_value_t = false)]
        no_redirects: bool,
    },
    /// Render compiled tables as a Rust module
    Codegen {
        /// Compiled tables (JSON)
        #[arg(short, long)]
        tables: PathBuf,

        /// Where to write the module (default: stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

/// One entry of a route definition file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteDefinition {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub schemes: Vec<String>,
    #[serde(default)]
    pub defaults: BTreeMap<String, Value>,
    #[serde(default)]
    pub requirements: BTreeMap<String, String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub utf8: bool,
}

impl RouteDefinition {
    pub fn into_route(self) -> (String, Route) {
        let mut route = Route::new(&self.path)
            .with_host(&self.host)
            .with_methods(&self.methods)
            .with_schemes(&self.schemes)
            .with_defaults(self.defaults)
            .with_requirements(self.requirements)
            .with_utf8(self.utf8);
        if let Some(condition) = &self.condition {
            route = route.with_condition(condition);
        }
        (self.name, route)
    }
}

/// Read an ordered JSON list of [`RouteDefinition`]s.
pub fn load_routes(path: &Path) -> Result<RouteCollection> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read routes from {}", path.display()))?;
    let definitions: Vec<RouteDefinition> = serde_json::from_str(&text)
        .with_context(|| format!("Invalid route definitions in {}", path.display()))?;
    Ok(definitions
        .into_iter()
        .map(RouteDefinition::into_route)
        .collect())
}

fn load_tables(path: &Path) -> Result<CompiledMatcherTables> {
    CompiledMatcherTables::load(path)
        .with_context(|| format!("Failed to load tables from {}", path.display()))
}

fn emit(out: &mut dyn Write, target: Option<&Path>, text: &str) -> Result<()> {
    match target {
        Some(path) => fs::write(path, text)
            .with_context(|| format!("Failed to write {}", path.display())),
        None => writeln!(out, "{text}").context("Failed to write output"),
    }
}

/// Execute the CLI command provided by the user, printing to stdout.
///
/// Returns the process exit code: 0 on success, 1 when `match` found
/// nothing (or the method is not allowed).
///
/// # Errors
///
/// Unreadable input files, invalid routes or tables, and write failures.
pub fn run_cli(cli: Cli) -> Result<u8> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    execute(cli, &mut out)
}

pub(crate) fn execute(cli: Cli, out: &mut dyn Write) -> Result<u8> {
    match cli.command {
        Commands::Compile {
            routes,
            out: target,
            regex_size_limit,
            chunk_limit,
        } => {
            let collection = load_routes(&routes)?;
            let mut config = CompilerConfig::from_env();
            if let Some(limit) = regex_size_limit {
                config = config.with_regex_size_limit(limit);
            }
            if let Some(limit) = chunk_limit {
                config = config.with_chunk_limit(limit);
            }
            let dumper = MatcherDumper::new(&collection).with_config(config);
            let tables = dumper.compiled_routes()?;
            info!(
                routes = tables.route_count(),
                chunks = tables.chunk_count(),
                "Compiled route definitions"
            );
            emit(out, target.as_deref(), &tables.to_json()?)?;
            Ok(0)
        }
        Commands::Inspect { tables } => {
            let tables = load_tables(&tables)?;
            write!(out, "{}", summary(&tables)).context("Failed to write output")?;
            Ok(0)
        }
        Commands::Match {
            tables,
            path,
            method,
            host,
            scheme,
            base_url,
            query,
            no_redirects,
        } => {
            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .map_err(|_| anyhow!("Invalid HTTP method: {method}"))?;
            let context = RequestContext::new()
                .with_method(method)
                .with_host(&host)
                .with_scheme(&scheme)
                .with_base_url(&base_url)
                .with_path_info(&path)
                .with_query_string(&query);
            let options = MatcherOptions::from_env().redirects(!no_redirects);
            let matcher = Matcher::new(load_tables(&tables)?, options)?;

            let (report, code) = match matcher.match_path(&path, &context) {
                Ok(outcome) => (serde_json::to_value(&outcome)?, 0),
                Err(e) => (error_report(&e), 1),
            };
            writeln!(out, "{}", serde_json::to_string_pretty(&report)?)
                .context("Failed to write output")?;
            Ok(code)
        }
        Commands::Codegen { tables, out: target } => {
            let tables = load_tables(&tables)?;
            emit(out, target.as_deref(), &render_rust(&tables)?)?;
            Ok(0)
        }
    }
}

fn error_report(error: &MatchError) -> Value {
    match error {
        MatchError::NotFound { path } => json!({
            "outcome": "not_found",
            "path": path,
            "message": error.to_string(),
        }),
        MatchError::MethodNotAllowed { allowed } => json!({
            "outcome": "method_not_allowed",
            "allowed": allowed,
            "message": error.to_string(),
        }),
        MatchError::NoConfiguration => json!({
            "outcome": "no_configuration",
            "message": error.to_string(),
        }),
    }
}

fn summary(tables: &CompiledMatcherTables) -> String {
    let mut text = format!(
        "Routes: {} ({} static, {} dynamic)\nChunks: {}\nHost matching: {}\nConditions: {}\n",
        tables.route_count(),
        tables.static_route_count(),
        tables.dynamic_route_count(),
        tables.chunk_count(),
        if tables.match_host { "yes" } else { "no" },
        tables.conditions.len(),
    );

    if !tables.static_routes.is_empty() {
        text.push_str("\nStatic paths:\n");
        for (path, records) in &tables.static_routes {
            let names: Vec<&str> = records.iter().map(|r| r.name()).collect();
            text.push_str(&format!("  {path} -> {}\n", names.join(", ")));
        }
    }

    for (offset, regex) in &tables.regexp_list {
        let leaves = tables.chunk_leaves.get(offset).map_or(0, Vec::len);
        text.push_str(&format!(
            "\nChunk @{offset}: {leaves} leaves, {} bytes\n",
            regex.len()
        ));
        for leaf in tables.chunk_leaves.get(offset).into_iter().flatten() {
            let names: Vec<&str> = tables
                .dynamic_routes
                .get(&leaf.mark)
                .into_iter()
                .flatten()
                .filter_map(|entry| match entry {
                    MarkEntry::Route(record) => Some(record.name()),
                    MarkEntry::Terminator => None,
                })
                .collect();
            text.push_str(&format!("  mark {} -> {}\n", leaf.mark, names.join(", ")));
        }
    }

    if !tables.conditions.is_empty() {
        text.push_str("\nConditions:\n");
        for condition in &tables.conditions {
            text.push_str(&format!("  {:>3}: {}\n", condition.id, condition.expression));
        }
    }
    text
}
