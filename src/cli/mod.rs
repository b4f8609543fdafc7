//! # CLI Module
//!
//! Command-line interface for compiling route tables and trying requests
//! against them.
//!
//! ## Commands
//!
//! ### `compile`
//!
//! Compile a JSON list of route definitions into matcher tables:
//!
//! ```bash
//! brrtmatch compile --routes routes.json --out tables.json
//! ```
//!
//! A route definition carries `name` and `path`, and optionally `host`,
//! `methods`, `schemes`, `defaults`, `requirements`, `condition` and `utf8`.
//! The order of the list is the matching precedence.
//!
//! ### `inspect`
//!
//! Summarise compiled tables (route counts, chunks, conditions):
//!
//! ```bash
//! brrtmatch inspect --tables tables.json
//! ```
//!
//! ### `match`
//!
//! Match one request and print the outcome as JSON:
//!
//! ```bash
//! brrtmatch match --tables tables.json --path /blog/hello --method GET --host example.com
//! ```
//!
//! Exit code 0 when a route matched or a redirect was found, 1 when nothing
//! matched or the method is not allowed.
//!
//! ### `codegen`
//!
//! Render the tables as a Rust module exposing `compiled_tables()`:
//!
//! ```bash
//! brrtmatch codegen --tables tables.json --out src/routes.rs
//! ```
//!
//! ## Usage from Code
//!
//! ```rust,ignore
//! use brrtmatch::cli::{run_cli, Cli};
//! use clap::Parser;
//!
//! let code = run_cli(Cli::parse())?;
//! ```

mod commands;


pub use commands::{load_routes, run_cli, Cli, Commands, RouteDefinition};
