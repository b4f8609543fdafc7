//! # BRRTMatch
//!
//! **BRRTMatch** compiles an ordered table of URL routes into a compact matcher: a hash
//! table for routes without variables and a small number of large regexes for the rest.
//! Matching a request costs one hash lookup plus, at most, one regex execution per chunk.
//!
//! ## Overview
//!
//! Routes are declared in precedence order: the first route that accepts a request wins.
//! Each route is a path pattern such as `/blog/{slug}` with optional host pattern,
//! requirements, defaults, methods, schemes and a condition expression. Matching
//! returns the route's parameters, a redirect for GET/HEAD requests that only differ
//! from a route by trailing slash or scheme, or an error distinguishing "not found"
//! from "method not allowed".
//!
//! ## Architecture
//!
//! - **[`route`]** - Route definitions and the ordered [`RouteCollection`](route::RouteCollection)
//! - **[`compiler`]** - Pattern compilation into anchored regexes and token lists
//! - **[`prefix_tree`]** - Factoring of common regex prefixes without reordering routes
//! - **[`partition`]** - Split between static (hash lookup) and dynamic (regex) routes
//! - **[`dumper`]** - Builds [`CompiledMatcherTables`](dumper::CompiledMatcherTables) and
//!   persists them as JSON or a generated Rust module
//! - **[`matcher`]** - Request-time lookup, redirect resolution and 405 detection
//! - **[`condition`]** - Route conditions evaluated with `minijinja`
//! - **[`context`]** - The request context and request seen by the matcher
//! - **[`runtime_config`]** - Compiler and matcher settings, loaded from the environment
//! - **[`logging`]** - `tracing` subscriber setup
//! - **[`cli`]** - The `brrtmatch` command line
//!
//! ### Compile Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant User
//!     participant Dumper as MatcherDumper
//!     participant Compiler as RouteCompiler
//!     participant Partition as partition
//!     participant Tree as StaticPrefixCollection
//!     participant Engine as regex
//!
//!     User->>Dumper: compiled_routes()
//!     Dumper->>Compiler: compile(route) for each route
//!     Compiler-->>Dumper: CompiledRoute (regex, tokens, variables)
//!     Dumper->>Partition: group_static_routes(routes)
//!     Partition-->>Dumper: static table + dynamic list
//!     loop each chunk
//!         Dumper->>Tree: add_route(regex body)
//!         Tree-->>Dumper: prefix-factored alternation
//!         Dumper->>Engine: build chunk regex
//!         alt compiled too big
//!             Engine-->>Dumper: CompiledTooBig
//!             Dumper->>Dumper: halve chunk limit and retry
//!         end
//!     end
//!     Dumper-->>User: CompiledMatcherTables
//! ```
//!
//! ### Match Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Matcher
//!     participant Static as static table
//!     participant Chunks as chunk regexes
//!
//!     Client->>Matcher: match_path("/blog/hello", context)
//!     Matcher->>Static: lookup trimmed path
//!     alt static candidate accepts request
//!         Static-->>Client: Found(parameters)
//!     end
//!     Matcher->>Chunks: captures(subject)
//!     Chunks-->>Matcher: marker group -> leaf -> route records
//!     alt record accepts request
//!         Matcher-->>Client: Found(parameters)
//!     else only method differs
//!         Matcher-->>Client: MethodNotAllowed(allowed)
//!     else GET/HEAD and only slash or scheme differs
//!         Matcher-->>Client: Redirect(path, scheme, url)
//!     else
//!         Matcher-->>Client: NotFound
//!     end
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use brrtmatch::context::RequestContext;
//! use brrtmatch::matcher::{MatchOutcome, Matcher};
//! use brrtmatch::route::{Route, RouteCollection};
//! use brrtmatch::runtime_config::{CompilerConfig, MatcherOptions};
//! use http::Method;
//!
//! let mut routes = RouteCollection::new();
//! routes.add("home", Route::new("/"));
//! routes.add("post_show", Route::new("/blog/{slug}").with_methods(["GET"]));
//! routes.add("post_edit", Route::new("/blog/{slug}/edit/").with_methods(["GET", "POST"]));
//!
//! let matcher = Matcher::from_routes(&routes, CompilerConfig::default(), MatcherOptions::default())?;
//!
//! let context = RequestContext::new().with_method(Method::GET);
//! let outcome = matcher.match_path("/blog/hello", &context)?;
//! assert_eq!(outcome.route(), "post_show");
//!
//! // Missing trailing slash on a GET request: redirect to the canonical path.
//! match matcher.match_path("/blog/hello/edit", &context)? {
//!     MatchOutcome::Redirect(redirect) => assert_eq!(redirect.path, "/blog/hello/edit/"),
//!     other => panic!("unexpected {other:?}"),
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Persisted Tables
//!
//! Compilation is deterministic, so tables can be built once and shipped:
//!
//! ```bash
//! brrtmatch compile --routes routes.json --out tables.json
//! brrtmatch match --tables tables.json --path /blog/hello
//! brrtmatch codegen --tables tables.json --out src/routes.rs
//! ```
//!
//! ## Configuration
//!
//! | Variable | Default | Effect |
//! |----------|---------|--------|
//! | `BRRTMATCH_REGEX_SIZE_LIMIT` | `0xA00000` | Compiled size limit of one chunk regex |
//! | `BRRTMATCH_CHUNK_LIMIT` | unlimited | Initial number of routes per chunk |
//! | `BRRTMATCH_REDIRECTS` | `true` | Resolve trailing slash and scheme redirects |
//! | `BRRTMATCH_SLOW_MATCH_US` | `1000` | Warn when one match takes longer |
//! | `BRRTMATCH_LOG_LEVEL` | `warn` | Log level of the `brrtmatch` binary |
//! | `BRRTMATCH_LOG_FORMAT` | `json` | `json` or `pretty` |

pub mod cli;
pub mod compiler;
pub mod condition;
pub mod context;
pub mod dumper;
pub mod error;
pub mod logging;
pub mod matcher;
pub mod partition;
pub mod prefix_tree;
pub mod route;
pub mod runtime_config;

pub use error::{ArtifactError, ConfigError, MatchError};
pub use matcher::{MatchOutcome, Matcher};
pub use route::{Route, RouteCollection};
