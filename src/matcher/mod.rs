//! # Matcher Module
//!
//! Request-time matching against [`CompiledMatcherTables`](crate::dumper::CompiledMatcherTables).
//!
//! ## Algorithm
//!
//! 1. The path is percent-decoded once. A trailing-slash-trimmed variant is
//!    kept for static lookups and trailing-variable checks.
//! 2. **Static phase**: the trimmed path is looked up in the static table and
//!    its candidates are tried in declaration order.
//! 3. **Dynamic phase**: each chunk regex is matched against the subject
//!    (`path`, or `host.path` when any route has a host). The marker group
//!    that participated names the leaf. When all records of a leaf are
//!    rejected, the chunk is scanned again with that leaf excluded.
//! 4. **Resolution**: a path match that failed only on methods is a
//!    [`MatchError::MethodNotAllowed`](crate::error::MatchError). For GET and
//!    HEAD, a match that failed only on scheme or trailing slash becomes a
//!    [`Redirect`].
//!
//! Method and scheme mismatches never stop the search: a later candidate for
//! the same path may still accept the request.
//!
//! ## Example
//!
//! ```rust
//! use brrtmatch::context::RequestContext;
//! use brrtmatch::matcher::Matcher;
//! use brrtmatch::route::{Route, RouteCollection};
//! use brrtmatch::runtime_config::{CompilerConfig, MatcherOptions};
//!
//! let mut routes = RouteCollection::new();
//! routes.add("post", Route::new("/blog/{slug}"));
//!
//! let matcher = Matcher::from_routes(&routes, CompilerConfig::default(), MatcherOptions::default())?;
//! let outcome = matcher.match_path("/blog/hello-world", &RequestContext::new())?;
//! assert_eq!(outcome.route(), "post");
//! assert_eq!(outcome.parameters().get_str("slug"), Some("hello-world"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod core;
mod outcome;
mod redirect;

pub use core::{Matcher, MAX_INLINE_VARS};
pub use outcome::{MatchOutcome, Parameters, Redirect};
