use brrtmatch::context::RequestContext;
use brrtmatch::dumper::{CompiledMatcherTables, MatcherDumper};
use brrtmatch::matcher::{MatchOutcome, Matcher, Parameters};
use brrtmatch::route::{Route, RouteCollection};
use brrtmatch::runtime_config::{CompilerConfig, MatcherOptions};
use brrtmatch::MatchError;
use http::Method;
use serde_json::Value;
use std::collections::BTreeMap;
use tempfile::TempDir;

fn matcher(routes: &RouteCollection) -> Matcher {
    Matcher::from_routes(routes, CompilerConfig::default(), MatcherOptions::default()).unwrap()
}

fn params(pairs: &[(&str, &str)]) -> Parameters {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::from(*v)))
        .collect::<BTreeMap<_, _>>()
        .into()
}

fn blog_routes() -> RouteCollection {
    let mut routes = RouteCollection::new();
    routes.add("home", Route::new("/"));
    routes.add("post", Route::new("/blog/{slug}"));
    routes.add("post_comments", Route::new("/blog/{slug}/comments"));
    routes
}

#[test]
fn test_blog_scenario() {
    let matcher = matcher(&blog_routes());
    let context = RequestContext::new();

    assert_eq!(
        matcher.match_path("/blog/hello-world", &context),
        Ok(MatchOutcome::Found(params(&[
            ("_route", "post"),
            ("slug", "hello-world")
        ])))
    );
    assert_eq!(
        matcher.match_path("/blog/hello-world/comments", &context),
        Ok(MatchOutcome::Found(params(&[
            ("_route", "post_comments"),
            ("slug", "hello-world")
        ])))
    );
    assert_eq!(
        matcher.match_path("/", &context),
        Ok(MatchOutcome::Found(params(&[("_route", "home")])))
    );
    assert_eq!(
        matcher.match_path("/unknown", &context),
        Err(MatchError::NotFound {
            path: "/unknown".to_string()
        })
    );
}

#[test]
fn test_host_routing() {
    let mut routes = RouteCollection::new();
    routes.add("api", Route::new("/users").with_host("api.example.com"));
    let matcher = matcher(&routes);

    let other = RequestContext::new().with_host("other.example.com");
    assert_eq!(
        matcher.match_path("/users", &other),
        Err(MatchError::NotFound {
            path: "/users".to_string()
        })
    );

    let api = RequestContext::new().with_host("api.example.com");
    assert_eq!(matcher.match_path("/users", &api).unwrap().route(), "api");
}

#[test]
fn test_method_accumulation() {
    let mut routes = RouteCollection::new();
    routes.add("read", Route::new("/resource").with_methods(["GET"]));
    routes.add("create", Route::new("/resource").with_methods(["POST"]));
    routes.add("replace", Route::new("/resource").with_methods(["PUT"]));
    let matcher = matcher(&routes);

    let delete = RequestContext::new().with_method(Method::DELETE);
    assert_eq!(
        matcher.match_path("/resource", &delete),
        Err(MatchError::MethodNotAllowed {
            allowed: vec!["GET".to_string(), "POST".to_string(), "PUT".to_string()]
        })
    );

    let put = RequestContext::new().with_method(Method::PUT);
    assert_eq!(matcher.match_path("/resource", &put).unwrap().route(), "replace");
}

#[test]
fn test_trailing_slash_idempotence() {
    let mut routes = RouteCollection::new();
    routes.add("foo", Route::new("/foo"));
    routes.add("bar", Route::new("/bar/"));
    routes.add("item", Route::new("/items/{id}"));
    let matcher = matcher(&routes);
    let context = RequestContext::new();

    for (canonical, variant) in [("/foo", "/foo/"), ("/bar/", "/bar"), ("/items/7", "/items/7/")] {
        let direct = matcher.match_path(canonical, &context).unwrap();
        assert!(!direct.is_redirect(), "{canonical}");

        match matcher.match_path(variant, &context).unwrap() {
            MatchOutcome::Redirect(redirect) => {
                assert_eq!(redirect.path, canonical);
                assert_eq!(&redirect.parameters, direct.parameters());
            }
            other => panic!("expected {variant} to redirect, got {other:?}"),
        }
    }
}

#[test]
fn test_scheme_redirect() {
    let mut routes = RouteCollection::new();
    routes.add("login", Route::new("/login").with_schemes(["https"]));
    let matcher = matcher(&routes);

    let http = RequestContext::new().with_host("example.com");
    match matcher.match_path("/login", &http).unwrap() {
        MatchOutcome::Redirect(redirect) => {
            assert_eq!(redirect.path, "/login");
            assert_eq!(redirect.scheme.as_deref(), Some("https"));
            assert_eq!(redirect.url, "https://example.com/login");
        }
        other => panic!("expected a redirect, got {other:?}"),
    }

    let https = http.with_scheme("https");
    assert_eq!(
        matcher.match_path("/login", &https),
        Ok(MatchOutcome::Found(params(&[("_route", "login")])))
    );

    let post = RequestContext::new().with_method(Method::POST);
    assert_eq!(
        matcher.match_path("/login", &post),
        Err(MatchError::NotFound {
            path: "/login".to_string()
        })
    );
}

#[test]
fn test_static_route_agrees_with_its_own_regex() {
    let mut routes = RouteCollection::new();
    routes.add("archive", Route::new("/archive/2024"));
    routes.add("feed", Route::new("/feed.xml"));
    let matcher = Matcher::from_routes(
        &routes,
        CompilerConfig::default(),
        MatcherOptions::default().redirects(false),
    )
    .unwrap();

    for path in ["/archive/2024", "/archive/2025", "/feed.xml", "/feedxxml", "/archive"] {
        let expected = routes
            .iter()
            .find(|(_, route)| {
                route
                    .compile()
                    .unwrap()
                    .path_matcher()
                    .unwrap()
                    .is_match(path.as_bytes())
            })
            .map(|(name, _)| name.to_string());
        let actual = matcher
            .match_path(path, &RequestContext::new())
            .ok()
            .map(|outcome| outcome.route().to_string());
        assert_eq!(actual, expected, "{path}");
    }
}

#[test]
fn test_persisted_tables_match_like_fresh_ones() {
    let mut routes = blog_routes();
    routes.add(
        "tenant",
        Route::new("/dashboard/{section}")
            .with_host("{tenant}.example.com")
            .with_default("section", "home"),
    );
    routes.add(
        "admin",
        Route::new("/admin")
            .with_methods(["GET"])
            .with_condition("context.host == 'admin.example.com'"),
    );
    routes.add(
        "secure",
        Route::new("/account/{page}").with_schemes(["https"]),
    );

    let dir = TempDir::new().unwrap();
    let file = dir.path().join("tables.json");
    let tables = MatcherDumper::new(&routes).compiled_routes().unwrap();
    tables.save(&file).unwrap();

    let loaded = CompiledMatcherTables::load(&file).unwrap();
    assert_eq!(loaded, tables);

    let fresh = matcher(&routes);
    let persisted = Matcher::new(loaded, MatcherOptions::default()).unwrap();
    let requests = [
        ("/", "www.example.com"),
        ("/blog/a", "www.example.com"),
        ("/blog/a/comments/", "www.example.com"),
        ("/dashboard", "acme.example.com"),
        ("/dashboard/billing", "acme.example.com"),
        ("/admin", "admin.example.com"),
        ("/admin", "www.example.com"),
        ("/account/settings", "www.example.com"),
        ("/missing", "www.example.com"),
    ];
    for (path, host) in requests {
        let context = RequestContext::new().with_host(host);
        assert_eq!(
            persisted.match_path(path, &context),
            fresh.match_path(path, &context),
            "{host}{path}"
        );
    }
}

#[test]
fn test_compilation_is_deterministic() {
    let mut routes = blog_routes();
    routes.add("tagged", Route::new("/tags/{tag}.{_format}").with_default("_format", "html"));
    let first = MatcherDumper::new(&routes).dump_json().unwrap();
    let second = MatcherDumper::new(&routes).dump_json().unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_chunked_tables_keep_precedence() {
    let mut routes = RouteCollection::new();
    for i in 0..20 {
        routes.add(format!("item_{i}"), Route::new(&format!("/section{i}/{{id}}")));
    }
    routes.add("catch_all", Route::new("/{section}/{id}"));
    let config = CompilerConfig::default().with_chunk_limit(3);
    let matcher = Matcher::from_routes(&routes, config, MatcherOptions::default()).unwrap();

    let context = RequestContext::new();
    assert_eq!(matcher.match_path("/section0/1", &context).unwrap().route(), "item_0");
    assert_eq!(matcher.match_path("/section19/1", &context).unwrap().route(), "item_19");
    assert_eq!(matcher.match_path("/other/1", &context).unwrap().route(), "catch_all");
}
