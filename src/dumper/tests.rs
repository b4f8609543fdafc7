use super::*;
use regex::bytes::RegexBuilder;
use serde_json::json;

fn tables(routes: &RouteCollection) -> CompiledMatcherTables {
    MatcherDumper::new(routes)
        .compiled_routes()
        .expect("routes should compile")
}

fn routes(items: Vec<(&str, Route)>) -> RouteCollection {
    items.into_iter().collect()
}

fn all_marks(tables: &CompiledMatcherTables) -> Vec<usize> {
    tables
        .chunk_leaves
        .values()
        .flatten()
        .map(|leaf| leaf.mark)
        .collect()
}

/// Smallest size limit under which `pattern` compiles.
fn minimal_size_limit(pattern: &str) -> usize {
    let (mut lo, mut hi) = (1usize, crate::runtime_config::DEFAULT_REGEX_SIZE_LIMIT);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if RegexBuilder::new(pattern).size_limit(mid).build().is_ok() {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    lo
}

#[test]
fn test_static_and_dynamic_split() {
    let tables = tables(&routes(vec![
        ("home", Route::new("/")),
        ("post", Route::new("/blog/{slug}")),
        ("about", Route::new("/about/")),
    ]));

    assert!(!tables.match_host);
    assert_eq!(tables.static_route_count(), 2);
    assert_eq!(tables.dynamic_route_count(), 1);
    assert_eq!(tables.route_names(), ["home", "about", "post"]);

    let about = &tables.static_routes["/about"][0];
    assert_eq!(about.name(), "about");
    assert!(about.has_trailing_slash);
    assert!(!tables.static_routes["/"][0].has_trailing_slash);
}

#[test]
fn test_marks_are_offsets_of_marker_groups() {
    let tables = tables(&routes(vec![
        ("a", Route::new("/foo/{bar}")),
        ("b", Route::new("/foo/{bar}/baz")),
        ("c", Route::new("/qux/{id}")),
    ]));

    assert_eq!(tables.chunk_count(), 1);
    let (start, text) = tables.regexp_list.iter().next().expect("one chunk");
    assert_eq!(*start, 0);
    assert!(text.starts_with("(?s-u)^(?:"), "{text}");
    assert!(text.ends_with(")/?$"), "{text}");

    let marks = all_marks(&tables);
    assert_eq!(marks.len(), 3);
    assert!(marks.windows(2).all(|w| w[0] < w[1]), "{marks:?}");
    for mark in &marks {
        assert!(
            text[mark - start..].starts_with(&format!("(?P<_M{mark}>)")),
            "mark {mark} in {text}"
        );
    }

    let names: Vec<_> = marks
        .iter()
        .map(|m| match &tables.dynamic_routes[m][0] {
            MarkEntry::Route(record) => record.name().to_string(),
            MarkEntry::Terminator => String::from("terminator"),
        })
        .collect();
    assert_eq!(names, ["a", "b", "c"]);
}

#[test]
fn test_last_mark_of_a_chunk_ends_with_terminator() {
    let tables = tables(&routes(vec![
        ("a", Route::new("/a/{x}")),
        ("b", Route::new("/b/{x}")),
    ]));
    let marks = all_marks(&tables);
    let last = marks.last().expect("marks");
    assert_eq!(
        tables.dynamic_routes[last].last(),
        Some(&MarkEntry::Terminator)
    );
    let first = &tables.dynamic_routes[&marks[0]];
    assert!(!first.contains(&MarkEntry::Terminator));
}

#[test]
fn test_chunk_regex_captures_into_leaf_groups() {
    let tables = tables(&routes(vec![
        ("a", Route::new("/foo/{bar}")),
        ("b", Route::new("/foo/{bar}/{baz}")),
    ]));
    let text = &tables.regexp_list[&0];
    let regex = RegexBuilder::new(text).build().expect("chunk compiles");
    let leaves = &tables.chunk_leaves[&0];

    let caps = regex.captures(b"/foo/one/two").expect("matches");
    let leaf = leaves
        .iter()
        .find(|leaf| caps.get(leaf.group).is_some())
        .expect("a marker participated");
    let values: Vec<_> = leaf
        .var_groups
        .iter()
        .map(|g| caps.get(*g).map(|m| m.as_bytes().to_vec()))
        .collect();
    assert_eq!(values, [Some(b"one".to_vec()), Some(b"two".to_vec())]);

    let standalone = RegexBuilder::new(&leaf.pattern).build().expect("leaf compiles");
    let caps = standalone.captures(b"/foo/one/two").expect("leaf matches alone");
    assert_eq!(caps.get(1).map(|m| m.as_bytes()), Some(&b"one"[..]));
    assert_eq!(caps.get(2).map(|m| m.as_bytes()), Some(&b"two"[..]));
}

#[test]
fn test_identical_regexes_share_a_mark() {
    let tables = tables(&routes(vec![
        ("first", Route::new("/foo/{bar}").with_methods(["POST"])),
        ("second", Route::new("/foo/{bar}").with_default("x", 1)),
    ]));
    let marks = all_marks(&tables);
    assert_eq!(marks.len(), 1);
    let entries = &tables.dynamic_routes[&marks[0]];
    assert_eq!(entries.len(), 3);
    assert!(matches!(&entries[0], MarkEntry::Route(r) if r.name() == "first"));
    assert!(matches!(&entries[1], MarkEntry::Route(r) if r.defaults["x"] == json!(1)));
    assert_eq!(entries[2], MarkEntry::Terminator);
}

#[test]
fn test_record_fields() {
    let tables = tables(&routes(vec![(
        "show",
        Route::new("/show/{id}/")
            .with_methods(["get", "head"])
            .with_schemes(["HTTPS"])
            .with_default("_format", "html"),
    )]));
    let MarkEntry::Route(record) = &tables.dynamic_routes[&all_marks(&tables)[0]][0] else {
        panic!("expected a route record");
    };
    assert_eq!(record.variables, ["id"]);
    assert_eq!(record.methods, ["GET", "HEAD"]);
    assert_eq!(record.schemes, ["https"]);
    assert!(record.has_trailing_slash);
    assert!(record.has_trailing_var);
    assert_eq!(record.defaults["_route"], json!("show"));
    assert_eq!(record.defaults["_format"], json!("html"));
    assert_eq!(record.condition, None);
}

#[test]
fn test_condition_ids() {
    let tables = tables(&routes(vec![
        ("a", Route::new("/a").with_condition("context.method == 'GET'")),
        ("b", Route::new("/b/{x}").with_condition("request.headers['x-a'] == '1'")),
        ("c", Route::new("/c").with_condition("context.method == 'GET'")),
    ]));
    assert_eq!(tables.conditions.len(), 2);
    assert_eq!(tables.static_routes["/a"][0].condition, Some(1));
    assert_eq!(tables.static_routes["/c"][0].condition, Some(1));
    let MarkEntry::Route(b) = &tables.dynamic_routes[&all_marks(&tables)[0]][0] else {
        panic!("expected a route record");
    };
    assert_eq!(b.condition, Some(-2));
    assert!(tables.conditions.iter().any(|c| c.id == -2 && c.expression.contains("request")));
}

#[test]
fn test_invalid_condition_is_a_config_error() {
    let result = MatcherDumper::new(&routes(vec![(
        "a",
        Route::new("/a").with_condition("context.method =="),
    )]))
    .compiled_routes();
    assert!(matches!(result, Err(ConfigError::InvalidCondition { .. })));
}

#[test]
fn test_canonical_route_overrides_name() {
    let tables = tables(&routes(vec![(
        "blog.en",
        Route::new("/blog").with_default("_canonical_route", "blog"),
    )]));
    let record = &tables.static_routes["/blog"][0];
    assert_eq!(record.name(), "blog");
    assert!(!record.defaults.contains_key("_canonical_route"));
}

#[test]
fn test_host_layout() {
    let tables = tables(&routes(vec![
        ("tenant", Route::new("/{id}").with_host("{tenant}.example.com")),
        ("any", Route::new("/any/{id}")),
        ("static", Route::new("/static/page").with_host("WWW.Example.com")),
        ("static_var", Route::new("/static/page").with_host("{sub}.example.org")),
    ]));
    assert!(tables.match_host);

    let text = &tables.regexp_list[&0];
    assert!(text.contains("(?i:([^\\.]+)\\.example\\.com)\\."), "{text}");
    assert!(text.contains(ANY_HOST), "{text}");

    let records = &tables.static_routes["/static/page"];
    assert_eq!(
        records[0].host,
        Some(RequiredHost::Literal("www.example.com".to_string()))
    );
    match &records[1].host {
        Some(RequiredHost::Pattern { regex, variables }) => {
            assert!(regex.contains("(?i)"), "{regex}");
            assert_eq!(variables, &["sub"]);
        }
        other => panic!("expected a host pattern, got {other:?}"),
    }

    let tenant = tables
        .chunk_leaves
        .values()
        .flatten()
        .find(|leaf| leaf.var_groups.len() == 2)
        .expect("tenant leaf");
    let regex = RegexBuilder::new(&tables.regexp_list[&0]).build().expect("chunk compiles");
    let caps = regex.captures(b"acme.example.com./42").expect("matches");
    assert_eq!(caps.get(tenant.var_groups[0]).map(|m| m.as_bytes()), Some(&b"acme"[..]));
    assert_eq!(caps.get(tenant.var_groups[1]).map(|m| m.as_bytes()), Some(&b"42"[..]));
}

#[test]
fn test_modifiers_split_chunks() {
    let tables = tables(&routes(vec![
        ("bytes", Route::new("/{a}").with_requirement("a", ".")),
        ("unicode", Route::new("/{a}").with_requirement("a", ".").with_utf8(true)),
    ]));
    assert_eq!(tables.chunk_count(), 2);
    let texts: Vec<_> = tables.regexp_list.values().collect();
    assert!(texts[0].starts_with("(?s-u)^"));
    assert!(texts[1].starts_with("(?s)^"));

    let (first, second): (Vec<&usize>, Vec<&usize>) = tables.regexp_list.keys().partition(|k| **k == 0);
    assert_eq!(first.len(), 1);
    assert_eq!(*second[0], texts[0].len());
}

#[test]
fn test_chunk_limit_splits_routes() {
    let routes = routes(vec![
        ("a", Route::new("/a/{x}")),
        ("b", Route::new("/b/{x}")),
        ("c", Route::new("/c/{x}")),
    ]);
    let tables = MatcherDumper::new(&routes)
        .with_config(CompilerConfig::default().with_chunk_limit(2))
        .compiled_routes()
        .expect("routes compile");
    assert_eq!(tables.chunk_count(), 2);
    assert_eq!(tables.dynamic_route_count(), 3);
    let terminators = tables
        .dynamic_routes
        .values()
        .flatten()
        .filter(|e| **e == MarkEntry::Terminator)
        .count();
    assert_eq!(terminators, 2);
}

#[test]
fn test_oversized_chunks_back_off() {
    let mut collection = RouteCollection::new();
    for i in 0..8 {
        collection.add(
            format!("r{i}"),
            Route::new(&format!("/r{i}/{{x}}")).with_requirement("x", "[a-z]{1,30}"),
        );
    }

    let single = MatcherDumper::new(&collection)
        .with_config(CompilerConfig::default().with_chunk_limit(1))
        .compiled_routes()
        .expect("routes compile");
    let limit = single
        .regexp_list
        .values()
        .map(|text| minimal_size_limit(text))
        .max()
        .expect("chunks")
        * 2;

    let tables = MatcherDumper::new(&collection)
        .with_config(CompilerConfig::default().with_regex_size_limit(limit))
        .compiled_routes()
        .expect("backoff should succeed");
    assert!(tables.chunk_count() > 1, "{} chunks", tables.chunk_count());
    assert_eq!(tables.dynamic_route_count(), 8);
    for text in tables.regexp_list.values() {
        assert!(RegexBuilder::new(text).size_limit(limit).build().is_ok());
    }
}

#[test]
fn test_single_route_over_limit_is_fatal() {
    let result = MatcherDumper::new(&routes(vec![("a", Route::new("/a/{x}"))]))
        .with_config(CompilerConfig::default().with_regex_size_limit(10))
        .compiled_routes();
    assert!(matches!(result, Err(ConfigError::RegexTooLarge { limit: 10 })));
}

#[test]
fn test_dump_json_round_trips() {
    let collection = routes(vec![
        ("home", Route::new("/")),
        ("post", Route::new("/blog/{slug}").with_condition("params.slug != 'x'")),
    ]);
    let json = MatcherDumper::new(&collection).dump_json().expect("json");
    let parsed = CompiledMatcherTables::from_json(&json).expect("parses");
    assert_eq!(parsed, tables(&collection));
    assert!(json.contains("\"terminator\""), "{json}");
}

#[test]
fn test_dump_rust_contains_tables() {
    let collection = routes(vec![("post", Route::new("/blog/{slug}"))]);
    let source = MatcherDumper::new(&collection).dump_rust().expect("rust");
    assert!(source.contains("// Routes: 1 (0 static, 1 dynamic)"));
    assert!(source.contains("regexp_list.insert(0, "));
    assert!(source.contains("MarkEntry::Terminator"));
    assert!(source.contains("Value::from(\"post\")"));
}

#[test]
fn test_reverse_host() {
    assert_eq!(reverse_host("{locale}.example.com"), "moc/elpmaxe/(elacol)");
}

#[test]
fn test_count_capture_groups() {
    assert_eq!(count_capture_groups("/foo/([^/]+)"), 1);
    assert_eq!(count_capture_groups("(?:a)(b)[(]\\(c"), 1);
    assert_eq!(count_capture_groups("(?i:x)\\."), 0);
    assert_eq!(count_capture_groups("(a)(b)"), 2);
    assert_eq!(count_capture_groups("[]()]+"), 0);
    assert_eq!(count_capture_groups("[^]()]+(x)"), 1);
}

#[test]
fn test_leading_bracket_in_class_is_literal() {
    let collection = routes(vec![(
        "a",
        Route::new("/a/{x}").with_requirement("x", "[]()]+"),
    )]);
    let tables = tables(&collection);
    assert_eq!(tables.dynamic_route_count(), 1);
    let leaf = tables.chunk_leaves.values().flatten().next().expect("leaf");
    assert_eq!(leaf.var_groups.len(), 1);
}

#[test]
fn test_tables_record_their_size_limit() {
    let collection = routes(vec![("post", Route::new("/blog/{slug}"))]);
    let tables = MatcherDumper::new(&collection)
        .with_config(CompilerConfig::default().with_regex_size_limit(1 << 24))
        .compiled_routes()
        .expect("routes compile");
    assert_eq!(tables.regex_size_limit, 1 << 24);

    let source = MatcherDumper::new(&collection)
        .with_config(CompilerConfig::default().with_regex_size_limit(1 << 24))
        .dump_rust()
        .expect("rust");
    assert!(source.contains("regex_size_limit: 16777216,"), "{source}");
}

#[test]
fn test_tables_without_size_limit_use_the_default() {
    let json = r#"{
        "match_host": false,
        "static_routes": {},
        "regexp_list": {},
        "dynamic_routes": {},
        "chunk_leaves": {},
        "conditions": []
    }"#;
    let tables = CompiledMatcherTables::from_json(json).expect("parses");
    assert_eq!(
        tables.regex_size_limit,
        crate::runtime_config::DEFAULT_REGEX_SIZE_LIMIT
    );
    assert_eq!(tables, CompiledMatcherTables::default());
}
