//! Rust source rendering of compiled tables.
//!
//! The generated module has no runtime dependency on the route definitions:
//! it rebuilds [`CompiledMatcherTables`] from literals, so an application can
//! embed its tables at build time and skip JSON parsing at startup.

use askama::Template;
use serde_json::Value;

use super::tables::{ChunkLeaf, CompiledMatcherTables, MarkEntry, RequiredHost, RouteRecord};
use crate::error::ArtifactError;

struct StaticPathView {
    path: String,
    records: Vec<String>,
}

struct RegexView {
    offset: usize,
    regex: String,
}

struct MarkView {
    mark: usize,
    entries: Vec<String>,
}

struct ChunkView {
    offset: usize,
    leaves: Vec<String>,
}

struct ConditionView {
    id: i32,
    expression: String,
}

/// Template data for the generated tables module
#[derive(Template)]
#[template(path = "compiled_tables.rs.txt", escape = "none")]
struct CompiledTablesTemplate {
    route_count: usize,
    static_count: usize,
    dynamic_count: usize,
    match_host: bool,
    static_routes: Vec<StaticPathView>,
    regexps: Vec<RegexView>,
    marks: Vec<MarkView>,
    chunks: Vec<ChunkView>,
    conditions: Vec<ConditionView>,
    regex_size_limit: usize,
}

/// Render `tables` as a Rust module exposing `pub fn compiled_tables()`.
pub fn render_rust(tables: &CompiledMatcherTables) -> Result<String, ArtifactError> {
    let template = CompiledTablesTemplate {
        route_count: tables.route_count(),
        static_count: tables.static_route_count(),
        dynamic_count: tables.dynamic_route_count(),
        match_host: tables.match_host,
        regex_size_limit: tables.regex_size_limit,
        static_routes: tables
            .static_routes
            .iter()
            .map(|(path, records)| StaticPathView {
                path: literal(path),
                records: records.iter().map(record_expr).collect(),
            })
            .collect(),
        regexps: tables
            .regexp_list
            .iter()
            .map(|(offset, regex)| RegexView {
                offset: *offset,
                regex: literal(regex),
            })
            .collect(),
        marks: tables
            .dynamic_routes
            .iter()
            .map(|(mark, entries)| MarkView {
                mark: *mark,
                entries: entries.iter().map(entry_expr).collect(),
            })
            .collect(),
        chunks: tables
            .chunk_leaves
            .iter()
            .map(|(offset, leaves)| ChunkView {
                offset: *offset,
                leaves: leaves.iter().map(leaf_expr).collect(),
            })
            .collect(),
        conditions: tables
            .conditions
            .iter()
            .map(|c| ConditionView {
                id: c.id,
                expression: literal(&c.expression),
            })
            .collect(),
    };
    Ok(template.render()?)
}

fn literal(text: &str) -> String {
    format!("{text:?}")
}

fn string_vec(items: &[String]) -> String {
    let items: Vec<String> = items
        .iter()
        .map(|item| format!("{}.to_string()", literal(item)))
        .collect();
    format!("vec![{}]", items.join(", "))
}

fn value_expr(value: &Value) -> String {
    match value {
        Value::Null => "Value::Null".to_string(),
        Value::Bool(b) => format!("Value::Bool({b})"),
        Value::String(s) => format!("Value::from({})", literal(s)),
        Value::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => format!("Value::from({i}i64)"),
            (None, Some(u)) => format!("Value::from({u}u64)"),
            _ => format!("Value::from({:?}f64)", n.as_f64().unwrap_or_default()),
        },
        Value::Array(_) | Value::Object(_) => format!(
            "serde_json::from_str::<Value>({}).unwrap_or_default()",
            literal(&value.to_string())
        ),
    }
}

fn host_expr(host: &Option<RequiredHost>) -> String {
    match host {
        None => "None".to_string(),
        Some(RequiredHost::Literal(host)) => {
            format!("Some(RequiredHost::Literal({}.to_string()))", literal(host))
        }
        Some(RequiredHost::Pattern { regex, variables }) => format!(
            "Some(RequiredHost::Pattern {{ regex: {}.to_string(), variables: {} }})",
            literal(regex),
            string_vec(variables)
        ),
    }
}

fn record_expr(record: &RouteRecord) -> String {
    let defaults: Vec<String> = record
        .defaults
        .iter()
        .map(|(k, v)| format!("({}.to_string(), {})", literal(k), value_expr(v)))
        .collect();
    let condition = match record.condition {
        Some(id) => format!("Some({id})"),
        None => "None".to_string(),
    };
    format!(
        "RouteRecord {{ defaults: BTreeMap::from([{}]), variables: {}, host: {}, methods: {}, schemes: {}, has_trailing_slash: {}, has_trailing_var: {}, condition: {} }}",
        defaults.join(", "),
        string_vec(&record.variables),
        host_expr(&record.host),
        string_vec(&record.methods),
        string_vec(&record.schemes),
        record.has_trailing_slash,
        record.has_trailing_var,
        condition,
    )
}

fn entry_expr(entry: &MarkEntry) -> String {
    match entry {
        MarkEntry::Route(record) => format!("MarkEntry::Route({})", record_expr(record)),
        MarkEntry::Terminator => "MarkEntry::Terminator".to_string(),
    }
}

fn leaf_expr(leaf: &ChunkLeaf) -> String {
    let groups: Vec<String> = leaf.var_groups.iter().map(usize::to_string).collect();
    format!(
        "ChunkLeaf {{ mark: {}, group: {}, var_groups: vec![{}], pattern: {}.to_string() }}",
        leaf.mark,
        leaf.group,
        groups.join(", "),
        literal(&leaf.pattern)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_expressions() {
        assert_eq!(value_expr(&Value::Null), "Value::Null");
        assert_eq!(value_expr(&json!(true)), "Value::Bool(true)");
        assert_eq!(value_expr(&json!("a\"b")), "Value::from(\"a\\\"b\")");
        assert_eq!(value_expr(&json!(-3)), "Value::from(-3i64)");
        assert!(value_expr(&json!([1, 2])).starts_with("serde_json::from_str::<Value>("));
    }

    #[test]
    fn test_record_expression() {
        let record = RouteRecord {
            defaults: [("_route".to_string(), json!("foo"))].into_iter().collect(),
            variables: vec!["id".to_string()],
            host: Some(RequiredHost::Literal("example.com".to_string())),
            methods: vec!["GET".to_string()],
            schemes: Vec::new(),
            has_trailing_slash: true,
            has_trailing_var: false,
            condition: Some(-1),
        };
        let expr = record_expr(&record);
        assert!(expr.contains("(\"_route\".to_string(), Value::from(\"foo\"))"));
        assert!(expr.contains("variables: vec![\"id\".to_string()]"));
        assert!(expr.contains("RequiredHost::Literal(\"example.com\".to_string())"));
        assert!(expr.contains("has_trailing_slash: true"));
        assert!(expr.contains("condition: Some(-1)"));
    }

    #[test]
    fn test_render_empty_tables() {
        let source = render_rust(&CompiledMatcherTables::default()).expect("renders");
        assert!(source.contains("pub fn compiled_tables() -> CompiledMatcherTables"));
        assert!(source.contains("match_host: false"));
        assert!(source.contains("// Routes: 0 (0 static, 0 dynamic)"));
    }
}
