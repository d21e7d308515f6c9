use lurry::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn fixture(path: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(path)
}

fn params(value: serde_json::Value) -> Params {
    serde_json::from_value(value).unwrap()
}

fn builder() -> QueryEngineBuilder {
    QueryEngine::builder().sources([fixture("queries/users.yaml"), fixture("queries/orders.xml")])
}

/// Reports a product name and counts how often it was asked.
struct CountingContext {
    product: Option<&'static str>,
    calls: Arc<AtomicUsize>,
}

impl ConnectionContext for CountingContext {
    fn product_name(&self) -> LurryResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.product
            .map(str::to_string)
            .ok_or_else(|| LurryError::Connection("connection closed".to_string()))
    }
}

#[test]
fn test_plain_text_unchanged() {
    let engine = builder().build().unwrap();
    assert_eq!(
        engine.render_sql("app.Order", "all", &Params::new()).unwrap(),
        "SELECT * FROM orders"
    );
}

#[test]
fn test_optional_keys_may_be_missing() {
    let engine = builder().dialect(Dialect::MySql).build().unwrap();

    assert_eq!(
        engine.render_sql("app.User", "search", &Params::new()).unwrap(),
        "SELECT * FROM users WHERE 1 = 1 LIMIT 50"
    );
    assert_eq!(
        engine
            .render_sql(
                "app.User",
                "search",
                &params(json!({"active": true, "name": "O'Brien", "limit": 10}))
            )
            .unwrap(),
        "SELECT * FROM users WHERE 1 = 1 AND active = 1 AND name = 'O''Brien' LIMIT 10"
    );
}

#[test]
fn test_detected_mysql_escaping() {
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = builder()
        .context(CountingContext {
            product: Some("MySQL"),
            calls: Arc::clone(&calls),
        })
        .build()
        .unwrap();

    let by_name = |name: &str| {
        engine
            .render_sql("app.User", "byName", &params(json!({ "name": name })))
            .unwrap()
    };
    assert_eq!(by_name(r"O'Br\ien"), r"SELECT * FROM users WHERE name = 'O''Br\\ien'");
    assert_eq!(by_name("x"), "SELECT * FROM users WHERE name = 'x'");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_in_clause_rendering() {
    let engine = builder().dialect(Dialect::MariaDb).build().unwrap();

    assert_eq!(
        engine
            .render_sql("app.Order", "byStatus", &params(json!({"statuses": ["new", null, "it's"], "min": 5})))
            .unwrap(),
        "SELECT * FROM orders WHERE status IN ('new','it''s') AND total > 5"
    );
    assert_eq!(
        engine
            .render_sql("app.Order", "byIds", &params(json!({"ids": [1, "2", "x; DROP TABLE orders"]})))
            .unwrap(),
        "SELECT * FROM orders WHERE id IN (1,2)"
    );
}

#[test]
fn test_unknown_product_falls_back_to_default() {
    let engine = builder()
        .context(StaticContext::new("FoxPro 9"))
        .build()
        .unwrap();

    assert_eq!(
        engine
            .render_sql("app.User", "byName", &params(json!({"name": "O'Brien"})))
            .unwrap(),
        "SELECT * FROM users WHERE name = O''Brien"
    );
    assert_eq!(engine.dialect().unwrap(), Dialect::Default);
}

#[test]
fn test_detection_failure_blocks_only_escaping() {
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = builder()
        .context(CountingContext {
            product: None,
            calls: Arc::clone(&calls),
        })
        .build()
        .unwrap();

    assert_eq!(
        engine
            .render_sql("app.User", "byId", &params(json!({"id": 1})))
            .unwrap(),
        "SELECT * FROM users WHERE id = 1"
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let err = engine
        .render_sql("app.User", "byName", &params(json!({"name": "a"})))
        .unwrap_err();
    assert!(matches!(err, LurryError::DialectDetection(_)), "got {:?}", err);

    // not cached: the next escaping render asks again
    assert!(engine.render_sql("app.User", "byName", &Params::new()).is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_missing_query_is_distinct() {
    let engine = builder().build().unwrap();
    let err = engine.render_sql("app.User", "delete", &Params::new()).unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(
        err,
        LurryError::QueryNotFound { ref entity, ref query } if entity == "app.User" && query == "delete"
    ));
}

#[test]
fn test_engine_from_config_file() {
    let config = EngineConfig::from_file(fixture("lurry.toml")).unwrap();
    let engine = QueryEngine::from_config(&config).unwrap();

    assert_eq!(engine.dialect().unwrap(), Dialect::MySql);
    assert_eq!(
        engine
            .render_sql("app.User", "byName", &params(json!({"name": "a'b"})))
            .unwrap(),
        "SELECT * FROM users WHERE name = 'a''b'"
    );
}

#[test]
fn test_engine_is_shareable_across_threads() {
    let engine = Arc::new(builder().dialect(Dialect::MySql).build().unwrap());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                engine
                    .render_sql("app.User", "byId", &params(json!({ "id": i })))
                    .unwrap()
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join().unwrap(), format!("SELECT * FROM users WHERE id = {}", i));
    }
    assert_eq!(engine.templates().len(), 1);
}
