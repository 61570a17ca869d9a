//! End-to-end tests of the HTTP surface against a stubbed data source.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tower::ServiceExt;

use chainlens_api::routes::{router, ApiState};
use chainlens_metadata::query::SqlStatement;
use chainlens_metadata::{
    indexed_schema, AttributeQueryEngine, DataSource, MetadataError, MetadataOverrides,
    MetadataService, QueryPolicy,
};

struct StubSource;

#[async_trait]
impl DataSource for StubSource {
    async fn count_rows(&self, _table: &str) -> Result<u64, MetadataError> {
        Ok(7)
    }

    async fn distinct_values(
        &self,
        _table: &str,
        _column: &str,
        prefix: Option<&str>,
        _limit: usize,
    ) -> Result<Vec<String>, MetadataError> {
        let all = ["transaction", "reveal", "delegation"];
        Ok(all
            .iter()
            .filter(|v| prefix.map(|p| v.starts_with(p)).unwrap_or(true))
            .map(|v| v.to_string())
            .collect())
    }

    async fn select_rows(
        &self,
        stmt: &SqlStatement,
    ) -> Result<Vec<Map<String, Value>>, MetadataError> {
        // One row shaped by the statement's projection.
        let mut row = Map::new();
        for (name, _) in &stmt.projection {
            row.insert(name.clone(), Value::String("x".into()));
        }
        Ok(vec![row])
    }
}

fn app(overrides_toml: &str) -> axum::Router {
    let source: Arc<dyn DataSource> = Arc::new(StubSource);
    let overrides: MetadataOverrides = toml::from_str(overrides_toml).unwrap();
    let metadata = Arc::new(MetadataService::new(
        vec![indexed_schema("tezos", &["mainnet".to_string()])],
        overrides,
        source.clone(),
    ));
    let engine = Arc::new(AttributeQueryEngine::new(
        metadata.clone(),
        source,
        QueryPolicy::default(),
    ));
    router(ApiState {
        metadata,
        engine,
        api_keys: Arc::new(vec!["secret".to_string()]),
    })
}

const TEZOS_ENABLED: &str = "[platforms.tezos]\nvisible = true";

async fn get(app: &axum::Router, uri: &str, key: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().uri(uri);
    if let Some(key) = key {
        builder = builder.header("apiKey", key);
    }
    let response = app
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn post(app: &axum::Router, uri: &str, key: Option<&str>, body: Value) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header("apiKey", key);
    }
    let response = app
        .clone()
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn platforms_listed_when_enabled() {
    let app = app(TEZOS_ENABLED);
    let (status, body) = get(&app, "/v2/metadata/platforms", Some("secret")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{"name": "tezos", "displayName": "Tezos"}]));
}

#[tokio::test]
async fn platforms_empty_when_disabled() {
    let app = app("[platforms.tezos]\nvisible = false");
    let (status, body) = get(&app, "/v2/metadata/platforms", Some("secret")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn missing_or_wrong_api_key_is_unauthorized() {
    let app = app(TEZOS_ENABLED);
    let (status, _) = get(&app, "/v2/metadata/platforms", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = get(&app, "/v2/metadata/platforms", Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_needs_no_key() {
    let app = app(TEZOS_ENABLED);
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn hidden_entity_attributes_are_not_found() {
    let app = app(
        r#"
        [platforms.tezos]
        visible = true

        [platforms.tezos.networks.mainnet.entities.operations]
        visible = false
        "#,
    );
    let (status, _) = get(
        &app,
        "/v2/metadata/tezos/mainnet/operations/attributes",
        Some("secret"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // An unknown entity answers identically.
    let (status, _) = get(
        &app,
        "/v2/metadata/tezos/mainnet/nonsense/attributes",
        Some("secret"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn entities_carry_counts() {
    let app = app(TEZOS_ENABLED);
    let (status, body) = get(&app, "/v2/metadata/tezos/mainnet/entities", Some("secret")).await;
    assert_eq!(status, StatusCode::OK);
    let entities = body.as_array().unwrap();
    assert!(entities.iter().any(|e| e["name"] == "blocks" && e["count"] == 7));
}

#[tokio::test]
async fn attribute_overrides_round_trip_through_discovery() {
    let app = app(
        r#"
        [platforms.tezos]
        visible = true

        [platforms.tezos.networks.mainnet.entities.accounts.attributes.balance]
        dataType = "Hash"
        currencySymbol = "ꜩ"
        currencySymbolCode = 42793
        scale = 6
        "#,
    );
    let (status, body) = get(
        &app,
        "/v2/metadata/tezos/mainnet/accounts/attributes",
        Some("secret"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let balance = body
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["name"] == "balance")
        .unwrap();
    assert_eq!(balance["dataType"], "Hash");
    assert_eq!(balance["currencySymbol"], "\u{a729}");
    assert_eq!(balance["currencySymbolCode"], 42793);
    assert_eq!(balance["scale"], 6);
    assert_eq!(balance["entity"], "accounts");
}

#[tokio::test]
async fn attribute_values_support_prefix() {
    let app = app(TEZOS_ENABLED);
    let (status, body) = get(
        &app,
        "/v2/metadata/tezos/mainnet/operations/kind?prefix=trans",
        Some("secret"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["transaction"]));
}

#[tokio::test]
async fn data_query_returns_rows() {
    let app = app(TEZOS_ENABLED);
    let (status, body) = post(
        &app,
        "/v2/data/tezos/mainnet/operations",
        Some("secret"),
        json!({
            "fields": ["source", "fee"],
            "predicates": [{"field": "kind", "operation": "eq", "set": ["transaction"]}],
            "limit": 5
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].get("source").is_some());
    assert!(rows[0].get("fee").is_some());
}

#[tokio::test]
async fn unknown_query_attribute_is_bad_request() {
    let app = app(TEZOS_ENABLED);
    let (status, _) = post(
        &app,
        "/v2/data/tezos/mainnet/operations",
        Some("secret"),
        json!({"fields": ["bogus"]}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn query_against_hidden_platform_is_not_found() {
    let app = app("");
    let (status, _) = post(
        &app,
        "/v2/data/tezos/mainnet/operations",
        Some("secret"),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
