//! Route table and handlers.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use chainlens_metadata::{
    ApiQuery, Attribute, AttributeQueryEngine, Entity, MetadataService, Network, Platform,
};

use crate::auth::require_api_key;
use crate::error::ApiError;

#[derive(Clone)]
pub struct ApiState {
    pub metadata: Arc<MetadataService>,
    pub engine: Arc<AttributeQueryEngine>,
    pub api_keys: Arc<Vec<String>>,
}

/// Build the full application router.
pub fn router(state: ApiState) -> Router {
    let v2 = Router::new()
        .route("/metadata/platforms", get(list_platforms))
        .route("/metadata/{platform}/networks", get(list_networks))
        .route("/metadata/{platform}/{network}/entities", get(list_entities))
        .route(
            "/metadata/{platform}/{network}/{entity}/attributes",
            get(list_attributes),
        )
        .route(
            "/metadata/{platform}/{network}/{entity}/{attribute}",
            get(attribute_values),
        )
        .route("/data/{platform}/{network}/{entity}", post(run_query))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ))
        .with_state(state);

    Router::new()
        .route("/health", get(health))
        .nest("/v2", v2)
        .layer(CorsLayer::permissive())
}

async fn health() -> &'static str {
    "OK"
}

async fn list_platforms(State(state): State<ApiState>) -> Json<Vec<Platform>> {
    Json(state.metadata.list_platforms())
}

async fn list_networks(
    State(state): State<ApiState>,
    Path(platform): Path<String>,
) -> Result<Json<Vec<Network>>, ApiError> {
    Ok(Json(state.metadata.list_networks(&platform)?))
}

async fn list_entities(
    State(state): State<ApiState>,
    Path((platform, network)): Path<(String, String)>,
) -> Result<Json<Vec<Entity>>, ApiError> {
    Ok(Json(state.metadata.list_entities(&platform, &network).await?))
}

async fn list_attributes(
    State(state): State<ApiState>,
    Path((platform, network, entity)): Path<(String, String, String)>,
) -> Result<Json<Vec<Attribute>>, ApiError> {
    Ok(Json(
        state
            .metadata
            .list_attributes(&platform, &network, &entity)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
struct ValuesParams {
    prefix: Option<String>,
}

async fn attribute_values(
    State(state): State<ApiState>,
    Path((platform, network, entity, attribute)): Path<(String, String, String, String)>,
    Query(params): Query<ValuesParams>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(
        state
            .metadata
            .attribute_values(
                &platform,
                &network,
                &entity,
                &attribute,
                params.prefix.as_deref(),
            )
            .await?,
    ))
}

async fn run_query(
    State(state): State<ApiState>,
    Path((platform, network, entity)): Path<(String, String, String)>,
    Json(query): Json<ApiQuery>,
) -> Result<Json<Vec<Map<String, Value>>>, ApiError> {
    Ok(Json(
        state
            .engine
            .run(&platform, &network, &entity, &query)
            .await?,
    ))
}
