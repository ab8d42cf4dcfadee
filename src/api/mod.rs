use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Request},
    routing::{get, post},
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::query_engine::QueryEngine;

pub mod handlers;
pub mod models;

/// Per-request dependencies. Cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<QueryEngine>,
    pub cors_origins: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(engine: QueryEngine, cors_origins: Vec<String>) -> Self {
        Self {
            engine: Arc::new(engine),
            cors_origins: Arc::new(cors_origins),
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return cors.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring unusable CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

pub fn create_router(state: AppState) -> Router {
    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
        tracing::info_span!(
            "request",
            request_id = %nanoid::nanoid!(12),
            method = %request.method(),
            uri = %request.uri(),
        )
    });

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/info", get(handlers::info_handler))
        .route(
            "/search",
            post(handlers::search_handler).get(handlers::search_get_handler),
        )
        .route("/nlp/search", get(handlers::keyword_search_handler))
        .route("/click", get(handlers::click_handler))
        .route("/ad-script", post(handlers::ad_script_handler))
        .layer(
            ServiceBuilder::new()
                .layer(trace)
                .layer(cors_layer(&state.cors_origins)),
        )
        .with_state(state)
}
