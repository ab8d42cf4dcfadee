use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};

use crate::ad_script::generate_group_ad_script;
use crate::data_models::ResultPage;
use crate::error::{Error, ValidationError};
use crate::normalizer::{self, RawSearchRequest};

use super::AppState;
use super::models::{
    AdScriptRequest, AdScriptResponse, ClickParams, HealthParams, HealthResponse, InfoResponse,
    SearchParams,
};

const ENDPOINTS: &[&str] = &[
    "GET /health - Health check (?deep=true pings the backend)",
    "POST /search - Search items with filters",
    "GET /search - Search items (query params)",
    "GET /nlp/search?q= - Keyword search (brand, color and price words)",
    "GET /click?id={id} - Redirect to seller",
    "POST /ad-script - Generate group ad copy",
    "GET /info - This endpoint",
];

fn malformed(rejection: JsonRejection) -> Error {
    ValidationError::MalformedRequest(rejection.body_text()).into()
}

fn malformed_query(rejection: QueryRejection) -> Error {
    ValidationError::MalformedRequest(rejection.body_text()).into()
}

/// `POST /search`
pub async fn search_handler(
    State(state): State<AppState>,
    body: Result<Json<RawSearchRequest>, JsonRejection>,
) -> Result<Json<ResultPage>, Error> {
    let Json(raw) = body.map_err(malformed)?;
    run_search(&state, &raw).await
}

/// `GET /search`: parses the query string, then follows the POST path.
pub async fn search_get_handler(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<ResultPage>, Error> {
    let Query(params) = params.map_err(malformed_query)?;
    let raw = RawSearchRequest::try_from(params)?;
    run_search(&state, &raw).await
}

/// `GET /nlp/search?q=`: filters are read out of the text itself.
pub async fn keyword_search_handler(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<ResultPage>, Error> {
    let Query(params) = params.map_err(malformed_query)?;
    let raw = RawSearchRequest::try_from(params)?;
    let search = normalizer::normalize_keywords(&raw)?;
    let page = state.engine.keyword_search(&search).await?;
    Ok(Json(page))
}

async fn run_search(state: &AppState, raw: &RawSearchRequest) -> Result<Json<ResultPage>, Error> {
    // validation happens before the backend is touched
    let request = normalizer::normalize(raw)?;
    let page = state.engine.search(&request).await?;
    Ok(Json(page))
}

/// `GET /click?id=` answers with a 302 to the seller.
pub async fn click_handler(
    State(state): State<AppState>,
    params: Result<Query<ClickParams>, QueryRejection>,
) -> Result<Response, Error> {
    let Query(params) = params.map_err(malformed_query)?;
    let id = params
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(ValidationError::MissingParameter("id"))?;

    let target = state.engine.resolve_click(id).await?;
    tracing::info!(item = id, target = %target, "redirecting click");
    Ok((StatusCode::FOUND, [(header::LOCATION, target.to_string())]).into_response())
}

pub async fn health_handler(
    State(state): State<AppState>,
    params: Result<Query<HealthParams>, QueryRejection>,
) -> Result<Json<HealthResponse>, Error> {
    let Query(params) = params.map_err(malformed_query)?;
    if params.deep {
        state.engine.check_health().await?;
    }
    Ok(Json(HealthResponse {
        ok: true,
        backend: state.engine.backend_name().to_string(),
    }))
}

pub async fn info_handler(State(state): State<AppState>) -> Json<InfoResponse> {
    Json(InfoResponse {
        name: "WebCloset API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        description: "Fashion marketplace aggregation API".to_string(),
        backend: state.engine.backend_name().to_string(),
        endpoints: ENDPOINTS.iter().map(|e| e.to_string()).collect(),
        cors_origins: state.cors_origins.as_ref().clone(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    })
}

/// `POST /ad-script`
pub async fn ad_script_handler(
    body: Result<Json<AdScriptRequest>, JsonRejection>,
) -> Result<Json<AdScriptResponse>, Error> {
    let Json(request) = body.map_err(malformed)?;
    let script = generate_group_ad_script(&request.offers)?;
    Ok(Json(AdScriptResponse { script }))
}
