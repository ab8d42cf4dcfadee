use serde::{Deserialize, Serialize};

use crate::ad_script::AdOffer;
use crate::error::ValidationError::{self, InvalidPagination, InvalidPrice};
use crate::normalizer::RawSearchRequest;

/// `GET /search` query string. Lists are comma-joined; every field arrives as text.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    pub q: Option<String>,
    pub brands: Option<String>,
    pub sizes: Option<String>,
    pub conditions: Option<String>,
    pub marketplaces: Option<String>,
    pub price_min: Option<String>,
    pub price_max: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
    pub per_page: Option<String>,
}

fn parse_number<T: std::str::FromStr>(
    field: &str,
    value: Option<String>,
    err: fn(String) -> ValidationError,
) -> Result<Option<T>, ValidationError> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| err(format!("{field} must be a number, got `{raw}`"))),
    }
}

impl TryFrom<SearchParams> for RawSearchRequest {
    type Error = ValidationError;

    fn try_from(params: SearchParams) -> Result<Self, Self::Error> {
        let list = |value: Option<String>| value.into_iter().collect::<Vec<_>>();
        Ok(RawSearchRequest {
            price_min: parse_number("price_min", params.price_min, InvalidPrice)?,
            price_max: parse_number("price_max", params.price_max, InvalidPrice)?,
            page: parse_number("page", params.page, InvalidPagination)?,
            per_page: parse_number("per_page", params.per_page, InvalidPagination)?,
            q: params.q,
            brands: list(params.brands),
            sizes: list(params.sizes),
            conditions: list(params.conditions),
            marketplaces: list(params.marketplaces),
            sort: params.sort,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ClickParams {
    pub id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HealthParams {
    #[serde(default)]
    pub deep: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub backend: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InfoResponse {
    pub name: String,
    pub version: String,
    pub description: String,
    pub backend: String,
    pub endpoints: Vec<String>,
    pub cors_origins: Vec<String>,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
pub struct AdScriptRequest {
    pub offers: Vec<AdOffer>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdScriptResponse {
    pub script: String,
}
