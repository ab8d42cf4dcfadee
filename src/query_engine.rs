use std::time::Instant;

use anyhow::Context;
use serde_json::Value;
use url::Url;

use crate::assembler;
use crate::catalog::MemoryCatalog;
use crate::config::{BackendKind, Config};
use crate::data_models::{KeywordSearch, ResultPage, SearchRequest};
use crate::db::Database;
use crate::error::{Error, Result, ValidationError};
use crate::index_query::IndexQuery;
use crate::search_index::SearchIndex;

/// The store answering searches for this process.
pub enum Backend {
    Index(SearchIndex),
    Relational(Database),
    Memory(MemoryCatalog),
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Index(_) => BackendKind::Elasticsearch.as_str(),
            Backend::Relational(_) => BackendKind::Postgres.as_str(),
            Backend::Memory(_) => BackendKind::Memory.as_str(),
        }
    }
}

/// Only absolute `http`/`https` URLs are redirect targets.
pub fn validate_redirect(target: &str) -> Result<Url> {
    let url = Url::parse(target.trim())
        .map_err(|e| ValidationError::DisallowedUrl(format!("malformed seller URL: {e}")))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        "http" | "https" => {
            Err(ValidationError::DisallowedUrl("seller URL has no host".to_string()).into())
        }
        scheme => {
            Err(ValidationError::DisallowedUrl(format!("scheme `{scheme}` is not allowed")).into())
        }
    }
}

pub struct QueryEngine {
    backend: Backend,
}

impl QueryEngine {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    /// Build the configured backend. Postgres is connected and pinged up front.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let backend = match config.backend {
            BackendKind::Postgres => {
                let db_config = config
                    .database
                    .as_ref()
                    .context("DATABASE_URL is required for the postgres backend")?;
                Backend::Relational(Database::new(db_config).await?)
            }
            BackendKind::Elasticsearch => Backend::Index(SearchIndex::new(&config.index)?),
            BackendKind::Memory => {
                let path = config
                    .catalog_path
                    .as_ref()
                    .context("CATALOG_FIXTURE is required for the memory backend")?;
                Backend::Memory(MemoryCatalog::from_json_file(path)?)
            }
        };
        Ok(Self::new(backend))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub async fn search(&self, req: &SearchRequest) -> Result<ResultPage> {
        self.execute(req, || IndexQuery::build(req)).await
    }

    /// Keyword search. The color hint only filters on the search index.
    pub async fn keyword_search(&self, search: &KeywordSearch) -> Result<ResultPage> {
        self.execute(&search.request, || IndexQuery::keyword(search))
            .await
    }

    async fn execute(
        &self,
        req: &SearchRequest,
        index_query: impl FnOnce() -> IndexQuery,
    ) -> Result<ResultPage> {
        let start = Instant::now();

        let (items, total) = match &self.backend {
            Backend::Index(index) => {
                let body = index_query().to_body();
                let result = index.search(&body).await?;
                (assembler::items_from_hits(&result.hits)?, result.total)
            }
            Backend::Relational(db) => db.search(req).await?,
            Backend::Memory(catalog) => catalog.search(req),
        };

        let page = assembler::result_page(items, total, req);
        tracing::info!(
            backend = self.backend_name(),
            total = page.total,
            returned = page.items.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "search completed"
        );
        Ok(page)
    }

    /// Seller URL to redirect a click on `id` to.
    pub async fn resolve_click(&self, id: &str) -> Result<Url> {
        let not_found = || Error::NotFound(format!("item {id}"));

        let target = match &self.backend {
            Backend::Index(index) => {
                let source = index
                    .get_source(id, &["seller_urls"])
                    .await?
                    .ok_or_else(not_found)?;
                first_seller_url(&source)
            }
            Backend::Relational(db) => db.cheapest_seller_url(id).await?.ok_or_else(not_found)?,
            Backend::Memory(catalog) => catalog.cheapest_seller_url(id).ok_or_else(not_found)?,
        };

        let target = target
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| Error::NotFound(format!("item {id} has no seller URL")))?;
        validate_redirect(&target)
    }

    pub async fn check_health(&self) -> Result<()> {
        match &self.backend {
            Backend::Index(index) => index.ping().await,
            Backend::Relational(db) => db.ping().await,
            Backend::Memory(_) => Ok(()),
        }
    }
}

fn first_seller_url(source: &Value) -> Option<String> {
    match source.get("seller_urls") {
        Some(Value::Array(urls)) => urls.iter().find_map(Value::as_str).map(str::to_string),
        Some(Value::String(url)) => Some(url.clone()),
        _ => None,
    }
}
