use anyhow::{Context, Result};
use futures::TryStreamExt;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};

use crate::assembler;
use crate::config::DatabaseConfig;
use crate::data_models::{CanonicalItem, SearchRequest};
use crate::error::Error;
use crate::sql_query::{BindValue, RelationalQuery, SqlQuery, cheapest_seller_url_sql};

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    binds: Vec<BindValue>,
) -> Query<'q, Postgres, PgArguments> {
    for value in binds {
        query = match value {
            BindValue::Text(v) => query.bind(v),
            BindValue::Int(v) => query.bind(v),
        };
    }
    query
}

/// Postgres pool wrapper for the relational backend. Handlers get it through
/// the query engine; nothing here is global.
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
    }

    /// Connect and verify the connection with a ping.
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = Self::pool_options(config)
            .connect(&config.url)
            .await
            .context("Failed to connect to Postgres")?;

        let db = Self { pool };
        db.ping().await.context("Failed to ping Postgres")?;
        log::info!(
            "Connected to Postgres (max {} connections)",
            config.max_connections
        );
        Ok(db)
    }

    /// Build a pool that connects on first use.
    pub fn new_lazy(config: &DatabaseConfig) -> Result<Self> {
        let pool = Self::pool_options(config)
            .connect_lazy(&config.url)
            .context("Failed to parse DATABASE_URL")?;
        Ok(Self { pool })
    }

    pub async fn ping(&self) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("SELECT 1").execute(&mut *conn).await?;
        Ok(())
    }

    /// Run the page and count queries on one pooled connection. The
    /// connection returns to the pool when `conn` drops, on every path.
    pub async fn search(&self, req: &SearchRequest) -> Result<(Vec<CanonicalItem>, u64), Error> {
        let query = RelationalQuery::build(req);
        let SqlQuery {
            sql: page_sql,
            binds: page_binds,
        } = query.page_sql();
        let SqlQuery {
            sql: count_sql,
            binds: count_binds,
        } = query.count_sql();

        let mut conn = self.pool.acquire().await?;

        let rows: Vec<PgRow> = bind_all(sqlx::query(&page_sql), page_binds)
            .fetch(&mut *conn)
            .try_collect()
            .await?;
        let items = assembler::items_from_rows(
            rows.iter()
                .map(|row| assembler::fields_from_row(row).map_err(|e| e.to_string())),
        );

        let count_row = bind_all(sqlx::query(&count_sql), count_binds)
            .fetch_one(&mut *conn)
            .await?;
        let total: i64 = count_row.try_get("total")?;

        Ok((items, u64::try_from(total).unwrap_or(0)))
    }

    /// `None` when the item is unknown or has no active listing.
    pub async fn cheapest_seller_url(&self, id: &str) -> Result<Option<Option<String>>, Error> {
        let SqlQuery { sql, binds } = cheapest_seller_url_sql(id);
        let mut conn = self.pool.acquire().await?;
        let row = bind_all(sqlx::query(&sql), binds)
            .fetch_optional(&mut *conn)
            .await?;
        match row {
            Some(row) => Ok(Some(row.try_get::<Option<String>, _>("seller_url")?)),
            None => Ok(None),
        }
    }
}
