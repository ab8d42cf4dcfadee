//! Parameterized aggregation queries for the relational backend.
//!
//! Every user-supplied value travels as a bind parameter; the SQL text only
//! ever contains placeholders (`$1`, `$2`, ...) and fixed fragments.

use std::fmt::Write as _;

use crate::data_models::{SearchRequest, SortMode};

/// Weight of the representative price in the `best` ranking.
pub const BEST_PRICE_WEIGHT: f64 = 0.7;
/// Weight of the inverse listing count in the `best` ranking.
pub const BEST_LISTINGS_WEIGHT: f64 = 0.3;
/// Scale applied to the inverse listing count before weighting.
pub const BEST_LISTINGS_SCALE: f64 = 1000.0;

const FROM_ACTIVE_LISTINGS: &str = "FROM item_canonical ic \
JOIN item_links l ON l.canonical_id = ic.id AND l.active = true \
JOIN item_source s ON s.id = l.source_id";

const SELECT_AGGREGATES: &str = "SELECT ic.id::text AS id, ic.brand, ic.title, ic.category, \
ic.image_url, \
MIN(s.price_cents)::bigint AS price_cents, \
COUNT(*) AS listings_count, \
STRING_AGG(DISTINCT s.condition, ', ' ORDER BY s.condition) AS condition, \
STRING_AGG(DISTINCT s.marketplace_code, ', ' ORDER BY s.marketplace_code) AS marketplace, \
STRING_AGG(DISTINCT s.size, ', ' ORDER BY s.size) AS size, \
ARRAY_AGG(DISTINCT s.seller_url) FILTER (WHERE s.seller_url IS NOT NULL) AS seller_urls";

/// `best` score for one aggregated item; lower ranks first. `None` sorts last.
pub fn best_score(price_cents: Option<i64>, listings_count: i64) -> Option<f64> {
    let price = price_cents? as f64;
    let listings = listings_count.max(1) as f64;
    let listings_term = (1.0 / listings) * BEST_LISTINGS_SCALE * BEST_LISTINGS_WEIGHT;
    Some(price * BEST_PRICE_WEIGHT + listings_term)
}

#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Text(String),
    Int(i64),
}

/// SQL text plus the ordered values for its placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub binds: Vec<BindValue>,
}

fn push_bind(binds: &mut Vec<BindValue>, value: BindValue) -> usize {
    binds.push(value);
    binds.len()
}

fn push_in_list<'a>(
    predicates: &mut Vec<String>,
    binds: &mut Vec<BindValue>,
    column: &str,
    values: impl IntoIterator<Item = &'a String>,
) {
    let placeholders: Vec<String> = values
        .into_iter()
        .map(|v| format!("${}", push_bind(binds, BindValue::Text(v.clone()))))
        .collect();
    if !placeholders.is_empty() {
        predicates.push(format!("{column} IN ({})", placeholders.join(", ")));
    }
}

/// Escape `LIKE` metacharacters so the term is matched as a literal substring.
fn like_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

fn order_by(sort: SortMode) -> String {
    let primary = match sort {
        SortMode::PriceAsc => "MIN(s.price_cents) ASC NULLS LAST".to_string(),
        SortMode::PriceDesc => "MIN(s.price_cents) DESC NULLS LAST".to_string(),
        SortMode::Newest => "ic.last_seen DESC NULLS LAST".to_string(),
        SortMode::Best => format!(
            "(MIN(s.price_cents) * {BEST_PRICE_WEIGHT} + (1.0 / COUNT(*)) * \
             {BEST_LISTINGS_SCALE} * {BEST_LISTINGS_WEIGHT}) ASC NULLS LAST"
        ),
    };
    // id tie-break keeps LIMIT/OFFSET pages disjoint when scores tie
    format!("{primary}, ic.id DESC")
}

/// Search and count queries sharing one WHERE clause.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationalQuery {
    where_clause: String,
    binds: Vec<BindValue>,
    order_by: String,
    limit: i64,
    offset: i64,
}

impl RelationalQuery {
    pub fn build(req: &SearchRequest) -> RelationalQuery {
        let mut predicates = Vec::new();
        let mut binds = Vec::new();

        if let Some(q) = &req.text_query {
            let n = push_bind(&mut binds, BindValue::Text(like_pattern(q)));
            predicates.push(format!(
                "(ic.title ILIKE ${n} OR ic.brand ILIKE ${n} OR ic.category ILIKE ${n})"
            ));
        }
        push_in_list(&mut predicates, &mut binds, "LOWER(ic.brand)", &req.brands);
        push_in_list(&mut predicates, &mut binds, "s.size", &req.sizes);
        push_in_list(&mut predicates, &mut binds, "s.condition", &req.conditions);
        push_in_list(
            &mut predicates,
            &mut binds,
            "s.marketplace_code",
            &req.marketplaces,
        );
        if let Some(min) = req.price_min_cents {
            let n = push_bind(&mut binds, BindValue::Int(min));
            predicates.push(format!("s.price_cents >= ${n}"));
        }
        if let Some(max) = req.price_max_cents {
            let n = push_bind(&mut binds, BindValue::Int(max));
            predicates.push(format!("s.price_cents <= ${n}"));
        }

        let where_clause = if predicates.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", predicates.join(" AND "))
        };

        RelationalQuery {
            where_clause,
            binds,
            order_by: order_by(req.sort),
            limit: i64::from(req.per_page),
            offset: i64::try_from(req.offset()).unwrap_or(i64::MAX),
        }
    }

    /// One page of aggregated canonical items.
    pub fn page_sql(&self) -> SqlQuery {
        let mut binds = self.binds.clone();
        let limit = push_bind(&mut binds, BindValue::Int(self.limit));
        let offset = push_bind(&mut binds, BindValue::Int(self.offset));

        let mut sql = String::new();
        let _ = write!(
            sql,
            "{SELECT_AGGREGATES} {FROM_ACTIVE_LISTINGS}{} GROUP BY ic.id ORDER BY {} \
             LIMIT ${limit} OFFSET ${offset}",
            self.where_clause, self.order_by
        );
        SqlQuery { sql, binds }
    }

    /// Distinct canonical items matching the same WHERE clause.
    pub fn count_sql(&self) -> SqlQuery {
        SqlQuery {
            sql: format!(
                "SELECT COUNT(DISTINCT ic.id) AS total {FROM_ACTIVE_LISTINGS}{}",
                self.where_clause
            ),
            binds: self.binds.clone(),
        }
    }
}

/// Lowest-priced active seller URL for one canonical item.
pub fn cheapest_seller_url_sql(id: &str) -> SqlQuery {
    SqlQuery {
        sql: format!(
            "SELECT s.seller_url {FROM_ACTIVE_LISTINGS} WHERE ic.id::text = $1 \
ORDER BY s.price_cents ASC NULLS LAST, s.id ASC LIMIT 1"
        ),
        binds: vec![BindValue::Text(id.to_string())],
    }
}
