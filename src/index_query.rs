//! Search-engine query documents.
//!
//! A normalized [`SearchRequest`] is turned into a [`Clause`] tree and a list
//! of [`SortKey`]s by pure functions, then rendered to the Elasticsearch query
//! DSL. Keeping the tree typed lets the shape be asserted without a live index.

use serde_json::{Map, Value, json};

use crate::data_models::{KeywordSearch, SearchRequest, SortMode};

/// Fields fetched from `_source`; enough to render a canonical item.
pub const SOURCE_FIELDS: &[&str] = &[
    "id",
    "title",
    "brand",
    "category",
    "image",
    "price_cents",
    "listings_count",
    "condition",
    "marketplace",
    "size",
    "seller_urls",
];

pub const TITLE_BOOST: u32 = 2;
pub const BRAND_BOOST: u32 = 1;

/// Ranking fields for keyword search.
const KEYWORD_FIELDS: &[(&str, u32)] = &[("title", 3), ("brand", 1), ("category", 1)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    fn as_str(self) -> &'static str {
        match self {
            Order::Asc => "asc",
            Order::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    MatchAll,
    MultiMatch {
        query: String,
        fields: Vec<(&'static str, u32)>,
    },
    MatchPhrasePrefix {
        field: &'static str,
        query: String,
    },
    Wildcard {
        field: &'static str,
        pattern: String,
    },
    Terms {
        field: &'static str,
        values: Vec<String>,
    },
    Range {
        field: &'static str,
        gte: Option<i64>,
        lte: Option<i64>,
    },
    Bool {
        must: Vec<Clause>,
        should: Vec<Clause>,
        filter: Vec<Clause>,
        minimum_should_match: Option<u32>,
    },
}

impl Clause {
    pub fn to_json(&self) -> Value {
        match self {
            Clause::MatchAll => json!({ "match_all": {} }),
            Clause::MultiMatch { query, fields } => {
                let fields: Vec<String> = fields
                    .iter()
                    .map(|(field, boost)| format!("{field}^{boost}"))
                    .collect();
                json!({ "multi_match": { "query": query, "fields": fields } })
            }
            Clause::MatchPhrasePrefix { field, query } => {
                json!({ "match_phrase_prefix": { *field: { "query": query } } })
            }
            Clause::Wildcard { field, pattern } => json!({
                "wildcard": { *field: { "value": pattern, "case_insensitive": true } }
            }),
            Clause::Terms { field, values } => json!({ "terms": { *field: values } }),
            Clause::Range { field, gte, lte } => {
                let mut bounds = Map::new();
                if let Some(gte) = gte {
                    bounds.insert("gte".to_string(), json!(gte));
                }
                if let Some(lte) = lte {
                    bounds.insert("lte".to_string(), json!(lte));
                }
                json!({ "range": { *field: bounds } })
            }
            Clause::Bool {
                must,
                should,
                filter,
                minimum_should_match,
            } => {
                let mut body = Map::new();
                let render = |clauses: &[Clause]| -> Value {
                    Value::Array(clauses.iter().map(Clause::to_json).collect())
                };
                if !must.is_empty() {
                    body.insert("must".to_string(), render(must));
                }
                if !should.is_empty() {
                    body.insert("should".to_string(), render(should));
                }
                if !filter.is_empty() {
                    body.insert("filter".to_string(), render(filter));
                }
                if let Some(min) = minimum_should_match {
                    body.insert("minimum_should_match".to_string(), json!(min));
                }
                json!({ "bool": body })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    Field { field: &'static str, order: Order },
    Score(Order),
}

impl SortKey {
    pub fn to_json(&self) -> Value {
        match self {
            SortKey::Field { field, order } => json!({ *field: order.as_str() }),
            SortKey::Score(order) => json!({ "_score": order.as_str() }),
        }
    }
}

/// Escape wildcard metacharacters so user text is matched literally.
fn escape_wildcard(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Relevance stage: weighted multi-field match, phrase prefix on title, or
/// wildcard prefix on title. Absent text matches everything.
pub fn text_clause(text_query: Option<&str>) -> Clause {
    let Some(q) = text_query else {
        return Clause::MatchAll;
    };
    Clause::Bool {
        must: Vec::new(),
        should: vec![
            Clause::MultiMatch {
                query: q.to_string(),
                fields: vec![("title", TITLE_BOOST), ("brand", BRAND_BOOST)],
            },
            Clause::MatchPhrasePrefix {
                field: "title",
                query: q.to_string(),
            },
            Clause::Wildcard {
                field: "title",
                pattern: format!("{}*", escape_wildcard(&q.to_lowercase())),
            },
        ],
        filter: Vec::new(),
        minimum_should_match: Some(1),
    }
}

/// Hard filters, each present only when the request carries values for it.
pub fn filter_clauses(req: &SearchRequest) -> Vec<Clause> {
    let mut filters = Vec::new();

    // brand is indexed with a lower-casing normalizer; request brands are already lower-case
    if !req.brands.is_empty() {
        filters.push(Clause::Terms {
            field: "brand",
            values: req.brands.iter().cloned().collect(),
        });
    }
    if !req.conditions.is_empty() {
        filters.push(Clause::Terms {
            field: "condition",
            values: req.conditions.iter().cloned().collect(),
        });
    }
    if !req.marketplaces.is_empty() {
        filters.push(Clause::Terms {
            field: "marketplace",
            values: req.marketplaces.iter().cloned().collect(),
        });
    }
    if req.price_min_cents.is_some() || req.price_max_cents.is_some() {
        filters.push(Clause::Range {
            field: "price_cents",
            gte: req.price_min_cents,
            lte: req.price_max_cents,
        });
    }

    filters
}

/// Keyword-search filters: the request's hard filters plus the color hint.
pub fn keyword_filter_clauses(search: &KeywordSearch) -> Vec<Clause> {
    let mut filters = filter_clauses(&search.request);
    if let Some(color) = &search.hints.color {
        filters.push(Clause::Terms {
            field: "color",
            values: vec![color.clone()],
        });
    }
    filters
}

pub fn sort_keys(sort: SortMode) -> Vec<SortKey> {
    match sort {
        SortMode::PriceAsc => vec![
            SortKey::Field {
                field: "price_cents",
                order: Order::Asc,
            },
            SortKey::Score(Order::Desc),
        ],
        SortMode::PriceDesc => vec![
            SortKey::Field {
                field: "price_cents",
                order: Order::Desc,
            },
            SortKey::Score(Order::Desc),
        ],
        SortMode::Newest => vec![SortKey::Field {
            field: "updated_at",
            order: Order::Desc,
        }],
        SortMode::Best => vec![SortKey::Score(Order::Desc)],
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexQuery {
    pub query: Clause,
    pub sort: Vec<SortKey>,
    pub from: u64,
    pub size: u32,
}

impl IndexQuery {
    pub fn build(req: &SearchRequest) -> IndexQuery {
        let filter = filter_clauses(req);
        IndexQuery {
            query: Clause::Bool {
                must: vec![text_clause(req.text_query.as_deref())],
                should: Vec::new(),
                filter,
                minimum_should_match: None,
            },
            sort: sort_keys(req.sort),
            from: req.offset(),
            size: req.per_page,
        }
    }

    /// Keyword search: the hints filter and the free text only ranks.
    pub fn keyword(search: &KeywordSearch) -> IndexQuery {
        let should = search
            .text
            .iter()
            .map(|text| Clause::MultiMatch {
                query: text.clone(),
                fields: KEYWORD_FIELDS.to_vec(),
            })
            .collect();
        IndexQuery {
            query: Clause::Bool {
                must: vec![Clause::MatchAll],
                should,
                filter: keyword_filter_clauses(search),
                minimum_should_match: None,
            },
            sort: sort_keys(search.request.sort),
            from: search.request.offset(),
            size: search.request.per_page,
        }
    }

    /// Full `_search` request body.
    pub fn to_body(&self) -> Value {
        json!({
            "from": self.from,
            "size": self.size,
            "track_total_hits": true,
            "query": self.query.to_json(),
            "sort": self.sort.iter().map(SortKey::to_json).collect::<Vec<_>>(),
            "_source": SOURCE_FIELDS,
        })
    }
}
