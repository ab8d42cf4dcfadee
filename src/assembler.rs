//! Maps backend rows and hits into [`CanonicalItem`]s and a [`ResultPage`].
//!
//! Both backends are first reduced to a JSON field map so that a single set
//! of coercion rules applies. Relational rows that fail coercion are dropped
//! with a warning; search-index hits that fail coercion fail the request.

use serde_json::{Map, Value};
use sqlx::Row;
use sqlx::postgres::PgRow;
use thiserror::Error;

use crate::data_models::{CanonicalItem, ResultPage, SearchRequest};
use crate::error::Error;

#[derive(Debug, Error, PartialEq)]
pub enum AssembleError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` has an unusable value: {value}")]
    InvalidField { field: &'static str, value: String },
}

fn invalid(field: &'static str, value: &Value) -> AssembleError {
    AssembleError::InvalidField {
        field,
        value: value.to_string(),
    }
}

fn optional_text(
    fields: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, AssembleError> {
    match fields.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(invalid(field, other)),
    }
}

/// Integer cents, or `None`. Whole-valued floats and numeric strings are accepted.
fn coerce_cents(
    fields: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<i64>, AssembleError> {
    let value = match fields.get(field) {
        None | Some(Value::Null) => return Ok(None),
        Some(value) => value,
    };
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Some(i))
            } else {
                n.as_f64()
                    .filter(|f| f.is_finite() && f.fract() == 0.0)
                    .map(|f| Some(f as i64))
                    .ok_or_else(|| invalid(field, value))
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| invalid(field, value)),
        other => Err(invalid(field, other)),
    }
}

fn coerce_count(fields: &Map<String, Value>) -> Result<i64, AssembleError> {
    Ok(coerce_cents(fields, "listings_count")?.unwrap_or(0))
}

fn coerce_urls(fields: &Map<String, Value>) -> Result<Vec<String>, AssembleError> {
    match fields.get("seller_urls") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(url)) => Ok(vec![url.clone()]),
        Some(Value::Array(values)) => values
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid("seller_urls", v))
            })
            .collect(),
        Some(other) => Err(invalid("seller_urls", other)),
    }
}

/// Build one item from a field map. `fallback_id` covers index hits whose
/// source omits `id` (the document `_id` is used instead).
pub fn item_from_fields(
    fields: &Map<String, Value>,
    fallback_id: Option<&str>,
) -> Result<CanonicalItem, AssembleError> {
    let id = optional_text(fields, "id")?
        .or_else(|| fallback_id.map(str::to_string))
        .filter(|id| !id.is_empty())
        .ok_or(AssembleError::MissingField("id"))?;

    let image_url = match optional_text(fields, "image_url")? {
        Some(url) => Some(url),
        None => optional_text(fields, "image")?,
    };

    Ok(CanonicalItem {
        id,
        title: optional_text(fields, "title")?,
        brand: optional_text(fields, "brand")?,
        category: optional_text(fields, "category")?,
        image_url,
        price_cents: coerce_cents(fields, "price_cents")?,
        listings_count: coerce_count(fields)?,
        condition: optional_text(fields, "condition")?,
        marketplace: optional_text(fields, "marketplace")?,
        size: optional_text(fields, "size")?,
        seller_urls: coerce_urls(fields)?,
    })
}

/// Index hits: any malformed hit fails the whole page.
pub fn items_from_hits(hits: &[Value]) -> Result<Vec<CanonicalItem>, Error> {
    hits.iter()
        .map(|hit| {
            let empty = Map::new();
            let source = match hit.get("_source") {
                Some(Value::Object(source)) => source,
                None | Some(Value::Null) => &empty,
                Some(other) => {
                    return Err(Error::Internal(format!("hit `_source` is not an object: {other}")));
                }
            };
            let fallback_id = hit.get("_id").and_then(Value::as_str);
            item_from_fields(source, fallback_id)
                .map_err(|e| Error::Internal(format!("malformed search hit: {e}")))
        })
        .collect()
}

/// Relational rows: rows that cannot be decoded or coerced are dropped.
pub fn items_from_rows<I>(rows: I) -> Vec<CanonicalItem>
where
    I: IntoIterator<Item = Result<Map<String, Value>, String>>,
{
    rows.into_iter()
        .enumerate()
        .filter_map(|(idx, row)| {
            let fields = match row {
                Ok(fields) => fields,
                Err(e) => {
                    tracing::warn!(row = idx, "dropping undecodable row: {e}");
                    return None;
                }
            };
            match item_from_fields(&fields, None) {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::warn!(row = idx, "dropping malformed row: {e}");
                    None
                }
            }
        })
        .collect()
}

fn price_from_row(row: &PgRow) -> Result<Value, sqlx::Error> {
    if let Ok(price) = row.try_get::<Option<i64>, _>("price_cents") {
        return Ok(price.map_or(Value::Null, Value::from));
    }
    if let Ok(price) = row.try_get::<Option<i32>, _>("price_cents") {
        return Ok(price.map_or(Value::Null, Value::from));
    }
    let price: Option<f64> = row.try_get("price_cents")?;
    Ok(price.map_or(Value::Null, Value::from))
}

/// Decode an aggregated row into the shared field map.
pub fn fields_from_row(row: &PgRow) -> Result<Map<String, Value>, sqlx::Error> {
    let text = |name: &str| -> Result<Value, sqlx::Error> {
        Ok(row
            .try_get::<Option<String>, _>(name)?
            .map_or(Value::Null, Value::from))
    };

    let mut fields = Map::new();
    for name in [
        "id",
        "brand",
        "title",
        "category",
        "image_url",
        "condition",
        "marketplace",
        "size",
    ] {
        fields.insert(name.to_string(), text(name)?);
    }
    fields.insert("price_cents".to_string(), price_from_row(row)?);
    fields.insert(
        "listings_count".to_string(),
        Value::from(row.try_get::<i64, _>("listings_count")?),
    );
    fields.insert(
        "seller_urls".to_string(),
        row.try_get::<Option<Vec<String>>, _>("seller_urls")?
            .map_or(Value::Null, Value::from),
    );
    Ok(fields)
}

pub fn result_page(items: Vec<CanonicalItem>, total: u64, req: &SearchRequest) -> ResultPage {
    ResultPage::new(items, total, req.page, req.per_page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn test_defaults_for_absent_fields() {
        let item = item_from_fields(&fields(json!({ "id": "c-1" })), None).unwrap();
        assert_eq!(item.id, "c-1");
        assert_eq!(item.listings_count, 0);
        assert!(item.seller_urls.is_empty());
        assert_eq!(item.price_cents, None);
        assert_eq!(item.title, None);
    }

    #[test]
    fn test_price_coercion() {
        let cases = [
            (json!(8000), Some(8000)),
            (json!(8000.0), Some(8000)),
            (json!("8000"), Some(8000)),
            (json!(null), None),
        ];
        for (raw, expected) in cases {
            let priced = fields(json!({ "id": "c", "price_cents": raw }));
            let item = item_from_fields(&priced, None).unwrap();
            assert_eq!(item.price_cents, expected, "{raw}");
        }

        let fractional = fields(json!({ "id": "c", "price_cents": 80.5 }));
        let err = item_from_fields(&fractional, None).unwrap_err();
        assert!(matches!(
            err,
            AssembleError::InvalidField {
                field: "price_cents",
                ..
            }
        ));
        let word = fields(json!({ "id": "c", "price_cents": "cheap" }));
        assert!(item_from_fields(&word, None).is_err());
    }

    #[test]
    fn test_missing_id_uses_fallback_or_fails() {
        let item = item_from_fields(&fields(json!({ "title": "Dunk" })), Some("doc-9")).unwrap();
        assert_eq!(item.id, "doc-9");

        let err = item_from_fields(&fields(json!({ "title": "Dunk" })), None).unwrap_err();
        assert_eq!(err, AssembleError::MissingField("id"));
    }

    #[test]
    fn test_image_falls_back_to_index_field() {
        let item = item_from_fields(
            &fields(json!({ "id": "c", "image": "https://img/1.jpg" })),
            None,
        )
        .unwrap();
        assert_eq!(item.image_url.as_deref(), Some("https://img/1.jpg"));
    }

    #[test]
    fn test_hits_are_strict() {
        let hits = vec![
            json!({ "_id": "a", "_source": { "title": "ok", "seller_urls": ["https://x"] } }),
            json!({ "_id": "b", "_source": { "title": "bad", "price_cents": { "nested": 1 } } }),
        ];
        let err = items_from_hits(&hits).unwrap_err();
        assert_eq!(err.kind(), "InternalError");

        let items = items_from_hits(&hits[..1]).unwrap();
        assert_eq!(items[0].id, "a");
        assert_eq!(items[0].seller_urls, vec!["https://x".to_string()]);
    }

    #[test]
    fn test_rows_are_tolerant() {
        let rows = vec![
            Ok(fields(json!({ "id": "1", "price_cents": 4000, "listings_count": 2 }))),
            Err("column type mismatch".to_string()),
            Ok(fields(json!({ "price_cents": 100 }))),
            Ok(fields(json!({ "id": "4", "seller_urls": [null, "https://s/4"] }))),
        ];
        let items = items_from_rows(rows);
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "4"]);
        assert_eq!(items[0].listings_count, 2);
        assert_eq!(items[1].seller_urls, vec!["https://s/4".to_string()]);
    }
}
