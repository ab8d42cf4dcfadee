use std::collections::BTreeSet;

use serde::Deserialize;

use crate::data_models::{KeywordHints, KeywordSearch, SearchRequest, SortMode};
use crate::error::ValidationError;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PER_PAGE: i64 = 24;
pub const MAX_PER_PAGE: i64 = 100;

/// Ceiling for "cheap" words when the text names no price.
pub const KEYWORD_CHEAP_MAX_CENTS: i64 = 40_000;
/// Floor for "luxury" words when the text names no price.
pub const KEYWORD_LUXURY_MIN_CENTS: i64 = 75_000;
/// Bounds for "range" words when the text names fewer than two prices.
pub const KEYWORD_DEFAULT_RANGE_CENTS: (i64, i64) = (0, 100_000);

const CHEAP_WORDS: &[&str] = &["cheap", "affordable", "budget", "under"];
const LUXURY_WORDS: &[&str] = &["luxury", "costliest"];
const RANGE_WORDS: &[&str] = &["range", "between"];
const KEYWORD_COLORS: &[&str] = &["red", "blue", "black", "white"];
const KEYWORD_BRANDS: &[&str] = &["louis vuitton", "gucci", "nike", "adidas"];

/// Search parameters as the client sent them. Prices are in dollars.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawSearchRequest {
    pub q: Option<String>,
    pub brands: Vec<String>,
    pub sizes: Vec<String>,
    pub conditions: Vec<String>,
    pub marketplaces: Vec<String>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub sort: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Split comma-joined values into trimmed, non-empty, deduplicated tokens.
pub fn split_list<'a, I>(values: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    values
        .into_iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Dollars to integer cents, truncating fractional cents.
pub fn dollars_to_cents(dollars: f64) -> Result<i64, ValidationError> {
    if !dollars.is_finite() {
        return Err(ValidationError::InvalidPrice(format!(
            "{dollars} is not a number"
        )));
    }
    if dollars < 0.0 {
        return Err(ValidationError::InvalidPrice(format!(
            "{dollars} must not be negative"
        )));
    }
    let cents = (dollars * 100.0).trunc();
    if cents > i64::MAX as f64 {
        return Err(ValidationError::InvalidPrice(format!(
            "{dollars} is too large"
        )));
    }
    Ok(cents as i64)
}

fn validate_pagination(page: i64, per_page: i64) -> Result<(u32, u32), ValidationError> {
    if page < 1 {
        return Err(ValidationError::InvalidPagination(format!(
            "page must be >= 1, got {page}"
        )));
    }
    if !(1..=MAX_PER_PAGE).contains(&per_page) {
        return Err(ValidationError::InvalidPagination(format!(
            "per_page must be between 1 and {MAX_PER_PAGE}, got {per_page}"
        )));
    }
    let Ok(page) = u32::try_from(page) else {
        return Err(ValidationError::InvalidPagination(format!(
            "page {page} is out of range"
        )));
    };
    Ok((page, per_page as u32))
}

fn trimmed_query(q: Option<&str>) -> Option<String> {
    q.map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
}

/// Validate and canonicalize a raw request. Pure and deterministic.
pub fn normalize(raw: &RawSearchRequest) -> Result<SearchRequest, ValidationError> {
    let text_query = trimmed_query(raw.q.as_deref());

    let price_min_cents = raw.price_min.map(dollars_to_cents).transpose()?;
    let price_max_cents = raw.price_max.map(dollars_to_cents).transpose()?;
    if let (Some(min_cents), Some(max_cents)) = (price_min_cents, price_max_cents) {
        if min_cents > max_cents {
            return Err(ValidationError::InvalidRange {
                min_cents,
                max_cents,
            });
        }
    }

    let (page, per_page) = validate_pagination(
        raw.page.unwrap_or(DEFAULT_PAGE),
        raw.per_page.unwrap_or(DEFAULT_PER_PAGE),
    )?;

    let brands = split_list(raw.brands.iter().map(String::as_str))
        .into_iter()
        .map(|b| b.to_lowercase())
        .collect();

    Ok(SearchRequest {
        text_query,
        brands,
        sizes: split_list(raw.sizes.iter().map(String::as_str)),
        conditions: split_list(raw.conditions.iter().map(String::as_str)),
        marketplaces: split_list(raw.marketplaces.iter().map(String::as_str)),
        price_min_cents,
        price_max_cents,
        sort: raw
            .sort
            .as_deref()
            .map(SortMode::parse_lenient)
            .unwrap_or_default(),
        page,
        per_page,
    })
}

/// Unsigned decimal numbers in `text`, in order of appearance.
fn numbers_in(text: &str) -> Vec<f64> {
    let mut numbers = Vec::new();
    let mut current = String::new();
    for c in text.chars().chain(std::iter::once(' ')) {
        if c.is_ascii_digit() || (c == '.' && !current.is_empty() && !current.contains('.')) {
            current.push(c);
            continue;
        }
        if !current.is_empty() {
            if let Ok(n) = current.trim_end_matches('.').parse() {
                numbers.push(n);
            }
            current.clear();
        }
    }
    numbers
}

/// Read brand, color and price hints out of free text. Prices named in the
/// text are dollars. Words match whole; brands may span two words.
pub fn keyword_hints(text: &str) -> Result<KeywordHints, ValidationError> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let phrase = format!(" {} ", words.join(" "));
    let has_any = |candidates: &[&str]| candidates.iter().any(|c| words.contains(c));
    let prices = numbers_in(&lower)
        .into_iter()
        .map(dollars_to_cents)
        .collect::<Result<Vec<_>, _>>()?;

    let mut hints = KeywordHints {
        brand: KEYWORD_BRANDS
            .iter()
            .copied()
            .find(|brand| phrase.contains(&format!(" {brand} ")))
            .map(str::to_string),
        color: KEYWORD_COLORS
            .iter()
            .copied()
            .find(|color| words.contains(color))
            .map(str::to_string),
        ..Default::default()
    };

    if has_any(CHEAP_WORDS) {
        hints.price_max_cents = Some(prices.first().copied().unwrap_or(KEYWORD_CHEAP_MAX_CENTS));
    }
    if has_any(LUXURY_WORDS) {
        hints.price_min_cents = Some(prices.first().copied().unwrap_or(KEYWORD_LUXURY_MIN_CENTS));
    }
    // a range overrides the one-sided bounds
    if has_any(RANGE_WORDS) {
        let (low, high) = match prices.as_slice() {
            [a, b, ..] => (*a.min(b), *a.max(b)),
            _ => KEYWORD_DEFAULT_RANGE_CENTS,
        };
        hints.price_min_cents = Some(low);
        hints.price_max_cents = Some(high);
    }
    Ok(hints)
}

/// Keyword search: only `q`, `page` and `per_page` are read from `raw`.
pub fn normalize_keywords(raw: &RawSearchRequest) -> Result<KeywordSearch, ValidationError> {
    let text = trimmed_query(raw.q.as_deref());
    let hints = keyword_hints(text.as_deref().unwrap_or_default())?;
    let (page, per_page) = validate_pagination(
        raw.page.unwrap_or(DEFAULT_PAGE),
        raw.per_page.unwrap_or(DEFAULT_PER_PAGE),
    )?;

    let request = SearchRequest {
        brands: hints.brand.iter().cloned().collect(),
        price_min_cents: hints.price_min_cents,
        price_max_cents: hints.price_max_cents,
        page,
        per_page,
        ..Default::default()
    };
    Ok(KeywordSearch {
        text,
        hints,
        request,
    })
}
