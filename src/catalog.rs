//! In-memory catalog backend.
//!
//! Holds canonical items with their listings and evaluates searches with the
//! relational backend's semantics: listing-level filters run before
//! aggregation, items left with no active listing disappear, and every sort
//! mode breaks ties by id descending.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data_models::{CanonicalItem, SearchRequest, SortMode};
use crate::sql_query::best_score;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CatalogListing {
    pub price_cents: Option<i64>,
    pub condition: Option<String>,
    pub marketplace: Option<String>,
    pub size: Option<String>,
    pub seller_url: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CatalogItem {
    pub id: String,
    pub title: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub listings: Vec<CatalogListing>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    items: Vec<CatalogItem>,
}

struct Ranked {
    item: CanonicalItem,
    last_seen: Option<DateTime<Utc>>,
}

fn contains_ci(haystack: Option<&str>, needle_lower: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(needle_lower))
}

fn in_set(value: Option<&str>, set: &BTreeSet<String>) -> bool {
    set.is_empty() || value.is_some_and(|v| set.contains(v))
}

fn listing_matches(listing: &CatalogListing, req: &SearchRequest) -> bool {
    if !listing.active {
        return false;
    }
    if !in_set(listing.size.as_deref(), &req.sizes)
        || !in_set(listing.condition.as_deref(), &req.conditions)
        || !in_set(listing.marketplace.as_deref(), &req.marketplaces)
    {
        return false;
    }
    if req.price_min_cents.is_some() || req.price_max_cents.is_some() {
        let Some(price) = listing.price_cents else {
            return false;
        };
        if req.price_min_cents.is_some_and(|min| price < min)
            || req.price_max_cents.is_some_and(|max| price > max)
        {
            return false;
        }
    }
    true
}

fn item_matches(item: &CatalogItem, req: &SearchRequest) -> bool {
    if let Some(q) = &req.text_query {
        let q = q.to_lowercase();
        if !(contains_ci(item.title.as_deref(), &q)
            || contains_ci(item.brand.as_deref(), &q)
            || contains_ci(item.category.as_deref(), &q))
        {
            return false;
        }
    }
    req.brands.is_empty()
        || item
            .brand
            .as_deref()
            .is_some_and(|b| req.brands.contains(&b.to_lowercase()))
}

/// Sorted distinct non-empty values joined the way `STRING_AGG(DISTINCT ...)` does.
fn joined<'a>(values: impl Iterator<Item = Option<&'a str>>) -> Option<String> {
    let distinct: BTreeSet<&str> = values.flatten().collect();
    if distinct.is_empty() {
        None
    } else {
        Some(distinct.into_iter().collect::<Vec<_>>().join(", "))
    }
}

fn aggregate(item: &CatalogItem, listings: &[&CatalogListing]) -> CanonicalItem {
    let seller_urls: BTreeSet<String> = listings
        .iter()
        .filter_map(|l| l.seller_url.clone())
        .collect();
    CanonicalItem {
        id: item.id.clone(),
        title: item.title.clone(),
        brand: item.brand.clone(),
        category: item.category.clone(),
        image_url: item.image_url.clone(),
        price_cents: listings.iter().filter_map(|l| l.price_cents).min(),
        listings_count: listings.len() as i64,
        condition: joined(listings.iter().map(|l| l.condition.as_deref())),
        marketplace: joined(listings.iter().map(|l| l.marketplace.as_deref())),
        size: joined(listings.iter().map(|l| l.size.as_deref())),
        seller_urls: seller_urls.into_iter().collect(),
    }
}

/// Ascending with `None` last.
fn nulls_last<T: PartialOrd>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Descending with `None` last.
fn nulls_last_desc<T: PartialOrd>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        (a, b) => nulls_last(a, b),
    }
}

fn compare(sort: SortMode, a: &Ranked, b: &Ranked) -> Ordering {
    let primary = match sort {
        SortMode::PriceAsc => nulls_last(a.item.price_cents, b.item.price_cents),
        SortMode::PriceDesc => nulls_last_desc(a.item.price_cents, b.item.price_cents),
        SortMode::Newest => nulls_last_desc(a.last_seen, b.last_seen),
        SortMode::Best => nulls_last(
            best_score(a.item.price_cents, a.item.listings_count),
            best_score(b.item.price_cents, b.item.listings_count),
        ),
    };
    primary.then_with(|| b.item.id.cmp(&a.item.id))
}

impl MemoryCatalog {
    pub fn new(items: Vec<CatalogItem>) -> Self {
        Self { items }
    }

    /// Load a catalog from a JSON array of items.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog fixture {}", path.display()))?;
        let items: Vec<CatalogItem> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse catalog fixture {}", path.display()))?;
        log::info!(
            "Loaded {} catalog items from {}",
            items.len(),
            path.display()
        );
        Ok(Self::new(items))
    }

    /// One page of matching items plus the total number of matches.
    pub fn search(&self, req: &SearchRequest) -> (Vec<CanonicalItem>, u64) {
        let mut ranked: Vec<Ranked> = self
            .items
            .iter()
            .filter(|item| item_matches(item, req))
            .filter_map(|item| {
                let listings: Vec<&CatalogListing> = item
                    .listings
                    .iter()
                    .filter(|l| listing_matches(l, req))
                    .collect();
                if listings.is_empty() {
                    return None;
                }
                Some(Ranked {
                    item: aggregate(item, &listings),
                    last_seen: item.last_seen,
                })
            })
            .collect();

        ranked.sort_by(|a, b| compare(req.sort, a, b));
        let total = ranked.len() as u64;
        let offset = usize::try_from(req.offset()).unwrap_or(usize::MAX);
        let items = ranked
            .into_iter()
            .skip(offset)
            .take(req.per_page as usize)
            .map(|r| r.item)
            .collect();
        (items, total)
    }

    /// `None` when the id is unknown or has no active listing; the inner
    /// `Option` is the cheapest listing's URL.
    pub fn cheapest_seller_url(&self, id: &str) -> Option<Option<String>> {
        let item = self.items.iter().find(|item| item.id == id)?;
        item.listings
            .iter()
            .filter(|l| l.active)
            .min_by(|a, b| nulls_last(a.price_cents, b.price_cents))
            .map(|l| l.seller_url.clone())
    }
}
