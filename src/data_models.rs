use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Result ordering. Unknown tokens fall back to `Best`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    #[default]
    Best,
    PriceAsc,
    PriceDesc,
    Newest,
}

impl SortMode {
    pub fn parse_lenient(token: &str) -> SortMode {
        match token.trim().to_ascii_lowercase().as_str() {
            "price_asc" => SortMode::PriceAsc,
            "price_desc" => SortMode::PriceDesc,
            "newest" => SortMode::Newest,
            _ => SortMode::Best,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::Best => "best",
            SortMode::PriceAsc => "price_asc",
            SortMode::PriceDesc => "price_desc",
            SortMode::Newest => "newest",
        }
    }
}

/// Canonical, validated search request. Only the normalizer builds these.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchRequest {
    pub text_query: Option<String>,
    /// Lower-cased.
    pub brands: BTreeSet<String>,
    pub sizes: BTreeSet<String>,
    pub conditions: BTreeSet<String>,
    pub marketplaces: BTreeSet<String>,
    pub price_min_cents: Option<i64>,
    pub price_max_cents: Option<i64>,
    pub sort: SortMode,
    pub page: u32,
    pub per_page: u32,
}

impl SearchRequest {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }
}

/// Filters read out of free text by keyword search.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KeywordHints {
    /// Lower-cased.
    pub brand: Option<String>,
    pub color: Option<String>,
    pub price_min_cents: Option<i64>,
    pub price_max_cents: Option<i64>,
}

/// A keyword search: the hints folded into a regular request, plus the
/// original text, which only ranks results on the search index.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordSearch {
    pub text: Option<String>,
    pub hints: KeywordHints,
    pub request: SearchRequest,
}

/// A deduplicated product aggregated over its active seller listings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CanonicalItem {
    pub id: String,
    pub title: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub image_url: Option<String>,
    /// Lowest listing price.
    pub price_cents: Option<i64>,
    pub listings_count: i64,
    pub condition: Option<String>,
    pub marketplace: Option<String>,
    pub size: Option<String>,
    pub seller_urls: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResultPage {
    pub items: Vec<CanonicalItem>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u64,
    pub has_more: bool,
}

impl ResultPage {
    pub fn new(items: Vec<CanonicalItem>, total: u64, page: u32, per_page: u32) -> ResultPage {
        let per_page_wide = u64::from(per_page.max(1));
        ResultPage {
            items,
            total,
            page,
            per_page,
            total_pages: total.div_ceil(per_page_wide),
            has_more: u64::from(page) * per_page_wide < total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_mode_lenient() {
        assert_eq!(SortMode::parse_lenient("price_asc"), SortMode::PriceAsc);
        assert_eq!(SortMode::parse_lenient(" PRICE_DESC "), SortMode::PriceDesc);
        assert_eq!(SortMode::parse_lenient("newest"), SortMode::Newest);
        assert_eq!(SortMode::parse_lenient("rating"), SortMode::Best);
        assert_eq!(SortMode::parse_lenient(""), SortMode::Best);
    }

    #[test]
    fn test_result_page_counts() {
        let page = ResultPage::new(Vec::new(), 0, 1, 24);
        assert_eq!(page.total_pages, 0);
        assert!(!page.has_more);

        let page = ResultPage::new(Vec::new(), 48, 1, 24);
        assert_eq!(page.total_pages, 2);
        assert!(page.has_more);

        let page = ResultPage::new(Vec::new(), 48, 2, 24);
        assert!(!page.has_more);

        let page = ResultPage::new(Vec::new(), 49, 2, 24);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_more);
    }
}
