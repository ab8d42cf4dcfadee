use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// One seller offer within a product group.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AdOffer {
    pub brand: String,
    pub title: String,
    pub size: Option<String>,
    pub price_cents: i64,
    pub currency: String,
    pub color: Option<String>,
}

fn dollars(cents: i64) -> String {
    format!("{:.2}", cents as f64 / 100.0)
}

/// Marketing copy for a group of offers of the same product.
pub fn generate_group_ad_script(offers: &[AdOffer]) -> Result<String, ValidationError> {
    let Some(first) = offers.first() else {
        return Err(ValidationError::MissingParameter("offers"));
    };
    // non-empty, so min/max exist
    let prices = offers.iter().map(|o| o.price_cents);
    let lowest = prices.clone().min().unwrap_or(first.price_cents);
    let highest = prices.max().unwrap_or(first.price_cents);
    let colors: BTreeSet<&str> = offers
        .iter()
        .filter_map(|o| o.color.as_deref())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect();

    let size = first.size.as_deref().unwrap_or("one size");
    let currency = &first.currency;
    let (lowest, highest) = (dollars(lowest), dollars(highest));

    let mut script = format!(
        "Looking for the {brand} {title} - Size {size}?\n\n\
         Now available on WebCloset starting from just {lowest} {currency}.\n\
         Price range: {lowest} - {highest} {currency}.\n",
        brand = first.brand,
        title = first.title,
    );
    if !colors.is_empty() {
        let colors: Vec<&str> = colors.into_iter().collect();
        script.push_str(&format!("\nAvailable in {}.\n", colors.join(", ")));
    }
    script.push_str("\nCompare multiple sellers instantly and grab the best deal today!\n");
    Ok(script)
}
