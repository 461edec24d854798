//! Listing query: page window, title search and price bounds.

use serde::Deserialize;

use crate::error::{ProductError, ProductResult};

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_PER_PAGE: u64 = 10;

/// A normalized listing request.
///
/// `page` and `per_page` are always at least 1. A price bound of `0.0` (or
/// anything not strictly positive) means "no bound on that side", so a product
/// priced at exactly zero cannot be singled out by the price filter.
#[derive(Debug, Clone, PartialEq)]
pub struct PageQuery {
    pub page: u64,
    pub per_page: u64,
    /// Empty means no title filter.
    pub search: String,
    pub min_price: f64,
    pub max_price: f64,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            per_page: DEFAULT_PER_PAGE,
            search: String::new(),
            min_price: 0.0,
            max_price: 0.0,
        }
    }
}

/// Listing parameters exactly as they arrive from a caller (query string, CLI flags).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPageQuery {
    pub page: Option<String>,
    pub per_page: Option<String>,
    pub search: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
}

impl PageQuery {
    /// Coerces out-of-range window values to the defaults instead of rejecting them.
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: positive_or(page, DEFAULT_PAGE),
            per_page: positive_or(per_page, DEFAULT_PER_PAGE),
            ..Self::default()
        }
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }

    pub fn with_price_range(mut self, min_price: f64, max_price: f64) -> Self {
        self.min_price = min_price;
        self.max_price = max_price;
        self
    }

    /// Normalize raw caller input.
    ///
    /// Unparsable or non-positive `page`/`per_page` fall back to 1 and 10.
    /// Unparsable prices are a validation error.
    pub fn parse(raw: &RawPageQuery) -> ProductResult<Self> {
        let page = raw
            .page
            .as_deref()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(DEFAULT_PAGE as i64);
        let per_page = raw
            .per_page
            .as_deref()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(DEFAULT_PER_PAGE as i64);

        Ok(Self::new(page, per_page)
            .with_search(raw.search.clone().unwrap_or_default())
            .with_price_range(
                parse_price("minPrice", raw.min_price.as_deref())?,
                parse_price("maxPrice", raw.max_price.as_deref())?,
            ))
    }

    /// Number of documents to skip.
    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.per_page)
    }

    pub fn min_bound(&self) -> Option<f64> {
        (self.min_price > 0.0).then_some(self.min_price)
    }

    pub fn max_bound(&self) -> Option<f64> {
        (self.max_price > 0.0).then_some(self.max_price)
    }

    pub fn has_search(&self) -> bool {
        !self.search.is_empty()
    }
}

/// `ceil(total / per_page)`, and 0 for an empty result.
pub fn total_pages(total: u64, per_page: u64) -> u64 {
    if total == 0 || per_page == 0 {
        return 0;
    }
    total.div_ceil(per_page)
}

fn positive_or(value: i64, default: u64) -> u64 {
    if value >= 1 { value as u64 } else { default }
}

fn parse_price(name: &str, raw: Option<&str>) -> ProductResult<f64> {
    match raw.map(str::trim) {
        None | Some("") => Ok(0.0),
        Some(value) => value
            .parse::<f64>()
            .map_err(|_| ProductError::Validation(format!("Invalid {name} format: '{value}'"))),
    }
}
