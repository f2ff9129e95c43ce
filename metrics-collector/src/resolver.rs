//! Date-based best-match resolution of products and discounts.
//!
//! A candidate applies when its source equals the requested source exactly and
//! its validity window `[valid_from, valid_to)` contains the billing date.
//! Among applicable candidates the one with the latest `valid_from` wins, so a
//! newer override shadows the definition it replaces. Products and discounts
//! share the same algorithm.

use crate::error::{BillingError, DimensionKind};
use crate::models::{Discount, Product};
use chrono::{DateTime, Utc};

/// Reference data with a source identity and a validity window.
pub trait Validity {
    fn source(&self) -> &str;
    fn valid_from(&self) -> DateTime<Utc>;
    /// Exclusive end; `None` means still active.
    fn valid_to(&self) -> Option<DateTime<Utc>>;

    fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.valid_from() <= at && self.valid_to().map_or(true, |to| at < to)
    }
}

impl Validity for Product {
    fn source(&self) -> &str {
        &self.source
    }

    fn valid_from(&self) -> DateTime<Utc> {
        self.during_from
    }

    fn valid_to(&self) -> Option<DateTime<Utc>> {
        self.during_to
    }
}

impl Validity for Discount {
    fn source(&self) -> &str {
        &self.source
    }

    fn valid_from(&self) -> DateTime<Utc> {
        self.during_from
    }

    fn valid_to(&self) -> Option<DateTime<Utc>> {
        self.during_to
    }
}

/// Pick the applicable candidate with the latest `valid_from`.
///
/// Equal `valid_from` values keep the first candidate in iteration order.
pub fn best_match<'a, T, I>(candidates: I, source: &str, at: DateTime<Utc>) -> Option<&'a T>
where
    T: Validity + 'a,
    I: IntoIterator<Item = &'a T>,
{
    candidates
        .into_iter()
        .filter(|c| c.source() == source && c.is_valid_at(at))
        .fold(None, |best: Option<&'a T>, candidate| match best {
            Some(b) if b.valid_from() >= candidate.valid_from() => Some(b),
            _ => Some(candidate),
        })
}

/// Resolve the product billed for `source` at `at`.
pub fn resolve_product(
    candidates: &[Product],
    source: &str,
    at: DateTime<Utc>,
) -> Result<Product, BillingError> {
    best_match(candidates, source, at)
        .cloned()
        .ok_or_else(|| BillingError::NoMatch {
            kind: DimensionKind::Product,
            source_string: source.to_string(),
            date: at,
        })
}

/// Outcome of a discount lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscountMatch {
    Matched(Discount),
    NoneApplies,
}

impl DiscountMatch {
    pub fn discount(&self) -> Option<&Discount> {
        match self {
            DiscountMatch::Matched(d) => Some(d),
            DiscountMatch::NoneApplies => None,
        }
    }
}

/// Resolve the discount applicable to `source` at `at`. Whether
/// [`DiscountMatch::NoneApplies`] is acceptable is up to the caller.
pub fn resolve_discount(candidates: &[Discount], source: &str, at: DateTime<Utc>) -> DiscountMatch {
    match best_match(candidates, source, at) {
        Some(discount) => DiscountMatch::Matched(discount.clone()),
        None => DiscountMatch::NoneApplies,
    }
}
