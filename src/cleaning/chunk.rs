use anyhow::{Context, Result};
use chrono::{Months, NaiveDate, Utc};
use regex::Regex;
use std::collections::HashSet;

use crate::config::CleanConfig;
use crate::cleaning::record::{
    CleanRecord, RawRecord, RejectedRecord, RejectionReason, normalise_field,
};
use crate::lookup::Resolver;

/// Unit prices must fall inside (0, MAX_UNIT_PRICE) to survive.
const MAX_UNIT_PRICE: f64 = 50_000.0;
/// Recomputed revenue must fall inside [0, MAX_REVENUE) to survive.
const MAX_REVENUE: f64 = 1_000_000.0;
/// Discounts above this fraction are flagged as anomalies, not rejected.
const HEAVY_DISCOUNT_THRESHOLD: f64 = 0.80;
const HEAVY_DISCOUNT_FLAG: &str = "heavy_discount";

/// Accepted sale_date formats, tried in this order.
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%m/%d/%Y", "%d-%m-%Y", "%Y/%m/%d"];

const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";

/// Runs the staged per-row validation over one chunk of raw records. A row
/// exits at the first stage it fails and is recorded with that stage's
/// reason only.
pub struct ChunkCleaner {
    email_regex: Regex,
    drop_zero_quantity: bool,
    /// Accepted sale_date window as epoch seconds, fixed at construction.
    min_sale_ts: i64,
    max_sale_ts: i64,
}

impl ChunkCleaner {
    pub fn new(config: &CleanConfig) -> Result<Self> {
        let now = Utc::now();
        let min_sale_ts = now
            .checked_sub_months(Months::new(240))
            .context("Failed to compute lower sale_date bound")?
            .timestamp();
        let max_sale_ts = now
            .checked_add_months(Months::new(12))
            .context("Failed to compute upper sale_date bound")?
            .timestamp();
        Ok(Self {
            email_regex: Regex::new(EMAIL_PATTERN)?,
            drop_zero_quantity: config.drop_zero_quantity,
            min_sale_ts,
            max_sale_ts,
        })
    }

    /// Partition a chunk into clean and rejected records, updating the shared
    /// seen-order-id set with every surviving id. Chunks must be processed
    /// sequentially in file order against the same seen set.
    pub fn clean_chunk(
        &self,
        chunk: &[RawRecord],
        resolver: &mut Resolver,
        seen_order_ids: &mut HashSet<String>,
    ) -> (Vec<CleanRecord>, Vec<RejectedRecord>) {
        let mut clean = Vec::new();
        let mut rejected = Vec::new();
        let mut chunk_order_ids: HashSet<String> = HashSet::new();

        for raw in chunk {
            match self.clean_row(raw, resolver, seen_order_ids, &mut chunk_order_ids) {
                Ok(record) => {
                    seen_order_ids.insert(record.order_id.clone());
                    clean.push(record);
                }
                Err(reason) => rejected.push(RejectedRecord {
                    raw: raw.clone(),
                    reason,
                }),
            }
        }

        (clean, rejected)
    }

    fn clean_row(
        &self,
        raw: &RawRecord,
        resolver: &mut Resolver,
        seen_order_ids: &HashSet<String>,
        chunk_order_ids: &mut HashSet<String>,
    ) -> std::result::Result<CleanRecord, RejectionReason> {
        // Stage 1: identifiers.
        let order_id = normalise_field(&raw.order_id);
        let product_name = normalise_field(&raw.product_name);
        if order_id.is_empty() || product_name.is_empty() {
            return Err(RejectionReason::MissingOrderIdOrProduct);
        }

        // Stage 2: dedup, first within the chunk, then against earlier chunks.
        // The first occurrence claims the id even if a later stage rejects it.
        if chunk_order_ids.contains(&order_id) || seen_order_ids.contains(&order_id) {
            return Err(RejectionReason::DuplicateOrderId);
        }
        chunk_order_ids.insert(order_id.clone());

        // Stage 3: canonical vocabulary.
        let category = resolver
            .resolve_category(&raw.category)
            .ok_or(RejectionReason::UnknownCategory)?;
        let region = resolver
            .resolve_region(&raw.region)
            .ok_or(RejectionReason::UnknownRegion)?;

        // Stage 4: numeric fields.
        let quantity = parse_quantity(&raw.quantity);
        let unit_price = parse_price(&raw.unit_price);
        let discount_percent = parse_discount(&raw.discount_percent);
        if unit_price <= 0.0 || unit_price >= MAX_UNIT_PRICE {
            return Err(RejectionReason::InvalidUnitPrice);
        }
        let anomaly_flag = (discount_percent > HEAVY_DISCOUNT_THRESHOLD)
            .then(|| HEAVY_DISCOUNT_FLAG.to_string());

        // Stage 5: quantity.
        if self.drop_zero_quantity && quantity == 0 {
            return Err(RejectionReason::ZeroQuantity);
        }

        // Stage 6: sale date.
        let sale_date = parse_sale_date(&raw.sale_date).ok_or(RejectionReason::InvalidSaleDate)?;
        if sale_date < self.min_sale_ts || sale_date > self.max_sale_ts {
            return Err(RejectionReason::SaleDateOutOfRange);
        }

        // Stage 7: email degrades to absent instead of rejecting the row.
        let customer_email = self.clean_email(&raw.customer_email);

        // Stage 8: revenue is always recomputed from the cleaned figures.
        let revenue = round2(unit_price * quantity as f64 * (1.0 - discount_percent));
        if revenue < 0.0 || revenue >= MAX_REVENUE {
            return Err(RejectionReason::InvalidCalculatedRevenue);
        }

        Ok(CleanRecord {
            order_id,
            product_name,
            category,
            quantity,
            unit_price,
            discount_percent,
            region,
            sale_date,
            customer_email,
            revenue,
            anomaly_flag,
        })
    }

    fn clean_email(&self, raw: &str) -> Option<String> {
        let email = normalise_field(raw).to_lowercase();
        if !email.is_empty() && self.email_regex.is_match(&email) {
            Some(email)
        } else {
            None
        }
    }
}

/// Parse a quantity, coercing unparsable values to 0 and clipping negatives.
/// Rounding is half-away-from-zero, so "2.5" becomes 3.
fn parse_quantity(raw: &str) -> i64 {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => value.round() as i64,
        _ => 0,
    }
}

/// Parse a price, coercing unparsable values to 0.0.
fn parse_price(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

/// Parse a discount fraction, coercing unparsable values to 0.0 and clamping
/// to [0, 1].
fn parse_discount(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => value.clamp(0.0, 1.0),
        _ => 0.0,
    }
}

/// Try the supported date formats in priority order; return epoch seconds of
/// midnight UTC, or None when no format matches.
fn parse_sale_date(raw: &str) -> Option<i64> {
    let value = normalise_field(raw);
    if value.is_empty() {
        return None;
    }
    let date = DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&value, format).ok())?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp())
}

// Half-away-from-zero to two decimal places.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
