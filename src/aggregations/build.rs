//! Derives business metric tables from the cleaned dataset. One code path
//! regardless of input size; every table is aggregate-then-sort with explicit
//! tie-breaks so repeated runs produce identical artefacts.

use anyhow::{Context, Result};
use chrono::DateTime;
use polars::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::cleaning::CleanRecord;

const DEFAULT_TOP_PRODUCTS_LIMIT: usize = 10;
const DEFAULT_ANOMALY_LIMIT: usize = 5;

/// Compute all supported aggregations from the cleaned parquet dataset and
/// write one parquet artefact per table into `output_dir`. Empty input still
/// yields every artefact with its documented schema.
pub fn build_all_aggregations(clean_parquet: &Path, output_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    info!("Loading cleaned data from: {}", clean_parquet.display());
    let records = load_clean_records(clean_parquet)?;
    if records.is_empty() {
        warn!("Input data is empty, generating empty aggregation files");
    } else {
        info!("Processing {} records from cleaned data", records.len());
    }

    let tables: [(&str, DataFrame); 5] = [
        ("monthly_sales_summary", monthly_sales_summary(&records)?),
        (
            "top_products",
            top_products(&records, DEFAULT_TOP_PRODUCTS_LIMIT)?,
        ),
        ("region_wise_performance", region_wise_performance(&records)?),
        ("category_discount_map", category_discount_map(&records)?),
        (
            "anomaly_records",
            anomaly_records(&records, DEFAULT_ANOMALY_LIMIT)?,
        ),
    ];

    let mut artefacts = Vec::new();
    for (name, mut frame) in tables {
        let artefact = output_dir.join(format!("{name}.parquet"));
        let file = File::create(&artefact)
            .with_context(|| format!("Failed to create {}", artefact.display()))?;
        ParquetWriter::new(file)
            .with_compression(ParquetCompression::Snappy)
            .finish(&mut frame)
            .with_context(|| format!("Failed to write {}", artefact.display()))?;
        info!("Saved {}: {} rows -> {}", name, frame.height(), artefact.display());
        artefacts.push(artefact);
    }

    info!(
        "Successfully generated {} aggregation files in {}",
        artefacts.len(),
        output_dir.display()
    );
    Ok(artefacts)
}

fn load_clean_records(clean_parquet: &Path) -> Result<Vec<CleanRecord>> {
    let file = File::open(clean_parquet)
        .with_context(|| format!("Failed to open {}", clean_parquet.display()))?;
    let frame = ParquetReader::new(file)
        .finish()
        .with_context(|| format!("Failed to read {}", clean_parquet.display()))?;

    let order_ids = frame.column("order_id")?.str()?;
    let product_names = frame.column("product_name")?.str()?;
    let categories = frame.column("category")?.str()?;
    let quantities = frame.column("quantity")?.i64()?;
    let unit_prices = frame.column("unit_price")?.f64()?;
    let discounts = frame.column("discount_percent")?.f64()?;
    let regions = frame.column("region")?.str()?;
    let sale_dates = frame.column("sale_date")?.i64()?;
    let emails = frame.column("customer_email")?.str()?;
    let revenues = frame.column("revenue")?.f64()?;
    let flags = frame.column("anomaly_flag")?.str()?;

    let mut records = Vec::with_capacity(frame.height());
    for i in 0..frame.height() {
        records.push(CleanRecord {
            order_id: order_ids.get(i).unwrap_or_default().to_string(),
            product_name: product_names.get(i).unwrap_or_default().to_string(),
            category: categories.get(i).unwrap_or_default().to_string(),
            quantity: quantities.get(i).unwrap_or_default(),
            unit_price: unit_prices.get(i).unwrap_or_default(),
            discount_percent: discounts.get(i).unwrap_or_default(),
            region: regions.get(i).unwrap_or_default().to_string(),
            sale_date: sale_dates.get(i).unwrap_or_default(),
            customer_email: emails.get(i).map(str::to_string),
            revenue: revenues.get(i).unwrap_or_default(),
            anomaly_flag: flags.get(i).map(str::to_string),
        });
    }
    Ok(records)
}

#[derive(Default)]
struct GroupAcc {
    revenue: f64,
    quantity: i64,
    discount_sum: f64,
    order_count: i64,
}

impl GroupAcc {
    fn add(&mut self, record: &CleanRecord) {
        self.revenue += record.revenue;
        self.quantity += record.quantity;
        self.discount_sum += record.discount_percent;
        self.order_count += 1;
    }

    fn avg_discount(&self) -> f64 {
        if self.order_count > 0 {
            round4(self.discount_sum / self.order_count as f64)
        } else {
            0.0
        }
    }
}

/// Revenue, quantity and average discount per calendar month, sorted by month.
fn monthly_sales_summary(records: &[CleanRecord]) -> Result<DataFrame> {
    let mut groups: BTreeMap<String, GroupAcc> = BTreeMap::new();
    for record in records {
        let Some(month) = month_of(record.sale_date) else {
            continue;
        };
        groups.entry(month).or_default().add(record);
    }

    let mut months = Vec::new();
    let mut revenues = Vec::new();
    let mut quantities = Vec::new();
    let mut discounts = Vec::new();
    let mut order_counts = Vec::new();
    for (month, acc) in groups {
        months.push(month);
        revenues.push(round2(acc.revenue));
        quantities.push(acc.quantity);
        discounts.push(acc.avg_discount());
        order_counts.push(acc.order_count);
    }

    frame(vec![
        Series::new("month".into(), months).into(),
        Series::new("total_revenue".into(), revenues).into(),
        Series::new("total_quantity".into(), quantities).into(),
        Series::new("avg_discount_percent".into(), discounts).into(),
        Series::new("order_count".into(), order_counts).into(),
    ])
}

/// Top products by revenue and by units, each ranked independently and
/// stacked with a metric_type column. Ties break by product name ascending.
fn top_products(records: &[CleanRecord], limit: usize) -> Result<DataFrame> {
    let mut groups: HashMap<&str, GroupAcc> = HashMap::new();
    for record in records {
        groups.entry(&record.product_name).or_default().add(record);
    }
    let mut grouped: Vec<(&str, GroupAcc)> = groups.into_iter().collect();

    let mut ranks = Vec::new();
    let mut names = Vec::new();
    let mut revenues = Vec::new();
    let mut quantities = Vec::new();
    let mut order_counts = Vec::new();
    let mut metric_types = Vec::new();

    grouped.sort_by(|a, b| b.1.revenue.total_cmp(&a.1.revenue).then(a.0.cmp(b.0)));
    for (rank, (name, acc)) in grouped.iter().take(limit).enumerate() {
        ranks.push((rank + 1) as i64);
        names.push(name.to_string());
        revenues.push(round2(acc.revenue));
        quantities.push(acc.quantity);
        order_counts.push(acc.order_count);
        metric_types.push("revenue".to_string());
    }

    grouped.sort_by(|a, b| b.1.quantity.cmp(&a.1.quantity).then(a.0.cmp(b.0)));
    for (rank, (name, acc)) in grouped.iter().take(limit).enumerate() {
        ranks.push((rank + 1) as i64);
        names.push(name.to_string());
        revenues.push(round2(acc.revenue));
        quantities.push(acc.quantity);
        order_counts.push(acc.order_count);
        metric_types.push("units".to_string());
    }

    frame(vec![
        Series::new("rank".into(), ranks).into(),
        Series::new("product_name".into(), names).into(),
        Series::new("total_revenue".into(), revenues).into(),
        Series::new("total_quantity".into(), quantities).into(),
        Series::new("order_count".into(), order_counts).into(),
        Series::new("metric_type".into(), metric_types).into(),
    ])
}

/// Sales performance per region, sorted by revenue descending.
fn region_wise_performance(records: &[CleanRecord]) -> Result<DataFrame> {
    let mut groups: HashMap<&str, GroupAcc> = HashMap::new();
    for record in records {
        groups.entry(&record.region).or_default().add(record);
    }
    let mut grouped: Vec<(&str, GroupAcc)> = groups.into_iter().collect();
    grouped.sort_by(|a, b| b.1.revenue.total_cmp(&a.1.revenue).then(a.0.cmp(b.0)));

    let mut regions = Vec::new();
    let mut revenues = Vec::new();
    let mut quantities = Vec::new();
    let mut order_counts = Vec::new();
    let mut avg_order_values = Vec::new();
    for (region, acc) in grouped {
        regions.push(region.to_string());
        revenues.push(round2(acc.revenue));
        quantities.push(acc.quantity);
        order_counts.push(acc.order_count);
        avg_order_values.push(round2(acc.revenue / acc.order_count as f64));
    }

    frame(vec![
        Series::new("region".into(), regions).into(),
        Series::new("total_revenue".into(), revenues).into(),
        Series::new("total_quantity".into(), quantities).into(),
        Series::new("order_count".into(), order_counts).into(),
        Series::new("avg_order_value".into(), avg_order_values).into(),
    ])
}

/// Average discount per category, sorted by discount descending.
fn category_discount_map(records: &[CleanRecord]) -> Result<DataFrame> {
    let mut groups: HashMap<&str, GroupAcc> = HashMap::new();
    for record in records {
        groups.entry(&record.category).or_default().add(record);
    }
    let mut grouped: Vec<(&str, GroupAcc)> = groups.into_iter().collect();
    grouped.sort_by(|a, b| {
        b.1.avg_discount()
            .total_cmp(&a.1.avg_discount())
            .then(a.0.cmp(b.0))
    });

    let mut categories = Vec::new();
    let mut discounts = Vec::new();
    let mut order_counts = Vec::new();
    let mut revenues = Vec::new();
    for (category, acc) in grouped {
        categories.push(category.to_string());
        discounts.push(acc.avg_discount());
        order_counts.push(acc.order_count);
        revenues.push(round2(acc.revenue));
    }

    frame(vec![
        Series::new("category".into(), categories).into(),
        Series::new("avg_discount_percent".into(), discounts).into(),
        Series::new("order_count".into(), order_counts).into(),
        Series::new("total_revenue".into(), revenues).into(),
    ])
}

/// The most extreme records: top `limit` by revenue and top `limit` by
/// discount, deduplicated by order id (revenue anomalies first), capped at
/// `limit` rows overall.
fn anomaly_records(records: &[CleanRecord], limit: usize) -> Result<DataFrame> {
    let mut by_revenue: Vec<&CleanRecord> = records.iter().collect();
    by_revenue.sort_by(|a, b| {
        b.revenue
            .total_cmp(&a.revenue)
            .then(a.order_id.cmp(&b.order_id))
    });
    let mut by_discount: Vec<&CleanRecord> = records.iter().collect();
    by_discount.sort_by(|a, b| {
        b.discount_percent
            .total_cmp(&a.discount_percent)
            .then(a.order_id.cmp(&b.order_id))
    });

    let mut seen: HashSet<&str> = HashSet::new();
    let mut anomalies: Vec<(&CleanRecord, &'static str)> = Vec::new();
    for record in by_revenue.iter().take(limit).copied() {
        if seen.insert(record.order_id.as_str()) {
            anomalies.push((record, "high_revenue"));
        }
    }
    for record in by_discount.iter().take(limit).copied() {
        if seen.insert(record.order_id.as_str()) {
            anomalies.push((record, "high_discount"));
        }
    }
    anomalies.truncate(limit);

    let mut ranks = Vec::new();
    let mut order_ids = Vec::new();
    let mut names = Vec::new();
    let mut categories = Vec::new();
    let mut regions = Vec::new();
    let mut revenues = Vec::new();
    let mut quantities = Vec::new();
    let mut prices = Vec::new();
    let mut discounts = Vec::new();
    let mut sale_dates = Vec::new();
    let mut reasons = Vec::new();
    for (rank, (record, reason)) in anomalies.iter().enumerate() {
        ranks.push((rank + 1) as i64);
        order_ids.push(record.order_id.clone());
        names.push(record.product_name.clone());
        categories.push(record.category.clone());
        regions.push(record.region.clone());
        revenues.push(round2(record.revenue));
        quantities.push(record.quantity);
        prices.push(round2(record.unit_price));
        discounts.push(round4(record.discount_percent));
        sale_dates.push(record.sale_date);
        reasons.push(reason.to_string());
    }

    frame(vec![
        Series::new("rank".into(), ranks).into(),
        Series::new("order_id".into(), order_ids).into(),
        Series::new("product_name".into(), names).into(),
        Series::new("category".into(), categories).into(),
        Series::new("region".into(), regions).into(),
        Series::new("revenue".into(), revenues).into(),
        Series::new("quantity".into(), quantities).into(),
        Series::new("unit_price".into(), prices).into(),
        Series::new("discount_percent".into(), discounts).into(),
        Series::new("sale_date".into(), sale_dates).into(),
        Series::new("anomaly_reason".into(), reasons).into(),
    ])
}

fn month_of(epoch_secs: i64) -> Option<String> {
    DateTime::from_timestamp(epoch_secs, 0).map(|dt| dt.format("%Y-%m").to_string())
}

fn frame(columns: Vec<Column>) -> Result<DataFrame> {
    DataFrame::new(columns).context("Failed to build aggregation DataFrame")
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(order_id: &str, product: &str, region: &str, revenue: f64) -> CleanRecord {
        CleanRecord {
            order_id: order_id.to_string(),
            product_name: product.to_string(),
            category: "Electronics".to_string(),
            quantity: 1,
            unit_price: revenue,
            discount_percent: 0.0,
            region: region.to_string(),
            sale_date: 1672531200, // 2023-01-01
            customer_email: None,
            revenue,
            anomaly_flag: None,
        }
    }

    #[test]
    fn test_monthly_summary_groups_by_month() {
        let mut records = vec![
            record("ORD-1", "Widget", "Mumbai", 10.0),
            record("ORD-2", "Widget", "Mumbai", 20.0),
        ];
        records[1].sale_date = 1675209600; // 2023-02-01
        let summary = monthly_sales_summary(&records).unwrap();

        assert_eq!(summary.height(), 2);
        let months = summary.column("month").unwrap().str().unwrap();
        assert_eq!(months.get(0), Some("2023-01"));
        assert_eq!(months.get(1), Some("2023-02"));
        let revenue = summary.column("total_revenue").unwrap().f64().unwrap();
        assert_eq!(revenue.get(0), Some(10.0));
    }

    #[test]
    fn test_top_products_ranks_and_tie_breaks() {
        let records = vec![
            record("ORD-1", "Alpha", "Mumbai", 50.0),
            record("ORD-2", "Beta", "Mumbai", 50.0),
            record("ORD-3", "Gamma", "Mumbai", 80.0),
        ];
        let top = top_products(&records, 2).unwrap();

        // Two metrics, two rows each.
        assert_eq!(top.height(), 4);
        let names = top.column("product_name").unwrap().str().unwrap();
        let metrics = top.column("metric_type").unwrap().str().unwrap();
        assert_eq!(names.get(0), Some("Gamma"));
        assert_eq!(names.get(1), Some("Alpha")); // revenue tie broken by name
        assert_eq!(metrics.get(0), Some("revenue"));
        assert_eq!(metrics.get(2), Some("units"));
    }

    #[test]
    fn test_region_performance_sorted_by_revenue() {
        let records = vec![
            record("ORD-1", "Widget", "Mumbai", 10.0),
            record("ORD-2", "Widget", "Thailand", 30.0),
            record("ORD-3", "Widget", "Thailand", 30.0),
        ];
        let performance = region_wise_performance(&records).unwrap();
        let regions = performance.column("region").unwrap().str().unwrap();
        assert_eq!(regions.get(0), Some("Thailand"));
        let avg = performance.column("avg_order_value").unwrap().f64().unwrap();
        assert_eq!(avg.get(0), Some(30.0));
    }

    #[test]
    fn test_anomaly_records_dedup_by_order_id() {
        let mut records = vec![
            record("ORD-1", "Widget", "Mumbai", 900.0),
            record("ORD-2", "Widget", "Mumbai", 100.0),
            record("ORD-3", "Widget", "Mumbai", 50.0),
        ];
        // ORD-1 is both the top-revenue and the top-discount record.
        records[0].discount_percent = 0.9;
        let anomalies = anomaly_records(&records, 2).unwrap();

        assert_eq!(anomalies.height(), 2);
        let order_ids = anomalies.column("order_id").unwrap().str().unwrap();
        assert_eq!(order_ids.get(0), Some("ORD-1"));
        let reasons = anomalies.column("anomaly_reason").unwrap().str().unwrap();
        assert_eq!(reasons.get(0), Some("high_revenue"));
    }

    #[test]
    fn test_empty_input_keeps_schemas() {
        let monthly = monthly_sales_summary(&[]).unwrap();
        assert_eq!(monthly.height(), 0);
        assert_eq!(
            monthly.get_column_names_str(),
            vec![
                "month",
                "total_revenue",
                "total_quantity",
                "avg_discount_percent",
                "order_count",
            ]
        );

        let anomalies = anomaly_records(&[], 5).unwrap();
        assert_eq!(anomalies.height(), 0);
        assert_eq!(anomalies.width(), 11);
    }

    #[test]
    fn test_build_all_writes_every_artefact() {
        let tmp = tempfile::tempdir().unwrap();
        let clean_path = tmp.path().join("clean.parquet");
        let records = vec![record("ORD-1", "Widget", "Mumbai", 10.0)];

        // Write a minimal clean dataset through the pipeline frame builder.
        let mut frame = crate::cleaning::pipeline::records_to_dataframe(&records).unwrap();
        ParquetWriter::new(File::create(&clean_path).unwrap())
            .finish(&mut frame)
            .unwrap();

        let output_dir = tmp.path().join("aggregations");
        let artefacts = build_all_aggregations(&clean_path, &output_dir).unwrap();
        assert_eq!(artefacts.len(), 5);
        for artefact in artefacts {
            assert!(artefact.exists());
        }
    }
}
