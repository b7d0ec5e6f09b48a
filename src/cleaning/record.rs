use csv::StringRecord;

/// Placeholder tokens that indicate a missing field, compared case-insensitively.
const NULLISH: [&str; 6] = ["null", "n/a", "na", "none", "-", "missing"];

/// Column order of the raw CSV input and of the rejected-rows sink.
pub const RAW_COLUMNS: [&str; 9] = [
    "order_id",
    "product_name",
    "category",
    "quantity",
    "unit_price",
    "discount_percent",
    "region",
    "sale_date",
    "customer_email",
];

/// Trim a raw field and collapse null-ish placeholder tokens to empty.
pub fn normalise_field(value: &str) -> String {
    let trimmed = value.trim();
    if NULLISH.iter().any(|token| trimmed.eq_ignore_ascii_case(token)) {
        return String::new();
    }
    trimmed.to_string()
}

/// One input row exactly as it appeared in the source CSV. Missing columns
/// are read as empty strings; no typing or normalization is applied here so
/// rejected rows can be written back with their original values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub order_id: String,
    pub product_name: String,
    pub category: String,
    pub quantity: String,
    pub unit_price: String,
    pub discount_percent: String,
    pub region: String,
    pub sale_date: String,
    pub customer_email: String,
}

/// Positions of the known columns within the source CSV header. Absent
/// columns stay `None` and their fields read as empty.
#[derive(Debug, Clone, Default)]
pub struct ColumnIndices {
    order_id: Option<usize>,
    product_name: Option<usize>,
    category: Option<usize>,
    quantity: Option<usize>,
    unit_price: Option<usize>,
    discount_percent: Option<usize>,
    region: Option<usize>,
    sale_date: Option<usize>,
    customer_email: Option<usize>,
}

impl ColumnIndices {
    pub fn from_headers(headers: &StringRecord) -> Self {
        let find = |name: &str| headers.iter().position(|header| header.trim() == name);
        Self {
            order_id: find("order_id"),
            product_name: find("product_name"),
            category: find("category"),
            quantity: find("quantity"),
            unit_price: find("unit_price"),
            discount_percent: find("discount_percent"),
            region: find("region"),
            sale_date: find("sale_date"),
            customer_email: find("customer_email"),
        }
    }
}

impl RawRecord {
    pub fn from_csv(indices: &ColumnIndices, record: &StringRecord) -> Self {
        let field = |index: Option<usize>| {
            index
                .and_then(|i| record.get(i))
                .unwrap_or_default()
                .to_string()
        };
        Self {
            order_id: field(indices.order_id),
            product_name: field(indices.product_name),
            category: field(indices.category),
            quantity: field(indices.quantity),
            unit_price: field(indices.unit_price),
            discount_percent: field(indices.discount_percent),
            region: field(indices.region),
            sale_date: field(indices.sale_date),
            customer_email: field(indices.customer_email),
        }
    }

    /// Field values in `RAW_COLUMNS` order, for the rejected-rows sink.
    pub fn values(&self) -> [&str; 9] {
        [
            &self.order_id,
            &self.product_name,
            &self.category,
            &self.quantity,
            &self.unit_price,
            &self.discount_percent,
            &self.region,
            &self.sale_date,
            &self.customer_email,
        ]
    }
}

/// A fully validated, canonicalized output row. Immutable once emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanRecord {
    pub order_id: String,
    pub product_name: String,
    pub category: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub discount_percent: f64,
    pub region: String,
    /// Unix epoch seconds, midnight UTC of the sale date.
    pub sale_date: i64,
    pub customer_email: Option<String>,
    /// Always recomputed from the cleaned figures, never copied from the source.
    pub revenue: f64,
    pub anomaly_flag: Option<String>,
}

/// Why a row was removed from the pipeline. Variant order is evaluation
/// order; a row carries only the first reason that applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    MissingOrderIdOrProduct,
    DuplicateOrderId,
    UnknownCategory,
    UnknownRegion,
    InvalidUnitPrice,
    ZeroQuantity,
    InvalidSaleDate,
    SaleDateOutOfRange,
    InvalidCalculatedRevenue,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingOrderIdOrProduct => "missing_order_id_or_product",
            Self::DuplicateOrderId => "duplicate_order_id",
            Self::UnknownCategory => "unknown_category",
            Self::UnknownRegion => "unknown_region",
            Self::InvalidUnitPrice => "invalid_unit_price",
            Self::ZeroQuantity => "zero_quantity",
            Self::InvalidSaleDate => "invalid_sale_date",
            Self::SaleDateOutOfRange => "sale_date_out_of_range",
            Self::InvalidCalculatedRevenue => "invalid_calculated_revenue",
        }
    }
}

/// A rejected row: the original raw values plus the single reason that
/// removed it.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRecord {
    pub raw: RawRecord,
    pub reason: RejectionReason,
}
