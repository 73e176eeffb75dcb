use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallerProfile {
    pub id: i64,
    pub name: String,
    pub attribute: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub date: String,
    pub product_name: String,
    pub quantity: i64,
    pub price: f64,
    pub rating: Option<i64>,
}

/// Purchase lookups never return more than this many records.
pub const PURCHASE_HISTORY_LIMIT: i64 = 5;
