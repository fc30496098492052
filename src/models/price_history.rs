use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use crate::models::required_decimal_column;

/// One stored price point. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceObservation {
    pub id: i64,
    pub product_id: String,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl PriceObservation {
    /// Difference against an earlier observation; positive means the price went up.
    pub fn change_since(&self, earlier: &PriceObservation) -> Decimal {
        self.price - earlier.price
    }
}

impl<'r> FromRow<'r, SqliteRow> for PriceObservation {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            price: required_decimal_column(row, "price")?,
            timestamp: row.try_get("timestamp")?,
        })
    }
}

/// Formats a signed change the way the history listing shows it.
pub fn format_change(change: Decimal) -> String {
    if change.is_sign_positive() && !change.is_zero() {
        format!("+{}", change)
    } else if change.is_sign_negative() && !change.is_zero() {
        format!("-{}", change.abs())
    } else {
        "No change".to_string()
    }
}
