use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use crate::models::{AlertKind, Product, required_decimal_column};

/// The last price level an alert was sent for, per product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertState {
    pub product_id: String,
    pub last_notified_price: Decimal,
    pub last_notified_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for AlertState {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            product_id: row.try_get("product_id")?,
            last_notified_price: required_decimal_column(row, "last_notified_price")?,
            last_notified_at: row.try_get("last_notified_at")?,
        })
    }
}

/// A fired alert, handed to the notifiers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub product_id: String,
    pub product_name: String,
    pub url: String,
    pub kind: AlertKind,
    pub price: Decimal,
    pub previous_price: Option<Decimal>,
    pub target_price: Option<Decimal>,
    pub triggered_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(product: &Product, kind: AlertKind, price: Decimal, previous_price: Option<Decimal>) -> Self {
        Self {
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            url: product.url.clone(),
            kind,
            price,
            previous_price,
            target_price: product.target_price,
            triggered_at: Utc::now(),
        }
    }

    pub fn title(&self) -> String {
        match self.kind {
            AlertKind::TargetReached => format!("Target price reached for {}", self.product_name),
            AlertKind::PriceDrop => format!("Price drop for {}", self.product_name),
        }
    }

    pub fn message(&self) -> String {
        let mut message = format!("{}: {}", self.title(), self.price);
        if let Some(previous) = self.previous_price {
            message.push_str(&format!(" (was {})", previous));
        }
        if let (AlertKind::TargetReached, Some(target)) = (self.kind, self.target_price) {
            message.push_str(&format!(", target {}", target));
        }
        message
    }
}
