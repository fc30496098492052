use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use crate::models::{AlertKind, NotificationStatus, generate_id, parsed_column, required_decimal_column};

/// Record of one alert delivery attempt on one channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationLog {
    pub id: String,
    pub product_id: String,
    pub kind: AlertKind,
    pub price: Decimal,
    pub channel: String,
    pub status: NotificationStatus,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNotificationLog {
    pub product_id: String,
    pub kind: AlertKind,
    pub price: Decimal,
    pub channel: String,
    pub status: NotificationStatus,
    pub error: Option<String>,
}

impl NotificationLog {
    pub fn new(new_log: NewNotificationLog) -> Self {
        Self {
            id: generate_id(),
            product_id: new_log.product_id,
            kind: new_log.kind,
            price: new_log.price,
            channel: new_log.channel,
            status: new_log.status,
            error: new_log.error,
            timestamp: Utc::now(),
        }
    }

    pub fn delivered(&self) -> bool {
        self.status == NotificationStatus::Sent
    }
}

impl<'r> FromRow<'r, SqliteRow> for NotificationLog {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            kind: parsed_column(row, "kind")?,
            price: required_decimal_column(row, "price")?,
            channel: row.try_get("channel")?,
            status: parsed_column(row, "status")?,
            error: row.try_get("error")?,
            timestamp: row.try_get("timestamp")?,
        })
    }
}
