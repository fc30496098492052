use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use std::fmt;
use validator::Validate;

use crate::models::{decimal_column, generate_id};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub url: String,
    /// CSS selector for the price element; common selectors are tried when absent.
    pub selector: Option<String>,
    pub target_price: Option<Decimal>,

    // Schedule
    pub auto_track: bool,
    /// Overrides the configured default interval.
    pub check_interval_minutes: Option<u32>,

    // Last check
    pub current_price: Option<Decimal>,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub error_count: i64,

    // Metadata
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewProduct {
    #[validate(length(min = 1, message = "product name must not be empty"))]
    pub name: String,
    #[validate(url(message = "product URL is not a valid URL"))]
    pub url: String,
    pub selector: Option<String>,
    pub target_price: Option<Decimal>,
    pub auto_track: Option<bool>,
    pub check_interval_minutes: Option<u32>,
}

/// Partial update. The nested options on `selector` and `target_price`
/// distinguish "leave alone" (`None`) from "clear" (`Some(None)`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub url: Option<String>,
    pub selector: Option<Option<String>>,
    pub target_price: Option<Option<Decimal>>,
    pub auto_track: Option<bool>,
    pub check_interval_minutes: Option<Option<u32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Tracking,
    Manual,
    Failing,
    TargetReached,
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProductStatus::Tracking => "Tracking",
            ProductStatus::Manual => "Manual",
            ProductStatus::Failing => "Failing",
            ProductStatus::TargetReached => "Target Reached!",
        };
        f.write_str(label)
    }
}

impl Product {
    pub fn new(new_product: NewProduct) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            name: new_product.name.trim().to_string(),
            url: new_product.url.trim().to_string(),
            selector: normalize_selector(new_product.selector),
            target_price: new_product.target_price,
            auto_track: new_product.auto_track.unwrap_or(true),
            check_interval_minutes: new_product.check_interval_minutes,
            current_price: None,
            last_checked: None,
            last_error: None,
            error_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn update(&mut self, update: UpdateProduct) {
        if let Some(name) = update.name {
            self.name = name.trim().to_string();
        }
        if let Some(url) = update.url {
            self.url = url.trim().to_string();
        }
        if let Some(selector) = update.selector {
            self.selector = normalize_selector(selector);
        }
        if let Some(target_price) = update.target_price {
            self.target_price = target_price;
        }
        if let Some(auto_track) = update.auto_track {
            self.auto_track = auto_track;
        }
        if let Some(interval) = update.check_interval_minutes {
            self.check_interval_minutes = interval;
        }

        self.updated_at = Utc::now();
    }

    pub fn interval_minutes(&self, default_minutes: u64) -> u64 {
        self.check_interval_minutes
            .map(u64::from)
            .unwrap_or(default_minutes)
    }

    pub fn target_reached(&self) -> bool {
        matches!(
            (self.current_price, self.target_price),
            (Some(current), Some(target)) if current <= target
        )
    }

    pub fn status(&self) -> ProductStatus {
        if self.target_reached() {
            ProductStatus::TargetReached
        } else if self.error_count > 0 {
            ProductStatus::Failing
        } else if self.auto_track {
            ProductStatus::Tracking
        } else {
            ProductStatus::Manual
        }
    }
}

fn normalize_selector(selector: Option<String>) -> Option<String> {
    selector
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl<'r> FromRow<'r, SqliteRow> for Product {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let interval: Option<i64> = row.try_get("check_interval_minutes")?;
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            url: row.try_get("url")?,
            selector: row.try_get("selector")?,
            target_price: decimal_column(row, "target_price")?,
            auto_track: row.try_get("auto_track")?,
            check_interval_minutes: interval.and_then(|m| u32::try_from(m).ok()),
            current_price: decimal_column(row, "current_price")?,
            last_checked: row.try_get("last_checked")?,
            last_error: row.try_get("last_error")?,
            error_count: row.try_get("error_count")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
