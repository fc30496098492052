use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use tracing::debug;

use crate::models::PriceObservation;
use crate::utils::error::{AppError, Result};

/// Appends a row stamped no earlier than the product's latest observation.
/// Timestamps are fixed-width RFC 3339 text, so `MAX` orders them correctly.
const APPEND_SQL: &str = "INSERT INTO price_history (product_id, price, timestamp) \
     SELECT ?, ?, MAX(?, COALESCE(\
         (SELECT timestamp FROM price_history WHERE product_id = ? ORDER BY id DESC LIMIT 1), '')) \
     RETURNING id, timestamp";

/// Append-only price history. Each append is a single statement, so the
/// timestamps of a product's observations never decrease in insertion order,
/// whichever connection or process writes them.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, product_id: &str, price: Decimal) -> Result<PriceObservation> {
        self.append_at(product_id, price, Utc::now()).await
    }

    /// Stores `price` observed at `at`. If `at` is earlier than the latest
    /// stored observation (clock skew), the latest timestamp is used instead.
    pub async fn append_at(
        &self,
        product_id: &str,
        price: Decimal,
        at: DateTime<Utc>,
    ) -> Result<PriceObservation> {
        if price <= Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "price must be positive, got {}",
                price
            )));
        }

        let (id, timestamp): (i64, DateTime<Utc>) = sqlx::query_as(APPEND_SQL)
            .bind(product_id)
            .bind(price.to_string())
            .bind(at.to_rfc3339_opts(SecondsFormat::Nanos, true))
            .bind(product_id)
            .fetch_one(&self.pool)
            .await?;

        if timestamp > at {
            debug!("Clamped observation for {} to previous timestamp {}", product_id, timestamp);
        }

        Ok(PriceObservation {
            id,
            product_id: product_id.to_string(),
            price,
            timestamp,
        })
    }

    pub async fn latest(&self, product_id: &str) -> Result<Option<PriceObservation>> {
        let observation = sqlx::query_as::<_, PriceObservation>(
            "SELECT id, product_id, price, timestamp FROM price_history \
             WHERE product_id = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(observation)
    }

    /// All observations of one product in insertion order.
    pub async fn list(&self, product_id: &str) -> Result<Vec<PriceObservation>> {
        let observations = sqlx::query_as::<_, PriceObservation>(
            "SELECT id, product_id, price, timestamp FROM price_history \
             WHERE product_id = ? ORDER BY id",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(observations)
    }

    pub async fn list_all(&self) -> Result<Vec<PriceObservation>> {
        let observations = sqlx::query_as::<_, PriceObservation>(
            "SELECT id, product_id, price, timestamp FROM price_history ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(observations)
    }

    pub async fn count(&self, product_id: &str) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM price_history WHERE product_id = ?")
            .bind(product_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
