use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::config::NotificationsConfig;
use crate::models::{
    Alert, AlertKind, AlertState, NewNotificationLog, NotificationLog, NotificationStatus, Product,
};
use crate::plugins::{NotificationEvent, PluginManager};
use crate::utils::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertSettings {
    pub notify_target_reached: bool,
    pub notify_price_drop: bool,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            notify_target_reached: true,
            notify_price_drop: true,
        }
    }
}

impl From<&NotificationsConfig> for AlertSettings {
    fn from(config: &NotificationsConfig) -> Self {
        Self {
            notify_target_reached: config.notify_target_reached,
            notify_price_drop: config.notify_price_drop,
        }
    }
}

/// Decides whether `price` warrants an alert.
///
/// `previous` is the latest observation stored before `price`. Every alert
/// lowers the notified level, and only a price strictly below it can fire
/// again, so each level alerts at most once. When the target is reached and
/// the price also dropped, a single `TargetReached` alert is emitted.
pub fn decide(
    product: &Product,
    previous: Option<Decimal>,
    price: Decimal,
    state: Option<&AlertState>,
    settings: &AlertSettings,
) -> Option<AlertKind> {
    if state.is_some_and(|s| price >= s.last_notified_price) {
        return None;
    }

    let target_reached = product.target_price.is_some_and(|target| price <= target);
    if settings.notify_target_reached && target_reached {
        return Some(AlertKind::TargetReached);
    }

    let dropped = previous.is_some_and(|previous| price < previous);
    if settings.notify_price_drop && dropped {
        return Some(AlertKind::PriceDrop);
    }

    None
}

/// Evaluates new prices against alert rules and delivers fired alerts.
#[derive(Clone)]
pub struct AlertEvaluator {
    pool: SqlitePool,
    notifiers: PluginManager,
    settings: AlertSettings,
}

impl AlertEvaluator {
    pub fn new(pool: SqlitePool, notifiers: PluginManager, settings: AlertSettings) -> Self {
        Self {
            pool,
            notifiers,
            settings,
        }
    }

    pub fn settings(&self) -> AlertSettings {
        self.settings
    }

    pub async fn load_state(&self, product_id: &str) -> Result<Option<AlertState>> {
        let state = sqlx::query_as::<_, AlertState>(
            "SELECT product_id, last_notified_price, last_notified_at FROM alert_state WHERE product_id = ?",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(state)
    }

    /// Moves the notified level to `price` only if it is still `seen`.
    /// Returns false when another check changed the state first.
    async fn claim_level(&self, product_id: &str, seen: Option<&AlertState>, price: Decimal) -> Result<bool> {
        let result = match seen {
            None => {
                sqlx::query(
                    "INSERT INTO alert_state (product_id, last_notified_price, last_notified_at) VALUES (?, ?, ?) \
                     ON CONFLICT(product_id) DO NOTHING",
                )
                .bind(product_id)
                .bind(price.to_string())
                .bind(Utc::now())
                .execute(&self.pool)
                .await?
            }
            Some(seen) => {
                sqlx::query(
                    "UPDATE alert_state SET last_notified_price = ?, last_notified_at = ? \
                     WHERE product_id = ? AND last_notified_price = ?",
                )
                .bind(price.to_string())
                .bind(Utc::now())
                .bind(product_id)
                .bind(seen.last_notified_price.to_string())
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected() == 1)
    }

    /// Applies the alert rules to a freshly observed price. When an alert
    /// fires the alert state is moved to `price` before returning; of several
    /// concurrent checks at the same level only one fires.
    pub async fn evaluate(
        &self,
        product: &Product,
        previous: Option<Decimal>,
        price: Decimal,
    ) -> Result<Option<Alert>> {
        loop {
            let state = self.load_state(&product.id).await?;

            let Some(kind) = decide(product, previous, price, state.as_ref(), &self.settings) else {
                debug!("No alert for {} at {}", product.id, price);
                return Ok(None);
            };

            // The level only ever moves down, so a lost race ends in `decide`
            if !self.claim_level(&product.id, state.as_ref(), price).await? {
                debug!("Alert state of {} changed concurrently, re-evaluating", product.id);
                continue;
            }

            counter!("price_alerts_total", "kind" => kind.as_str()).increment(1);
            info!("Alert {} fired for {} at {}", kind, product.name, price);

            return Ok(Some(Alert::new(product, kind, price, previous)));
        }
    }

    /// Sends the alert on every channel and logs each attempt. Returns the
    /// number of successful deliveries.
    pub async fn dispatch(&self, alert: &Alert) -> Result<usize> {
        let event = NotificationEvent::from(alert);
        let deliveries = self.notifiers.dispatch(&event).await;
        let mut sent = 0;

        for (channel, outcome) in deliveries {
            let (status, error) = match outcome {
                Ok(_) => {
                    sent += 1;
                    (NotificationStatus::Sent, None)
                }
                Err(e) => {
                    counter!("notifications_failed_total", "channel" => channel.clone()).increment(1);
                    (NotificationStatus::Failed, Some(e))
                }
            };

            let log = NotificationLog::new(NewNotificationLog {
                product_id: alert.product_id.clone(),
                kind: alert.kind,
                price: alert.price,
                channel,
                status,
                error,
            });
            if let Err(e) = self.record(&log).await {
                warn!("Failed to record notification for {}: {}", alert.product_id, e);
            }
        }

        Ok(sent)
    }

    async fn record(&self, log: &NotificationLog) -> Result<()> {
        sqlx::query(
            "INSERT INTO notification_log (id, product_id, kind, price, channel, status, error, timestamp) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&log.id)
        .bind(&log.product_id)
        .bind(log.kind.as_str())
        .bind(log.price.to_string())
        .bind(&log.channel)
        .bind(log.status.as_str())
        .bind(&log.error)
        .bind(log.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Most recent delivery attempts, newest first.
    pub async fn recent_notifications(&self, product_id: Option<&str>, limit: i64) -> Result<Vec<NotificationLog>> {
        let logs = match product_id {
            Some(product_id) => {
                sqlx::query_as::<_, NotificationLog>(
                    "SELECT * FROM notification_log WHERE product_id = ? ORDER BY timestamp DESC LIMIT ?",
                )
                .bind(product_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, NotificationLog>(
                    "SELECT * FROM notification_log ORDER BY timestamp DESC LIMIT ?",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(logs)
    }
}
