use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Alert, AlertKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub product: ProductInfo,
    pub kind: AlertKind,
    pub price: Decimal,
    pub previous_price: Option<Decimal>,
    pub target_price: Option<Decimal>,
    pub title: String,
    pub message: String,
    pub formatted_new: String,
    pub formatted_old: Option<String>,
    pub difference: Option<String>,
    pub triggered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductInfo {
    pub id: String,
    pub name: String,
    pub url: String,
}

impl From<&Alert> for NotificationEvent {
    fn from(alert: &Alert) -> Self {
        let difference = alert.previous_price.map(|previous| {
            let change = alert.price - previous;
            if previous.is_zero() {
                format!("{:+.2}", change)
            } else {
                let percent = change / previous * Decimal::ONE_HUNDRED;
                format!("{:+.2} ({:+.1}%)", change, percent)
            }
        });

        Self {
            product: ProductInfo {
                id: alert.product_id.clone(),
                name: alert.product_name.clone(),
                url: alert.url.clone(),
            },
            kind: alert.kind,
            price: alert.price,
            previous_price: alert.previous_price,
            target_price: alert.target_price,
            title: alert.title(),
            message: alert.message(),
            formatted_new: alert.price.to_string(),
            formatted_old: alert.previous_price.map(|p| p.to_string()),
            difference,
            triggered_at: alert.triggered_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationResult {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

/// Trait for implementing notification channels (console, e-mail, Discord).
#[async_trait]
pub trait NotifierPlugin: Send + Sync {
    /// Plugin metadata
    fn name(&self) -> &str;
    fn plugin_type(&self) -> &str;
    fn description(&self) -> &str;

    async fn notify(&self, event: &NotificationEvent) -> Result<NotificationResult, Box<dyn std::error::Error + Send + Sync>>;
}
