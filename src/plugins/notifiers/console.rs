use async_trait::async_trait;
use tracing::info;

use crate::models::AlertKind;
use crate::plugins::traits::{NotificationEvent, NotificationResult, NotifierPlugin};

/// Prints alerts to the terminal running the tracker.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl ConsoleNotifier {
    pub fn new() -> Self {
        Self
    }

    pub fn format_line(event: &NotificationEvent) -> String {
        let marker = match event.kind {
            AlertKind::TargetReached => "🎯",
            AlertKind::PriceDrop => "📉",
        };
        format!("{} Price Alert: {}\n   {}", marker, event.message, event.product.url)
    }
}

#[async_trait]
impl NotifierPlugin for ConsoleNotifier {
    fn name(&self) -> &str {
        "Console Notifier"
    }

    fn plugin_type(&self) -> &str {
        "console"
    }

    fn description(&self) -> &str {
        "Prints price alerts to standard output"
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<NotificationResult, Box<dyn std::error::Error + Send + Sync>> {
        info!(product = %event.product.id, kind = %event.kind, "{}", event.message);
        println!("{}", Self::format_line(event));

        Ok(NotificationResult {
            success: true,
            message_id: None,
            error: None,
        })
    }
}
