use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::notifiers::{ConsoleNotifier, DiscordNotifier, EmailConfig, EmailNotifier};
use super::traits::{NotificationEvent, NotificationResult, NotifierPlugin};
use crate::config::NotificationsConfig;
use crate::utils::error::AppError;

pub type NotifierPluginBox = Box<dyn NotifierPlugin>;

/// Outcome of sending one event on one channel.
pub type Delivery = (String, Result<NotificationResult, String>);

#[derive(Clone)]
pub struct PluginManager {
    notifiers: Arc<RwLock<HashMap<String, NotifierPluginBox>>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self {
            notifiers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registers every channel the configuration enables.
    pub async fn from_config(config: &NotificationsConfig) -> Result<Self, AppError> {
        let manager = Self::new();

        if config.console {
            manager.register_notifier(Box::new(ConsoleNotifier::new())).await?;
        }

        if let Some(discord) = DiscordNotifier::from_config(&config.discord) {
            manager.register_notifier(Box::new(discord)).await?;
        }

        if let Some(email) = EmailConfig::from_smtp(&config.smtp) {
            let notifier = EmailNotifier::new(email).map_err(|e| AppError::Plugin {
                plugin_type: "email".to_string(),
                message: e.to_string(),
            })?;
            manager.register_notifier(Box::new(notifier)).await?;
        }

        debug!("Registered notifiers: {:?}", manager.list_notifier_types().await);
        Ok(manager)
    }

    /// Register a notifier plugin
    pub async fn register_notifier(&self, plugin: NotifierPluginBox) -> Result<(), AppError> {
        let plugin_type = plugin.plugin_type().to_string();

        let mut notifiers = self.notifiers.write().await;
        notifiers.insert(plugin_type, plugin);
        Ok(())
    }

    /// List all available notifier types
    pub async fn list_notifier_types(&self) -> Vec<String> {
        let notifiers = self.notifiers.read().await;
        let mut types: Vec<String> = notifiers.keys().cloned().collect();
        types.sort();
        types
    }

    /// Sends the event on every registered channel. One channel failing does
    /// not stop the others.
    pub async fn dispatch(&self, event: &NotificationEvent) -> Vec<Delivery> {
        let notifiers = self.notifiers.read().await;
        let mut deliveries = Vec::with_capacity(notifiers.len());

        for (plugin_type, notifier) in notifiers.iter() {
            let outcome = match notifier.notify(event).await {
                Ok(result) if result.success => Ok(result),
                Ok(result) => Err(result.error.unwrap_or_else(|| "delivery failed".to_string())),
                Err(e) => Err(e.to_string()),
            };

            if let Err(e) = &outcome {
                warn!("Notifier {} failed for product {}: {}", plugin_type, event.product.id, e);
            }
            deliveries.push((plugin_type.clone(), outcome));
        }

        deliveries
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}
