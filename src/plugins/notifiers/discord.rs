use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::config::DiscordConfig;
use crate::models::AlertKind;
use crate::plugins::traits::{NotificationEvent, NotificationResult, NotifierPlugin};

pub struct DiscordNotifier {
    client: Client,
    webhook_url: String,
    username: String,
    avatar_url: Option<String>,
}

impl DiscordNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        DiscordNotifier {
            client: Client::new(),
            webhook_url: webhook_url.into(),
            username: "Price Tracker".to_string(),
            avatar_url: None,
        }
    }

    /// `None` when no webhook is configured.
    pub fn from_config(config: &DiscordConfig) -> Option<Self> {
        let webhook_url = config.webhook_url.as_ref()?;
        Some(Self {
            username: config.username.clone(),
            avatar_url: config.avatar_url.clone(),
            ..Self::new(webhook_url.clone())
        })
    }

    fn get_embed_color(&self, kind: &AlertKind) -> u32 {
        match kind {
            AlertKind::TargetReached => 0x00ff00, // Green
            AlertKind::PriceDrop => 0x0099ff,     // Blue
        }
    }

    fn get_emoji(&self, kind: &AlertKind) -> &str {
        match kind {
            AlertKind::TargetReached => "🎯",
            AlertKind::PriceDrop => "📉",
        }
    }

    fn create_embed(&self, event: &NotificationEvent) -> serde_json::Value {
        let mut fields = Vec::new();

        let change_title = match event.kind {
            AlertKind::TargetReached => "💰 Target Reached!",
            AlertKind::PriceDrop => "💰 Price Drop!",
        };
        let mut change = format!("**Now:** {}", event.formatted_new);
        if let Some(old) = &event.formatted_old {
            change.push_str(&format!("\n**Was:** {}", old));
        }
        if let Some(difference) = &event.difference {
            change.push_str(&format!("\n**Change:** {}", difference));
        }
        fields.push(json!({
            "name": change_title,
            "value": change,
            "inline": false
        }));

        if let Some(target) = event.target_price {
            fields.push(json!({
                "name": "🎯 Target",
                "value": target.to_string(),
                "inline": true
            }));
        }

        json!({
            "title": format!("{} {}", self.get_emoji(&event.kind), event.product.name),
            "url": event.product.url,
            "color": self.get_embed_color(&event.kind),
            "timestamp": event.triggered_at.to_rfc3339(),
            "fields": fields,
            "footer": { "text": "Price Tracker" }
        })
    }

    fn create_webhook_payload(&self, event: &NotificationEvent) -> serde_json::Value {
        let mut payload = json!({
            "username": self.username,
            "embeds": [self.create_embed(event)]
        });

        if let Some(avatar_url) = &self.avatar_url {
            payload["avatar_url"] = json!(avatar_url);
        }

        payload
    }
}

#[async_trait]
impl NotifierPlugin for DiscordNotifier {
    fn name(&self) -> &str {
        "Discord Notifier"
    }

    fn plugin_type(&self) -> &str {
        "discord"
    }

    fn description(&self) -> &str {
        "Sends rich notifications via Discord webhooks with embeds"
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<NotificationResult, Box<dyn std::error::Error + Send + Sync>> {
        let payload = self.create_webhook_payload(event);

        let response = self.client.post(&self.webhook_url).json(&payload).send().await?;

        if response.status().is_success() {
            Ok(NotificationResult {
                success: true,
                message_id: None,
                error: None,
            })
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Ok(NotificationResult {
                success: false,
                message_id: None,
                error: Some(format!("webhook returned {}: {}", status, body)),
            })
        }
    }
}
