use async_trait::async_trait;
use lettre::message::{MultiPart, SinglePart, header};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpConfig;
use crate::models::AlertKind;
use crate::plugins::traits::{NotificationEvent, NotificationResult, NotifierPlugin};

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub credentials: Option<(String, String)>,
    pub from_email: String,
    pub from_name: String,
    pub to_email: String,
    pub use_tls: bool,
}

impl EmailConfig {
    /// `None` unless host, sender and recipient are all set.
    pub fn from_smtp(config: &SmtpConfig) -> Option<Self> {
        let credentials = match (&config.username, &config.password) {
            (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
            _ => None,
        };

        Some(EmailConfig {
            smtp_server: config.host.clone()?,
            smtp_port: config.port,
            credentials,
            from_email: config.from_address.clone()?,
            from_name: config.from_name.clone(),
            to_email: config.to_address.clone()?,
            use_tls: config.use_tls,
        })
    }
}

pub struct EmailNotifier {
    config: EmailConfig,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_server)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_server)
        }
        .port(config.smtp_port);

        let builder = match &config.credentials {
            Some((user, pass)) => builder.credentials(Credentials::new(user.clone(), pass.clone())),
            None => builder,
        };

        Ok(EmailNotifier {
            mailer: builder.build(),
            config,
        })
    }

    fn format_subject(&self, event: &NotificationEvent) -> String {
        match event.kind {
            AlertKind::TargetReached => format!("🎯 Target Reached: {} - {}", event.product.name, event.formatted_new),
            AlertKind::PriceDrop => format!("🔔 Price Drop: {} - {}", event.product.name, event.formatted_new),
        }
    }

    fn format_html_body(&self, event: &NotificationEvent) -> String {
        let mut html = String::new();

        html.push_str(&format!(r#"<!DOCTYPE html>
<html>
<head>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 20px; }}
        .product {{ font-size: 18px; font-weight: bold; }}
        .change {{ margin: 15px 0; padding: 10px; background: #e8f5e8; border-left: 4px solid #4CAF50; }}
    </style>
</head>
<body>
    <div class="product">{}</div>
    <div class="change">
        <strong>Now:</strong> {}<br>
"#, event.product.name, event.formatted_new));

        if let Some(old) = &event.formatted_old {
            html.push_str(&format!("        <strong>Was:</strong> {}<br>\n", old));
        }
        if let Some(difference) = &event.difference {
            html.push_str(&format!("        <strong>Change:</strong> {}<br>\n", difference));
        }
        if let Some(target) = event.target_price {
            html.push_str(&format!("        <strong>Target:</strong> {}<br>\n", target));
        }

        html.push_str(&format!(r#"    </div>
    <a href="{}">View product</a>
</body>
</html>
"#, event.product.url));

        html
    }

    fn format_text_body(&self, event: &NotificationEvent) -> String {
        let mut text = String::new();

        text.push_str("PRICE TRACKER ALERT\n\n");
        text.push_str(&format!("{}\n\n", event.message));
        text.push_str(&format!("Product: {}\n", event.product.name));
        text.push_str(&format!("Now: {}\n", event.formatted_new));
        if let Some(old) = &event.formatted_old {
            text.push_str(&format!("Was: {}\n", old));
        }
        if let Some(difference) = &event.difference {
            text.push_str(&format!("Change: {}\n", difference));
        }
        text.push_str(&format!("URL: {}\n", event.product.url));

        text
    }

    fn build_message(&self, event: &NotificationEvent) -> Result<Message, Box<dyn std::error::Error + Send + Sync>> {
        let message = Message::builder()
            .from(format!("{} <{}>", self.config.from_name, self.config.from_email).parse()?)
            .to(self.config.to_email.parse()?)
            .subject(self.format_subject(event))
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(self.format_text_body(event)),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(self.format_html_body(event)),
                    ),
            )?;

        Ok(message)
    }
}

#[async_trait]
impl NotifierPlugin for EmailNotifier {
    fn name(&self) -> &str {
        "Email Notifier"
    }

    fn plugin_type(&self) -> &str {
        "email"
    }

    fn description(&self) -> &str {
        "Sends notifications via SMTP email with HTML formatting"
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<NotificationResult, Box<dyn std::error::Error + Send + Sync>> {
        let email = self.build_message(event)?;

        match self.mailer.send(email).await {
            Ok(response) => Ok(NotificationResult {
                success: true,
                message_id: response.message().next().map(str::to_string),
                error: None,
            }),
            Err(e) => Ok(NotificationResult {
                success: false,
                message_id: None,
                error: Some(e.to_string()),
            }),
        }
    }
}
