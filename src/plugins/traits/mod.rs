pub mod notifier;

pub use notifier::{NotificationEvent, NotificationResult, NotifierPlugin, ProductInfo};
