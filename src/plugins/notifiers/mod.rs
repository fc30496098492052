// Notifier plugin implementations
pub mod console;
pub mod discord;
pub mod email;

pub use console::ConsoleNotifier;
pub use discord::DiscordNotifier;
pub use email::{EmailConfig, EmailNotifier};
