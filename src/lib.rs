pub mod cli;
pub mod config;
pub mod context;
pub mod core;
pub mod models;
pub mod plugins;
pub mod telemetry;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use context::AppContext;
pub use utils::error::{AppError, Result};
