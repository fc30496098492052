use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parsing error: {message}")]
    Parse { message: String },

    #[error("Plugin error: {plugin_type}: {message}")]
    Plugin { plugin_type: String, message: String },

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("No price found on {url}")]
    PriceNotFound { url: String },

    #[error("Already tracking {url}")]
    AlreadyTracked { url: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Failures that should be retried on the next tick rather than surfaced.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Http(_)
                | AppError::Browser(_)
                | AppError::PriceNotFound { .. }
                | AppError::Parse { .. }
        )
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("{}", err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::Io(_)));
    }

    #[test]
    fn test_plugin_error() {
        let err = AppError::Plugin {
            plugin_type: "discord".to_string(),
            message: "webhook rejected".to_string(),
        };
        assert_eq!(err.to_string(), "Plugin error: discord: webhook rejected");
    }

    #[test]
    fn test_price_not_found_is_transient() {
        let err = AppError::PriceNotFound {
            url: "https://shop.example.com/item".to_string(),
        };
        assert_eq!(err.to_string(), "No price found on https://shop.example.com/item");
        assert!(err.is_transient());
    }

    #[test]
    fn test_validation_is_not_transient() {
        let err = AppError::Validation("target price must be positive".to_string());
        assert!(!err.is_transient());

        let err = AppError::AlreadyTracked {
            url: "https://shop.example.com/item".to_string(),
        };
        assert!(!err.is_transient());
    }
}
