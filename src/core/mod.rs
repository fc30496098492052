pub mod alerts;
pub mod database;
pub mod export;
pub mod extractor;
pub mod history;
pub mod product_manager;
pub mod scheduler;
pub mod scraper;
