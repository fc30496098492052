use std::path::Path;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::alerts::{AlertEvaluator, AlertSettings};
use crate::core::database::Database;
use crate::core::history::HistoryStore;
use crate::core::product_manager::ProductManager;
use crate::core::scheduler::ProductScheduler;
use crate::core::scraper::WebScraper;
use crate::plugins::PluginManager;
use crate::utils::error::Result;

/// Everything a command needs, built once from configuration.
pub struct AppContext {
    pub config: AppConfig,
    pub database: Database,
    pub product_manager: Arc<ProductManager>,
}

impl AppContext {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let database = Database::open(&config.database).await?;
        let scraper = WebScraper::new(&config.scraper)?;
        Self::assemble(config, database, scraper).await
    }

    /// Wires the components around an open database and a scraper.
    pub async fn assemble(config: AppConfig, database: Database, scraper: WebScraper) -> Result<Self> {
        let notifiers = PluginManager::from_config(&config.notifications).await?;
        let pool = database.pool().clone();

        let alerts = AlertEvaluator::new(
            pool.clone(),
            notifiers,
            AlertSettings::from(&config.notifications),
        );
        let product_manager = Arc::new(ProductManager::new(
            pool.clone(),
            scraper,
            HistoryStore::new(pool),
            alerts,
            config.clone(),
        ));

        Ok(Self {
            config,
            database,
            product_manager,
        })
    }

    pub fn history(&self) -> &HistoryStore {
        self.product_manager.history()
    }

    pub async fn scheduler(&self) -> anyhow::Result<ProductScheduler> {
        ProductScheduler::new(Arc::clone(&self.product_manager), self.config.scheduler.clone()).await
    }

    /// Replaces the store with `backup` and rebuilds the context on the
    /// reopened file.
    pub async fn restore(self, backup: &Path) -> Result<Self> {
        let AppContext {
            config,
            database,
            product_manager,
        } = self;
        drop(product_manager);

        let database = database.restore(backup).await?;
        let scraper = WebScraper::new(&config.scraper)?;
        Self::assemble(config, database, scraper).await
    }

    pub async fn close(&self) {
        self.database.close().await;
    }
}
