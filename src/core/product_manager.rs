use chrono::Utc;
use futures::{StreamExt, stream};
use metrics::{counter, histogram};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use validator::Validate;

use crate::config::AppConfig;
use crate::core::alerts::AlertEvaluator;
use crate::core::extractor::PriceExtractor;
use crate::core::history::HistoryStore;
use crate::core::scraper::{DetectionReport, WebScraper};
use crate::models::{AlertKind, FetchMethod, NewProduct, Product, UpdateProduct};
use crate::utils::error::{AppError, Result};

const PRODUCT_COLUMNS: &str = "id, name, url, selector, target_price, auto_track, check_interval_minutes, \
     current_price, last_checked, last_error, error_count, created_at, updated_at";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductCheckResult {
    pub product_id: String,
    pub product_name: String,
    pub success: bool,
    pub price: Option<Decimal>,
    pub previous_price: Option<Decimal>,
    pub method: Option<FetchMethod>,
    pub alert: Option<AlertKind>,
    pub notifications_sent: usize,
    pub error: Option<String>,
    /// False when the failure will repeat until the product is changed.
    pub retryable: bool,
    pub total_time_ms: u64,
}

impl ProductCheckResult {
    fn failed(product: &Product, error: &AppError, started: Instant) -> Self {
        Self {
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            success: false,
            price: None,
            previous_price: None,
            method: None,
            alert: None,
            notifications_sent: 0,
            error: Some(error.to_string()),
            retryable: error.is_transient(),
            total_time_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Product CRUD and the single check pipeline shared by the scheduler and
/// manual checks.
pub struct ProductManager {
    pool: SqlitePool,
    scraper: WebScraper,
    history: HistoryStore,
    alerts: AlertEvaluator,
    config: AppConfig,
}

impl ProductManager {
    pub fn new(
        pool: SqlitePool,
        scraper: WebScraper,
        history: HistoryStore,
        alerts: AlertEvaluator,
        config: AppConfig,
    ) -> Self {
        Self {
            pool,
            scraper,
            history,
            alerts,
            config,
        }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn alerts(&self) -> &AlertEvaluator {
        &self.alerts
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn create_product(&self, new_product: NewProduct) -> Result<Product> {
        new_product.validate()?;
        validate_name(&new_product.name)?;
        validate_target(new_product.target_price)?;
        validate_interval(new_product.check_interval_minutes)?;
        if let Some(selector) = &new_product.selector {
            validate_selector(selector)?;
        }

        let product = Product::new(new_product);

        let inserted = sqlx::query(
            "INSERT INTO products (id, name, url, selector, target_price, auto_track, check_interval_minutes, \
             current_price, last_checked, last_error, error_count, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, NULL, NULL, NULL, 0, ?, ?)",
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.url)
        .bind(&product.selector)
        .bind(product.target_price.map(|p| p.to_string()))
        .bind(product.auto_track)
        .bind(product.check_interval_minutes.map(i64::from))
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(AppError::AlreadyTracked { url: product.url });
            }
            Err(e) => return Err(e.into()),
        }

        info!("Added product {} ({})", product.name, product.id);
        Ok(product)
    }

    pub async fn find_product(&self, product_id: &str) -> Result<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {} FROM products WHERE id = ?",
            PRODUCT_COLUMNS
        ))
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    pub async fn get_product(&self, product_id: &str) -> Result<Product> {
        self.find_product(product_id)
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource: format!("product {}", product_id),
            })
    }

    pub async fn list_products(&self) -> Result<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {} FROM products ORDER BY created_at, name",
            PRODUCT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    pub async fn list_auto_tracked(&self) -> Result<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {} FROM products WHERE auto_track = 1 ORDER BY created_at, name",
            PRODUCT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    pub async fn update_product(&self, product_id: &str, update: UpdateProduct) -> Result<Product> {
        let mut product = self.get_product(product_id).await?;

        if let Some(name) = &update.name {
            validate_name(name)?;
        }
        if let Some(url) = &update.url {
            url::Url::parse(url.trim())
                .map_err(|e| AppError::Validation(format!("product URL is not a valid URL: {}", e)))?;
        }
        if let Some(Some(selector)) = &update.selector {
            validate_selector(selector)?;
        }
        if let Some(target) = update.target_price {
            validate_target(target)?;
        }
        if let Some(interval) = update.check_interval_minutes {
            validate_interval(interval)?;
        }

        product.update(update);

        let updated = sqlx::query(
            "UPDATE products SET name = ?, url = ?, selector = ?, target_price = ?, auto_track = ?, \
             check_interval_minutes = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&product.name)
        .bind(&product.url)
        .bind(&product.selector)
        .bind(product.target_price.map(|p| p.to_string()))
        .bind(product.auto_track)
        .bind(product.check_interval_minutes.map(i64::from))
        .bind(product.updated_at)
        .bind(&product.id)
        .execute(&self.pool)
        .await;

        match updated {
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(AppError::AlreadyTracked { url: product.url });
            }
            Err(e) => return Err(e.into()),
        }

        info!("Updated product {}", product.id);
        Ok(product)
    }

    /// Removes the product together with its history, alert state and
    /// notification log.
    pub async fn delete_product(&self, product_id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(product_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound {
                resource: format!("product {}", product_id),
            });
        }

        info!("Removed product {}", product_id);
        Ok(())
    }

    pub async fn test_detection(&self, url: &str, selector: Option<&str>) -> DetectionReport {
        self.scraper.test_detection(url, selector).await
    }

    /// Fetch, extract, store, evaluate. Fetch and extraction failures are
    /// recorded on the product and reported in the result; only store errors
    /// are returned as `Err`.
    pub async fn check_product(&self, product: &Product) -> Result<ProductCheckResult> {
        let started = Instant::now();
        counter!("price_checks_total").increment(1);
        debug!("Checking {} at {}", product.id, product.url);

        let previous_price = self.history.latest(&product.id).await?.map(|o| o.price);

        let reading = match self
            .scraper
            .fetch_price(&product.url, product.selector.as_deref())
            .await
        {
            Ok(reading) => reading,
            Err(e) => {
                let transient = e.is_transient();
                counter!("price_check_failures_total", "transient" => transient.to_string()).increment(1);
                if transient {
                    warn!("Check failed for {} ({}), retrying next tick: {}", product.name, product.id, e);
                } else {
                    error!("Check failed for {} ({}) and will keep failing: {}", product.name, product.id, e);
                }
                self.record_failure(&product.id, &e.to_string()).await?;
                histogram!("price_check_duration_seconds").record(started.elapsed().as_secs_f64());
                return Ok(ProductCheckResult::failed(product, &e, started));
            }
        };

        self.history.append(&product.id, reading.price).await?;
        self.record_success(&product.id, reading.price).await?;

        let mut alert = None;
        let mut notifications_sent = 0;
        match self.alerts.evaluate(product, previous_price, reading.price).await {
            Ok(Some(fired)) => {
                alert = Some(fired.kind);
                notifications_sent = self.alerts.dispatch(&fired).await.unwrap_or_else(|e| {
                    warn!("Failed to deliver alert for {}: {}", product.id, e);
                    0
                });
            }
            Ok(None) => {}
            Err(e) => warn!("Alert evaluation failed for {}: {}", product.id, e),
        }

        histogram!("price_check_duration_seconds").record(started.elapsed().as_secs_f64());
        info!(
            "Checked {}: {} via {} ({})",
            product.name, reading.price, reading.method, reading.rule
        );

        Ok(ProductCheckResult {
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            success: true,
            price: Some(reading.price),
            previous_price,
            method: Some(reading.method),
            alert,
            notifications_sent,
            error: None,
            retryable: true,
            total_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Checks every product, manual ones included, with bounded concurrency.
    pub async fn check_all(&self) -> Result<Vec<ProductCheckResult>> {
        let products = self.list_products().await?;
        let limit = self.config.scheduler.max_concurrent_checks.max(1);

        let results = stream::iter(products)
            .map(|product| async move {
                let started = Instant::now();
                match self.check_product(&product).await {
                    Ok(result) => result,
                    Err(e) => ProductCheckResult::failed(&product, &e, started),
                }
            })
            .buffer_unordered(limit)
            .collect()
            .await;

        Ok(results)
    }

    async fn record_success(&self, product_id: &str, price: Decimal) -> Result<()> {
        sqlx::query(
            "UPDATE products SET current_price = ?, last_checked = ?, last_error = NULL, error_count = 0 \
             WHERE id = ?",
        )
        .bind(price.to_string())
        .bind(Utc::now())
        .bind(product_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_failure(&self, product_id: &str, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE products SET last_checked = ?, last_error = ?, error_count = error_count + 1 WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(error)
        .bind(product_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("product name must not be empty".to_string()));
    }
    Ok(())
}

fn validate_target(target: Option<Decimal>) -> Result<()> {
    match target {
        Some(target) if target <= Decimal::ZERO => Err(AppError::Validation(format!(
            "target price must be positive, got {}",
            target
        ))),
        _ => Ok(()),
    }
}

fn validate_interval(interval: Option<u32>) -> Result<()> {
    match interval {
        Some(0) => Err(AppError::Validation(
            "check interval must be at least 1 minute".to_string(),
        )),
        _ => Ok(()),
    }
}

fn validate_selector(selector: &str) -> Result<()> {
    if selector.trim().is_empty() {
        return Ok(());
    }
    PriceExtractor::check_selector(selector.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::AlertSettings;
    use crate::core::database::Database;
    use crate::core::scraper::{FetchedPage, MockPageFetcher, PageFetcher};
    use crate::plugins::PluginManager;
    use crate::plugins::notifiers::ConsoleNotifier;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn new_product(url: &str) -> NewProduct {
        NewProduct {
            name: "Coffee Grinder".to_string(),
            url: url.to_string(),
            selector: Some(".price".to_string()),
            target_price: Some(dec("80")),
            auto_track: None,
            check_interval_minutes: None,
        }
    }

    async fn setup(fetcher: MockPageFetcher) -> (TempDir, ProductManager) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.database.path = dir.path().join("products.db");
        let database = Database::open(&config.database).await.unwrap();
        let pool = database.pool().clone();

        let notifiers = PluginManager::new();
        notifiers.register_notifier(Box::new(ConsoleNotifier::new())).await.unwrap();

        let http: Arc<dyn PageFetcher> = Arc::new(fetcher);
        let manager = ProductManager::new(
            pool.clone(),
            WebScraper::with_fetchers(http, None),
            HistoryStore::new(pool.clone()),
            AlertEvaluator::new(pool, notifiers, AlertSettings::default()),
            config,
        );
        (dir, manager)
    }

    fn serving(prices: Vec<&'static str>) -> MockPageFetcher {
        let mut fetcher = MockPageFetcher::new();
        let mut prices = prices.into_iter();
        fetcher.expect_fetch().returning(move |request| {
            let html = match prices.next() {
                Some(price) => format!("<span class=\"price\">${}</span>", price),
                None => "<p>Out of stock</p>".to_string(),
            };
            Ok(FetchedPage {
                final_url: request.url.clone(),
                html,
                method: FetchMethod::Http,
            })
        });
        fetcher
    }

    #[tokio::test]
    async fn test_create_and_get_product() {
        let (_dir, manager) = setup(MockPageFetcher::new()).await;

        let created = manager
            .create_product(new_product("https://shop.example.com/grinder"))
            .await
            .unwrap();
        let loaded = manager.get_product(&created.id).await.unwrap();

        assert_eq!(loaded, created);
        assert_eq!(manager.list_products().await.unwrap().len(), 1);
        assert_eq!(manager.list_auto_tracked().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates_and_bad_input() {
        let (_dir, manager) = setup(MockPageFetcher::new()).await;
        manager
            .create_product(new_product("https://shop.example.com/grinder"))
            .await
            .unwrap();

        let duplicate = manager
            .create_product(new_product("https://shop.example.com/grinder"))
            .await;
        assert!(matches!(duplicate, Err(AppError::AlreadyTracked { .. })));

        assert!(matches!(
            manager.create_product(new_product("not a url")).await,
            Err(AppError::Validation(_))
        ));

        let mut bad_target = new_product("https://shop.example.com/other");
        bad_target.target_price = Some(dec("0"));
        assert!(matches!(
            manager.create_product(bad_target).await,
            Err(AppError::Validation(_))
        ));

        let mut bad_interval = new_product("https://shop.example.com/other");
        bad_interval.check_interval_minutes = Some(0);
        assert!(matches!(
            manager.create_product(bad_interval).await,
            Err(AppError::Validation(_))
        ));

        let mut bad_selector = new_product("https://shop.example.com/other");
        bad_selector.selector = Some("div[".to_string());
        assert!(matches!(
            manager.create_product(bad_selector).await,
            Err(AppError::InvalidSelector { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_and_delete_product() {
        let (_dir, manager) = setup(MockPageFetcher::new()).await;
        let product = manager
            .create_product(new_product("https://shop.example.com/grinder"))
            .await
            .unwrap();

        let updated = manager
            .update_product(
                &product.id,
                UpdateProduct {
                    target_price: Some(None),
                    auto_track: Some(false),
                    check_interval_minutes: Some(Some(15)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.target_price, None);
        assert!(!updated.auto_track);
        assert_eq!(updated.check_interval_minutes, Some(15));
        assert!(manager.list_auto_tracked().await.unwrap().is_empty());

        manager.delete_product(&product.id).await.unwrap();
        assert!(matches!(
            manager.get_product(&product.id).await,
            Err(AppError::NotFound { .. })
        ));
        assert!(matches!(
            manager.delete_product(&product.id).await,
            Err(AppError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_check_product_stores_and_alerts() {
        let (_dir, manager) = setup(serving(vec!["99.00", "79.50"])).await;
        let product = manager
            .create_product(new_product("https://shop.example.com/grinder"))
            .await
            .unwrap();

        let first = manager.check_product(&product).await.unwrap();
        assert!(first.success);
        assert_eq!(first.price, Some(dec("99.00")));
        assert_eq!(first.alert, None);

        let second = manager.check_product(&product).await.unwrap();
        assert_eq!(second.previous_price, Some(dec("99.00")));
        assert_eq!(second.alert, Some(AlertKind::TargetReached));
        assert_eq!(second.notifications_sent, 1);

        let stored = manager.get_product(&product.id).await.unwrap();
        assert_eq!(stored.current_price, Some(dec("79.50")));
        assert_eq!(stored.error_count, 0);
        assert_eq!(manager.history().count(&product.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_check_is_recorded_not_stored() {
        let (_dir, manager) = setup(serving(vec![])).await;
        let product = manager
            .create_product(new_product("https://shop.example.com/grinder"))
            .await
            .unwrap();

        let result = manager.check_product(&product).await.unwrap();
        assert!(!result.success);
        assert!(result.retryable);
        assert!(result.error.unwrap().contains("No price found"));

        let stored = manager.get_product(&product.id).await.unwrap();
        assert_eq!(stored.error_count, 1);
        assert!(stored.last_error.is_some());
        assert_eq!(manager.history().count(&product.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_check_all_includes_manual_products() {
        let (_dir, manager) = setup(serving(vec!["10", "20"])).await;
        manager
            .create_product(new_product("https://shop.example.com/a"))
            .await
            .unwrap();
        let mut manual = new_product("https://shop.example.com/b");
        manual.auto_track = Some(false);
        manager.create_product(manual).await.unwrap();

        let results = manager.check_all().await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success));
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retryable() {
        let mut fetcher = MockPageFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|_| Err(AppError::Internal("browser task failed".to_string())));
        let (_dir, manager) = setup(fetcher).await;
        let product = manager
            .create_product(new_product("https://shop.example.com/grinder"))
            .await
            .unwrap();

        let result = manager.check_product(&product).await.unwrap();
        assert!(!result.success);
        assert!(!result.retryable);
        assert_eq!(manager.get_product(&product.id).await.unwrap().error_count, 1);
    }

    #[tokio::test]
    async fn test_blank_name_is_rejected() {
        let (_dir, manager) = setup(MockPageFetcher::new()).await;

        let mut blank = new_product("https://shop.example.com/grinder");
        blank.name = "   ".to_string();
        assert!(matches!(
            manager.create_product(blank).await,
            Err(AppError::Validation(_))
        ));
        assert!(manager.list_products().await.unwrap().is_empty());
    }
}
