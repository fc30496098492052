// Shared setup for the integration tests. Every test gets its own SQLite
// file in a temp dir and its own mock shop server.

pub mod alert_tests;
pub mod export_tests;
pub mod history_tests;
pub mod maintenance_tests;
pub mod pipeline_tests;
pub mod scheduler_tests;

use std::path::Path;

use price_tracker::models::{NewProduct, Product};
use price_tracker::{AppConfig, AppContext};
use rust_decimal::Decimal;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub struct TestEnv {
    pub dir: TempDir,
    pub ctx: AppContext,
    pub server: MockServer,
}

impl TestEnv {
    pub fn url(&self, page: &str) -> String {
        format!("{}{}", self.server.uri(), page)
    }
}

/// Test configuration for integration tests
pub fn get_test_config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.database.path = dir.join("tracker.db");
    config.database.backup_dir = dir.join("backups");
    config.scraper.browser_fallback = false;
    config.scraper.retry_attempts = 0;
    config.scraper.retry_delay_ms = 10;
    config.scraper.request_timeout = 5;
    config.scheduler.check_on_start = false;
    config.scheduler.max_concurrent_checks = 2;
    config
}

pub async fn create_test_env() -> anyhow::Result<TestEnv> {
    let dir = tempfile::tempdir()?;
    let ctx = AppContext::new(get_test_config(dir.path())).await?;
    let server = MockServer::start().await;

    Ok(TestEnv { dir, ctx, server })
}

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

pub fn price_page(price: &str) -> String {
    format!(
        r#"<html><head><title>Product</title></head>
<body>
  <h1>Espresso Machine</h1>
  <div class="product-info"><span class="sale-price">${}</span></div>
  <script>var tracking = "$1.00";</script>
</body></html>"#,
        price
    )
}

/// Serves `price` on `page`, replacing anything mounted before.
pub async fn serve_price(env: &TestEnv, page: &str, price: &str) {
    env.server.reset().await;
    Mock::given(method("GET"))
        .and(path(page))
        .respond_with(ResponseTemplate::new(200).set_body_string(price_page(price)))
        .mount(&env.server)
        .await;
}

pub async fn add_product(env: &TestEnv, page: &str, target: Option<&str>) -> anyhow::Result<Product> {
    let product = env
        .ctx
        .product_manager
        .create_product(NewProduct {
            name: format!("Product at {}", page),
            url: env.url(page),
            selector: None,
            target_price: target.map(dec),
            auto_track: Some(true),
            check_interval_minutes: None,
        })
        .await?;

    Ok(product)
}
