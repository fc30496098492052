use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_retry::Retry;
use tokio_retry::strategy::FixedInterval;
use tracing::{debug, warn};

use crate::config::ScraperConfig;
use crate::core::extractor::{MatchedRule, PriceExtractor};
use crate::models::FetchMethod;
use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    /// Rendered fetches wait for this element before reading the page.
    pub wait_for_selector: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub final_url: String,
    pub html: String,
    pub method: FetchMethod,
}

/// Retrieves raw page content for a URL.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPage>;
}

/// Plain HTTP GET with browser-like headers.
pub struct HttpFetcher {
    client: reqwest::Client,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl HttpFetcher {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout))
            .build()?;

        Ok(Self {
            client,
            retry_attempts: config.retry_attempts,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<FetchedPage> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let final_url = response.url().to_string();
        let html = response.text().await?;

        Ok(FetchedPage {
            final_url,
            html,
            method: FetchMethod::Http,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPage> {
        let strategy = FixedInterval::new(self.retry_delay).take(self.retry_attempts as usize);

        Retry::spawn(strategy, move || async move {
            self.fetch_once(&request.url).await.inspect_err(|e| {
                debug!("HTTP fetch of {} failed: {}", request.url, e);
            })
        })
        .await
    }
}

/// Headless Chrome rendering for pages that build their price with
/// JavaScript. The browser is launched on first use and reused.
pub struct BrowserFetcher {
    config: ScraperConfig,
    browser: Arc<Mutex<Option<Arc<Browser>>>>,
}

impl BrowserFetcher {
    pub fn new(config: &ScraperConfig) -> Self {
        Self {
            config: config.clone(),
            browser: Arc::new(Mutex::new(None)),
        }
    }

    fn launch(config: &ScraperConfig) -> Result<Browser> {
        let mut launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .args(vec![
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-extensions"),
            ])
            .build()
            .map_err(|e| AppError::Browser(format!("Failed to create launch options: {}", e)))?;

        if let Some(chrome_path) = &config.chrome_path {
            launch_options.path = Some(PathBuf::from(chrome_path));
        }

        Browser::new(launch_options)
            .map_err(|e| AppError::Browser(format!("Failed to launch browser: {}", e)))
    }

    fn shared_browser(slot: &Mutex<Option<Arc<Browser>>>, config: &ScraperConfig) -> Result<Arc<Browser>> {
        let mut guard = slot
            .lock()
            .map_err(|_| AppError::Internal("browser slot poisoned".to_string()))?;

        if let Some(browser) = guard.as_ref() {
            return Ok(Arc::clone(browser));
        }

        debug!("Launching headless browser");
        let browser = Arc::new(Self::launch(config)?);
        *guard = Some(Arc::clone(&browser));
        Ok(browser)
    }

    fn forget_browser(slot: &Mutex<Option<Arc<Browser>>>) {
        if let Ok(mut guard) = slot.lock() {
            guard.take();
        }
    }

    fn render(
        slot: &Mutex<Option<Arc<Browser>>>,
        config: &ScraperConfig,
        request: &FetchRequest,
    ) -> Result<FetchedPage> {
        let browser = Self::shared_browser(slot, config)?;

        // An idle browser may have been closed underneath us; relaunch once
        let tab = match browser.new_tab() {
            Ok(tab) => tab,
            Err(e) => {
                warn!("Browser tab failed ({}), relaunching", e);
                Self::forget_browser(slot);
                Self::shared_browser(slot, config)?
                    .new_tab()
                    .map_err(|e| AppError::Browser(format!("Failed to create tab: {}", e)))?
            }
        };

        tab.set_user_agent(&config.user_agent, None, None)
            .map_err(|e| AppError::Browser(format!("Failed to set user agent: {}", e)))?;
        tab.navigate_to(&request.url)
            .map_err(|e| AppError::Browser(format!("Navigation failed: {}", e)))?;
        tab.wait_until_navigated()
            .map_err(|e| AppError::Browser(format!("Page load failed: {}", e)))?;

        if let Some(selector) = &request.wait_for_selector {
            let timeout = Duration::from_secs(config.request_timeout);
            if let Err(e) = tab.wait_for_element_with_custom_timeout(selector, timeout) {
                debug!("Selector '{}' did not appear on {}: {}", selector, request.url, e);
            }
        }

        let html = tab
            .get_content()
            .map_err(|e| AppError::Browser(format!("Failed to get page content: {}", e)))?;
        let final_url = match tab.get_url() {
            url if url.is_empty() => request.url.clone(),
            url => url,
        };

        let _ = tab.close(true);

        Ok(FetchedPage {
            final_url,
            html,
            method: FetchMethod::Browser,
        })
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPage> {
        let slot = Arc::clone(&self.browser);
        let config = self.config.clone();
        let request = request.clone();

        tokio::task::spawn_blocking(move || Self::render(&slot, &config, &request))
            .await
            .map_err(|e| AppError::Internal(format!("browser task failed: {}", e)))?
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceReading {
    pub price: Decimal,
    pub method: FetchMethod,
    pub rule: MatchedRule,
    pub final_url: String,
}

/// Outcome of a one-off detection run, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionReport {
    pub url: String,
    pub reading: Option<PriceReading>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

/// Fetches a page and extracts its price, over HTTP first and through the
/// browser when HTTP fails or yields no price.
#[derive(Clone)]
pub struct WebScraper {
    http: Arc<dyn PageFetcher>,
    browser: Option<Arc<dyn PageFetcher>>,
    extractor: PriceExtractor,
}

impl WebScraper {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let http: Arc<dyn PageFetcher> = Arc::new(HttpFetcher::new(config)?);
        let browser: Option<Arc<dyn PageFetcher>> = if config.browser_fallback {
            Some(Arc::new(BrowserFetcher::new(config)))
        } else {
            None
        };

        Ok(Self::with_fetchers(http, browser))
    }

    pub fn with_fetchers(http: Arc<dyn PageFetcher>, browser: Option<Arc<dyn PageFetcher>>) -> Self {
        Self {
            http,
            browser,
            extractor: PriceExtractor::new(),
        }
    }

    pub async fn fetch_price(&self, url: &str, selector: Option<&str>) -> Result<PriceReading> {
        let request = FetchRequest {
            url: url.to_string(),
            wait_for_selector: selector.map(str::to_string),
        };

        let http_failure = match self.http.fetch(&request).await {
            Ok(page) => match self.read_price(&page, selector)? {
                Some(reading) => return Ok(reading),
                None => AppError::PriceNotFound {
                    url: url.to_string(),
                },
            },
            Err(e) => e,
        };

        let Some(browser) = &self.browser else {
            return Err(http_failure);
        };

        debug!("Falling back to browser for {}: {}", url, http_failure);
        let page = browser.fetch(&request).await?;
        self.read_price(&page, selector)?
            .ok_or_else(|| AppError::PriceNotFound {
                url: url.to_string(),
            })
    }

    pub async fn test_detection(&self, url: &str, selector: Option<&str>) -> DetectionReport {
        let started = Instant::now();
        let outcome = self.fetch_price(url, selector).await;

        let (reading, error) = match outcome {
            Ok(reading) => (Some(reading), None),
            Err(e) => (None, Some(e.to_string())),
        };

        DetectionReport {
            url: url.to_string(),
            reading,
            error,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    fn read_price(&self, page: &FetchedPage, selector: Option<&str>) -> Result<Option<PriceReading>> {
        let extraction = self.extractor.extract(&page.html, selector)?;
        Ok(extraction.map(|found| PriceReading {
            price: found.price,
            method: page.method,
            rule: found.rule,
            final_url: page.final_url.clone(),
        }))
    }
}
