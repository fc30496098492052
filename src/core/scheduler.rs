use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::core::product_manager::{ProductCheckResult, ProductManager};
use crate::models::Product;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: Uuid,
    pub product_id: String,
    pub interval_minutes: u64,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobStatus {
    Active,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub total_jobs: usize,
    pub active_jobs: usize,
    pub failing_jobs: usize,
    pub running_jobs: usize,
    pub completed_runs: u64,
    pub failed_runs: u64,
    pub uptime_seconds: u64,
}

/// What a `sync_products` pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub scheduled: usize,
    pub rescheduled: usize,
    pub unscheduled: usize,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.scheduled == 0 && self.rescheduled == 0 && self.unscheduled == 0
    }
}

/// State shared between the scheduler handle and its job closures.
#[derive(Clone)]
struct CheckRunner {
    product_manager: Arc<ProductManager>,
    jobs: Arc<RwLock<HashMap<String, JobInfo>>>, // product_id -> JobInfo
    running: Arc<Mutex<HashSet<String>>>,        // product_ids with a check in flight
    permits: Arc<Semaphore>,
    capacity: u32,
}

impl CheckRunner {
    /// Runs one scheduled tick. Skips the tick when the previous check of
    /// the same product is still running, or when the product was deleted or
    /// switched to manual since it was scheduled.
    async fn execute_product_check(&self, product_id: String) -> Option<ProductCheckResult> {
        if !self.running.lock().await.insert(product_id.clone()) {
            tracing::debug!("Previous check for {} still running, skipping tick", product_id);
            return None;
        }

        let result = self.check_current(&product_id).await;
        self.running.lock().await.remove(&product_id);
        result
    }

    async fn check_current(&self, product_id: &str) -> Option<ProductCheckResult> {
        let Ok(_permit) = self.permits.acquire().await else {
            return None;
        };

        let product = match self.product_manager.find_product(product_id).await {
            Ok(Some(product)) if product.auto_track => product,
            Ok(_) => {
                tracing::info!("Product {} is gone or manual, skipping scheduled check", product_id);
                return None;
            }
            Err(e) => {
                tracing::error!("Failed to load product {}: {}", product_id, e);
                self.update_job_stats(product_id, false, Some(e.to_string())).await;
                return None;
            }
        };

        self.run(&product).await.ok()
    }

    async fn run(&self, product: &Product) -> Result<ProductCheckResult> {
        tracing::debug!("Starting check for product: {}", product.id);

        match self.product_manager.check_product(product).await {
            Ok(result) => {
                self.update_job_stats(&product.id, result.success, result.error.clone()).await;
                Ok(result)
            }
            Err(e) => {
                tracing::error!("Failed to check product {}: {}", product.id, e);
                self.update_job_stats(&product.id, false, Some(e.to_string())).await;
                Err(anyhow::Error::new(e).context(format!("check of product {} failed", product.id)))
            }
        }
    }

    async fn update_job_stats(&self, product_id: &str, success: bool, error: Option<String>) {
        let mut jobs = self.jobs.write().await;
        if let Some(job_info) = jobs.get_mut(product_id) {
            job_info.last_run = Some(Utc::now());
            job_info.run_count += 1;

            if success {
                job_info.success_count += 1;
                job_info.last_error = None;
                job_info.status = JobStatus::Active;
            } else {
                job_info.error_count += 1;
                job_info.last_error = error;
                job_info.status = JobStatus::Error;
            }
        }
    }
}

/// Runs a repeating price check per auto-tracked product.
#[derive(Clone)]
pub struct ProductScheduler {
    scheduler: JobScheduler,
    runner: CheckRunner,
    config: SchedulerConfig,
    start_time: DateTime<Utc>,
}

impl ProductScheduler {
    pub async fn new(product_manager: Arc<ProductManager>, config: SchedulerConfig) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;
        let capacity = u32::try_from(config.max_concurrent_checks.max(1)).unwrap_or(u32::MAX);

        Ok(Self {
            scheduler,
            runner: CheckRunner {
                product_manager,
                jobs: Arc::new(RwLock::new(HashMap::new())),
                running: Arc::new(Mutex::new(HashSet::new())),
                permits: Arc::new(Semaphore::new(capacity as usize)),
                capacity,
            },
            config,
            start_time: Utc::now(),
        })
    }

    pub async fn start(&self) -> Result<()> {
        self.scheduler.start().await?;
        tracing::info!("Product scheduler started");
        Ok(())
    }

    /// Stops issuing ticks and waits for checks already in flight to finish,
    /// so none is cut off between storing a price and evaluating it. Ticks
    /// that had not started yet are dropped.
    pub async fn shutdown(&self) -> Result<()> {
        let mut scheduler = self.scheduler.clone();
        scheduler.shutdown().await?;
        self.runner.jobs.write().await.clear();

        let in_flight = self.runner.capacity as usize - self.runner.permits.available_permits();
        if in_flight > 0 {
            tracing::info!("Waiting for {} in-flight checks", in_flight);
        }
        // Holding every permit means nothing is running; closing stops queued ticks
        if let Ok(drained) = self.runner.permits.acquire_many(self.runner.capacity).await {
            self.runner.permits.close();
            drop(drained);
        }

        tracing::info!("Product scheduler shutdown");
        Ok(())
    }

    /// Schedule a product for regular checking
    pub async fn schedule_product(&self, product: &Product) -> Result<()> {
        if !product.auto_track {
            bail!("Cannot schedule manual product {}", product.id);
        }

        // Remove existing job if any
        self.unschedule_product(&product.id).await?;

        let interval_minutes = product.interval_minutes(self.config.check_interval_minutes);
        let runner = self.runner.clone();
        let product_id_for_job = product.id.clone();

        let job = Job::new_repeated_async(Duration::from_secs(interval_minutes * 60), move |_uuid, _l| {
            let runner = runner.clone();
            let product_id = product_id_for_job.clone();

            Box::pin(async move {
                runner.execute_product_check(product_id).await;
            })
        })?;

        let id = self.scheduler.add(job).await?;

        let job_info = JobInfo {
            id,
            product_id: product.id.clone(),
            interval_minutes,
            status: JobStatus::Active,
            created_at: Utc::now(),
            last_run: None,
            run_count: 0,
            success_count: 0,
            error_count: 0,
            last_error: None,
        };
        self.runner.jobs.write().await.insert(product.id.clone(), job_info);

        tracing::info!("Scheduled product {} every {} minutes", product.id, interval_minutes);
        Ok(())
    }

    /// Unschedule a product
    pub async fn unschedule_product(&self, product_id: &str) -> Result<()> {
        let removed = self.runner.jobs.write().await.remove(product_id);

        if let Some(job_info) = removed {
            self.scheduler.remove(&job_info.id).await?;
            tracing::info!("Unscheduled product {} (job: {})", product_id, job_info.id);
        }

        Ok(())
    }

    /// Update schedule for a product
    pub async fn reschedule_product(&self, product: &Product) -> Result<()> {
        self.unschedule_product(&product.id).await?;

        if product.auto_track {
            self.schedule_product(product).await?;
        }

        Ok(())
    }

    /// Brings the job set in line with the stored auto-tracked products.
    pub async fn sync_products(&self) -> Result<SyncReport> {
        let products = self
            .runner
            .product_manager
            .list_auto_tracked()
            .await
            .context("failed to list auto-tracked products")?;

        let mut report = SyncReport::default();
        let wanted: HashSet<&str> = products.iter().map(|p| p.id.as_str()).collect();

        let stale: Vec<String> = {
            let jobs = self.runner.jobs.read().await;
            jobs.keys()
                .filter(|id| !wanted.contains(id.as_str()))
                .cloned()
                .collect()
        };
        for product_id in stale {
            self.unschedule_product(&product_id).await?;
            report.unscheduled += 1;
        }

        for product in &products {
            let interval = product.interval_minutes(self.config.check_interval_minutes);
            let current = self.get_job_info(&product.id).await.map(|job| job.interval_minutes);

            match current {
                None => {
                    self.schedule_product(product).await?;
                    report.scheduled += 1;
                    if self.config.check_on_start {
                        let runner = self.runner.clone();
                        let product_id = product.id.clone();
                        tokio::spawn(async move {
                            runner.execute_product_check(product_id).await;
                        });
                    }
                }
                Some(existing) if existing != interval => {
                    self.reschedule_product(product).await?;
                    report.rescheduled += 1;
                }
                Some(_) => {}
            }
        }

        if !report.is_empty() {
            tracing::info!(
                "Synced schedule: {} added, {} changed, {} removed",
                report.scheduled,
                report.rescheduled,
                report.unscheduled
            );
        }
        Ok(report)
    }

    /// Get job information for a product
    pub async fn get_job_info(&self, product_id: &str) -> Option<JobInfo> {
        let jobs = self.runner.jobs.read().await;
        jobs.get(product_id).cloned()
    }

    /// Get all scheduled jobs
    pub async fn list_jobs(&self) -> Vec<JobInfo> {
        let jobs = self.runner.jobs.read().await;
        jobs.values().cloned().collect()
    }

    /// Get scheduler statistics
    pub async fn get_stats(&self) -> SchedulerStats {
        let jobs = self.runner.jobs.read().await;
        let running = self.runner.running.lock().await;

        let uptime = Utc::now().signed_duration_since(self.start_time);

        SchedulerStats {
            total_jobs: jobs.len(),
            active_jobs: jobs.values().filter(|j| j.status == JobStatus::Active).count(),
            failing_jobs: jobs.values().filter(|j| j.status == JobStatus::Error).count(),
            running_jobs: running.len(),
            completed_runs: jobs.values().map(|j| j.success_count).sum(),
            failed_runs: jobs.values().map(|j| j.error_count).sum(),
            uptime_seconds: uptime.num_seconds().max(0) as u64,
        }
    }

    /// Check if a product job is currently running
    pub async fn is_job_running(&self, product_id: &str) -> bool {
        self.runner.running.lock().await.contains(product_id)
    }

    /// Execute a product check immediately (outside of schedule)
    pub async fn run_job_now(&self, product_id: &str) -> Result<ProductCheckResult> {
        if !self.runner.running.lock().await.insert(product_id.to_string()) {
            bail!("Job is already running for product: {}", product_id);
        }

        tracing::info!("Running immediate check for product: {}", product_id);

        let result = match self.runner.product_manager.get_product(product_id).await {
            Ok(product) => self.runner.run(&product).await,
            Err(e) => Err(e.into()),
        };

        self.runner.running.lock().await.remove(product_id);
        result
    }
}
