use super::*;
use price_tracker::core::scheduler::JobStatus;
use price_tracker::models::UpdateProduct;

#[tokio::test(flavor = "multi_thread")]
async fn test_scheduler_follows_store() -> anyhow::Result<()> {
    let env = create_test_env().await?;
    let scheduler = env.ctx.scheduler().await?;
    scheduler.start().await?;

    let a = add_product(&env, "/a", None).await?;
    let b = add_product(&env, "/b", None).await?;

    let report = scheduler.sync_products().await?;
    assert_eq!(report.scheduled, 2);

    env.ctx
        .product_manager
        .update_product(
            &b.id,
            UpdateProduct {
                auto_track: Some(false),
                ..Default::default()
            },
        )
        .await?;

    let report = scheduler.sync_products().await?;
    assert_eq!(report.unscheduled, 1);
    assert!(scheduler.get_job_info(&a.id).await.is_some());
    assert!(scheduler.get_job_info(&b.id).await.is_none());

    scheduler.shutdown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_run_job_now_records_failures() -> anyhow::Result<()> {
    let env = create_test_env().await?;
    let scheduler = env.ctx.scheduler().await?;
    let product = add_product(&env, "/offline", None).await?;
    scheduler.schedule_product(&product).await?;

    let result = scheduler.run_job_now(&product.id).await?;
    assert!(!result.success);

    let job = scheduler.get_job_info(&product.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert_eq!(job.error_count, 1);
    assert!(job.last_error.is_some());

    serve_price(&env, "/offline", "42").await;
    scheduler.run_job_now(&product.id).await?;
    let job = scheduler.get_job_info(&product.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Active);
    assert_eq!(job.run_count, 2);
    Ok(())
}
