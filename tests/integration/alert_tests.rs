use super::*;
use price_tracker::models::AlertKind;

async fn check_at(env: &TestEnv, product: &Product, price: &str) -> anyhow::Result<Option<AlertKind>> {
    serve_price(env, "/headphones", price).await;
    let result = env.ctx.product_manager.check_product(product).await?;
    assert!(result.success, "check failed: {:?}", result.error);
    Ok(result.alert)
}

#[tokio::test]
async fn test_alert_fires_at_most_once_per_level() -> anyhow::Result<()> {
    let env = create_test_env().await?;
    let product = add_product(&env, "/headphones", Some("150")).await?;

    let sequence = [
        ("199.99", None),
        ("149.00", Some(AlertKind::TargetReached)),
        ("149.00", None),
        ("139.00", Some(AlertKind::TargetReached)),
        ("160.00", None),
        ("149.00", None),
        ("145.00", None),
        ("139.00", None),
        ("120.00", Some(AlertKind::TargetReached)),
    ];

    for (price, expected) in sequence {
        assert_eq!(check_at(&env, &product, price).await?, expected, "at price {}", price);
    }

    let logs = env
        .ctx
        .product_manager
        .alerts()
        .recent_notifications(Some(&product.id), 50)
        .await?;
    assert_eq!(logs.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_price_drop_without_target() -> anyhow::Result<()> {
    let env = create_test_env().await?;
    let product = add_product(&env, "/headphones", None).await?;

    assert_eq!(check_at(&env, &product, "80").await?, None);
    assert_eq!(check_at(&env, &product, "85").await?, None);
    assert_eq!(check_at(&env, &product, "79.99").await?, Some(AlertKind::PriceDrop));
    assert_eq!(check_at(&env, &product, "79.99").await?, None);
    assert_eq!(check_at(&env, &product, "90").await?, None);
    assert_eq!(check_at(&env, &product, "85").await?, None);
    assert_eq!(check_at(&env, &product, "75").await?, Some(AlertKind::PriceDrop));
    Ok(())
}

#[tokio::test]
async fn test_rise_under_target_stays_quiet() -> anyhow::Result<()> {
    let env = create_test_env().await?;
    let product = add_product(&env, "/headphones", Some("150")).await?;

    assert_eq!(check_at(&env, &product, "140").await?, Some(AlertKind::TargetReached));
    assert_eq!(check_at(&env, &product, "145").await?, None);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simultaneous_checks_alert_once() -> anyhow::Result<()> {
    let env = create_test_env().await?;
    serve_price(&env, "/headphones", "90.00").await;
    let product = add_product(&env, "/headphones", Some("100")).await?;

    let checks = (0..4).map(|_| env.ctx.product_manager.check_product(&product));
    let results = futures::future::try_join_all(checks).await?;

    assert!(results.iter().all(|r| r.success), "{:?}", results);
    assert_eq!(results.iter().filter(|r| r.alert.is_some()).count(), 1);

    let logs = env
        .ctx
        .product_manager
        .alerts()
        .recent_notifications(Some(&product.id), 50)
        .await?;
    assert_eq!(logs.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_failed_check_never_alerts() -> anyhow::Result<()> {
    let env = create_test_env().await?;
    let product = add_product(&env, "/missing", Some("1000")).await?;

    // Nothing mounted: the mock server answers 404
    let result = env.ctx.product_manager.check_product(&product).await?;
    assert!(!result.success);
    assert!(result.alert.is_none());
    assert!(env.ctx.product_manager.alerts().load_state(&product.id).await?.is_none());

    let stored = env.ctx.product_manager.get_product(&product.id).await?;
    assert_eq!(stored.error_count, 1);
    Ok(())
}
