use super::*;
use chrono::{Duration, Utc};

#[tokio::test]
async fn test_observations_are_timestamp_ordered() -> anyhow::Result<()> {
    let env = create_test_env().await?;
    let history = env.ctx.history();
    let a = add_product(&env, "/a", None).await?;
    let b = add_product(&env, "/b", None).await?;

    let now = Utc::now();
    // Interleaved writes, some stamped earlier than what is already stored
    let writes = [
        (&a, "10", now),
        (&b, "5", now + Duration::seconds(30)),
        (&a, "11", now - Duration::minutes(5)),
        (&a, "12", now + Duration::minutes(1)),
        (&b, "4", now - Duration::hours(1)),
    ];
    for (product, price, at) in writes {
        history.append_at(&product.id, dec(price), at).await?;
    }

    for product in [&a, &b] {
        let observations = history.list(&product.id).await?;
        assert!(
            observations.windows(2).all(|w| w[0].timestamp <= w[1].timestamp),
            "timestamps went backwards for {}",
            product.id
        );
    }

    let a_prices: Vec<_> = history.list(&a.id).await?.into_iter().map(|o| o.price).collect();
    assert_eq!(a_prices, vec![dec("10"), dec("11"), dec("12")]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checks_keep_order() -> anyhow::Result<()> {
    let env = create_test_env().await?;
    serve_price(&env, "/busy", "50").await;
    let product = add_product(&env, "/busy", None).await?;

    let checks = (0..8).map(|_| env.ctx.product_manager.check_product(&product));
    let results = futures::future::try_join_all(checks).await?;
    assert!(results.iter().all(|r| r.success), "{:?}", results);

    let observations = env.ctx.history().list(&product.id).await?;
    assert_eq!(observations.len(), 8);
    assert!(observations.windows(2).all(|w| w[0].timestamp <= w[1].timestamp && w[0].id < w[1].id));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checks_of_distinct_products() -> anyhow::Result<()> {
    let env = create_test_env().await?;
    env.server.reset().await;
    for page in ["/p0", "/p1", "/p2", "/p3"] {
        Mock::given(method("GET"))
            .and(path(page))
            .respond_with(ResponseTemplate::new(200).set_body_string(price_page("25.00")))
            .mount(&env.server)
            .await;
    }

    let mut products = Vec::new();
    for page in ["/p0", "/p1", "/p2", "/p3"] {
        products.push(add_product(&env, page, Some("30")).await?);
    }

    for _ in 0..10 {
        let checks = products.iter().map(|p| env.ctx.product_manager.check_product(p));
        let results = futures::future::try_join_all(checks).await?;
        let failed: Vec<_> = results.iter().filter_map(|r| r.error.as_deref()).collect();
        assert!(failed.is_empty(), "checks failed: {:?}", failed);
    }

    for product in &products {
        assert_eq!(env.ctx.history().count(&product.id).await?, 10);
        let logs = env
            .ctx
            .product_manager
            .alerts()
            .recent_notifications(Some(&product.id), 50)
            .await?;
        assert_eq!(logs.len(), 1);
    }
    Ok(())
}
