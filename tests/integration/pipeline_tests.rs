use super::*;
use price_tracker::core::scraper::WebScraper;
use price_tracker::models::FetchMethod;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_detection_with_custom_selector() -> anyhow::Result<()> {
    let env = create_test_env().await?;
    Mock::given(method("GET"))
        .and(path("/tv"))
        .and(header_exists("user-agent"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<div class="price">$999.00</div><div id="deal"><b>$1,149.50</b></div>"#,
        ))
        .mount(&env.server)
        .await;

    let scraper = WebScraper::new(&env.ctx.config.scraper)?;

    let report = scraper.test_detection(&env.url("/tv"), Some("#deal b")).await;
    let reading = report.reading.expect("price detected");
    assert_eq!(reading.price, dec("1149.50"));
    assert_eq!(reading.method, FetchMethod::Http);

    let report = scraper.test_detection(&env.url("/tv"), None).await;
    assert_eq!(report.reading.map(|r| r.price), Some(dec("999.00")));
    Ok(())
}

#[tokio::test]
async fn test_detection_reports_http_errors() -> anyhow::Result<()> {
    let env = create_test_env().await?;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&env.server)
        .await;

    let scraper = WebScraper::new(&env.ctx.config.scraper)?;
    let report = scraper.test_detection(&env.url("/gone"), None).await;

    assert!(report.reading.is_none());
    assert!(report.error.unwrap().contains("503"));
    Ok(())
}

#[tokio::test]
async fn test_check_all_isolates_failures() -> anyhow::Result<()> {
    let env = create_test_env().await?;
    serve_price(&env, "/good", "15.00").await;
    let good = add_product(&env, "/good", None).await?;
    let bad = add_product(&env, "/bad", None).await?;

    let results = env.ctx.product_manager.check_all().await?;
    assert_eq!(results.len(), 2);

    let good_result = results.iter().find(|r| r.product_id == good.id).unwrap();
    let bad_result = results.iter().find(|r| r.product_id == bad.id).unwrap();
    assert!(good_result.success);
    assert!(!bad_result.success);

    assert_eq!(env.ctx.history().count(&good.id).await?, 1);
    assert_eq!(env.ctx.history().count(&bad.id).await?, 0);

    // A later success clears the failure streak
    Mock::given(method("GET"))
        .and(path("/bad"))
        .respond_with(ResponseTemplate::new(200).set_body_string(price_page("3.50")))
        .mount(&env.server)
        .await;
    let bad = env.ctx.product_manager.get_product(&bad.id).await?;
    assert_eq!(bad.error_count, 1);
    env.ctx.product_manager.check_product(&bad).await?;
    let bad = env.ctx.product_manager.get_product(&bad.id).await?;
    assert_eq!(bad.error_count, 0);
    assert!(bad.last_error.is_none());
    Ok(())
}
