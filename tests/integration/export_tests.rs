use super::*;
use price_tracker::core::export::ExportDocument;

#[tokio::test]
async fn test_export_reproduces_store_exactly() -> anyhow::Result<()> {
    let env = create_test_env().await?;
    let history = env.ctx.history();
    let a = add_product(&env, "/a", Some("9.99")).await?;
    let b = add_product(&env, "/b", None).await?;
    add_product(&env, "/never-checked", None).await?;

    for (product, price) in [(&a, "12.340"), (&b, "0.01"), (&a, "1234567.8901"), (&a, "12.34")] {
        history.append(&product.id, dec(price)).await?;
    }

    let path = env.dir.path().join("export.json");
    ExportDocument::collect(&env.ctx.product_manager).await?.save(&path)?;

    let json = std::fs::read_to_string(&path)?;
    let document = ExportDocument::from_json(&json)?;

    let products = env.ctx.product_manager.list_products().await?;
    assert_eq!(document.products.len(), products.len());
    for (exported, stored) in document.products.iter().zip(&products) {
        assert_eq!(&exported.product, stored);
        assert_eq!(exported.observations, history.list(&stored.id).await?);
    }
    assert_eq!(document.observation_count(), 4);

    // Prices keep their exact text
    let raw: serde_json::Value = serde_json::from_str(&json)?;
    assert_eq!(raw["products"][0]["observations"][0]["price"], "12.340");
    assert_eq!(raw["products"][0]["observations"][1]["price"], "1234567.8901");
    Ok(())
}
