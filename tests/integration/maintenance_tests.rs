use super::*;

#[tokio::test]
async fn test_backup_and_restore() -> anyhow::Result<()> {
    let env = create_test_env().await?;
    let product = add_product(&env, "/lamp", None).await?;
    env.ctx.history().append(&product.id, dec("25")).await?;

    let backup = env.ctx.database.backup().await?;
    let name = backup.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("price_tracker_backup_"));
    assert!(name.ends_with(".db"));

    // Diverge from the backup, then restore it
    env.ctx.product_manager.delete_product(&product.id).await?;
    add_product(&env, "/other", None).await?;

    let TestEnv { dir, ctx, server: _server } = env;
    let restored = ctx.restore(&backup).await?;

    let products = restored.product_manager.list_products().await?;
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].id, product.id);
    assert_eq!(restored.history().count(&product.id).await?, 1);
    drop(dir);
    Ok(())
}

#[tokio::test]
async fn test_restore_missing_backup() -> anyhow::Result<()> {
    let env = create_test_env().await?;
    let missing = env.dir.path().join("nope.db");

    let TestEnv { dir: _dir, ctx, server: _server } = env;
    assert!(ctx.restore(&missing).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_clear_history_keeps_products() -> anyhow::Result<()> {
    let env = create_test_env().await?;
    serve_price(&env, "/lamp", "20").await;
    let product = add_product(&env, "/lamp", Some("25")).await?;
    env.ctx.product_manager.check_product(&product).await?;
    assert!(env.ctx.product_manager.alerts().load_state(&product.id).await?.is_some());

    let removed = env.ctx.database.clear_history().await?;
    assert_eq!(removed, 1);
    assert_eq!(env.ctx.history().count(&product.id).await?, 0);
    assert!(env.ctx.product_manager.alerts().load_state(&product.id).await?.is_none());
    assert!(env.ctx.product_manager.find_product(&product.id).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_reset_empties_everything() -> anyhow::Result<()> {
    let env = create_test_env().await?;
    let product = add_product(&env, "/lamp", None).await?;
    env.ctx.history().append(&product.id, dec("20")).await?;

    env.ctx.database.reset().await?;
    assert!(env.ctx.product_manager.list_products().await?.is_empty());
    assert!(env.ctx.history().list_all().await?.is_empty());

    // Schema is usable again straight away
    add_product(&env, "/lamp", None).await?;
    Ok(())
}
