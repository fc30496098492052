use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::context::AppContext;
use crate::core::export::ExportDocument;
use crate::core::product_manager::ProductCheckResult;
use crate::core::scraper::WebScraper;
use crate::models::{NewProduct, Product, UpdateProduct, format_change};

#[derive(Parser)]
#[command(name = "price-tracker", version)]
#[command(about = "Track product prices and get alerted when they drop", long_about = None)]
pub struct Cli {
    /// Configuration file layered over config/default.toml
    #[arg(short, long, global = true, env = "PRICE_TRACKER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database file, overriding database.path
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start tracking a product
    Add {
        url: String,
        #[arg(short, long)]
        name: String,
        /// CSS selector for the price element
        #[arg(short, long)]
        selector: Option<String>,
        /// Alert when the price falls to or below this
        #[arg(short, long)]
        target: Option<Decimal>,
        /// Only check when asked
        #[arg(long)]
        manual: bool,
        /// Minutes between checks
        #[arg(short, long)]
        interval: Option<u32>,
    },
    /// List tracked products
    List,
    /// Show one product
    Show { product: String },
    /// Change a product
    Update {
        product: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long, conflicts_with = "clear_selector")]
        selector: Option<String>,
        #[arg(long)]
        clear_selector: bool,
        #[arg(long, conflicts_with = "clear_target")]
        target: Option<Decimal>,
        #[arg(long)]
        clear_target: bool,
        /// Check on a schedule (true) or only on demand (false)
        #[arg(long)]
        auto: Option<bool>,
        #[arg(long, conflicts_with = "clear_interval")]
        interval: Option<u32>,
        #[arg(long)]
        clear_interval: bool,
    },
    /// Stop tracking a product and delete its history
    Remove { product: String },
    /// Try price detection on a URL without saving anything
    Test {
        url: String,
        #[arg(short, long)]
        selector: Option<String>,
    },
    /// Check one product now, or every product
    Check { product: Option<String> },
    /// Show the price history of a product
    History {
        product: String,
        /// Only the most recent N observations
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show recent alert deliveries
    Alerts {
        product: Option<String>,
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: i64,
    },
    /// Check auto-tracked products on their schedule until interrupted
    Track,
    /// Write products and price history to a JSON file
    Export {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Copy the database to a backup file
    Backup {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Replace the database with a backup
    Restore {
        backup: PathBuf,
        #[arg(long)]
        yes: bool,
    },
    /// Delete all price history and alert state, keeping products
    ClearHistory {
        #[arg(long)]
        yes: bool,
    },
    /// Drop and recreate every table
    Reset {
        #[arg(long)]
        yes: bool,
    },
    /// Print the effective configuration
    Config,
}

pub async fn run(cli: Cli, mut config: AppConfig) -> Result<()> {
    if let Some(database) = cli.database {
        config.database.path = database;
    }

    match cli.command {
        Commands::Config => print_config(&config),
        Commands::Test { url, selector } => {
            let scraper = WebScraper::new(&config.scraper)?;
            test_detection(&scraper, &url, selector.as_deref()).await
        }
        Commands::Restore { backup, yes } => {
            confirm(yes, "restore replaces every product and observation in the database")?;
            restore(config, &backup).await
        }
        command => {
            let ctx = AppContext::new(config)
                .await
                .context("failed to open the price database")?;

            let outcome = dispatch(&ctx, command).await;
            ctx.close().await;
            outcome
        }
    }
}

async fn dispatch(ctx: &AppContext, command: Commands) -> Result<()> {
    let manager = &ctx.product_manager;

    match command {
        Commands::Add {
            url,
            name,
            selector,
            target,
            manual,
            interval,
        } => {
            let product = manager
                .create_product(NewProduct {
                    name,
                    url,
                    selector,
                    target_price: target,
                    auto_track: Some(!manual),
                    check_interval_minutes: interval,
                })
                .await?;
            println!("Added {} ({})", product.name, product.id);
        }
        Commands::List => {
            let products = manager.list_products().await?;
            if products.is_empty() {
                println!("No products tracked yet. Add one with `price-tracker add <URL> --name <NAME>`.");
            }
            for product in &products {
                println!(
                    "{:<12} {:<30} {:>12} {:>12}  {:<16} {}",
                    short_id(&product.id),
                    truncate(&product.name, 30),
                    money(product.current_price),
                    money(product.target_price),
                    product.status().to_string(),
                    product
                        .last_checked
                        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "never".to_string()),
                );
            }
        }
        Commands::Show { product } => {
            let product = resolve(ctx, &product).await?;
            print_product(ctx, &product).await?;
        }
        Commands::Update {
            product,
            name,
            url,
            selector,
            clear_selector,
            target,
            clear_target,
            auto,
            interval,
            clear_interval,
        } => {
            let product = resolve(ctx, &product).await?;
            let update = UpdateProduct {
                name,
                url,
                selector: if clear_selector { Some(None) } else { selector.map(Some) },
                target_price: if clear_target { Some(None) } else { target.map(Some) },
                auto_track: auto,
                check_interval_minutes: if clear_interval { Some(None) } else { interval.map(Some) },
            };
            let updated = manager.update_product(&product.id, update).await?;
            println!("Updated {} ({})", updated.name, updated.id);
        }
        Commands::Remove { product } => {
            let product = resolve(ctx, &product).await?;
            manager.delete_product(&product.id).await?;
            println!("Removed {}", product.name);
        }
        Commands::Check { product } => {
            let results = match product {
                Some(key) => {
                    let product = resolve(ctx, &key).await?;
                    vec![manager.check_product(&product).await?]
                }
                None => manager.check_all().await?,
            };
            for result in &results {
                print_check(result);
            }
        }
        Commands::History { product, limit } => {
            let product = resolve(ctx, &product).await?;
            let observations = ctx.history().list(&product.id).await?;
            if observations.is_empty() {
                println!("No price history for {}", product.name);
            }
            let skip = limit.map_or(0, |n| observations.len().saturating_sub(n));
            for (index, observation) in observations.iter().enumerate().skip(skip) {
                let change = match index.checked_sub(1).map(|i| &observations[i]) {
                    Some(earlier) => format_change(observation.change_since(earlier)),
                    None => String::new(),
                };
                println!(
                    "{}  {:>12}  {}",
                    observation.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
                    observation.price,
                    change
                );
            }
        }
        Commands::Alerts { product, limit } => {
            let product_id = match product {
                Some(key) => Some(resolve(ctx, &key).await?.id),
                None => None,
            };
            let logs = manager
                .alerts()
                .recent_notifications(product_id.as_deref(), limit)
                .await?;
            if logs.is_empty() {
                println!("No alerts sent yet");
            }
            for log in &logs {
                println!(
                    "{}  {:<12} {:<15} {:>12}  {:<8} {}",
                    log.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                    short_id(&log.product_id),
                    log.kind.to_string(),
                    log.price,
                    log.channel,
                    log.error.as_deref().unwrap_or(log.status.as_str()),
                );
            }
        }
        Commands::Track => track(ctx).await?,
        Commands::Export { output } => {
            let path = output.unwrap_or_else(|| {
                PathBuf::from(format!(
                    "price_tracker_export_{}.json",
                    Local::now().format("%Y%m%d_%H%M%S")
                ))
            });
            let document = ExportDocument::collect(manager).await?;
            document.save(&path)?;
            println!(
                "Exported {} products and {} observations to {}",
                document.products.len(),
                document.observation_count(),
                path.display()
            );
        }
        Commands::Backup { output } => {
            let path = match output {
                Some(path) => {
                    ctx.database.backup_to(&path).await?;
                    path
                }
                None => ctx.database.backup().await?,
            };
            println!("Database backed up to {}", path.display());
        }
        Commands::ClearHistory { yes } => {
            confirm(yes, "clear-history deletes every price observation")?;
            let removed = ctx.database.clear_history().await?;
            println!("Removed {} price observations", removed);
        }
        Commands::Reset { yes } => {
            confirm(yes, "reset deletes every product and observation")?;
            ctx.database.reset().await?;
            println!("Database reset");
        }
        Commands::Config | Commands::Test { .. } | Commands::Restore { .. } => {
            bail!("this command does not run against an open database")
        }
    }

    Ok(())
}

async fn track(ctx: &AppContext) -> Result<()> {
    let scheduler = ctx.scheduler().await?;
    scheduler.start().await?;

    let report = scheduler.sync_products().await?;
    info!("Tracking {} products, press Ctrl-C to stop", report.scheduled);

    let mut sync = tokio::time::interval(Duration::from_secs(ctx.config.scheduler.sync_interval_secs));
    sync.tick().await;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                break;
            }
            _ = sync.tick() => {
                if let Err(e) = scheduler.sync_products().await {
                    warn!("Schedule sync failed: {:#}", e);
                }
            }
        }
    }

    info!("Stopping tracker");
    let stats = scheduler.get_stats().await;
    scheduler.shutdown().await?;
    info!(
        "Ran {} checks ({} failed) over {}s",
        stats.completed_runs + stats.failed_runs,
        stats.failed_runs,
        stats.uptime_seconds
    );
    Ok(())
}

async fn restore(config: AppConfig, backup: &std::path::Path) -> Result<()> {
    let ctx = AppContext::new(config)
        .await
        .context("failed to open the price database")?;
    let restored = ctx
        .restore(backup)
        .await
        .with_context(|| format!("failed to restore from {}", backup.display()))?;

    let count = restored.product_manager.list_products().await?.len();
    restored.close().await;
    println!("Restored {} products from {}", count, backup.display());
    Ok(())
}

async fn test_detection(scraper: &WebScraper, url: &str, selector: Option<&str>) -> Result<()> {
    let report = scraper.test_detection(url, selector).await;

    match (&report.reading, &report.error) {
        (Some(reading), _) => {
            println!("Price detected: {}", reading.price);
            println!("  via {} using {}", reading.method, reading.rule);
            if reading.final_url != url {
                println!("  final URL {}", reading.final_url);
            }
        }
        (None, Some(error)) => println!("Could not detect price: {}", error),
        (None, None) => println!("Could not detect price"),
    }
    println!("  took {} ms", report.elapsed_ms);

    Ok(())
}

fn print_config(config: &AppConfig) -> Result<()> {
    let mut shown = config.clone();
    if shown.notifications.smtp.password.is_some() {
        shown.notifications.smtp.password = Some("********".to_string());
    }
    print!("{}", toml::to_string_pretty(&shown)?);
    Ok(())
}

async fn print_product(ctx: &AppContext, product: &Product) -> Result<()> {
    let history = ctx.history();
    let count = history.count(&product.id).await?;
    let interval = product.interval_minutes(ctx.config.scheduler.check_interval_minutes);

    println!("{}", product.name);
    println!("  id            {}", product.id);
    println!("  url           {}", product.url);
    println!("  selector      {}", product.selector.as_deref().unwrap_or("(common selectors)"));
    println!("  current       {}", money(product.current_price));
    println!("  target        {}", money(product.target_price));
    println!("  status        {}", product.status());
    if product.auto_track {
        println!("  schedule      every {} minutes", interval);
    } else {
        println!("  schedule      manual");
    }
    println!("  observations  {}", count);
    if let Some(error) = &product.last_error {
        println!("  last error    {} ({} in a row)", error, product.error_count);
    }
    if let Some(state) = ctx.product_manager.alerts().load_state(&product.id).await? {
        println!(
            "  last alert    {} at {}",
            state.last_notified_price,
            state.last_notified_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
        );
    }

    Ok(())
}

fn print_check(result: &ProductCheckResult) {
    match (result.success, result.price) {
        (true, Some(price)) => {
            let change = result
                .previous_price
                .map(|previous| format!(" ({})", format_change(price - previous)))
                .unwrap_or_default();
            let alert = result
                .alert
                .map(|kind| format!(" [{} alert, {} sent]", kind, result.notifications_sent))
                .unwrap_or_default();
            println!("{}: {}{}{}", result.product_name, price, change, alert);
        }
        _ => println!(
            "{}: failed: {}{}",
            result.product_name,
            result.error.as_deref().unwrap_or("unknown error"),
            if result.retryable { "" } else { " (fix the product before the next check)" }
        ),
    }
}

/// Finds a product by id, unique id prefix, or URL.
async fn resolve(ctx: &AppContext, key: &str) -> Result<Product> {
    if let Some(product) = ctx.product_manager.find_product(key).await? {
        return Ok(product);
    }

    let products = ctx.product_manager.list_products().await?;
    let matches: Vec<&Product> = products
        .iter()
        .filter(|p| p.id.starts_with(key) || p.url == key)
        .collect();

    match matches.as_slice() {
        [product] => Ok((*product).clone()),
        [] => bail!("No product matches '{}'", key),
        _ => bail!("'{}' matches {} products, use a longer id", key, matches.len()),
    }
}

fn confirm(yes: bool, what: &str) -> Result<()> {
    if !yes {
        bail!("{}; pass --yes to continue", what);
    }
    Ok(())
}

fn money(value: Option<Decimal>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn short_id(id: &str) -> &str {
    &id[..id.len().min(8)]
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max - 1).collect();
        format!("{}…", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_add() {
        let cli = Cli::try_parse_from([
            "price-tracker",
            "add",
            "https://shop.example.com/kettle",
            "--name",
            "Kettle",
            "--target",
            "39.99",
            "--manual",
        ])
        .unwrap();

        match cli.command {
            Commands::Add {
                url,
                name,
                target,
                manual,
                ..
            } => {
                assert_eq!(url, "https://shop.example.com/kettle");
                assert_eq!(name, "Kettle");
                assert_eq!(target, Some("39.99".parse().unwrap()));
                assert!(manual);
            }
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn test_update_flags_conflict() {
        let result = Cli::try_parse_from([
            "price-tracker",
            "update",
            "abc",
            "--target",
            "10",
            "--clear-target",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_database_flag() {
        let cli = Cli::try_parse_from(["price-tracker", "list", "--database", "/tmp/other.db"]).unwrap();
        assert_eq!(cli.database, Some(PathBuf::from("/tmp/other.db")));
    }

    #[test]
    fn test_helpers() {
        assert_eq!(money(None), "-");
        assert_eq!(money(Some("5".parse().unwrap())), "5");
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(truncate("Noise Cancelling Headphones", 10), "Noise Can…");
        assert!(confirm(false, "reset").is_err());
        assert!(confirm(true, "reset").is_ok());
    }
}
