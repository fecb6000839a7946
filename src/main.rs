use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use nepremicnine_bot::app::ports::{Notifier, PageSource};
use nepremicnine_bot::bot::{Bot, BotOptions};
use nepremicnine_bot::config::Config;
use nepremicnine_bot::db::SqliteStore;
use nepremicnine_bot::discord::{mask_token, DiscordNotifier};
use nepremicnine_bot::infra::browserless::BrowserlessPageSource;
use nepremicnine_bot::infra::http_client::HttpPageSource;
use nepremicnine_bot::infra::log_notifier::LogNotifier;
use nepremicnine_bot::parser::ListingParser;
use nepremicnine_bot::rate_limiter::{Limits, RateLimiter};
use nepremicnine_bot::spider::{Spider, SpiderReport};
use nepremicnine_bot::storage::{InMemoryStore, ListingStore};
use nepremicnine_bot::{logging, metrics};

#[derive(Parser)]
#[command(name = "nepremicnine_bot")]
#[command(about = "Watches nepremicnine.net searches and posts new listings to Discord")]
#[command(version)]
struct Cli {
    /// Path to the TOML config file (defaults to ./config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the scheduled bot
    Run,
    /// Scrape once and announce what was found
    Scrape {
        /// Log announcements instead of posting, and keep nothing
        #[arg(long)]
        dry_run: bool,
        /// Override the configured page limit
        #[arg(long)]
        max_pages: Option<u32>,
    },
    /// Create the database tables
    Migrate {
        /// Drop all listing data first
        #[arg(long)]
        reset: bool,
    },
    /// Check the database, browser service and Discord connection
    Check,
    /// Show recently seen listings
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show the price history of a listing
    History {
        listing_id: String,
    },
}

fn build_page_source(config: &Config) -> anyhow::Result<Arc<dyn PageSource>> {
    let timeout = Duration::from_secs(config.scraper.timeout_seconds);
    Ok(match &config.scraper.chrome_url {
        Some(chrome_url) => Arc::new(BrowserlessPageSource::new(chrome_url, timeout)?),
        None => Arc::new(HttpPageSource::new(&config.scraper.user_agent, timeout)?),
    })
}

fn build_notifier(config: &Config, dry_run: bool) -> anyhow::Result<Arc<dyn Notifier>> {
    if dry_run {
        return Ok(Arc::new(LogNotifier));
    }
    match config.discord.credentials() {
        Some((token, channel_id)) => Ok(Arc::new(DiscordNotifier::new(
            token,
            channel_id,
            &config.discord.api_base,
        )?)),
        None => {
            warn!("DISCORD_TOKEN or DISCORD_CHANNEL_ID not set, announcements go to the log");
            Ok(Arc::new(LogNotifier))
        }
    }
}

fn build_spider(
    config: &Config,
    store: Arc<dyn ListingStore>,
    max_pages: Option<u32>,
) -> anyhow::Result<Spider> {
    let limiter = RateLimiter::new(Limits {
        requests_per_min: config.scraper.requests_per_min,
        burst: config.scraper.burst,
    });
    Ok(Spider::new(
        build_page_source(config)?,
        store,
        limiter,
        max_pages.unwrap_or(config.scraper.max_pages),
    ))
}

fn print_report(report: &SpiderReport) {
    println!("\n📊 Scrape results:");
    println!("   Pages visited: {}", report.pages_visited);
    println!("   Listings seen: {}", report.listings_seen);
    println!("   New: {}", report.new_listings.len());
    println!("   Price changes: {}", report.price_changes.len());
    println!("   Unchanged: {}", report.unchanged);
    if !report.errors.is_empty() {
        println!("\n⚠️  Errors encountered:");
        for error in &report.errors {
            println!("   - {}", error);
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn check(config: &Config) -> anyhow::Result<()> {
    let mut failures = 0;

    println!("🗄️  Database ({})", config.database.path.display());
    match SqliteStore::open(&config.database.path) {
        Ok(store) => match store.count_listings().await {
            Ok(count) => println!("   ✅ {} listings stored", count),
            Err(e) => {
                failures += 1;
                println!("   ❌ {}", e);
            }
        },
        Err(e) => {
            failures += 1;
            println!("   ❌ {}", e);
        }
    }

    match &config.scraper.chrome_url {
        Some(chrome_url) => {
            println!("🌐 Browser service ({})", chrome_url);
            let browser = BrowserlessPageSource::new(
                chrome_url,
                Duration::from_secs(config.scraper.timeout_seconds),
            )?;
            match browser.ping().await {
                Ok(version) => println!("   ✅ {}", version.browser),
                Err(e) => {
                    failures += 1;
                    println!("   ❌ {}", e);
                }
            }
        }
        None => println!("🌐 Browser service: not configured, pages are fetched directly"),
    }

    let url = config.search.page_url(1);
    println!("🔎 Search page ({})", url);
    let source = build_page_source(config)?;
    match source.fetch(&url).await {
        Ok(html) => match ListingParser::parse_page(&html, &url) {
            Ok(page) => println!(
                "   ✅ {} listings parsed, {} cards skipped",
                page.listings.len(),
                page.errors.len()
            ),
            Err(e) => {
                failures += 1;
                println!("   ❌ {}", e);
            }
        },
        Err(e) => {
            failures += 1;
            println!("   ❌ {}", e);
        }
    }

    match config.discord.credentials() {
        Some((token, channel_id)) => {
            println!("💬 Discord (token {}, channel {})", mask_token(token), channel_id);
            let discord = DiscordNotifier::new(token, channel_id, &config.discord.api_base)?;
            match discord.current_user().await {
                Ok(user) => println!("   ✅ Logged in as {} (ID: {})", user.username, user.id),
                Err(e) => {
                    failures += 1;
                    println!("   ❌ {}", e);
                }
            }
        }
        None => println!("💬 Discord: not configured"),
    }

    if failures > 0 {
        bail!("{} check(s) failed", failures);
    }
    println!("\n✅ All checks passed");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let _log_guard = logging::init_logging(&config.logging.dir);
    metrics::init_metrics(config.metrics.port);

    match cli.command {
        Commands::Run => {
            println!("🚀 Starting nepremicnine bot...");
            let store = SqliteStore::open(&config.database.path)?;
            let spider = build_spider(&config, Arc::new(store), None)?;
            let notifier = build_notifier(&config, false)?;
            let bot = Bot::new(
                spider,
                config.search.clone(),
                notifier,
                BotOptions::from_config(&config),
            );
            bot.run(shutdown_signal()).await?;
            info!("Bot stopped");
        }
        Commands::Scrape { dry_run, max_pages } => {
            println!("🔄 Scraping {}", config.search.page_url(1));
            let store: Arc<dyn ListingStore> = if dry_run {
                Arc::new(InMemoryStore::new())
            } else {
                Arc::new(SqliteStore::open(&config.database.path)?)
            };
            let spider = build_spider(&config, store, max_pages)?;
            let notifier = build_notifier(&config, dry_run)?;
            notifier.wait_until_ready().await?;
            let bot = Bot::new(
                spider,
                config.search.clone(),
                notifier,
                BotOptions::from_config(&config),
            );
            let report = bot.run_once().await?;
            print_report(&report);
        }
        Commands::Migrate { reset } => {
            let store = SqliteStore::open(&config.database.path)?;
            if reset {
                println!("🧨 Dropping and recreating tables in {}", store.path().display());
                store.reset()?;
            }
            println!("✅ Database ready at {}", store.path().display());
        }
        Commands::Check => {
            check(&config).await?;
        }
        Commands::List { limit } => {
            let store = SqliteStore::open(&config.database.path)?;
            let listings = store.recent_listings(limit).await?;
            if listings.is_empty() {
                println!("No listings stored yet");
            }
            for stored in listings {
                let l = &stored.listing;
                println!(
                    "{:>10}  {:>10.2} €  {:>8}  {}  {}",
                    l.id,
                    l.price,
                    l.size_m2.map(|s| format!("{s:.1} m²")).unwrap_or_default(),
                    stored.accessed_time.format("%Y-%m-%d %H:%M"),
                    l.title
                );
            }
        }
        Commands::History { listing_id } => {
            let store = SqliteStore::open(&config.database.path)?;
            let Some(stored) = store.get_listing(&listing_id).await? else {
                bail!("No listing with id {}", listing_id);
            };
            println!("{}\n{}", stored.listing.title, stored.listing.url);
            for point in store.price_history(&listing_id).await? {
                println!(
                    "   {}  {:.2} €",
                    point.accessed_time.format("%Y-%m-%d %H:%M"),
                    point.price
                );
            }
        }
    }
    Ok(())
}
