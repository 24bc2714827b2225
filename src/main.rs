use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use feedpoll::cache::ExpiringCache;
use feedpoll::config::Config;
use feedpoll::feed::{DocumentFetcher, Scheduler};
use feedpoll::shutdown::{self, ShutdownTrigger};
use feedpoll::storage::{Database, StoreError};
use feedpoll::util::{parse_duration, validate_feed_url};

/// Get the config directory path (~/.config/feedpoll/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedpoll"))
}

#[derive(Parser, Debug)]
#[command(
    name = "feedpoll",
    version,
    about = "Poll RSS feeds on a fixed cadence and store new posts in SQLite"
)]
struct Args {
    /// Config file (default: ~/.config/feedpoll/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding `database_path` from the config
    #[arg(long, value_name = "FILE", global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a feed to be polled
    Addfeed { name: String, url: String },
    /// List registered feeds
    Feeds,
    /// Show the most recent posts
    Browse {
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
    /// Poll feeds until interrupted
    Agg {
        /// Time between cycles, e.g. "30s" or "1m" (default: `fetch_interval` from config)
        interval: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so command output on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("feedpoll=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = match &args.db {
        Some(path) => path.clone(),
        None => {
            ensure_config_dir(&config_dir)?;
            config.database_path(&config_dir)
        }
    };
    let db = open_database(&db_path).await?;

    match args.command {
        Command::Addfeed { name, url } => add_feed(&db, &name, &url).await,
        Command::Feeds => list_feeds(&db).await,
        Command::Browse { limit } => browse(&db, limit).await,
        Command::Agg { interval } => aggregate(db, &config, interval.as_deref()).await,
    }
}

fn ensure_config_dir(config_dir: &Path) -> Result<()> {
    if config_dir.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(config_dir).context("Failed to create config directory")?;

    // User-only access; the database may hold private subscriptions
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) =
            std::fs::set_permissions(config_dir, std::fs::Permissions::from_mode(0o700))
        {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }
    Ok(())
}

async fn open_database(path: &Path) -> Result<Database> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = Database::open(path_str)
        .await
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    db.ping().await.context("Database is not responding")?;
    tracing::debug!(path = %path.display(), "Database ready");
    Ok(db)
}

async fn add_feed(db: &Database, name: &str, url: &str) -> Result<()> {
    let url = validate_feed_url(url).with_context(|| format!("Rejected feed URL {:?}", url))?;

    match db.add_feed(name.trim(), url.as_str()).await {
        Ok(feed) => {
            println!("Added feed {} ({}) with id {}", feed.name, feed.url, feed.id);
            Ok(())
        }
        Err(StoreError::Duplicate) => {
            anyhow::bail!("A feed with URL {} is already registered", url)
        }
        Err(e) => Err(e).context("Failed to add feed"),
    }
}

async fn list_feeds(db: &Database) -> Result<()> {
    let feeds = db.list_feeds().await.context("Failed to list feeds")?;
    if feeds.is_empty() {
        println!("No feeds registered. Add one with: feedpoll addfeed <NAME> <URL>");
        return Ok(());
    }

    for feed in feeds {
        println!(
            "{:>4}  {:<24}  {}  (last fetched: {})",
            feed.id,
            feed.name,
            feed.url,
            format_time(feed.last_fetched(), "never")
        );
    }
    Ok(())
}

async fn browse(db: &Database, limit: i64) -> Result<()> {
    let posts = db
        .recent_posts(limit.max(1))
        .await
        .context("Failed to load posts")?;
    if posts.is_empty() {
        println!("No posts yet. Run `feedpoll agg` to start polling.");
        return Ok(());
    }

    for post in posts {
        println!("{}", post.title);
        println!("  {}  {}", format_time(post.published(), "undated"), post.url);
        if let Some(description) = post.description.as_deref() {
            println!("  {}", truncate_chars(description, 160));
        }
        println!();
    }
    Ok(())
}

async fn aggregate(db: Database, config: &Config, interval: Option<&str>) -> Result<()> {
    let interval = match interval {
        Some(raw) => parse_duration(raw).with_context(|| format!("Invalid interval {:?}", raw))?,
        None => config.fetch_interval()?,
    };
    if interval.is_zero() {
        anyhow::bail!("Interval must be greater than zero");
    }

    let mut fetcher =
        DocumentFetcher::new(&config.fetcher_config()).context("Failed to build HTTP client")?;
    if let Some(ttl) = config.cache_ttl()? {
        fetcher = fetcher.with_cache(Arc::new(ExpiringCache::new(ttl)));
    }

    let (trigger, shutdown) = shutdown::channel();
    spawn_signal_listener(trigger)?;

    println!("Collecting feeds every {:?}", interval);
    let mut scheduler = Scheduler::new(db, fetcher, interval);
    scheduler.run(shutdown).await;
    Ok(())
}

/// Trigger shutdown on the first SIGINT or SIGTERM.
fn spawn_signal_listener(trigger: ShutdownTrigger) -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down gracefully"),
                _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down gracefully"),
            }
            trigger.trigger();
        });
    }

    #[cfg(not(unix))]
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, shutting down gracefully");
            trigger.trigger();
        }
    });

    Ok(())
}

fn format_time(time: Option<DateTime<Utc>>, missing: &str) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| missing.to_string())
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}
