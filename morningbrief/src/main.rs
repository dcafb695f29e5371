/*
morningbrief - CLI for the daily brief
Loads configuration, opens the store and runs a single digest operation.
*/

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::{init_db_pool, Config};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use morningbrief::{
    DigestManager, KeyValueStore, MemoryStore, NewsItemPatch, SqliteStore, SystemClock,
};

#[derive(Parser, Debug)]
#[command(name = "morningbrief", about = "Manage and render the daily three-section news brief")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use an in-memory store instead of the SQLite database
    #[arg(long)]
    ephemeral: bool,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the stored digest as JSON
    Show,
    /// Replace one news slot
    Update {
        /// policy, industry or tech
        category: String,
        /// Slot number (1-3)
        slot: usize,
        title: String,
        link: String,
    },
    /// Patch a whole section from a JSON array of {title?, link?} objects
    UpdateCategory {
        category: String,
        /// e.g. '[{"title":"A"},null,{"link":"https://x"}]'
        items: String,
    },
    /// Write the digest to a timestamped JSON file
    Export {
        /// Target directory (defaults to brief.export_dir)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },
    /// Replace the stored digest with the contents of a JSON file
    Import { file: PathBuf },
    /// Remove the stored digest
    Clear,
    /// Print the API-shaped digest
    Api,
    /// Print the plain-text chat message
    Wechat,
    /// Print the Markdown card
    Markdown,
    /// Print whether the digest is dated today
    IsToday,
    /// Print the last update time
    LastUpdate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so rendered output on stdout can be piped.
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    // Resolve config paths
    let default_path = PathBuf::from("config.default.toml");
    let override_path = if let Some(p) = args.config {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow::anyhow!("Config file not found: {}", p.display()));
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() { Some(p) } else { None }
    };

    let config = Config::load_with_defaults(Some(default_path.as_path()), override_path.as_deref())
        .await
        .context("failed to load configuration")?;
    info!(default = ?default_path, override = ?override_path, "configuration loaded");

    let store: Arc<dyn KeyValueStore> = if args.ephemeral {
        info!("using in-memory store");
        match config.storage.quota_bytes {
            Some(quota) => Arc::new(MemoryStore::with_quota(quota)),
            None => Arc::new(MemoryStore::new()),
        }
    } else {
        let db_path = &config.storage.path;
        info!(db_path = %db_path, "opening SQLite store");
        let pool = init_db_pool(db_path).await?;
        Arc::new(SqliteStore::open(pool).await?)
    };

    let manager = DigestManager::new(store, Arc::new(SystemClock), &config)?;
    run(&manager, args.command).await
}

async fn run(manager: &DigestManager, command: Command) -> Result<()> {
    match command {
        Command::Show => {
            let digest = manager.load_data().await;
            println!("{}", serde_json::to_string_pretty(&digest)?);
        }
        Command::Update {
            category,
            slot,
            title,
            link,
        } => {
            manager
                .update_single_news(&category, slot, &title, &link)
                .await?;
            info!(%category, slot, "news updated");
        }
        Command::UpdateCategory { category, items } => {
            let patches: Vec<Option<NewsItemPatch>> = serde_json::from_str(&items)
                .context("items must be a JSON array of {title, link} objects or nulls")?;
            manager.update_category_news(&category, &patches).await?;
            info!(%category, count = patches.len(), "section updated");
        }
        Command::Export { dir } => {
            let dir = dir.unwrap_or_else(|| PathBuf::from(&manager.brief().export_dir));
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("failed to create export dir {}", dir.display()))?;
            let filename = manager.export_to_json(&dir).await?;
            println!("{}", filename);
        }
        Command::Import { file } => {
            let imported = manager.import_from_json(&file).await?;
            if imported.digest().is_none() {
                warn!("imported file does not have the digest shape; it is stored but not used");
            }
            println!("{}", serde_json::to_string_pretty(&imported)?);
        }
        Command::Clear => manager.clear_data().await?,
        Command::Api => {
            let api = manager.generate_api_data().await;
            println!("{}", serde_json::to_string_pretty(&api)?);
        }
        Command::Wechat => println!("{}", manager.generate_wechat_message().await),
        Command::Markdown => print!("{}", manager.generate_markdown().await),
        Command::IsToday => println!("{}", manager.is_today().await),
        Command::LastUpdate => println!("{}", manager.get_last_update_time().await),
    }
    Ok(())
}
