//! Binary entrypoint for the realmcore CLI.
//!
//! Commands:
//! - `init` - write a starter `realmcore.toml` and create the data directory
//! - `catalog [--path <file>]` - load a static data snapshot and report data errors
//! - `items --owner <guid>` - list persisted items of a character
//! - `reputation --player <guid>` - show a character's faction standings
//!
//! See the library crate docs for module-level details: `realmcore::`.
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use realmcore::config::Config;
use realmcore::realm::{
    reputation_to_rank, Catalog, Outbox, PlayerGuid, ReputationMgr, SledCharacterStore,
};

#[derive(Parser)]
#[command(name = "realmcore")]
#[command(about = "Item lifecycle and reputation engine for a game realm server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "realmcore.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Validate a static data snapshot
    Catalog {
        /// Snapshot file; defaults to `[catalog] path` from the config
        #[arg(short, long)]
        path: Option<String>,
    },
    /// List the persisted items of a character
    Items {
        /// Owning character guid
        #[arg(short, long)]
        owner: u32,
    },
    /// Show persisted faction standings of a character
    Reputation {
        /// Character guid
        #[arg(short, long)]
        player: u32,
        /// Race mask used to resolve base standings
        #[arg(long, default_value_t = 1)]
        race_mask: u32,
        /// Class mask used to resolve base standings
        #[arg(long, default_value_t = 1)]
        class_mask: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&config, cli.verbose);

    match cli.command {
        Commands::Init => {
            info!("Initializing new realmcore configuration");
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);

            let cfg = Config::default();
            tokio::fs::create_dir_all(&cfg.storage.data_dir)
                .await
                .with_context(|| format!("Failed to create data directory {}", cfg.storage.data_dir))?;
            info!("Data directory ready at {}", cfg.storage.data_dir);
        }
        Commands::Catalog { path } => {
            let config = require_config(config, &cli.config)?;
            let path = path.unwrap_or(config.catalog.path);
            let catalog = Catalog::load(&path).with_context(|| format!("Failed to load catalog {}", path))?;
            let problems = catalog.validate();
            if problems.is_empty() {
                println!("Catalog {} OK", path);
            } else {
                for problem in &problems {
                    warn!("{}", problem);
                    println!("  - {}", problem);
                }
                return Err(anyhow!("Catalog {} has {} problem(s)", path, problems.len()));
            }
        }
        Commands::Items { owner } => {
            let config = require_config(config, &cli.config)?;
            let catalog = Catalog::load(&config.catalog.path).ok();
            let store = SledCharacterStore::open(config.storage.characters_path())?;
            let rows = store.load_item_rows(PlayerGuid(owner))?;
            println!("Items of character {} ({}):", owner, rows.len());
            for row in rows {
                let name = catalog
                    .as_ref()
                    .and_then(|c| c.item_template(row.entry))
                    .map(|t| t.name.clone())
                    .unwrap_or_else(|| "<unknown template>".to_string());
                println!(
                    "  #{} entry {} \"{}\" x{} durability {} duration {}",
                    row.guid, row.entry, name, row.count, row.durability, row.duration
                );
            }
        }
        Commands::Reputation {
            player,
            race_mask,
            class_mask,
        } => {
            let config = require_config(config, &cli.config)?;
            let catalog = Catalog::load(&config.catalog.path)
                .with_context(|| format!("Failed to load catalog {}", config.catalog.path))?;
            let store = SledCharacterStore::open(config.storage.characters_path())?;
            let rows = store.load_reputation_rows(PlayerGuid(player))?;

            let mut mgr = ReputationMgr::new(
                PlayerGuid(player),
                race_mask,
                class_mask,
                config.rates.reputation_rates(),
            );
            let mut outbox = Outbox::new();
            outbox.set_loading(true);
            mgr.load_from_db(&rows, &catalog, &mut outbox);

            println!("Reputation of character {}:", player);
            for state in mgr.states() {
                let Some(faction) = catalog.faction(state.id) else {
                    continue;
                };
                let total = mgr.reputation_of(faction);
                println!(
                    "  [{:3}] {:<32} {:>6} {:<10} flags {:#06x}",
                    state.reputation_list_id,
                    faction.name,
                    total,
                    reputation_to_rank(total).to_string(),
                    state.flags.bits()
                );
            }
            println!(
                "Visible {} / Honored {} / Revered {} / Exalted {}",
                mgr.visible_faction_count(),
                mgr.honored_faction_count(),
                mgr.revered_faction_count(),
                mgr.exalted_faction_count()
            );
        }
    }

    Ok(())
}

fn require_config(config: Option<Config>, path: &str) -> Result<Config> {
    config.ok_or_else(|| anyhow!("Config file {} missing or invalid; run `realmcore init` first", path))
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::{IsTerminal, Write};
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|cfg| cfg.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|cfg| cfg.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });

    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        let is_tty = std::io::stderr().is_terminal();
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
