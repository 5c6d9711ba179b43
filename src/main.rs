//! Binary entrypoint for the Habitquest CLI.
//!
//! Commands:
//! - `init` - write a starter `habitquest.toml` and create the ledger database
//! - `status` - print configuration and catalog summary
//! - `register <username>` / `profile <username>`
//! - `habit add|list|edit|delete`, `complete`, `history`
//! - `shop`, `buy`, `equip`, `use`
//! - `pet adopt|feed|activate|list`
//!
//! Accounts are addressed by username. Results are printed as JSON.
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use log::{info, warn};
use serde_json::{json, Value};

use habitquest::config::Config;
use habitquest::ledger::{
    HabitUpdate, Ledger, LedgerSettings, LedgerStore, SledStoreBuilder, UserRecord,
};

#[derive(Parser)]
#[command(name = "habitquest")]
#[command(about = "Progression and reward ledger for a gamified habit tracker")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "habitquest.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a default configuration and an empty ledger database
    Init,
    /// Show configuration and catalog summary
    Status,
    /// Register a new account
    Register { username: String },
    /// Show an account with level progress, inventory and pets
    Profile { username: String },
    /// Manage habits
    #[command(subcommand)]
    Habit(HabitCommand),
    /// Complete a habit for today and collect the reward
    Complete { username: String, habit_id: u64 },
    /// Completion history and per-day counts
    History {
        username: String,
        /// Only this habit
        #[arg(long)]
        habit: Option<u64>,
        /// Days covered by the per-day counts, ending today
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
    /// List shop items
    Shop {
        /// Include items outside their seasonal window
        #[arg(long)]
        all: bool,
    },
    /// Buy an item
    Buy { username: String, item_id: u64 },
    /// Equip (or unequip with --off) an owned item
    Equip {
        username: String,
        item_id: u64,
        #[arg(long)]
        off: bool,
    },
    /// Consume one unit of a boost or powerup
    Use { username: String, item_id: u64 },
    /// Manage pets
    #[command(subcommand)]
    Pet(PetCommand),
}

#[derive(Subcommand)]
enum HabitCommand {
    Add {
        username: String,
        name: String,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long, default_value_t = 1)]
        target: u32,
    },
    List {
        username: String,
    },
    Edit {
        username: String,
        habit_id: u64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Remove the description
        #[arg(long, conflicts_with = "description")]
        clear_description: bool,
        #[arg(long)]
        target: Option<u32>,
    },
    Delete {
        username: String,
        habit_id: u64,
    },
}

#[derive(Subcommand)]
enum PetCommand {
    /// Adopt a pet from an owned pet-template item
    Adopt {
        username: String,
        item_id: u64,
        name: String,
    },
    Feed {
        username: String,
        pet_id: u64,
    },
    /// Set the active pet; omit the id to clear it
    Activate {
        username: String,
        pet_id: Option<u64>,
    },
    List {
        username: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init = cli.command {
        init_logging(&None, cli.verbose);
        return run_init(&cli.config).await;
    }

    let config = Config::load(&cli.config).await?;
    init_logging(&Some(config.clone()), cli.verbose);
    let ledger = open_ledger(&config)?;

    let output = match cli.command {
        Commands::Init => return Err(anyhow!("init runs before the ledger is opened")),
        Commands::Status => {
            let catalog = ledger.list_catalog()?;
            let on_sale = ledger.available_items_at(Utc::now())?;
            json!({
                "version": env!("CARGO_PKG_VERSION"),
                "data_dir": config.storage.data_dir,
                "day_boundary_offset_minutes": ledger.settings().day_boundary.offset_minutes(),
                "starting_coins": ledger.settings().starting_coins,
                "pet_decay_per_day": ledger.settings().pet_decay_per_day,
                "catalog_items": catalog.len(),
                "items_on_sale": on_sale.len(),
            })
        }
        Commands::Register { username } => json!(ledger.register_user(&username)?),
        Commands::Profile { username } => {
            let user = resolve(&ledger, &username)?;
            json!({
                "user": user,
                "progress": ledger.level_progress(user.id)?,
                "inventory": ledger
                    .list_inventory(user.id)?
                    .into_iter()
                    .map(|entry| json!({ "item": entry.item, "owned": entry.owned }))
                    .collect::<Vec<_>>(),
                "pets": ledger.list_pets(user.id)?,
            })
        }
        Commands::Habit(command) => run_habit(&ledger, command)?,
        Commands::Complete { username, habit_id } => {
            let user = resolve(&ledger, &username)?;
            let outcome = ledger.complete_habit(user.id, habit_id)?;
            json!({
                "habit": outcome.habit,
                "completion": outcome.completion,
                "user": outcome.user,
            })
        }
        Commands::History {
            username,
            habit,
            days,
        } => {
            let user = resolve(&ledger, &username)?;
            if days < 1 {
                return Err(anyhow!("--days must be at least 1"));
            }
            let to = ledger.settings().day_boundary.day_of(Utc::now());
            let from = to - Duration::days(days - 1);
            let counts: serde_json::Map<String, Value> = ledger
                .daily_completion_counts(user.id, from, to)?
                .into_iter()
                .map(|(day, count)| (day.to_string(), json!(count)))
                .collect();
            json!({
                "completions": ledger.list_completions(user.id, habit)?,
                "daily_counts": counts,
            })
        }
        Commands::Shop { all } => {
            if all {
                json!(ledger.list_catalog()?)
            } else {
                json!(ledger.available_items_at(Utc::now())?)
            }
        }
        Commands::Buy { username, item_id } => {
            let user = resolve(&ledger, &username)?;
            json!(ledger.purchase(user.id, item_id)?)
        }
        Commands::Equip {
            username,
            item_id,
            off,
        } => {
            let user = resolve(&ledger, &username)?;
            json!(ledger.set_equipped(user.id, item_id, !off)?)
        }
        Commands::Use { username, item_id } => {
            let user = resolve(&ledger, &username)?;
            json!(ledger.use_item(user.id, item_id)?)
        }
        Commands::Pet(command) => run_pet(&ledger, command)?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run_init(path: &str) -> Result<()> {
    info!("Initializing Habitquest configuration");
    if std::path::Path::new(path).exists() {
        warn!("Configuration file {} already exists; leaving it untouched", path);
    } else {
        Config::create_default(path).await?;
        info!("Created default configuration at {}", path);
    }
    let config = Config::load(path).await?;
    let ledger = open_ledger(&config)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "config": path,
            "data_dir": config.storage.data_dir,
            "catalog_items": ledger.list_catalog()?.len(),
        }))?
    );
    Ok(())
}

fn open_ledger(config: &Config) -> Result<Ledger> {
    let mut builder = SledStoreBuilder::new(&config.storage.data_dir);
    if !config.ledger.seed_catalog {
        builder = builder.without_catalog_seed();
    }
    let store: Arc<dyn LedgerStore> = Arc::new(builder.open()?);
    let settings = LedgerSettings::try_from(&config.ledger)?;
    Ok(Ledger::new(store, settings))
}

fn resolve(ledger: &Ledger, username: &str) -> Result<UserRecord> {
    Ok(ledger.find_user(username)?)
}

fn run_habit(ledger: &Ledger, command: HabitCommand) -> Result<Value> {
    Ok(match command {
        HabitCommand::Add {
            username,
            name,
            description,
            target,
        } => {
            let user = resolve(ledger, &username)?;
            json!(ledger.create_habit(user.id, &name, description.as_deref(), target)?)
        }
        HabitCommand::List { username } => {
            let user = resolve(ledger, &username)?;
            json!(ledger.list_habits(user.id)?)
        }
        HabitCommand::Edit {
            username,
            habit_id,
            name,
            description,
            clear_description,
            target,
        } => {
            let user = resolve(ledger, &username)?;
            let description = if clear_description {
                Some(None)
            } else {
                description.map(Some)
            };
            let update = HabitUpdate {
                name,
                description,
                target,
            };
            json!(ledger.update_habit(user.id, habit_id, update)?)
        }
        HabitCommand::Delete { username, habit_id } => {
            let user = resolve(ledger, &username)?;
            ledger.delete_habit(user.id, habit_id)?;
            json!({ "deleted": habit_id })
        }
    })
}

fn run_pet(ledger: &Ledger, command: PetCommand) -> Result<Value> {
    Ok(match command {
        PetCommand::Adopt {
            username,
            item_id,
            name,
        } => {
            let user = resolve(ledger, &username)?;
            json!(ledger.create_pet(user.id, item_id, &name)?)
        }
        PetCommand::Feed { username, pet_id } => {
            let user = resolve(ledger, &username)?;
            json!(ledger.feed_pet(user.id, pet_id)?)
        }
        PetCommand::Activate { username, pet_id } => {
            let user = resolve(ledger, &username)?;
            json!(ledger.set_active_pet(user.id, pet_id)?)
        }
        PetCommand::List { username } => {
            let user = resolve(ledger, &username)?;
            json!(ledger.list_pets(user.id)?)
        }
    })
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
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
        .and_then(|cfg| cfg.logging.file.clone())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });

    if let Some(f) = log_file {
        let file = std::sync::Mutex::new(f);
        // Echo to the console only when attached to a terminal
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = file.lock() {
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
            writeln!(
                fmt,
                "{} [{}] {}",
                Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                record.level(),
                record.args()
            )
        });
    }
    let _ = builder.try_init();
}
