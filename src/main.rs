//! Binary entrypoint for the paragon-engine operator CLI.
//!
//! Commands:
//! - `init` - write a starter `config.toml` and create the data directory
//! - `show <character>` - print a character's progression
//! - `grant-xp <character> <amount> [--source <s>]` - grant character experience
//! - `grant-skill-xp <character> <skill> <amount>` - grant skill experience
//! - `allocate-attribute <character> <attribute>` - spend one attribute point
//! - `allocate-skill <character> <skill>` - spend one skill point
//! - `skills <character> [--limit n] [--offset n]` - page through skill progress
//! - `paragon <character>` - print paragon state
//! - `grant-paragon-xp <character> <amount>` - grant paragon experience
//! - `distribute <character> <stat=points>...` - spend paragon points
//! - `paragon-stats <character>` - paragon totals and global standing
//! - `prestige <character>` - prestige standing and eligibility
//! - `prestige-reset <character>` - trade the character level for a multiplier
//! - `prestige-bonuses <character>` - bonus multipliers earned so far
//! - `mastery <character> [<type>]` - every track, or one track's progress
//! - `mastery-rewards <character> <type>` - rewards unlocked on one track
//! - `grant-mastery-xp <character> <type> <amount>` - grant mastery experience
//! - `events [--limit n]` - newest journaled events
//!
//! Every engine call runs on the blocking pool under the configured deadline
//! and prints its result as JSON on stdout. Logs go to stderr.
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{debug, info};
use serde::Serialize;
use uuid::Uuid;

use paragon_engine::config::Config;
use paragon_engine::growth::{GrowthEngine, GrowthError, StatAllocation};
use paragon_engine::metrics;

#[derive(Parser)]
#[command(name = "paragon-engine")]
#[command(about = "Character progression and paragon point engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration and create the data directory
    Init,
    #[command(flatten)]
    Engine(EngineCommand),
}

/// Commands that run against an open engine.
#[derive(Subcommand)]
enum EngineCommand {
    /// Show a character's progression (created on first access)
    Show { character: Uuid },
    /// Grant character experience
    GrantXp {
        character: Uuid,
        amount: u64,
        /// Free-form label recorded in the level-up event
        #[arg(short, long, default_value = "admin")]
        source: String,
    },
    /// Grant experience to one skill
    GrantSkillXp {
        character: Uuid,
        skill: String,
        amount: u64,
    },
    /// Spend one attribute point
    AllocateAttribute { character: Uuid, attribute: String },
    /// Spend one skill point to advance a skill one level
    AllocateSkill { character: Uuid, skill: String },
    /// List skill progress, most recently updated first
    Skills {
        character: Uuid,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        #[arg(short, long, default_value_t = 0)]
        offset: usize,
    },
    /// Show paragon state (created on first access)
    Paragon { character: Uuid },
    /// Grant paragon experience
    GrantParagonXp { character: Uuid, amount: u64 },
    /// Spend paragon points, e.g. `distribute <id> strength=3 vitality=2`
    Distribute {
        character: Uuid,
        #[arg(required = true, value_parser = parse_allocation)]
        allocations: Vec<StatAllocation>,
    },
    /// Paragon totals, per-stat points and global rank
    ParagonStats { character: Uuid },
    /// Prestige standing and whether a reset is allowed
    Prestige { character: Uuid },
    /// Reset the character to level 1 for a permanent bonus multiplier
    PrestigeReset { character: Uuid },
    /// Bonus multipliers earned from prestige resets
    PrestigeBonuses { character: Uuid },
    /// Mastery levels for every track, or progress on one
    Mastery {
        character: Uuid,
        /// raid, dungeon, world_boss, pvp or exploration
        mastery_type: Option<String>,
    },
    /// Rewards unlocked on one mastery track
    MasteryRewards { character: Uuid, mastery_type: String },
    /// Grant experience to one mastery track
    GrantMasteryXp {
        character: Uuid,
        mastery_type: String,
        amount: u64,
    },
    /// Print the newest journaled events
    Events {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

fn parse_allocation(raw: &str) -> Result<StatAllocation, String> {
    let (stat, points) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected <stat>=<points>, got '{}'", raw))?;
    let points = points
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid points in '{}': {}", raw, e))?;
    Ok(StatAllocation::new(stat.trim(), points))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Init => {
            init_logging(&None, cli.verbose);
            return init(&cli.config).await;
        }
        Commands::Engine(command) => command,
    };

    let config = Config::load(&cli.config).await?;
    config.validate()?;
    init_logging(&Some(config.clone()), cli.verbose);

    let deadline = config.engine.request_timeout();
    let engine = Arc::new(GrowthEngine::open(&config)?);

    match command {
        EngineCommand::Show { character } => {
            let progression = run(&engine, deadline, move |e| {
                e.progression().get_progression(character)
            })
            .await?;
            print_json(&progression)?;
        }
        EngineCommand::GrantXp {
            character,
            amount,
            source,
        } => {
            let progression = run(&engine, deadline, move |e| {
                e.progression().add_experience(character, amount, &source)?;
                e.progression().get_progression(character)
            })
            .await?;
            print_json(&progression)?;
        }
        EngineCommand::GrantSkillXp {
            character,
            skill,
            amount,
        } => {
            let page = run(&engine, deadline, move |e| {
                e.progression()
                    .add_skill_experience(character, &skill, amount)?;
                e.progression().get_skill_progression(character, 20, 0)
            })
            .await?;
            print_json(&page)?;
        }
        EngineCommand::AllocateAttribute {
            character,
            attribute,
        } => {
            let progression = run(&engine, deadline, move |e| {
                e.progression()
                    .allocate_attribute_point(character, &attribute)?;
                e.progression().get_progression(character)
            })
            .await?;
            print_json(&progression)?;
        }
        EngineCommand::AllocateSkill { character, skill } => {
            let page = run(&engine, deadline, move |e| {
                e.progression().allocate_skill_point(character, &skill)?;
                e.progression().get_skill_progression(character, 20, 0)
            })
            .await?;
            print_json(&page)?;
        }
        EngineCommand::Skills {
            character,
            limit,
            offset,
        } => {
            let page = run(&engine, deadline, move |e| {
                e.progression()
                    .get_skill_progression(character, limit, offset)
            })
            .await?;
            print_json(&page)?;
        }
        EngineCommand::Paragon { character } => {
            let paragon = run(&engine, deadline, move |e| {
                e.paragon().get_paragon_levels(character)
            })
            .await?;
            print_json(&paragon)?;
        }
        EngineCommand::GrantParagonXp { character, amount } => {
            let paragon = run(&engine, deadline, move |e| {
                e.paragon().add_paragon_experience(character, amount)?;
                e.paragon().get_paragon_levels(character)
            })
            .await?;
            print_json(&paragon)?;
        }
        EngineCommand::Distribute {
            character,
            allocations,
        } => {
            let paragon = run(&engine, deadline, move |e| {
                e.paragon()
                    .distribute_paragon_points(character, &allocations)
            })
            .await?;
            print_json(&paragon)?;
        }
        EngineCommand::ParagonStats { character } => {
            let stats = run(&engine, deadline, move |e| {
                e.paragon().get_paragon_stats(character)
            })
            .await?;
            print_json(&stats)?;
        }
        EngineCommand::Prestige { character } => {
            let info = run(&engine, deadline, move |e| {
                e.prestige().get_prestige_info(character)
            })
            .await?;
            print_json(&info)?;
        }
        EngineCommand::PrestigeReset { character } => {
            let info = run(&engine, deadline, move |e| e.prestige().reset_prestige(character))
                .await?;
            print_json(&info)?;
        }
        EngineCommand::PrestigeBonuses { character } => {
            let bonuses = run(&engine, deadline, move |e| {
                e.prestige().get_prestige_bonuses(character)
            })
            .await?;
            print_json(&bonuses)?;
        }
        EngineCommand::Mastery {
            character,
            mastery_type: Some(mastery_type),
        } => {
            let progress = run(&engine, deadline, move |e| {
                e.mastery().get_mastery_progress(character, &mastery_type)
            })
            .await?;
            print_json(&progress)?;
        }
        EngineCommand::Mastery {
            character,
            mastery_type: None,
        } => {
            let levels = run(&engine, deadline, move |e| {
                e.mastery().get_mastery_levels(character)
            })
            .await?;
            print_json(&levels)?;
        }
        EngineCommand::MasteryRewards {
            character,
            mastery_type,
        } => {
            let rewards = run(&engine, deadline, move |e| {
                e.mastery().get_mastery_rewards(character, &mastery_type)
            })
            .await?;
            print_json(&rewards)?;
        }
        EngineCommand::GrantMasteryXp {
            character,
            mastery_type,
            amount,
        } => {
            let progress = run(&engine, deadline, move |e| {
                e.mastery()
                    .add_mastery_experience(character, &mastery_type, amount)
            })
            .await?;
            print_json(&progress)?;
        }
        EngineCommand::Events { limit } => {
            let events = run(&engine, deadline, move |e| e.store().recent_events(limit)).await?;
            print_json(&events)?;
        }
    }

    debug!("metrics: {}", serde_json::to_string(&metrics::snapshot())?);
    Ok(())
}

async fn init(config_path: &str) -> Result<()> {
    if Path::new(config_path).exists() {
        info!("Keeping existing configuration at {}", config_path);
    } else {
        Config::create_default(config_path).await?;
        println!("Created default configuration: {}", config_path);
    }
    let config = Config::load(config_path).await?;
    config.validate()?;
    tokio::fs::create_dir_all(&config.storage.data_dir)
        .await
        .map_err(|e| anyhow!("Failed to create {}: {}", config.storage.data_dir, e))?;
    // Opening once lays down the sled trees.
    GrowthEngine::open(&config)?;
    println!("Initialized growth store at {}", config.storage.data_dir);
    Ok(())
}

/// Run one engine operation on the blocking pool, bounded by `deadline`.
async fn run<T, F>(engine: &Arc<GrowthEngine>, deadline: Duration, op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&GrowthEngine) -> Result<T, GrowthError> + Send + 'static,
{
    let engine = engine.clone();
    let task = tokio::task::spawn_blocking(move || op(&engine));
    match tokio::time::timeout(deadline, task).await {
        Ok(joined) => {
            let outcome = joined.map_err(|e| anyhow!("engine task failed: {}", e))?;
            Ok(outcome?)
        }
        Err(_) => Err(GrowthError::Timeout.into()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|cfg| cfg.logging.level.parse::<log::LevelFilter>().ok())
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
        // Only echo to the console when someone is watching it
        let is_tty = atty::is(atty::Stream::Stderr);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!(
                "{} [{}] {}: {}",
                ts,
                record.level(),
                record.target(),
                record.args()
            );
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
            writeln!(
                fmt,
                "{} [{}] {}: {}",
                ts,
                record.level(),
                record.target(),
                record.args()
            )
        });
    }
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_arguments_parse() {
        let parsed = parse_allocation("strength = 3").unwrap();
        assert_eq!(parsed, StatAllocation::new("strength", 3));
        assert!(parse_allocation("strength").is_err());
        assert!(parse_allocation("strength=-1").is_err());
    }

    #[test]
    fn cli_accepts_repeated_allocations() {
        let id = Uuid::new_v4().to_string();
        let cli = Cli::try_parse_from([
            "paragon-engine",
            "distribute",
            id.as_str(),
            "strength=2",
            "vitality=1",
        ])
        .unwrap();
        match cli.command {
            Commands::Engine(EngineCommand::Distribute { allocations, .. }) => {
                assert_eq!(allocations.len(), 2)
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn mastery_type_is_optional() {
        let id = Uuid::new_v4().to_string();
        let cli = Cli::try_parse_from(["paragon-engine", "mastery", id.as_str()]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Engine(EngineCommand::Mastery {
                mastery_type: None,
                ..
            })
        ));
        let cli = Cli::try_parse_from([
            "paragon-engine",
            "grant-mastery-xp",
            id.as_str(),
            "world_boss",
            "500",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Engine(EngineCommand::GrantMasteryXp { amount: 500, .. })
        ));
    }

    #[tokio::test]
    async fn operations_past_the_deadline_time_out() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = dir.path().to_string_lossy().into_owned();
        let engine = Arc::new(GrowthEngine::open(&config).unwrap());
        let err = run(&engine, Duration::from_millis(10), |_| {
            std::thread::sleep(Duration::from_millis(200));
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GrowthError>(),
            Some(GrowthError::Timeout)
        ));
    }
}
