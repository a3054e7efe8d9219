//! Command-line entry point for inspecting and editing an org unit store.
//!
//! # Responsibility
//! - Map one subcommand to one core service operation.
//! - Print results as JSON `{id, name, code, parent_id}` records.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use orgunit_core::db::open_db;
use orgunit_core::{
    default_log_level, init_logging, EngineConfig, NewUnit, SqliteUnitRepository, UnitId,
    UnitService,
};
use serde_json::to_value;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "orgunit")]
#[command(about = "Organizational unit hierarchy store", version)]
struct Cli {
    /// SQLite database file
    #[arg(long, env = "ORGUNIT_DB", default_value = "orgunits.sqlite3")]
    db: PathBuf,

    /// Log level (trace|debug|info|warn|error)
    #[arg(long, env = "ORGUNIT_LOG_LEVEL")]
    log_level: Option<String>,

    /// Absolute directory for rolling log files; logging is off when unset
    #[arg(long, env = "ORGUNIT_LOG_DIR")]
    log_dir: Option<String>,

    /// Abort traversals that visit more than this many units
    #[arg(long, env = "ORGUNIT_MAX_VISITED")]
    max_visited: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a unit
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        code: String,
        /// Parent unit id; omit for a root
        #[arg(long)]
        parent: Option<UnitId>,
    },
    /// Show one unit
    Get { id: UnitId },
    /// Change a unit's display name
    Rename { id: UnitId, name: String },
    /// Change a unit's business code
    Recode { id: UnitId, code: String },
    /// Move a unit under another parent, or to root level
    Move {
        id: UnitId,
        #[arg(long)]
        parent: Option<UnitId>,
    },
    /// Delete a unit without children
    Remove { id: UnitId },
    /// List all ancestors, nearest first
    Ancestors { id: UnitId },
    /// List all descendants, breadth-first
    Descendants { id: UnitId },
    /// List direct children
    Children { id: UnitId },
    /// List root units
    Roots,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(log_dir) = cli.log_dir.as_deref() {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, log_dir).map_err(anyhow::Error::msg)?;
    }

    let conn = open_db(&cli.db)
        .with_context(|| format!("failed to open database `{}`", cli.db.display()))?;
    let repo = SqliteUnitRepository::try_new(&conn)?;
    let config = EngineConfig {
        max_visited: cli.max_visited,
    };
    let service = UnitService::load(repo, config)?;

    let output = match cli.command {
        Commands::Create { name, code, parent } => {
            let mut input = NewUnit::new(name, code);
            input.parent_id = parent;
            to_value(service.create_unit(input)?)?
        }
        Commands::Get { id } => to_value(service.get_unit(id)?)?,
        Commands::Rename { id, name } => to_value(service.rename_unit(id, name)?)?,
        Commands::Recode { id, code } => to_value(service.set_code(id, code)?)?,
        Commands::Move { id, parent } => to_value(service.set_parent(id, parent)?)?,
        Commands::Remove { id } => to_value(service.remove_unit(id)?)?,
        Commands::Ancestors { id } => to_value(service.ancestors_of(id)?)?,
        Commands::Descendants { id } => to_value(service.descendants_of(id)?)?,
        Commands::Children { id } => to_value(service.children_of(id)?)?,
        Commands::Roots => to_value(service.roots()?)?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Cli, Commands};
    use clap::{CommandFactory, Parser};

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn move_without_parent_targets_root_level() {
        let id = uuid::Uuid::new_v4().to_string();
        let cli = Cli::try_parse_from(["orgunit", "--db", "x.db", "move", id.as_str()]).unwrap();
        assert!(matches!(cli.command, Commands::Move { parent: None, .. }));
    }

    #[test]
    fn invalid_unit_id_is_rejected() {
        assert!(Cli::try_parse_from(["orgunit", "ancestors", "not-a-uuid"]).is_err());
    }
}
