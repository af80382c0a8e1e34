use clap::{value_parser, ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::fetch::{RetryPolicy, DEFAULT_BASE_URL};
use crate::store::UpsertMode;

#[derive(Parser, Debug)]
#[command(name = "planetarium")]
#[command(version, about = "Ingest planets, climates and terrains from SWAPI into SQLite")]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// SQLite database file (defaults to the platform data directory)
    #[arg(long, global = true, env = "PLANETARIUM_DB")]
    pub database: Option<PathBuf>,

    /// More log output (-v info, -vv debug, -vvv trace); RUST_LOG wins when set
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only print errors and the final summary
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Settings for the default ingestion pass
    #[command(flatten)]
    pub ingest: IngestArgs,
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    /// Upstream planet listing
    #[arg(long, env = "PLANETARIUM_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Records requested per page
    #[arg(long, env = "PLANETARIUM_PAGE_SIZE", default_value_t = 10,
          value_parser = value_parser!(u32).range(1..))]
    pub page_size: u32,

    /// Attempts per request before giving up
    #[arg(long, env = "PLANETARIUM_MAX_ATTEMPTS", default_value_t = 4,
          value_parser = value_parser!(u32).range(1..))]
    pub max_attempts: u32,

    /// HTTP timeout in seconds
    #[arg(long, env = "PLANETARIUM_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    /// Leave planets that already exist untouched
    #[arg(long)]
    pub skip_existing: bool,
}

impl IngestArgs {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn mode(&self) -> UpsertMode {
        if self.skip_existing {
            UpsertMode::SkipExisting
        } else {
            UpsertMode::Update
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one ingestion pass (the default when no command is given)
    Ingest(IngestArgs),

    /// List stored planets
    Planets {
        /// Case-insensitive substring of the name or population
        #[arg(short, long)]
        search: Option<String>,

        /// Only planets with this climate
        #[arg(long)]
        climate: Option<String>,

        /// Only planets with this terrain
        #[arg(long)]
        terrain: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show one planet with its climates and terrains
    Show {
        name: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List climates and how many planets use each
    Climates,

    /// List terrains and how many planets use each
    Terrains,

    /// Create a planet; unknown climates and terrains are created as needed
    AddPlanet {
        name: String,

        #[arg(short, long)]
        population: Option<String>,

        /// Climate names (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        climate: Vec<String>,

        /// Terrain names (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        terrain: Vec<String>,
    },

    /// Change a stored planet; climates and terrains are replaced only when given
    UpdatePlanet {
        name: String,

        /// New name
        #[arg(long = "name", value_name = "NEW_NAME")]
        new_name: Option<String>,

        /// New population ("unknown" clears it)
        #[arg(short, long)]
        population: Option<String>,

        /// Replacement climate names (comma-separated, "" for none)
        #[arg(short, long, value_delimiter = ',')]
        climate: Option<Vec<String>>,

        /// Replacement terrain names (comma-separated, "" for none)
        #[arg(short, long, value_delimiter = ',')]
        terrain: Option<Vec<String>>,
    },

    /// Delete a planet; its climates and terrains are kept
    DeletePlanet { name: String },

    /// Create a climate without a planet
    AddClimate { name: String },

    /// Create a terrain without a planet
    AddTerrain { name: String },
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// The command to run; no subcommand means ingest with the top-level settings
    pub fn into_command(self) -> Commands {
        match self.command {
            Some(command) => command,
            None => Commands::Ingest(self.ingest),
        }
    }
}
