//! # Bridi CLI Module
//!
//! This module implements the CLI interface for Bridi.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `init` - Initialize a new database
//! - `status` - Show graph status
//! - `get` - Print one entity
//! - `query` - Evaluate a query file once
//! - `watch` - Keep a query file's results live
//! - `export` - Write an entity's replicated document to a file
//! - `merge` - Merge a replicated document from a file

mod commands;

use crate::config::{AppConfig, Backend, Overrides};
use bridi_core::{EntityId, GraphError, UserId};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Bridi - semantic graph store
///
/// Entities, relation types and relation instances, each a replicated
/// document, queried through a declarative traversal language.
#[derive(Parser, Debug)]
#[command(name = "bridi")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (default: ./bridi.toml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the graph database
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend
    #[arg(short = 'B', long, global = true, value_enum)]
    pub backend: Option<Backend>,

    /// Acting user for read and write checks
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Initialize a new database with the seed set
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Show graph status
    Status,

    /// Print one entity
    Get {
        /// Entity id, e.g. @person1
        id: String,
    },

    /// Evaluate a query file once
    Query {
        /// Path to the query definition (JSON)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Re-evaluate a query file whenever it changes
    Watch {
        /// Path to the query definition (JSON)
        #[arg(short, long)]
        file: PathBuf,

        /// Evaluate once and exit
        #[arg(long)]
        once: bool,

        /// How often the file is checked, in milliseconds
        #[arg(long, default_value = "500")]
        poll_ms: u64,
    },

    /// Write an entity's replicated document to a file
    Export {
        /// Entity id
        id: String,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Merge a replicated document from a file
    Merge {
        /// Entity id
        id: String,

        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },
}

impl Cli {
    /// Command line values that override the configuration file.
    #[must_use]
    pub fn overrides(&self) -> Overrides {
        let (host, port) = match &self.command {
            Some(Commands::Server { host, port }) => (host.clone(), *port),
            _ => (None, None),
        };
        Overrides {
            database: self.database.clone(),
            backend: self.backend,
            host,
            port,
        }
    }

    #[must_use]
    pub fn acting_user(&self) -> Option<UserId> {
        self.user.as_deref().map(UserId::new)
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), GraphError> {
    let config = AppConfig::load(cli.config.as_deref())?.with_overrides(&cli.overrides());
    let user = cli.acting_user();
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { .. }) => cmd_server(&config).await,
        Some(Commands::Init { force }) => cmd_init(&config, force),
        Some(Commands::Status) | None => cmd_status(&config, json_mode),
        Some(Commands::Get { id }) => cmd_get(&config, user.as_ref(), &EntityId::new(id)),
        Some(Commands::Query { file }) => cmd_query(&config, user.as_ref(), &file, json_mode),
        Some(Commands::Watch {
            file,
            once,
            poll_ms,
        }) => cmd_watch(&config, user, &file, once, poll_ms, json_mode).await,
        Some(Commands::Export { id, output }) => cmd_export(&config, &EntityId::new(id), &output),
        Some(Commands::Merge { id, input }) => {
            cmd_merge(&config, user.as_ref(), &EntityId::new(id), &input)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
