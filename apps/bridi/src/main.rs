//! # Bridi - Semantic Graph Server
//!
//! The main binary for the Bridi semantic graph store.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for graph operations and live queries
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                apps/bridi (THE BINARY)               │
//! │                                                      │
//! │  ┌─────────────┐   ┌─────────────┐   ┌───────────┐  │
//! │  │   CLI       │   │   HTTP API  │   │  Config   │  │
//! │  │  (clap)     │   │   (axum)    │   │  (toml)   │  │
//! │  └──────┬──────┘   └──────┬──────┘   └─────┬─────┘  │
//! │         └─────────────────┼────────────────┘        │
//! │                           ▼                         │
//! │                   ┌───────────────┐                 │
//! │                   │  bridi-core   │                 │
//! │                   │  (THE LOGIC)  │                 │
//! │                   └───────────────┘                 │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! bridi server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! bridi status
//! bridi query -f team.json
//! bridi watch -f team.json --user alice
//! ```

use bridi::cli;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // Parse CLI arguments first so --verbose can shape the default filter.
    let cli = cli::Cli::parse();

    // BRIDI_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("BRIDI_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let default_filter = if cli.verbose {
        "bridi=debug,bridi_core=debug,tower_http=debug"
    } else {
        "bridi=info,tower_http=debug"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Bridi startup banner.
fn print_banner() {
    eprintln!(
        r#"
  ██████╗ ██████╗ ██╗██████╗ ██╗
  ██╔══██╗██╔══██╗██║██╔══██╗██║
  ██████╔╝██████╔╝██║██║  ██║██║
  ██╔══██╗██╔══██╗██║██║  ██║██║
  ██████╔╝██║  ██║██║██████╔╝██║
  ╚═════╝ ╚═╝  ╚═╝╚═╝╚═════╝ ╚═╝

  Semantic Graph Server v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
