//! # Bridi
//!
//! Library half of the Bridi binary: the HTTP API, the CLI and the
//! configuration file. `main.rs` only sets up logging and dispatches.

pub mod api;
pub mod cli;
pub mod config;
