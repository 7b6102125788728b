//! Command-line entry points.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ziggurat", about = "Self-hosted package registry")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the registry server (default).
    Serve,
    /// Print the version and exit.
    Version,
}
