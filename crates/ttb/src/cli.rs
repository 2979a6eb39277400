//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "ttb")]
#[command(about = "Voice-server chat bot with an interactive console", long_about = None)]
#[command(version)]
pub struct Cli {
    /// TOML config file.
    #[arg(long, env = "TTB_CONFIG", default_value = "config.toml")]
    pub config: PathBuf,
}
