//! CLI commands.

mod farm;
mod nodes;
mod power;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::client::ApiClient;
use crate::output::OutputFormat;

/// farmctl - Manage a farmerbot instance.
#[derive(Debug, Parser)]
#[command(name = "farmctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: String,

    /// Base URL of the farmerbot API.
    #[arg(
        long,
        global = true,
        env = "FARMERBOT_URL",
        default_value = "http://127.0.0.1:8080"
    )]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Define or show the farm.
    Farm(farm::FarmCommand),

    /// Define, list and allocate nodes.
    Node(nodes::NodeCommand),

    /// Configure power policy and drive node power.
    Power(power::PowerCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let format = match self.format.as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Table,
        };

        let ctx = CommandContext {
            url: self.url,
            format,
        };

        match self.command {
            Commands::Farm(cmd) => cmd.run(ctx).await,
            Commands::Node(cmd) => cmd.run(ctx).await,
            Commands::Power(cmd) => cmd.run(ctx).await,
            Commands::Version => {
                println!("farmctl {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub url: String,
    pub format: OutputFormat,
}

impl CommandContext {
    pub fn client(&self) -> Result<ApiClient> {
        ApiClient::new(&self.url)
    }
}

/// Read a JSON document from a path, or stdin for `-`.
fn read_document(path: &std::path::Path) -> Result<Vec<u8>> {
    use anyhow::Context;
    use std::io::Read;

    if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("Failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}
