//! Farm commands.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::{Deserialize, Serialize};

use crate::output::{print_single, print_success};

use super::{read_document, CommandContext};

#[derive(Debug, Args)]
pub struct FarmCommand {
    #[command(subcommand)]
    command: FarmSubcommand,
}

#[derive(Debug, Subcommand)]
enum FarmSubcommand {
    /// Define the farm from a JSON document.
    Define(DefineFarmArgs),

    /// Show the farm.
    Get,
}

#[derive(Debug, Args)]
struct DefineFarmArgs {
    /// Path to the farm document (`-` for stdin).
    #[arg(long, short)]
    config: PathBuf,
}

impl FarmCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            FarmSubcommand::Define(args) => define_farm(ctx, args).await,
            FarmSubcommand::Get => get_farm(ctx).await,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FarmResponse {
    id: u32,
    #[serde(default)]
    description: String,
    #[serde(rename = "publicIPs", default)]
    public_ips: u64,
}

async fn define_farm(ctx: CommandContext, args: DefineFarmArgs) -> Result<()> {
    let client = ctx.client()?;
    let document = read_document(&args.config)?;

    let farm: FarmResponse = client.post_raw("/v1/farmmanager/define", document).await?;

    print_success(&format!(
        "Defined farm {} with {} public IPs",
        farm.id, farm.public_ips
    ));
    Ok(())
}

async fn get_farm(ctx: CommandContext) -> Result<()> {
    let client = ctx.client()?;
    let farm: FarmResponse = client.get("/v1/farmmanager/farm").await?;
    print_single(&farm, ctx.format);
    Ok(())
}
