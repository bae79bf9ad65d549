//! Power commands.

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::output::{print_info, print_single, print_success, OutputFormat};

use super::{read_document, CommandContext};

#[derive(Debug, Args)]
pub struct PowerCommand {
    #[command(subcommand)]
    command: PowerSubcommand,
}

#[derive(Debug, Subcommand)]
enum PowerSubcommand {
    /// Set the power policy.
    Configure(ConfigureArgs),

    /// Show the power policy and the next periodic wake-up.
    Get,

    /// Power a node on.
    On(NodeArg),

    /// Power a node off.
    Off(NodeArg),

    /// Run the periodic wake-up now.
    PeriodicWakeup,

    /// Run one power management round now.
    Manage,
}

#[derive(Debug, Args)]
struct ConfigureArgs {
    /// Path to a power policy document (`-` for stdin).
    #[arg(long, short, conflicts_with_all = ["threshold", "wakeup"])]
    config: Option<PathBuf>,

    /// Usage percentage (50-80) at which another node is woken.
    #[arg(long)]
    threshold: Option<u64>,

    /// Daily wake-up time, e.g. 08:30PM (UTC).
    #[arg(long)]
    wakeup: Option<String>,
}

#[derive(Debug, Args)]
struct NodeArg {
    /// Node ID (`12` or `node-12`).
    node: String,
}

impl PowerCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            PowerSubcommand::Configure(args) => configure(ctx, args).await,
            PowerSubcommand::Get => get_power(ctx).await,
            PowerSubcommand::On(args) => set_power(ctx, args, true).await,
            PowerSubcommand::Off(args) => set_power(ctx, args, false).await,
            PowerSubcommand::PeriodicWakeup => run_routine(ctx, "periodicwakeup").await,
            PowerSubcommand::Manage => run_routine(ctx, "powermanagement").await,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PowerStatus {
    wake_up_threshold: u64,
    periodic_wake_up: String,
    next_periodic_wake_up: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoweredNode {
    id: u32,
    power_state: String,
}

fn print_status(status: &PowerStatus, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            println!("Wake-up threshold:  {}%", status.wake_up_threshold);
            println!("Periodic wake-up:   {} UTC", status.periodic_wake_up);
            println!("Next wake-up:       {}", status.next_periodic_wake_up);
        }
        OutputFormat::Json => print_single(status, format),
    }
}

async fn configure(ctx: CommandContext, args: ConfigureArgs) -> Result<()> {
    let client = ctx.client()?;

    let status: PowerStatus = match &args.config {
        Some(path) => {
            let document = read_document(path)?;
            client.post_raw("/v1/powermanager/configure", document).await?
        }
        None => {
            // Unset fields keep their current value.
            let current: PowerStatus = client.get("/v1/powermanager/power").await?;
            let request = json!({
                "wakeUpThreshold": args.threshold.unwrap_or(current.wake_up_threshold),
                "periodicWakeUp": args.wakeup.clone().unwrap_or(current.periodic_wake_up),
            });
            client.post("/v1/powermanager/configure", &request).await?
        }
    };

    if let Some(requested) = args.threshold {
        if requested != status.wake_up_threshold {
            print_info(&format!(
                "Threshold {requested}% is out of range, using {}%",
                status.wake_up_threshold
            ));
        }
    }
    print_success("Power policy updated");
    print_status(&status, ctx.format);
    Ok(())
}

async fn get_power(ctx: CommandContext) -> Result<()> {
    let client = ctx.client()?;
    let status: PowerStatus = client.get("/v1/powermanager/power").await?;
    print_status(&status, ctx.format);
    Ok(())
}

async fn set_power(ctx: CommandContext, args: NodeArg, on: bool) -> Result<()> {
    let client = ctx.client()?;
    let action = if on { "poweron" } else { "poweroff" };

    let node: PoweredNode = client
        .post_empty(&format!("/v1/powermanager/{action}/{}", args.node))
        .await?;

    print_success(&format!("Node {} is {}", node.id, node.power_state));
    Ok(())
}

async fn run_routine(ctx: CommandContext, routine: &str) -> Result<()> {
    let client = ctx.client()?;
    let outcome: Value = client
        .post_empty(&format!("/v1/powermanager/{routine}"))
        .await?;
    print_single(&outcome, ctx.format);
    Ok(())
}
