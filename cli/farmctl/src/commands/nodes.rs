//! Node commands.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tabled::Tabled;

use crate::error::CliError;
use crate::output::{print_output, print_single, print_success, OutputFormat};

use super::{read_document, CommandContext};

#[derive(Debug, Args)]
pub struct NodeCommand {
    #[command(subcommand)]
    command: NodeSubcommand,
}

#[derive(Debug, Subcommand)]
enum NodeSubcommand {
    /// Define (or replace) a node from a JSON document.
    Define(DefineNodeArgs),

    /// List all nodes.
    List,

    /// Get node details.
    Get(GetNodeArgs),

    /// Allocate a node for a workload.
    Find(FindNodeArgs),
}

#[derive(Debug, Args)]
struct DefineNodeArgs {
    /// Path to the node document (`-` for stdin).
    #[arg(long, short)]
    config: PathBuf,
}

#[derive(Debug, Args)]
struct GetNodeArgs {
    /// Node ID (`12` or `node-12`).
    node: String,
}

#[derive(Debug, Args)]
struct FindNodeArgs {
    /// Only certified nodes.
    #[arg(long)]
    certified: bool,

    /// Take a whole dedicated node.
    #[arg(long)]
    dedicated: bool,

    /// Only nodes with a public config.
    #[arg(long)]
    public_config: bool,

    /// Public IPv4 addresses to reserve.
    #[arg(long, default_value = "0")]
    public_ips: u64,

    #[arg(long, default_value = "0")]
    cru: u64,

    /// Memory in bytes.
    #[arg(long, default_value = "0")]
    mru: u64,

    /// SSD storage in bytes.
    #[arg(long, default_value = "0")]
    sru: u64,

    /// HDD storage in bytes.
    #[arg(long, default_value = "0")]
    hru: u64,

    /// Node IDs to skip (repeatable).
    #[arg(long)]
    exclude: Vec<u32>,
}

impl NodeCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            NodeSubcommand::Define(args) => define_node(ctx, args).await,
            NodeSubcommand::List => list_nodes(ctx).await,
            NodeSubcommand::Get(args) => get_node(ctx, args).await,
            NodeSubcommand::Find(args) => find_node(ctx, args).await,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct Capacity {
    #[serde(rename = "CRU", default)]
    cru: u64,
    #[serde(rename = "MRU", default)]
    mru: u64,
    #[serde(rename = "SRU", default)]
    sru: u64,
    #[serde(rename = "HRU", default)]
    hru: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Resources {
    #[serde(default)]
    total: Capacity,
    #[serde(default)]
    used: Capacity,
}

/// Node as returned by the API. Unknown fields are dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeResponse {
    id: u32,
    #[serde(rename = "twinID")]
    twin_id: u32,
    #[serde(default)]
    certified: bool,
    #[serde(default)]
    dedicated: bool,
    #[serde(default)]
    public_config: bool,
    #[serde(rename = "publicIPsUsed", default)]
    public_ips_used: u64,
    #[serde(default)]
    resources: Resources,
    power_state: String,
    #[serde(default)]
    has_active_rent_contract: bool,
}

#[derive(Debug, Serialize, Tabled)]
struct NodeRow {
    #[tabled(rename = "ID")]
    id: u32,

    #[tabled(rename = "Twin")]
    twin_id: u32,

    #[tabled(rename = "Power")]
    power_state: String,

    #[tabled(rename = "CRU")]
    cru: String,

    #[tabled(rename = "Flags")]
    flags: String,

    #[tabled(rename = "Public IPs")]
    public_ips_used: u64,
}

impl From<&NodeResponse> for NodeRow {
    fn from(node: &NodeResponse) -> Self {
        let flags: Vec<&str> = [
            (node.certified, "certified"),
            (node.dedicated, "dedicated"),
            (node.public_config, "public-config"),
            (node.has_active_rent_contract, "rented"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect();

        Self {
            id: node.id,
            twin_id: node.twin_id,
            power_state: node.power_state.clone(),
            cru: format!(
                "{}/{}",
                node.resources.used.cru, node.resources.total.cru
            ),
            flags: if flags.is_empty() {
                "-".to_string()
            } else {
                flags.join(",")
            },
            public_ips_used: node.public_ips_used,
        }
    }
}

async fn define_node(ctx: CommandContext, args: DefineNodeArgs) -> Result<()> {
    let client = ctx.client()?;
    let document = read_document(&args.config)?;

    let node: NodeResponse = client.post_raw("/v1/nodemanager/define", document).await?;

    print_success(&format!("Defined node {} (twin {})", node.id, node.twin_id));
    Ok(())
}

async fn list_nodes(ctx: CommandContext) -> Result<()> {
    let client = ctx.client()?;
    let nodes: Vec<NodeResponse> = client.get("/v1/nodemanager/nodes").await?;

    match ctx.format {
        OutputFormat::Table => {
            let rows: Vec<NodeRow> = nodes.iter().map(NodeRow::from).collect();
            print_output(&rows, ctx.format);
        }
        OutputFormat::Json => print_single(&nodes, ctx.format),
    }
    Ok(())
}

async fn get_node(ctx: CommandContext, args: GetNodeArgs) -> Result<()> {
    let client = ctx.client()?;

    let node: NodeResponse = client
        .get(&format!("/v1/nodemanager/nodes/{}", args.node))
        .await
        .map_err(|e| match e {
            CliError::Api { status: 404, .. } => {
                CliError::NotFound(format!("Node '{}' not found", args.node))
            }
            other => other,
        })?;

    print_single(&node, ctx.format);
    Ok(())
}

async fn find_node(ctx: CommandContext, args: FindNodeArgs) -> Result<()> {
    let client = ctx.client()?;

    let request = json!({
        "certified": args.certified,
        "dedicated": args.dedicated,
        "publicConfig": args.public_config,
        "publicIPs": args.public_ips,
        "capacity": Capacity {
            cru: args.cru,
            mru: args.mru,
            sru: args.sru,
            hru: args.hru,
        },
        "exclude": args.exclude,
    });

    let node: NodeResponse = client.post("/v1/nodemanager/findnode", &request).await?;

    match ctx.format {
        OutputFormat::Table => {
            print_success(&format!("Allocated node {}", node.id));
            print_output(&[NodeRow::from(&node)], ctx.format);
        }
        OutputFormat::Json => print_single(&node, ctx.format),
    }
    Ok(())
}
