//! ojremote demo binary
//!
//! Serves a generated job tree from the in-memory loopback server, walks it
//! through the tree model and prints it, then removes a job on the "server"
//! and prints the reconciled tree.
//!
//! Usage:
//!   cargo run -p ojremote-demo
//!   cargo run -p ojremote-demo -- --depth 4 --breadth 3 --expand-all
//!   cargo run -p ojremote-demo -- --config session.ron --log ojremote_tree=debug

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ojremote_client::loopback::{self, LoopbackServer};
use ojremote_client::{CapabilityRegistry, SessionConfig};
use ojremote_tree::{NodeStructure, ProxyNodeController, SessionNodeFactory};
use ojremote_types::{ImageData, InvokeResponse, RemoteId, names};
use serde_json::json;

const ROOT: u64 = 1;
const ICONS: [&str; 3] = ["ready", "executing", "complete"];

/// Walk a loopback job tree through the ojremote tree model.
#[derive(Parser, Debug)]
#[command(name = "ojremote-demo")]
#[command(about = "Print a remote job tree served by the in-memory loopback server")]
struct Args {
    /// Levels of jobs below the root
    #[arg(long, default_value_t = 2)]
    depth: u32,

    /// Child jobs per job
    #[arg(long, default_value_t = 3)]
    breadth: u32,

    /// Expand every node, not just the root
    #[arg(long)]
    expand_all: bool,

    /// Session configuration (RON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter, overrides RUST_LOG
    #[arg(long)]
    log: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _telemetry = ojremote_telemetry::init_tracing("ojremote-demo", args.log.as_deref(), "warn")?;

    let config = match &args.config {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("loading session config {}", path.display()))?,
        None => SessionConfig::default(),
    };

    let (server, conn) = loopback::connect(CapabilityRegistry::with_defaults()?, config);
    let jobs = populate(&server, args.depth, args.breadth);
    tracing::info!(jobs, "loopback tree built");

    let factory = SessionNodeFactory::new(conn.session().clone());
    let root = factory.root(RemoteId::new(ROOT)).await?;
    root.flush().await;

    print_tree(&root, args.expand_all).await?;

    // Drop the first job under the root and let the model reconcile.
    if let Some(children) = root.child_ids().filter(|c| !c.is_empty()) {
        let kept: Vec<u64> = children.iter().skip(1).map(|id| id.get()).collect();
        println!("\n-- server removes {} --\n", children[0]);
        server.set_children(RemoteId::new(ROOT), &kept);
        wait_for_children(&root, kept.len()).await;
        print_tree(&root, false).await?;
    }

    root.destroy();
    conn.close();
    tracing::info!(live = conn.session().len(), "session closed");
    Ok(())
}

/// Serve a tree `depth` levels deep with `breadth` children per job.
/// Returns the number of jobs.
fn populate(server: &LoopbackServer, depth: u32, breadth: u32) -> u64 {
    let mut next = ROOT;
    let mut level = vec![ROOT];
    serve_job(server, ROOT, "Nightly Batch", 0);

    for d in 0..depth {
        let mut below = Vec::new();
        for &parent in &level {
            let children: Vec<u64> = (0..breadth)
                .map(|_| {
                    next += 1;
                    next
                })
                .collect();
            for (i, &child) in children.iter().enumerate() {
                serve_job(server, child, &format!("Job {}.{}", d + 1, i + 1), child as usize);
            }
            server.set_children(RemoteId::new(parent), &children);
            below.extend(children);
        }
        level = below;
    }
    for &leaf in &level {
        server.set_children(RemoteId::new(leaf), &[]);
    }
    next
}

fn serve_job(server: &LoopbackServer, id: u64, name: &str, icon: usize) {
    let remote_id = RemoteId::new(id);
    server.add_object(remote_id, &[names::OBJECT, names::STRUCTURAL, names::ICONIC]);
    server.respond_value(remote_id, "toString", names::STRING, &name);
    for icon_id in ICONS {
        let image = ImageData::new("image/png", icon_id.as_bytes().to_vec()).with_description(icon_id);
        server.respond_to_arg(
            remote_id,
            "iconForId",
            json!(icon_id),
            InvokeResponse::new(names::IMAGE_DATA, Some(json!(image))),
        );
    }
    server.set_icon(remote_id, ICONS[icon % ICONS.len()]);
}

async fn print_tree(root: &Arc<ProxyNodeController>, expand_all: bool) -> Result<()> {
    let mut stack = vec![(root.clone(), 0usize)];
    while let Some((node, depth)) = stack.pop() {
        let expand = node.structure() == NodeStructure::Collapsed && (expand_all || depth == 0);
        if expand {
            node.expand().await?;
        }

        let marker = match node.structure() {
            NodeStructure::Expanded => "-",
            NodeStructure::Collapsed => "+",
            NodeStructure::Empty | NodeStructure::Unknown => " ",
        };
        let icon = node.current_icon().map(|i| i.icon_id).unwrap_or_else(|| "?".into());
        println!("{:indent$}{marker} {} [{icon}]", "", node.label().await, indent = depth * 2);

        if let Some(children) = node.children() {
            for child in children.into_iter().rev() {
                child.flush().await;
                stack.push((child, depth + 1));
            }
        }
    }
    Ok(())
}

async fn wait_for_children(node: &ProxyNodeController, count: usize) {
    let mut structure = node.watch_structure();
    for _ in 0..100 {
        node.flush().await;
        if node.children().map_or(0, |c| c.len()) == count {
            return;
        }
        let _ = tokio::time::timeout(std::time::Duration::from_millis(10), structure.changed()).await;
    }
    tracing::warn!(count, "children did not settle");
}
