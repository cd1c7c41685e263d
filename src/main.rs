//! Hive demo node
//!
//! Boots a local cluster, spreads echo actors across the workers by ring
//! placement, and pushes a round of pings through the mesh so every send
//! path, local dispatch and IPC, gets exercised.

use clap::Parser;
use hive::{Cluster, ClusterConfig, ClusterNode, NodeError, Props, WorkerStartFn};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "hive", version, about = "Hive: single-host actor cluster runtime")]
struct Args {
    /// Number of worker peers
    #[arg(short, long, default_value = "4")]
    workers: u32,

    /// Directory capacity (actor paths the cluster can track)
    #[arg(short, long, default_value = "1024")]
    table_size: usize,

    /// Directory for the worker sockets
    #[arg(short, long)]
    socket_dir: Option<PathBuf>,

    /// Pings each worker sends to each echo actor
    #[arg(short, long, default_value = "8")]
    messages: u64,
}

fn on_worker_start(delivered: Arc<AtomicU64>, messages: u64) -> WorkerStartFn {
    Arc::new(move |node: Arc<ClusterNode>| {
        let worker = node.worker_id();

        // Claim the echo actors the ring places here. Every worker tries
        // every path; exactly one spawn per path succeeds.
        for i in 0..node.worker_count() {
            let path = format!("echo/{i}");
            let counter = delivered.clone();
            match node.spawn(
                Props::from_fn(move |msg| {
                    counter.fetch_add(1, Ordering::Relaxed);
                    debug!(len = msg.len(), "echo received ping");
                }),
                &path,
            ) {
                Ok(()) => info!(worker, path = %path, "hosting echo actor"),
                Err(NodeError::Misplaced { .. }) => {}
                Err(e) => warn!(worker, path = %path, error = %e, "spawn failed"),
            }
        }

        let node = node.clone();
        tokio::spawn(async move {
            // Let every worker finish spawning before traffic starts.
            tokio::time::sleep(Duration::from_millis(50)).await;

            for m in 0..messages {
                for i in 0..node.worker_count() {
                    let path = format!("echo/{i}");
                    let payload = format!("ping {m} from worker {worker}").into_bytes();
                    if let Err(e) = node.send(&path, payload).await {
                        warn!(worker, path = %path, error = %e, "send failed");
                    }
                }
            }

            // Give in-flight frames time to drain, then report and stop.
            tokio::time::sleep(Duration::from_millis(300)).await;
            let stats = node.transport_stats();
            info!(
                worker,
                frames_sent = stats.frames_sent,
                frames_received = stats.frames_received,
                frames_dropped = stats.frames_dropped,
                "worker done"
            );
            node.shutdown();
        });
    })
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hive=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let socket_dir = args
        .socket_dir
        .unwrap_or_else(|| std::env::temp_dir().join("hive-sockets"));

    info!("Hive v{VERSION} with {} workers", args.workers);

    let delivered = Arc::new(AtomicU64::new(0));
    let expected = u64::from(args.workers) * u64::from(args.workers) * args.messages;

    let config = ClusterConfig {
        worker_count: args.workers,
        table_size: args.table_size,
        socket_dir,
        on_worker_start: Some(on_worker_start(delivered.clone(), args.messages)),
        ..ClusterConfig::default()
    };

    if let Err(e) = Cluster::run(config) {
        error!("cluster failed: {e}");
        std::process::exit(1);
    }

    info!(
        "delivered {}/{} pings",
        delivered.load(Ordering::Relaxed),
        expected
    );
}
