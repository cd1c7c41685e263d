//! Cluster bootstrap
//!
//! Brings N workers from nothing to a usable mesh: one shared directory
//! created up front, one worker per OS thread, each with its own
//! single-threaded cooperative runtime, its own actor system, and its own
//! transport. Startup is sequenced bind → barrier → connect → start so no
//! worker dials a peer that has not bound yet.
//!
//! A worker that fails during startup or run flags the whole cluster down:
//! the remaining workers stop, and `Cluster::run` surfaces the first
//! failure.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Barrier, watch};
use tracing::{debug, info};

use crate::actor::ActorSystem;
use crate::codec::{PostcardCodec, WireCodec};
use crate::directory::Directory;
use crate::net::{NetError, Transport};
use crate::node::ClusterNode;
use crate::ring::{DEFAULT_REPLICAS, HashRing};

/// Invoked exactly once per worker with the fully wired node, after the
/// mesh is up. Spawn actors and tasks here; do not block.
pub type WorkerStartFn = Arc<dyn Fn(Arc<ClusterNode>) + Send + Sync>;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("socket directory {path:?}: {source}")]
    SocketDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("worker {worker} runtime: {source}")]
    Runtime {
        worker: u32,
        #[source]
        source: io::Error,
    },
    #[error("worker {worker}: {source}")]
    Worker {
        worker: u32,
        #[source]
        source: NetError,
    },
    #[error("worker {0} panicked")]
    WorkerPanic(u32),
}

/// Cluster options. Only `worker_count`, `table_size`, and `socket_dir`
/// affect the routing substrate; the rest wires the application in.
#[derive(Clone)]
pub struct ClusterConfig {
    /// Number of peer workers, at least 1.
    pub worker_count: u32,
    /// Directory capacity: how many actor paths the cluster can track.
    pub table_size: usize,
    /// Where the per-worker listening sockets live.
    pub socket_dir: PathBuf,
    /// Per-worker application entry point.
    pub on_worker_start: Option<WorkerStartFn>,
    /// Envelope serializer for the wire.
    pub codec: Arc<dyn WireCodec>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            table_size: 1024,
            socket_dir: std::env::temp_dir().join("hive-sockets"),
            on_worker_start: None,
            codec: Arc::new(PostcardCodec),
        }
    }
}

struct WorkerCtx {
    worker: u32,
    worker_count: u32,
    socket_dir: PathBuf,
    directory: Arc<Directory>,
    ring: Arc<HashRing>,
    codec: Arc<dyn WireCodec>,
    barrier: Arc<Barrier>,
    abort_tx: watch::Sender<bool>,
    abort_rx: watch::Receiver<bool>,
    on_start: Option<WorkerStartFn>,
}

pub struct Cluster;

impl Cluster {
    /// Boot the cluster and block until every worker has exited. The
    /// worker-start hook must arrange for each worker to eventually call
    /// `shutdown`, or `run` blocks forever.
    pub fn run(config: ClusterConfig) -> Result<(), ClusterError> {
        if config.worker_count < 1 {
            return Err(ClusterError::Config("worker_count must be at least 1".into()));
        }
        if config.table_size == 0 {
            return Err(ClusterError::Config("table_size must be at least 1".into()));
        }
        if config.socket_dir.as_os_str().is_empty() {
            return Err(ClusterError::Config("socket_dir must not be empty".into()));
        }

        std::fs::create_dir_all(&config.socket_dir).map_err(|source| ClusterError::SocketDir {
            path: config.socket_dir.clone(),
            source,
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&config.socket_dir, std::fs::Permissions::from_mode(0o755))
                .map_err(|source| ClusterError::SocketDir {
                    path: config.socket_dir.clone(),
                    source,
                })?;
        }

        // Shared state exists before any worker does: every worker handle
        // refers to the same directory and an identical ring.
        let directory = Arc::new(Directory::new(config.table_size));
        let ring = Arc::new(HashRing::new(config.worker_count, DEFAULT_REPLICAS));
        let barrier = Arc::new(Barrier::new(config.worker_count as usize));
        let (abort_tx, abort_rx) = watch::channel(false);

        info!(
            workers = config.worker_count,
            table_size = config.table_size,
            socket_dir = %config.socket_dir.display(),
            "cluster starting"
        );

        let mut handles = Vec::with_capacity(config.worker_count as usize);
        for worker in 0..config.worker_count {
            let ctx = WorkerCtx {
                worker,
                worker_count: config.worker_count,
                socket_dir: config.socket_dir.clone(),
                directory: directory.clone(),
                ring: ring.clone(),
                codec: config.codec.clone(),
                barrier: barrier.clone(),
                abort_tx: abort_tx.clone(),
                abort_rx: abort_rx.clone(),
                on_start: config.on_worker_start.clone(),
            };
            let spawned = std::thread::Builder::new()
                .name(format!("hive-worker-{worker}"))
                .spawn(move || worker_thread(ctx));
            match spawned {
                Ok(handle) => handles.push((worker, handle)),
                Err(source) => {
                    let _ = abort_tx.send(true);
                    for (_, handle) in handles {
                        let _ = handle.join();
                    }
                    return Err(ClusterError::Runtime { worker, source });
                }
            }
        }

        let mut result = Ok(());
        for (worker, handle) in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
                Err(_) => {
                    let _ = abort_tx.send(true);
                    if result.is_ok() {
                        result = Err(ClusterError::WorkerPanic(worker));
                    }
                }
            }
        }
        if result.is_ok() {
            info!("cluster stopped");
        }
        result
    }
}

fn worker_thread(ctx: WorkerCtx) -> Result<(), ClusterError> {
    let worker = ctx.worker;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|source| {
            let _ = ctx.abort_tx.send(true);
            ClusterError::Runtime { worker, source }
        })?;
    runtime.block_on(worker_main(ctx))
}

async fn worker_main(mut ctx: WorkerCtx) -> Result<(), ClusterError> {
    let system = Arc::new(ActorSystem::new(format!("worker-{}", ctx.worker)));
    let transport = Arc::new(Transport::new(ctx.worker, ctx.worker_count, ctx.socket_dir.clone()));
    let node = Arc::new(ClusterNode::new(
        ctx.worker,
        system.clone(),
        transport.clone(),
        ctx.ring.clone(),
        ctx.directory.clone(),
        ctx.codec.clone(),
    ));

    let result = worker_run(&mut ctx, &system, &transport, &node).await;
    if result.is_err() {
        // Fail-stop: one dead worker takes the cluster down.
        let _ = ctx.abort_tx.send(true);
    }
    node.close();
    if result.is_ok() {
        info!(worker = ctx.worker, "worker stopped");
    }
    result
}

async fn worker_run(
    ctx: &mut WorkerCtx,
    system: &Arc<ActorSystem>,
    transport: &Arc<Transport>,
    node: &Arc<ClusterNode>,
) -> Result<(), ClusterError> {
    let worker = ctx.worker;
    transport
        .bind()
        .map_err(|source| ClusterError::Worker { worker, source })?;

    // Rendezvous: no worker dials out until every worker has bound.
    tokio::select! {
        _ = ctx.barrier.wait() => {}
        _ = ctx.abort_rx.wait_for(|&aborted| aborted) => {
            debug!(worker, "peer failed during startup, aborting");
            return Ok(());
        }
    }

    transport
        .connect_to_peers()
        .await
        .map_err(|source| ClusterError::Worker { worker, source })?;
    node.start();

    if let Some(on_start) = &ctx.on_start {
        on_start(node.clone());
    }
    debug!(worker, "worker running");

    tokio::select! {
        _ = system.run() => {}
        _ = ctx.abort_rx.wait_for(|&aborted| aborted) => {
            debug!(worker, "cluster aborting, stopping worker");
        }
    }
    Ok(())
}
