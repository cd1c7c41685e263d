//! Full-mesh Unix-socket transport
//!
//! Each worker listens on `{socket_dir}/worker-{i}.sock` and holds one
//! outbound stream to every peer, giving the cluster `N*(N-1)` independent
//! simplex streams. Outbound and inbound directions between a pair of
//! workers are separate sockets.
//!
//! Frames sent to one target in program order arrive and parse in that
//! order. Nothing is promised across targets or across source workers.
//!
//! A broken peer socket takes down only the read loop or send it touched;
//! there is no reconnect. On one host, socket loss means the peer is gone
//! and recovery is a cluster restart.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use super::frame::{FrameBuffer, FrameError, READ_CHUNK_SIZE, encode_frame};

/// Accept and receive loops wake at least this often to observe `closed`.
const IO_TICK: Duration = Duration::from_secs(1);

/// Installed once per transport; invoked with each inbound frame payload.
/// Read loops call it concurrently, one call per frame, in per-connection
/// arrival order.
pub type FrameListener = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("bind {path:?}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("connect to worker {peer}: {source}")]
    Connect {
        peer: u32,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Monotonic transport counters.
#[derive(Default)]
pub struct TransportStats {
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
    frames_received: AtomicU64,
    bytes_received: AtomicU64,
    frames_dropped: AtomicU64,
}

/// Point-in-time copy of [`TransportStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportSnapshot {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub frames_received: u64,
    pub bytes_received: u64,
    pub frames_dropped: u64,
}

impl TransportStats {
    fn snapshot(&self) -> TransportSnapshot {
        TransportSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
        }
    }
}

pub fn socket_path(socket_dir: &Path, worker: u32) -> PathBuf {
    socket_dir.join(format!("worker-{worker}.sock"))
}

pub struct Transport {
    worker_id: u32,
    worker_count: u32,
    socket_dir: PathBuf,
    closed: Arc<AtomicBool>,
    listener: Arc<RwLock<Option<FrameListener>>>,
    /// Outbound streams keyed by peer id. Complete once `connect_to_peers`
    /// returns; each stream carries its own writer lock so concurrent
    /// senders cannot interleave frames.
    peers: RwLock<HashMap<u32, Arc<Mutex<UnixStream>>>>,
    stats: Arc<TransportStats>,
}

impl Transport {
    pub fn new(worker_id: u32, worker_count: u32, socket_dir: impl Into<PathBuf>) -> Self {
        Self {
            worker_id,
            worker_count,
            socket_dir: socket_dir.into(),
            closed: Arc::new(AtomicBool::new(false)),
            listener: Arc::new(RwLock::new(None)),
            peers: RwLock::new(HashMap::new()),
            stats: Arc::new(TransportStats::default()),
        }
    }

    pub fn worker_id(&self) -> u32 {
        self.worker_id
    }

    /// This worker's listening socket path.
    pub fn local_path(&self) -> PathBuf {
        socket_path(&self.socket_dir, self.worker_id)
    }

    pub fn stats(&self) -> TransportSnapshot {
        self.stats.snapshot()
    }

    /// Install the inbound frame listener. Must happen before peers start
    /// sending; frames arriving with no listener installed are dropped.
    pub fn set_listener(&self, listener: impl Fn(Vec<u8>) + Send + Sync + 'static) {
        *self.listener.write().expect("listener lock poisoned") = Some(Arc::new(listener));
    }

    /// Create and listen on this worker's socket, then spawn the detached
    /// accept loop. Any stale socket file from a previous run is unlinked
    /// first.
    pub fn bind(&self) -> Result<(), NetError> {
        let path = self.local_path();
        match std::fs::remove_file(&path) {
            Ok(()) => debug!(worker = self.worker_id, "unlinked stale socket file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(NetError::Bind { path, source }),
        }

        let listener = UnixListener::bind(&path).map_err(|source| NetError::Bind {
            path: path.clone(),
            source,
        })?;
        info!(worker = self.worker_id, path = %path.display(), "transport listening");

        let worker = self.worker_id;
        let closed = self.closed.clone();
        let frame_listener = self.listener.clone();
        let stats = self.stats.clone();
        tokio::spawn(async move {
            loop {
                if closed.load(Ordering::Acquire) {
                    break;
                }
                match timeout(IO_TICK, listener.accept()).await {
                    Err(_) => continue,
                    Ok(Ok((stream, _))) => {
                        trace!(worker, "accepted inbound connection");
                        let closed = closed.clone();
                        let frame_listener = frame_listener.clone();
                        let stats = stats.clone();
                        tokio::spawn(handle_connection(stream, worker, closed, frame_listener, stats));
                    }
                    Ok(Err(e)) => {
                        if !closed.load(Ordering::Acquire) {
                            warn!(worker, error = %e, "accept failed, stopping accept loop");
                        }
                        break;
                    }
                }
            }
            trace!(worker, "accept loop exited");
        });
        Ok(())
    }

    /// Open one client stream to every peer. Called after all workers have
    /// bound (the bootstrap barrier guarantees that); any connect failure
    /// is fatal to this worker.
    pub async fn connect_to_peers(&self) -> Result<(), NetError> {
        for peer in 0..self.worker_count {
            if peer == self.worker_id {
                continue;
            }
            let path = socket_path(&self.socket_dir, peer);
            let stream = UnixStream::connect(&path)
                .await
                .map_err(|source| NetError::Connect { peer, source })?;
            self.peers
                .write()
                .expect("peer table lock poisoned")
                .insert(peer, Arc::new(Mutex::new(stream)));
        }
        debug!(
            worker = self.worker_id,
            peers = self.worker_count - 1,
            "connected to all peers"
        );
        Ok(())
    }

    /// Frame `payload` and full-send it to `target`.
    ///
    /// A missing target entry means the mesh is not up (before
    /// `connect_to_peers`) or already torn down (after `close` or peer
    /// death); the frame is dropped, not an error. A write failure marks
    /// the peer dead and removes its entry, so later sends take the drop
    /// path. The only send error is an oversized payload.
    pub async fn send(&self, target: u32, payload: &[u8]) -> Result<(), NetError> {
        let stream = self
            .peers
            .read()
            .expect("peer table lock poisoned")
            .get(&target)
            .cloned();
        let Some(stream) = stream else {
            debug!(worker = self.worker_id, target, "no outbound socket, dropping frame");
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        };

        let frame = encode_frame(payload)?;
        let mut guard = stream.lock().await;
        if let Err(e) = guard.write_all(&frame).await {
            drop(guard);
            warn!(worker = self.worker_id, target, error = %e, "peer socket failed, dropping peer");
            self.peers
                .write()
                .expect("peer table lock poisoned")
                .remove(&target);
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
        self.stats.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes_sent
            .fetch_add(frame.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Tear the transport down: flag the loops, drop every outbound
    /// stream, drop the listener callback, unlink this worker's socket
    /// file. Accept and read loops observe the flag within one tick.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.peers.write().expect("peer table lock poisoned").clear();
        self.listener.write().expect("listener lock poisoned").take();
        let path = self.local_path();
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(worker = self.worker_id, error = %e, "failed to unlink socket file");
            }
        }
        info!(worker = self.worker_id, "transport closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Read loop for one accepted connection.
///
/// Reads up to [`READ_CHUNK_SIZE`] at a time, reassembles frames through a
/// [`FrameBuffer`], and hands each payload to the installed listener in
/// arrival order. Receive timeouts keep partial frames buffered; EOF or a
/// read error ends the loop and closes the connection. A malformed length
/// field closes the connection without resync.
async fn handle_connection(
    mut stream: UnixStream,
    worker: u32,
    closed: Arc<AtomicBool>,
    frame_listener: Arc<RwLock<Option<FrameListener>>>,
    stats: Arc<TransportStats>,
) {
    let mut parser = FrameBuffer::new();
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    loop {
        if closed.load(Ordering::Acquire) {
            break;
        }
        let n = match timeout(IO_TICK, stream.read(&mut chunk)).await {
            // Timeout: keep waiting, a partial frame may be buffered.
            Err(_) => continue,
            Ok(Ok(0)) => {
                if !parser.is_empty() {
                    warn!(worker, "peer closed mid-frame, discarding partial frame");
                }
                break;
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                debug!(worker, error = %e, "connection read failed");
                break;
            }
        };

        parser.push(&chunk[..n]);
        loop {
            match parser.next_frame() {
                Ok(Some(payload)) => {
                    stats.frames_received.fetch_add(1, Ordering::Relaxed);
                    stats
                        .bytes_received
                        .fetch_add(payload.len() as u64, Ordering::Relaxed);
                    let cb = frame_listener
                        .read()
                        .expect("listener lock poisoned")
                        .clone();
                    match cb {
                        Some(cb) => cb(payload),
                        None => {
                            stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                            trace!(worker, "frame arrived before listener installed, dropped");
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(worker, error = %e, "framing error, closing connection");
                    return;
                }
            }
        }
    }
    trace!(worker, "read loop exited");
}
