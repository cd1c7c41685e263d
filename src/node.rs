//! Cluster node façade
//!
//! One per worker. Composes the actor system, transport, ring, directory,
//! and codec into the two operations applications care about: spawn an
//! actor at a path, send a message to a path. Placement is settled by the
//! directory first and the ring second; the first reference to an unknown
//! path claims its owner in the directory for everyone.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::actor::{ActorError, ActorSystem, Props};
use crate::codec::{CodecError, Envelope, WireCodec};
use crate::directory::Directory;
use crate::net::{NetError, Transport, TransportSnapshot};
use crate::ring::HashRing;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("path {path:?} is placed on worker {owner}, not worker {worker}")]
    Misplaced { path: String, owner: u32, worker: u32 },
    #[error("no local actor at {0:?}")]
    NotLocal(String),
    #[error(transparent)]
    Actor(#[from] ActorError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Net(#[from] NetError),
}

pub struct ClusterNode {
    worker_id: u32,
    system: Arc<ActorSystem>,
    transport: Arc<Transport>,
    ring: Arc<HashRing>,
    directory: Arc<Directory>,
    codec: Arc<dyn WireCodec>,
}

impl ClusterNode {
    pub fn new(
        worker_id: u32,
        system: Arc<ActorSystem>,
        transport: Arc<Transport>,
        ring: Arc<HashRing>,
        directory: Arc<Directory>,
        codec: Arc<dyn WireCodec>,
    ) -> Self {
        Self {
            worker_id,
            system,
            transport,
            ring,
            directory,
            codec,
        }
    }

    pub fn worker_id(&self) -> u32 {
        self.worker_id
    }

    pub fn worker_count(&self) -> u32 {
        self.ring.worker_count()
    }

    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    pub fn transport_stats(&self) -> TransportSnapshot {
        self.transport.stats()
    }

    /// Install the inbound side: decode each frame into an envelope and
    /// hand the payload to the local actor. Envelopes naming a path with
    /// no local actor are dropped; the node never forwards.
    pub fn start(&self) {
        let worker = self.worker_id;
        let system = self.system.clone();
        let codec = self.codec.clone();
        self.transport.set_listener(move |bytes| {
            let envelope = match codec.decode(&bytes) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(worker, error = %e, "undecodable envelope, dropping");
                    return;
                }
            };
            if !system.deliver(&envelope.path, envelope.payload) {
                warn!(worker, path = %envelope.path, "no local actor for inbound envelope, dropping");
            }
        });
        debug!(worker, "node started");
    }

    /// Spawn an actor at `path` on this worker and publish the placement.
    ///
    /// Refuses paths the ring places on another worker. That refusal is
    /// what keeps any path from ever being registered under two different
    /// owners.
    pub fn spawn(&self, props: Props, path: &str) -> Result<(), NodeError> {
        let owner = self.ring.node_for(path);
        if owner != self.worker_id {
            return Err(NodeError::Misplaced {
                path: path.to_string(),
                owner,
                worker: self.worker_id,
            });
        }
        self.system.spawn(props, path)?;
        self.directory.register(path, self.worker_id);
        Ok(())
    }

    /// Spawn at `path` here regardless of what the ring says. Deliberate
    /// placement override; the caller owns the consequences of competing
    /// registrations.
    pub fn spawn_pinned(&self, props: Props, path: &str) -> Result<(), NodeError> {
        self.system.spawn(props, path)?;
        self.directory.register(path, self.worker_id);
        Ok(())
    }

    /// Route `message` to the actor at `path`, local or remote.
    pub async fn send(&self, path: &str, message: Vec<u8>) -> Result<(), NodeError> {
        let owner = match self.directory.lookup(path) {
            Some(owner) => owner,
            None => {
                // Claim on first reference: this send fixes the owner.
                let owner = self.ring.node_for(path);
                self.directory.register(path, owner);
                owner
            }
        };

        if owner == self.worker_id {
            if !self.system.deliver(path, message) {
                warn!(worker = self.worker_id, path, "no local actor at owned path, dropping");
            }
            return Ok(());
        }

        let frame = self.codec.encode(&Envelope {
            path: path.to_string(),
            payload: message,
        })?;
        self.transport.send(owner, &frame).await?;
        Ok(())
    }

    /// Terminate the actor at `path` and retire its directory entry. Only
    /// the owning worker may do this.
    pub fn stop_actor(&self, path: &str) -> Result<(), NodeError> {
        if !self.system.stop(path) {
            return Err(NodeError::NotLocal(path.to_string()));
        }
        self.directory.remove(path);
        Ok(())
    }

    /// Stop this worker's actor system; the worker's `run` returns and the
    /// bootstrap tears the node down.
    pub fn shutdown(&self) {
        self.system.shutdown();
    }

    /// Tear down the transport. Called by the bootstrap after the actor
    /// system has stopped.
    pub fn close(&self) {
        self.transport.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PostcardCodec;
    use crate::ring::DEFAULT_REPLICAS;

    fn test_node(worker_id: u32, worker_count: u32, name: &str) -> ClusterNode {
        let dir = std::env::temp_dir().join(format!("hive_node_{name}_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        ClusterNode::new(
            worker_id,
            Arc::new(ActorSystem::new(format!("worker-{worker_id}"))),
            Arc::new(Transport::new(worker_id, worker_count, dir)),
            Arc::new(HashRing::new(worker_count, DEFAULT_REPLICAS)),
            Arc::new(Directory::new(64)),
            Arc::new(PostcardCodec),
        )
    }

    fn path_owned_by(ring: &HashRing, owner: u32) -> String {
        (0..)
            .map(|i| format!("probe/{i}"))
            .find(|p| ring.node_for(p) == owner)
            .unwrap()
    }

    #[tokio::test]
    async fn test_spawn_refuses_misplaced_path() {
        let node = test_node(0, 4, "misplaced");
        let ring = HashRing::new(4, DEFAULT_REPLICAS);
        let foreign = path_owned_by(&ring, 2);
        let result = node.spawn(Props::from_fn(|_| {}), &foreign);
        assert!(matches!(result, Err(NodeError::Misplaced { owner: 2, .. })));
        assert!(!node.directory().has(&foreign));
    }

    #[tokio::test]
    async fn test_spawn_pinned_overrides_placement() {
        let node = test_node(0, 4, "pinned");
        let ring = HashRing::new(4, DEFAULT_REPLICAS);
        let foreign = path_owned_by(&ring, 2);
        node.spawn_pinned(Props::from_fn(|_| {}), &foreign).unwrap();
        assert_eq!(node.directory().lookup(&foreign), Some(0));
    }

    #[tokio::test]
    async fn test_send_claims_owner_on_first_reference() {
        let node = test_node(0, 4, "claim");
        let ring = HashRing::new(4, DEFAULT_REPLICAS);
        let remote = path_owned_by(&ring, 3);
        // No mesh is up; the send is dropped by the transport, but the
        // claim must still land.
        node.send(&remote, b"hi".to_vec()).await.unwrap();
        assert_eq!(node.directory().lookup(&remote), Some(3));
    }

    #[tokio::test]
    async fn test_stop_actor_retires_directory_entry() {
        let node = test_node(0, 1, "stop");
        node.spawn(Props::from_fn(|_| {}), "a").unwrap();
        assert!(node.directory().has("a"));
        node.stop_actor("a").unwrap();
        assert!(!node.directory().has("a"));
        assert!(matches!(node.stop_actor("a"), Err(NodeError::NotLocal(_))));
    }
}
