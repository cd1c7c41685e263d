//! Hive: single-host actor cluster runtime
//!
//! N peer workers on one machine, each with its own cooperative runtime
//! and actor system, a full mesh of Unix-domain sockets between them, a
//! shared path → owner directory, and a consistent-hash ring deciding
//! where each actor path lives. Given a message and a destination path,
//! the runtime decides whether to dispatch locally or over IPC, and
//! delivers it.

pub mod actor;
pub mod cluster;
pub mod codec;
pub mod directory;
pub mod net;
pub mod node;
pub mod ring;

pub use actor::{ActorError, ActorSystem, Props};
pub use cluster::{Cluster, ClusterConfig, ClusterError, WorkerStartFn};
pub use codec::{CodecError, Envelope, PostcardCodec, WireCodec};
pub use directory::Directory;
pub use net::{
    FrameBuffer, FrameError, MAX_FRAME_SIZE, NetError, READ_CHUNK_SIZE, Transport,
    TransportSnapshot,
};
pub use node::{ClusterNode, NodeError};
pub use ring::{DEFAULT_REPLICAS, HashRing};
