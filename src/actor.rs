//! Minimal actor system
//!
//! Actors are lightweight tasks addressed by path, each draining a private
//! FIFO mailbox. The cluster node only touches this module through spawn,
//! deliver, stop, and run, the surface a fuller actor system would expose.
//! Mailbox hand-off is the synchronizing boundary: read loops deliver from
//! many tasks concurrently, the actor processes strictly one message at a
//! time.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockWriteGuard};
use thiserror::Error;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ActorError {
    #[error("actor already spawned at {0:?}")]
    AlreadySpawned(String),
    #[error("actor path must not be empty")]
    EmptyPath,
}

/// Actor behavior: invoked once per mailbox message, in arrival order.
pub type Behavior = Box<dyn FnMut(Vec<u8>) + Send>;

/// Recipe for an actor: produces the behavior at spawn time.
pub struct Props {
    make: Box<dyn FnOnce() -> Behavior + Send>,
}

impl Props {
    /// Props from a plain message handler.
    pub fn from_fn<F>(handler: F) -> Self
    where
        F: FnMut(Vec<u8>) + Send + 'static,
    {
        Self {
            make: Box::new(move || Box::new(handler)),
        }
    }
}

pub struct ActorSystem {
    name: String,
    mailboxes: RwLock<HashMap<String, mpsc::UnboundedSender<Vec<u8>>>>,
    shutdown: Notify,
}

impl ActorSystem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mailboxes: RwLock::new(HashMap::new()),
            shutdown: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn mailboxes(&self) -> RwLockWriteGuard<'_, HashMap<String, mpsc::UnboundedSender<Vec<u8>>>> {
        self.mailboxes.write().expect("mailbox lock poisoned")
    }

    /// Instantiate an actor at `path`. The behavior task runs until the
    /// actor is stopped or the system shuts down.
    pub fn spawn(&self, props: Props, path: &str) -> Result<(), ActorError> {
        if path.is_empty() {
            return Err(ActorError::EmptyPath);
        }
        let mut mailboxes = self.mailboxes();
        if mailboxes.contains_key(path) {
            return Err(ActorError::AlreadySpawned(path.to_string()));
        }
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        mailboxes.insert(path.to_string(), tx);
        drop(mailboxes);

        let mut behavior = (props.make)();
        let task_path = path.to_string();
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                behavior(message);
            }
            debug!(path = %task_path, "actor mailbox closed");
        });
        debug!(system = %self.name, path, "actor spawned");
        Ok(())
    }

    /// Enqueue `message` for the actor at `path`. Returns false when no
    /// such actor exists here.
    pub fn deliver(&self, path: &str, message: Vec<u8>) -> bool {
        let sender = {
            let mailboxes = self.mailboxes.read().expect("mailbox lock poisoned");
            mailboxes.get(path).cloned()
        };
        match sender {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    pub fn has_actor(&self, path: &str) -> bool {
        self.mailboxes
            .read()
            .expect("mailbox lock poisoned")
            .contains_key(path)
    }

    /// Stop the actor at `path`. Messages already in its mailbox are still
    /// processed; new deliveries miss. Returns false when no such actor
    /// exists here.
    pub fn stop(&self, path: &str) -> bool {
        let removed = self.mailboxes().remove(path).is_some();
        if removed {
            debug!(system = %self.name, path, "actor stopped");
        }
        removed
    }

    /// Block until `shutdown` is called, then drop every mailbox so actor
    /// tasks drain and exit.
    pub async fn run(&self) {
        self.shutdown.notified().await;
        self.mailboxes().clear();
        info!(system = %self.name, "actor system stopped");
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc as tokio_mpsc;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_mailbox_fifo() {
        let system = ActorSystem::new("t");
        let (tx, mut rx) = tokio_mpsc::unbounded_channel::<Vec<u8>>();
        system
            .spawn(
                Props::from_fn(move |msg| {
                    let _ = tx.send(msg);
                }),
                "echo",
            )
            .unwrap();

        for i in 0u8..20 {
            assert!(system.deliver("echo", vec![i]));
        }
        for i in 0u8..20 {
            let got = timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(got, vec![i]);
        }
    }

    #[tokio::test]
    async fn test_deliver_unknown_path() {
        let system = ActorSystem::new("t");
        assert!(!system.deliver("ghost", b"hi".to_vec()));
    }

    #[tokio::test]
    async fn test_double_spawn_refused() {
        let system = ActorSystem::new("t");
        system.spawn(Props::from_fn(|_| {}), "a").unwrap();
        assert!(matches!(
            system.spawn(Props::from_fn(|_| {}), "a"),
            Err(ActorError::AlreadySpawned(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_removes_actor() {
        let system = ActorSystem::new("t");
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        system
            .spawn(
                Props::from_fn(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
                "a",
            )
            .unwrap();
        assert!(system.stop("a"));
        assert!(!system.stop("a"));
        assert!(!system.deliver("a", Vec::new()));
    }

    #[tokio::test]
    async fn test_shutdown_completes_run() {
        let system = Arc::new(ActorSystem::new("t"));
        system.spawn(Props::from_fn(|_| {}), "a").unwrap();
        system.shutdown();
        timeout(Duration::from_secs(1), system.run()).await.unwrap();
        assert!(!system.has_actor("a"));
    }
}
