use std::{
    any::Any,
    collections::HashMap,
    fmt, io,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::{
    StreamExt,
    channel::mpsc::{self, UnboundedSender},
    stream::BoxStream,
};
use log::{debug, trace};
use parking_lot::Mutex;
use tokio::time;
use worker::ModelSnapshot;

use crate::store::EnsembleLog;

/// A held cluster wide lock, released when dropped.
pub struct ClusterLock {
    key: String,
    _guard: Box<dyn Any + Send + Sync>,
}

impl ClusterLock {
    /// Wraps whatever keeps the lock held for a given substrate.
    pub fn new(key: &str, guard: impl Any + Send + Sync) -> Self {
        Self {
            key: key.to_string(),
            _guard: Box::new(guard),
        }
    }
}

impl fmt::Debug for ClusterLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterLock").field("key", &self.key).finish()
    }
}

impl Drop for ClusterLock {
    fn drop(&mut self) {
        trace!(key = self.key.as_str(); "released cluster lock");
    }
}

/// The substrate shared by every member of a cluster.
///
/// Members see each other only through it: a broadcast bus for signals, named locks,
/// a snapshot multiset per domain and a map of ensemble logs.
#[async_trait::async_trait]
pub trait Cluster: Send + Sync {
    /// The amount of live members, this one included.
    fn members(&self) -> usize;

    /// Stops counting this member, rounds started afterwards don't wait for it.
    ///
    /// Calling it more than once is a no op.
    fn leave(&self);

    /// Sends a frame to every subscriber, this member included.
    async fn publish(&self, frame: Vec<u8>) -> io::Result<()>;

    /// Subscribes to every frame published from now on.
    fn subscribe(&self) -> BoxStream<'static, Vec<u8>>;

    /// Tries to take a named lock.
    ///
    /// # Arguments
    /// * `key` - The name of the lock.
    /// * `timeout` - How long to wait for it.
    ///
    /// # Returns
    /// The held lock, or `None` if it wasn't available in time.
    async fn try_lock(&self, key: &str, timeout: Duration) -> Option<ClusterLock>;

    /// Adds a snapshot to a domain's collection.
    async fn add_snapshot(&self, domain: &str, snapshot: ModelSnapshot);

    /// Takes every snapshot out of a domain's collection.
    async fn drain_snapshots(&self, domain: &str) -> Vec<ModelSnapshot>;

    /// Reads a log.
    async fn load_log(&self, key: &str) -> Option<EnsembleLog>;

    /// Replaces a log.
    async fn save_log(&self, key: &str, log: EnsembleLog);
}

#[derive(Default)]
struct Shared {
    members: AtomicUsize,
    subscribers: Mutex<Vec<UnboundedSender<Vec<u8>>>>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    snapshots: Mutex<HashMap<String, Vec<ModelSnapshot>>>,
    logs: Mutex<HashMap<String, EnsembleLog>>,
}

/// An in process cluster, every member lives in the same address space.
#[derive(Clone, Default)]
pub struct LocalCluster {
    shared: Arc<Shared>,
}

impl LocalCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a member to the cluster.
    ///
    /// # Returns
    /// The member's handle, it leaves the cluster when dropped.
    pub fn join(&self) -> LocalMember {
        let members = self.shared.members.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(members = members; "member joined the local cluster");

        LocalMember {
            shared: Arc::clone(&self.shared),
            left: AtomicBool::new(false),
        }
    }

    pub fn members(&self) -> usize {
        self.shared.members.load(Ordering::Acquire)
    }
}

/// A member's view of a `LocalCluster`.
pub struct LocalMember {
    shared: Arc<Shared>,
    left: AtomicBool,
}

impl Drop for LocalMember {
    fn drop(&mut self) {
        self.leave();
    }
}

#[async_trait::async_trait]
impl Cluster for LocalMember {
    fn members(&self) -> usize {
        self.shared.members.load(Ordering::Acquire)
    }

    fn leave(&self) {
        if self.left.swap(true, Ordering::AcqRel) {
            return;
        }

        let members = self.shared.members.fetch_sub(1, Ordering::AcqRel) - 1;
        debug!(members = members; "member left the local cluster");
    }

    async fn publish(&self, frame: Vec<u8>) -> io::Result<()> {
        let mut subscribers = self.shared.subscribers.lock();
        subscribers.retain(|tx| tx.unbounded_send(frame.clone()).is_ok());
        Ok(())
    }

    fn subscribe(&self) -> BoxStream<'static, Vec<u8>> {
        let (tx, rx) = mpsc::unbounded();
        self.shared.subscribers.lock().push(tx);
        rx.boxed()
    }

    async fn try_lock(&self, key: &str, timeout: Duration) -> Option<ClusterLock> {
        let lock = {
            let mut locks = self.shared.locks.lock();
            Arc::clone(locks.entry(key.to_string()).or_default())
        };

        let guard = time::timeout(timeout, lock.lock_owned()).await.ok()?;
        trace!(key = key; "acquired cluster lock");
        Some(ClusterLock::new(key, guard))
    }

    async fn add_snapshot(&self, domain: &str, snapshot: ModelSnapshot) {
        self.shared
            .snapshots
            .lock()
            .entry(domain.to_string())
            .or_default()
            .push(snapshot);
    }

    async fn drain_snapshots(&self, domain: &str) -> Vec<ModelSnapshot> {
        self.shared
            .snapshots
            .lock()
            .remove(domain)
            .unwrap_or_default()
    }

    async fn load_log(&self, key: &str) -> Option<EnsembleLog> {
        self.shared.logs.lock().get(key).cloned()
    }

    async fn save_log(&self, key: &str, log: EnsembleLog) {
        self.shared.logs.lock().insert(key.to_string(), log);
    }
}
