use std::{collections::HashMap, sync::Arc, time::Duration};

use log::{debug, trace};
use parking_lot::Mutex;
use tokio::{sync::mpsc, time};

/// The in flight gather rounds initiated by this member, one slot per domain.
///
/// Acknowledgements for a domain without a slot belong to another member's round
/// and are dropped.
#[derive(Debug, Default)]
pub struct PendingRounds {
    slots: Mutex<HashMap<String, mpsc::UnboundedSender<()>>>,
}

impl PendingRounds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the slot of a domain, replacing any stale one.
    ///
    /// # Returns
    /// The ticket the initiator waits on, the slot is closed when it's dropped.
    pub fn open(self: &Arc<Self>, domain: &str) -> RoundTicket {
        let (tx, rx) = mpsc::unbounded_channel();
        self.slots.lock().insert(domain.to_string(), tx);

        RoundTicket {
            domain: domain.to_string(),
            rounds: Arc::clone(self),
            acks: rx,
        }
    }

    /// Counts an acknowledgement for a domain.
    ///
    /// # Returns
    /// Whether a round of this member was waiting for it.
    pub fn acknowledge(&self, domain: &str) -> bool {
        match self.slots.lock().get(domain) {
            Some(tx) => tx.send(()).is_ok(),
            None => {
                trace!(domain = domain; "acknowledgement for a foreign round");
                false
            }
        }
    }

    #[cfg(test)]
    fn is_open(&self, domain: &str) -> bool {
        self.slots.lock().contains_key(domain)
    }
}

/// The initiator's end of a round's slot.
#[derive(Debug)]
pub struct RoundTicket {
    domain: String,
    rounds: Arc<PendingRounds>,
    acks: mpsc::UnboundedReceiver<()>,
}

impl RoundTicket {
    /// Waits until `expected` acknowledgements arrived.
    ///
    /// # Returns
    /// Whether they all arrived before `timeout`.
    pub async fn wait(&mut self, expected: usize, timeout: Duration) -> bool {
        let count = async {
            let mut received = 0;
            while received < expected {
                if self.acks.recv().await.is_none() {
                    break;
                }
                received += 1;
            }
            received
        };

        match time::timeout(timeout, count).await {
            Ok(received) => received >= expected,
            Err(_) => {
                debug!(domain = self.domain.as_str(); "gave up waiting for {expected} acknowledgements");
                false
            }
        }
    }
}

impl Drop for RoundTicket {
    fn drop(&mut self) {
        self.rounds.slots.lock().remove(&self.domain);
    }
}
