use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::oneshot;
use tracing::debug;

use crate::error::SsoError;

use super::codec::SsoResponse;
use super::push::PushSink;

pub type ResultSlot = oneshot::Receiver<Result<SsoResponse, SsoError>>;

struct PendingEntry {
    command: String,
    created_at: Instant,
    tx: oneshot::Sender<Result<SsoResponse, SsoError>>,
}

/// Outstanding requests keyed by sequence number.
///
/// Every operation is one short critical section, and removal from the map
/// decides who wins when `complete`, `cancel` and `fail_all` race on the same
/// sequence: the first to remove the entry resolves it, the rest are no-ops.
pub struct PendingTable {
    entries: Mutex<HashMap<i32, PendingEntry>>,
    push: PushSink,
}

impl PendingTable {
    pub fn new(push: PushSink) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            push,
        }
    }

    /// Register a new outstanding request. Rejects a sequence that is still
    /// pending (possible only after the counter wraps).
    pub fn register(&self, sequence: i32, command: &str) -> Result<ResultSlot, SsoError> {
        let mut entries = self.lock();
        match entries.entry(sequence) {
            Entry::Occupied(_) => Err(SsoError::SequenceInUse(sequence)),
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                slot.insert(PendingEntry {
                    command: command.to_string(),
                    created_at: Instant::now(),
                    tx,
                });
                Ok(rx)
            }
        }
    }

    /// Resolve the entry for `resp.sequence`, or hand the frame to the push
    /// sink when nobody is waiting for it. Returns true if a caller got it.
    pub fn complete(&self, resp: SsoResponse) -> bool {
        let entry = self.lock().remove(&resp.sequence);
        let Some(entry) = entry else {
            self.push.deliver(resp);
            return false;
        };
        debug!(
            "[seq={}] {} answered in {:?}",
            resp.sequence,
            entry.command,
            entry.created_at.elapsed()
        );
        match entry.tx.send(Ok(resp)) {
            Ok(()) => true,
            Err(Ok(resp)) => {
                self.push.deliver(resp);
                false
            }
            Err(Err(_)) => false,
        }
    }

    /// Resolve a single entry with an error.
    pub fn fail(&self, sequence: i32, err: SsoError) -> bool {
        let entry = self.lock().remove(&sequence);
        match entry {
            Some(entry) => entry.tx.send(Err(err)).is_ok(),
            None => false,
        }
    }

    /// Drop the entry of a caller that stopped waiting.
    pub fn cancel(&self, sequence: i32) -> bool {
        self.lock().remove(&sequence).is_some()
    }

    /// Fail every outstanding entry and clear the table. Returns how many
    /// entries were failed.
    pub fn fail_all(&self, err: SsoError) -> usize {
        let drained: Vec<PendingEntry> = self.lock().drain().map(|(_, e)| e).collect();
        let count = drained.len();
        for entry in drained {
            let _ = entry.tx.send(Err(err.clone()));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<i32, PendingEntry>> {
        // The map holds no invariants a panicking holder could break.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
