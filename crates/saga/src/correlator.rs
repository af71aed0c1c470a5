//! Response correlator: matches inbound inventory results to waiting
//! saga steps.
//!
//! One long-lived reader drains the result stream into a table of
//! pending waiters keyed by correlation key. This replaces per-request
//! consumers of the result stream, which would grow a consumer group per
//! awaited response.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use channel::{Envelope, InventoryResult, messages};
use common::CorrelationKey;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::error::SagaError;

type WaiterTable = Arc<Mutex<HashMap<CorrelationKey, oneshot::Sender<InventoryResult>>>>;

/// Matches inbound results to registered waiters, with timeout-based
/// abandonment.
#[derive(Clone, Default)]
pub struct ResponseCorrelator {
    waiters: WaiterTable,
}

/// A registered waiter for one correlation key.
///
/// Registration and waiting are separate so a caller can register
/// *before* publishing its command: a result that races the publish is
/// buffered for the waiter instead of being discarded as unmatched.
/// Dropping a `PendingResult` removes its registration.
#[derive(Debug)]
pub struct PendingResult {
    key: CorrelationKey,
    rx: Option<oneshot::Receiver<InventoryResult>>,
    waiters: WaiterTable,
}

impl PendingResult {
    /// Blocks the calling saga step until the result arrives or the
    /// timeout elapses.
    ///
    /// On timeout a distinguished [`SagaError::CorrelationTimeout`] is
    /// returned and the registration is removed; the orchestrator treats
    /// that as a reservation failure, not as "retry".
    pub async fn wait(mut self, timeout: Duration) -> Result<InventoryResult, SagaError> {
        let Some(rx) = self.rx.take() else {
            return Err(SagaError::CorrelatorClosed);
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(SagaError::CorrelatorClosed),
            Err(_) => {
                tracing::warn!(key = %self.key, ?timeout, "timed out waiting for inventory result");
                Err(SagaError::CorrelationTimeout { key: self.key })
            }
        }
    }
}

impl Drop for PendingResult {
    fn drop(&mut self) {
        self.waiters.lock().unwrap().remove(&self.key);
    }
}

impl ResponseCorrelator {
    /// Creates a correlator with an empty waiter table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns the background reader draining the result stream.
    ///
    /// Runs until `shutdown` flips to `true` or the stream closes.
    /// Results without a registered waiter (late arrivals after timeout,
    /// or duplicates) are discarded.
    pub fn run(
        &self,
        mut rx: mpsc::Receiver<Envelope>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let waiters = Arc::clone(&self.waiters);
        tokio::spawn(async move {
            tracing::info!("result stream reader started");
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    msg = rx.recv() => match msg {
                        Some(envelope) => dispatch(&waiters, envelope),
                        None => break,
                    },
                }
            }
            // Dropping pending senders wakes waiters with CorrelatorClosed.
            waiters.lock().unwrap().clear();
            tracing::info!("result stream reader stopped");
        })
    }

    /// Registers a waiter for `key`, to be awaited with
    /// [`PendingResult::wait`].
    ///
    /// Callers register before publishing the command the result answers,
    /// so the reader can deliver a result that arrives while the publish
    /// is still in flight.
    pub fn register(&self, key: CorrelationKey) -> Result<PendingResult, SagaError> {
        let mut waiters = self.waiters.lock().unwrap();
        match waiters.entry(key) {
            Entry::Occupied(_) => Err(SagaError::DuplicateWaiter(key)),
            Entry::Vacant(entry) => {
                let (tx, rx) = oneshot::channel();
                entry.insert(tx);
                Ok(PendingResult {
                    key,
                    rx: Some(rx),
                    waiters: Arc::clone(&self.waiters),
                })
            }
        }
    }

    /// Registers a waiter and immediately waits for its result.
    ///
    /// Only correct when the awaited result cannot already be in flight;
    /// command senders use [`ResponseCorrelator::register`] first and
    /// wait after publishing.
    pub async fn await_result(
        &self,
        key: CorrelationKey,
        timeout: Duration,
    ) -> Result<InventoryResult, SagaError> {
        self.register(key)?.wait(timeout).await
    }

    /// Number of registered waiters (for tests and diagnostics).
    pub fn pending(&self) -> usize {
        self.waiters.lock().unwrap().len()
    }
}

fn dispatch(waiters: &WaiterTable, envelope: Envelope) {
    let result: InventoryResult = match messages::decode(&envelope.payload) {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(key = %envelope.key, error = %e, "malformed inventory result, discarding");
            return;
        }
    };

    let key = result.key();
    let waiter = waiters.lock().unwrap().remove(&key);

    match waiter {
        Some(tx) => {
            // The waiter may have just timed out; the result is then dropped.
            if tx.send(result).is_err() {
                tracing::debug!(%key, "waiter gone before delivery, discarding result");
            }
        }
        None => {
            tracing::debug!(%key, "no waiter registered, discarding result");
        }
    }
}
