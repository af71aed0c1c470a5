//! Long-running command stream workers.
//!
//! One worker drains each command topic with a blocking receive; both run
//! until the shutdown signal flips or the channel closes. Every consumed
//! command is answered with exactly one result on the results stream.

use std::sync::Arc;

use channel::{
    ChannelError, Envelope, InventoryResult, MessageBus, ReleaseCommand, ReserveCommand, Topic,
    messages, publish_with_retry,
};
use common::CorrelationKey;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::engine::ReservationEngine;
use crate::store::InventoryStore;

/// Subscribes to both command topics and spawns the two workers.
///
/// Fails eagerly if either topic already has a consumer. The returned
/// handles complete after `shutdown` flips to `true` (or its sender is
/// dropped).
pub fn spawn_workers<S, B>(
    engine: Arc<ReservationEngine<S>>,
    bus: B,
    shutdown: watch::Receiver<bool>,
) -> Result<Vec<JoinHandle<()>>, ChannelError>
where
    S: InventoryStore + 'static,
    B: MessageBus + Clone + 'static,
{
    let reserve_rx = bus.subscribe(Topic::ReserveCommands)?;
    let release_rx = bus.subscribe(Topic::ReleaseCommands)?;

    let reserve_handle = tokio::spawn(run_reserve_worker(
        Arc::clone(&engine),
        bus.clone(),
        reserve_rx,
        shutdown.clone(),
    ));
    let release_handle = tokio::spawn(run_release_worker(engine, bus, release_rx, shutdown));

    Ok(vec![reserve_handle, release_handle])
}

async fn run_reserve_worker<S, B>(
    engine: Arc<ReservationEngine<S>>,
    bus: B,
    mut rx: mpsc::Receiver<Envelope>,
    mut shutdown: watch::Receiver<bool>,
) where
    S: InventoryStore,
    B: MessageBus,
{
    tracing::info!("reserve worker started");
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            msg = rx.recv() => match msg {
                Some(envelope) => handle_reserve(&engine, &bus, envelope).await,
                None => break,
            },
        }
    }
    tracing::info!("reserve worker stopped");
}

async fn run_release_worker<S, B>(
    engine: Arc<ReservationEngine<S>>,
    bus: B,
    mut rx: mpsc::Receiver<Envelope>,
    mut shutdown: watch::Receiver<bool>,
) where
    S: InventoryStore,
    B: MessageBus,
{
    tracing::info!("release worker started");
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            msg = rx.recv() => match msg {
                Some(envelope) => handle_release(&engine, &bus, envelope).await,
                None => break,
            },
        }
    }
    tracing::info!("release worker stopped");
}

async fn handle_reserve<S: InventoryStore, B: MessageBus>(
    engine: &ReservationEngine<S>,
    bus: &B,
    envelope: Envelope,
) {
    let command: ReserveCommand = match messages::decode(&envelope.payload) {
        Ok(command) => command,
        Err(e) => {
            reject_malformed(bus, &envelope, "reserve", e).await;
            return;
        }
    };

    let key = command.key();
    tracing::info!(%key, quantity = command.quantity, "processing reserve command");

    let result = match engine.reserve(key, command.quantity).await {
        Ok(()) => InventoryResult::ok(key),
        Err(e) => {
            tracing::warn!(%key, error = %e, "reserve failed");
            InventoryResult::failure(key, e.to_string())
        }
    };

    publish_result(bus, result).await;
}

async fn handle_release<S: InventoryStore, B: MessageBus>(
    engine: &ReservationEngine<S>,
    bus: &B,
    envelope: Envelope,
) {
    let command: ReleaseCommand = match messages::decode(&envelope.payload) {
        Ok(command) => command,
        Err(e) => {
            reject_malformed(bus, &envelope, "release", e).await;
            return;
        }
    };

    let key = command.key();
    tracing::info!(%key, quantity = command.quantity, "processing release command");

    let result = match engine.release(key, command.quantity).await {
        Ok(()) => InventoryResult::ok(key),
        Err(e) => {
            tracing::warn!(%key, error = %e, "release failed");
            InventoryResult::failure(key, e.to_string())
        }
    };

    publish_result(bus, result).await;
}

/// Answers a command whose body did not parse. A failure result still goes
/// out when the message key identifies the caller; otherwise the message
/// can only be dropped.
async fn reject_malformed<B: MessageBus>(
    bus: &B,
    envelope: &Envelope,
    kind: &str,
    error: ChannelError,
) {
    match CorrelationKey::parse(&envelope.key) {
        Some(key) => {
            tracing::error!(%key, kind, error = %error, "malformed command payload");
            publish_result(
                bus,
                InventoryResult::failure(key, format!("malformed {kind} command: {error}")),
            )
            .await;
        }
        None => {
            tracing::error!(key = %envelope.key, kind, error = %error, "malformed command with unparseable key, dropping");
        }
    }
}

/// Publishes a result with bounded retry. An undeliverable result is the
/// single biggest consistency risk in the system: the waiting saga will
/// time out and compensate while the reservation may have committed, so
/// it is logged loudly for reconciliation.
async fn publish_result<B: MessageBus>(bus: &B, result: InventoryResult) {
    let key = result.key();
    let payload = match messages::encode(&result) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(%key, error = %e, "failed to encode inventory result");
            return;
        }
    };

    match publish_with_retry(bus, Topic::Results, Envelope::new(key.to_string(), payload)).await {
        Ok(()) => {
            tracing::info!(%key, success = result.success, "published inventory result");
        }
        Err(e) => {
            metrics::counter!("inventory_results_dropped_total").increment(1);
            tracing::error!(%key, error = %e, "inventory result undeliverable, manual reconciliation required");
        }
    }
}
