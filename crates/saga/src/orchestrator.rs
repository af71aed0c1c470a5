//! Saga orchestrator: drives one order's fulfillment state machine.

use std::sync::Arc;
use std::time::Duration;

use channel::{
    Envelope, MessageBus, ReleaseCommand, ReserveCommand, Topic, messages, publish_with_retry,
};
use common::OrderId;

use crate::correlator::ResponseCorrelator;
use crate::error::SagaError;
use crate::model::{Order, OrderItem, OrderSaga};
use crate::state::SagaStatus;
use crate::store::OrderStore;

/// Default deadline for each awaited inventory result. Per item, not per
/// order: an N-item order can take up to N × timeout sequentially.
pub const DEFAULT_AWAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Orchestrates order fulfillment sagas.
///
/// Reservation is sequential and in list order so the compensation set
/// at any failure point is exactly the prefix of already-reserved items.
/// The caller blocks until the saga reaches COMPLETED or FAILED.
pub struct SagaOrchestrator<B, O>
where
    B: MessageBus,
    O: OrderStore,
{
    bus: B,
    store: O,
    correlator: Arc<ResponseCorrelator>,
    await_timeout: Duration,
}

impl<B, O> SagaOrchestrator<B, O>
where
    B: MessageBus,
    O: OrderStore,
{
    /// Creates an orchestrator with the default per-item timeout.
    pub fn new(bus: B, store: O, correlator: Arc<ResponseCorrelator>) -> Self {
        Self {
            bus,
            store,
            correlator,
            await_timeout: DEFAULT_AWAIT_TIMEOUT,
        }
    }

    /// Overrides the per-item await timeout.
    pub fn with_await_timeout(mut self, timeout: Duration) -> Self {
        self.await_timeout = timeout;
        self
    }

    /// Creates an order and runs its fulfillment saga to completion.
    ///
    /// Returns the order id only after the saga reached COMPLETED. On
    /// any reservation or persistence failure the already-reserved
    /// prefix is compensated, the saga is marked FAILED, and the
    /// original cause is returned.
    #[tracing::instrument(skip(self, items), fields(item_count = items.len()))]
    pub async fn create_order(&self, items: Vec<OrderItem>) -> Result<OrderId, SagaError> {
        metrics::counter!("saga_executions_total").increment(1);
        let saga_start = std::time::Instant::now();

        // 1. Validate before anything is persisted; no compensation needed.
        if items.is_empty() {
            return Err(SagaError::EmptyOrder);
        }
        if let Some(item) = items.iter().find(|item| item.quantity == 0) {
            return Err(SagaError::InvalidQuantity(item.product.id));
        }

        // 2. Persist the pending order and the saga record before the
        // first reservation attempt.
        let order_id = self.store.create_order().await?;
        self.store.create_saga(OrderSaga::new(order_id)).await?;
        tracing::info!(%order_id, "saga started");

        // 3. Reserve each line item in order, advancing the durable step
        // counter only after the reservation is confirmed. Any failure
        // past this point, including a saga-record write failure, must
        // compensate the reserved prefix before it propagates.
        for (i, item) in items.iter().enumerate() {
            if let Err(e) = self
                .store
                .update_saga_status(order_id, SagaStatus::Reserving)
                .await
            {
                tracing::error!(%order_id, error = %e, "failed to record RESERVING status");
                self.fail_saga(order_id, &items[..i], saga_start).await;
                return Err(e.into());
            }

            if let Err(e) = self.reserve_item(order_id, item).await {
                tracing::warn!(%order_id, product_id = %item.product.id, error = %e, "reservation step failed");
                self.fail_saga(order_id, &items[..i], saga_start).await;
                return Err(e);
            }

            // Item i is reserved by now, so it joins the compensation set.
            if let Err(e) = self.store.update_saga_step(order_id, i + 1).await {
                tracing::error!(%order_id, step = i + 1, error = %e, "failed to record saga step");
                self.fail_saga(order_id, &items[..=i], saga_start).await;
                return Err(e.into());
            }
        }

        if let Err(e) = self
            .store
            .update_saga_status(order_id, SagaStatus::InventoryReserved)
            .await
        {
            tracing::error!(%order_id, error = %e, "failed to record INVENTORY_RESERVED status");
            self.fail_saga(order_id, &items, saga_start).await;
            return Err(e.into());
        }

        // 4. Commit the line items. A failure here compensates every
        // reservation even though all of them succeeded.
        if let Err(e) = self.store.create_order_items(order_id, &items).await {
            tracing::error!(%order_id, error = %e, "failed to persist order items, compensating all reservations");
            self.fail_saga(order_id, &items, saga_start).await;
            return Err(SagaError::Store(e));
        }

        // The line items are already durable, so this failure is not
        // compensated; releasing stock now would under-count a fulfilled
        // order. The record stays INVENTORY_RESERVED for reconciliation.
        if let Err(e) = self
            .store
            .update_saga_status(order_id, SagaStatus::Completed)
            .await
        {
            tracing::error!(%order_id, error = %e, "failed to record saga completion");
            return Err(e.into());
        }

        metrics::histogram!("saga_duration_seconds").record(saga_start.elapsed().as_secs_f64());
        metrics::counter!("saga_completed").increment(1);
        tracing::info!(%order_id, "saga completed");
        Ok(order_id)
    }

    /// Returns all orders with their persisted items and mirrored status.
    pub async fn get_orders(&self) -> Result<Vec<Order>, SagaError> {
        Ok(self.store.get_orders().await?)
    }

    /// Sends one reserve command and awaits its correlated result.
    ///
    /// The waiter is registered before the publish: the engine may answer
    /// while the publish call is still returning, and an unregistered
    /// result would be discarded by the correlator. If the publish fails,
    /// dropping the registration abandons the waiter.
    async fn reserve_item(&self, order_id: OrderId, item: &OrderItem) -> Result<(), SagaError> {
        let command = ReserveCommand::new(order_id, item.product.id, item.quantity);
        let key = command.key();

        let pending = self.correlator.register(key)?;
        publish_with_retry(
            &self.bus,
            Topic::ReserveCommands,
            Envelope::new(key.to_string(), messages::encode(&command)?),
        )
        .await?;

        let result = pending.wait(self.await_timeout).await?;
        if result.success {
            Ok(())
        } else {
            Err(SagaError::ReservationFailed {
                product_id: item.product.id,
                reason: result
                    .error
                    .unwrap_or_else(|| "unspecified engine failure".to_string()),
            })
        }
    }

    /// Compensates the reserved prefix and marks the saga FAILED.
    ///
    /// Marked only after every compensating release has been issued, so
    /// a FAILED saga implies its releases were triggered. Infallible: a
    /// failure to record the FAILED status is logged rather than
    /// returned, so the callers' original error always reaches the
    /// caller instead of being replaced by a store error.
    async fn fail_saga(
        &self,
        order_id: OrderId,
        reserved: &[OrderItem],
        saga_start: std::time::Instant,
    ) {
        self.compensate(order_id, reserved).await;
        if let Err(e) = self
            .store
            .update_saga_status(order_id, SagaStatus::Failed)
            .await
        {
            tracing::error!(%order_id, error = %e, "failed to record FAILED status after compensation");
        }

        metrics::histogram!("saga_duration_seconds").record(saga_start.elapsed().as_secs_f64());
        metrics::counter!("saga_failed").increment(1);
        tracing::warn!(%order_id, released_items = reserved.len(), "saga failed");
    }

    /// Issues a compensating release for every already-reserved item, in
    /// order. Releases are best-effort: a release that fails or times
    /// out is logged and the compensation continues, leaving inventory
    /// under-released as a reconciliation concern.
    async fn compensate(&self, order_id: OrderId, reserved: &[OrderItem]) {
        for item in reserved {
            let command = ReleaseCommand::new(order_id, item.product.id, item.quantity);
            let key = command.key();

            let payload = match messages::encode(&command) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!(%key, error = %e, "failed to encode release command");
                    continue;
                }
            };

            // Registered before the publish for the same reason as the
            // reserve path: the confirmation can race the publish call.
            let pending = match self.correlator.register(key) {
                Ok(pending) => pending,
                Err(e) => {
                    metrics::counter!("saga_compensation_failures_total").increment(1);
                    tracing::error!(%key, error = %e, "failed to register for release confirmation");
                    continue;
                }
            };

            if let Err(e) = publish_with_retry(
                &self.bus,
                Topic::ReleaseCommands,
                Envelope::new(key.to_string(), payload),
            )
            .await
            {
                metrics::counter!("saga_compensation_failures_total").increment(1);
                tracing::error!(%key, error = %e, "failed to publish release command");
                continue;
            }

            match pending.wait(self.await_timeout).await {
                Ok(result) if result.success => {
                    tracing::info!(%key, quantity = item.quantity, "released reserved inventory");
                }
                Ok(result) => {
                    metrics::counter!("saga_compensation_failures_total").increment(1);
                    tracing::error!(%key, error = ?result.error, "release rejected by engine");
                }
                Err(e) => {
                    metrics::counter!("saga_compensation_failures_total").increment(1);
                    tracing::error!(%key, error = %e, "no confirmation for release command");
                }
            }
        }
    }
}
