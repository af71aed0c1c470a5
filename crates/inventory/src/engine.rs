//! Reservation engine: atomic reserve/release against the inventory store.

use std::collections::HashMap;

use common::CorrelationKey;
use tokio::sync::Mutex;

use crate::error::InventoryError;
use crate::store::InventoryStore;

#[derive(Debug, Default)]
struct EngineState {
    /// Quantities of reserve commands already applied, keyed by
    /// correlation key. Commands are redelivered at-least-once; a replay
    /// of an identical completed reserve must not decrement twice.
    ///
    /// The ledger is never pruned and grows with every distinct completed
    /// reserve for the life of the process. The redelivery window is
    /// unbounded, and the protocol carries no settlement signal that
    /// would make an entry safe to drop, so memory is traded for replay
    /// idempotency. One entry is two ids and a quantity.
    completed_reserves: HashMap<CorrelationKey, u32>,
}

/// Applies reserve and release commands to the inventory store.
///
/// The engine holds a single lock across every read-check-write so that
/// concurrent reservations for the same product cannot both pass the
/// stock check. The same lock guards the dedupe ledger.
pub struct ReservationEngine<S> {
    store: S,
    state: Mutex<EngineState>,
}

impl<S: InventoryStore> ReservationEngine<S> {
    /// Creates an engine over the given store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            state: Mutex::new(EngineState::default()),
        }
    }

    /// Reserves stock for one order line item.
    ///
    /// Fails with [`InventoryError::InsufficientStock`] without mutating
    /// anything when the available quantity is below the request. An
    /// identical already-completed reserve is a no-op success.
    pub async fn reserve(&self, key: CorrelationKey, quantity: u32) -> Result<(), InventoryError> {
        let mut state = self.state.lock().await;

        if state.completed_reserves.get(&key) == Some(&quantity) {
            tracing::debug!(%key, quantity, "duplicate reserve command, treating as no-op success");
            metrics::counter!("inventory_duplicate_reserves_total").increment(1);
            return Ok(());
        }

        let available = self.store.get_quantity(key.product_id).await?;
        if available < quantity {
            return Err(InventoryError::InsufficientStock {
                product_id: key.product_id,
                available,
                requested: quantity,
            });
        }

        self.store
            .set_quantity(key.product_id, available - quantity)
            .await?;
        state.completed_reserves.insert(key, quantity);

        metrics::counter!("inventory_reservations_total").increment(1);
        tracing::info!(%key, quantity, remaining = available - quantity, "reserved inventory");
        Ok(())
    }

    /// Releases previously reserved stock.
    ///
    /// Purely additive with no upper bound: release amounts mirror prior
    /// reserves, and a release for a reservation that never committed
    /// must stay safe (the timeout ambiguity of the protocol).
    pub async fn release(&self, key: CorrelationKey, quantity: u32) -> Result<(), InventoryError> {
        let _state = self.state.lock().await;

        let available = self.store.get_quantity(key.product_id).await?;
        self.store
            .set_quantity(key.product_id, available + quantity)
            .await?;

        metrics::counter!("inventory_releases_total").increment(1);
        tracing::info!(%key, quantity, restored = available + quantity, "released inventory");
        Ok(())
    }
}
