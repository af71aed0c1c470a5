//! Order store interface and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;
use thiserror::Error;

use crate::model::{Order, OrderItem, OrderSaga, OrderStatus};
use crate::state::SagaStatus;

/// Errors from the order store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No order row with the given id.
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    /// No saga record for the given order.
    #[error("saga for order {0} not found")]
    SagaNotFound(OrderId),

    /// A saga record already exists for the order (one saga per order).
    #[error("saga for order {0} already exists")]
    SagaExists(OrderId),

    /// The requested status change is not a legal state machine move.
    #[error("illegal saga transition for order {order_id}: {from} -> {to}")]
    IllegalTransition {
        order_id: OrderId,
        from: SagaStatus,
        to: SagaStatus,
    },

    /// The underlying persistence layer failed.
    #[error("persistence error: {0}")]
    Persistence(String),
}

/// Durable order, line item, and saga records.
///
/// Implemented by the (out of scope) relational layer; the in-memory
/// implementation below backs tests and single-process runs.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Creates an empty order row and returns its assigned id.
    async fn create_order(&self) -> Result<OrderId, StoreError>;

    /// Persists the order's line items. Called once, after all
    /// reservations succeeded.
    async fn create_order_items(
        &self,
        order_id: OrderId,
        items: &[OrderItem],
    ) -> Result<(), StoreError>;

    /// Writes the initial saga record for an order.
    async fn create_saga(&self, saga: OrderSaga) -> Result<(), StoreError>;

    /// Updates a saga's status, enforcing legal transitions.
    async fn update_saga_status(
        &self,
        order_id: OrderId,
        status: SagaStatus,
    ) -> Result<(), StoreError>;

    /// Updates a saga's step counter (items successfully reserved).
    async fn update_saga_step(&self, order_id: OrderId, step: usize) -> Result<(), StoreError>;

    /// Returns all orders with their items, status mirrored from the saga.
    async fn get_orders(&self) -> Result<Vec<Order>, StoreError>;

    /// Returns the saga record for an order, if any.
    async fn get_saga(&self, order_id: OrderId) -> Result<Option<OrderSaga>, StoreError>;
}

#[derive(Debug)]
struct OrderRecord {
    items: Vec<OrderItem>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct InMemoryOrderState {
    orders: HashMap<OrderId, OrderRecord>,
    order_sequence: Vec<OrderId>,
    sagas: HashMap<OrderId, OrderSaga>,
    next_id: i64,
    fail_on_create_items: bool,
    fail_on_update_step: bool,
    fail_on_status_write: Option<SagaStatus>,
}

/// In-memory order store for tests and single-process runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<InMemoryOrderState>>,
}

impl InMemoryOrderStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the store to fail the next `create_order_items` call,
    /// simulating a persistence fault at saga commit time.
    pub fn set_fail_on_create_items(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create_items = fail;
    }

    /// Configures the store to fail `update_saga_step` calls, simulating
    /// a persistence fault mid-reservation.
    pub fn set_fail_on_update_step(&self, fail: bool) {
        self.state.write().unwrap().fail_on_update_step = fail;
    }

    /// Configures the store to reject writes of one particular saga
    /// status, leaving every other saga write working.
    pub fn set_fail_on_status_write(&self, status: Option<SagaStatus>) {
        self.state.write().unwrap().fail_on_status_write = status;
    }

    /// Returns the number of persisted line items for an order.
    pub fn item_count(&self, order_id: OrderId) -> usize {
        self.state
            .read()
            .unwrap()
            .orders
            .get(&order_id)
            .map(|record| record.items.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create_order(&self) -> Result<OrderId, StoreError> {
        let mut state = self.state.write().unwrap();
        state.next_id += 1;
        let order_id = OrderId::new(state.next_id);
        state.orders.insert(
            order_id,
            OrderRecord {
                items: Vec::new(),
                created_at: Utc::now(),
            },
        );
        state.order_sequence.push(order_id);
        Ok(order_id)
    }

    async fn create_order_items(
        &self,
        order_id: OrderId,
        items: &[OrderItem],
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_create_items {
            return Err(StoreError::Persistence(
                "order items write rejected".to_string(),
            ));
        }
        let record = state
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;
        record.items = items.to_vec();
        Ok(())
    }

    async fn create_saga(&self, saga: OrderSaga) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();
        if !state.orders.contains_key(&saga.order_id) {
            return Err(StoreError::OrderNotFound(saga.order_id));
        }
        if state.sagas.contains_key(&saga.order_id) {
            return Err(StoreError::SagaExists(saga.order_id));
        }
        state.sagas.insert(saga.order_id, saga);
        Ok(())
    }

    async fn update_saga_status(
        &self,
        order_id: OrderId,
        status: SagaStatus,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_status_write == Some(status) {
            return Err(StoreError::Persistence(
                "saga status write rejected".to_string(),
            ));
        }
        let saga = state
            .sagas
            .get_mut(&order_id)
            .ok_or(StoreError::SagaNotFound(order_id))?;
        if !saga.status.can_transition_to(status) {
            return Err(StoreError::IllegalTransition {
                order_id,
                from: saga.status,
                to: status,
            });
        }
        saga.status = status;
        Ok(())
    }

    async fn update_saga_step(&self, order_id: OrderId, step: usize) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_update_step {
            return Err(StoreError::Persistence(
                "saga step write rejected".to_string(),
            ));
        }
        let saga = state
            .sagas
            .get_mut(&order_id)
            .ok_or(StoreError::SagaNotFound(order_id))?;
        saga.step = step;
        Ok(())
    }

    async fn get_orders(&self) -> Result<Vec<Order>, StoreError> {
        let state = self.state.read().unwrap();
        Ok(state
            .order_sequence
            .iter()
            .filter_map(|order_id| {
                let record = state.orders.get(order_id)?;
                let status = state
                    .sagas
                    .get(order_id)
                    .map(|saga| OrderStatus::from(saga.status))
                    .unwrap_or(OrderStatus::Created);
                Some(Order {
                    id: *order_id,
                    items: record.items.clone(),
                    status,
                    created_at: record.created_at,
                })
            })
            .collect())
    }

    async fn get_saga(&self, order_id: OrderId) -> Result<Option<OrderSaga>, StoreError> {
        Ok(self.state.read().unwrap().sagas.get(&order_id).cloned())
    }
}
