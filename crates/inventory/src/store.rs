//! Inventory store interface and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::ProductId;

use crate::error::InventoryError;

/// Durable mapping of product id to available quantity.
///
/// The store only exposes raw reads and writes; the reservation engine
/// serializes read + check + write as one logical operation, so
/// implementations do not need their own check-and-decrement.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Returns the current quantity for a product.
    async fn get_quantity(&self, product_id: ProductId) -> Result<u32, InventoryError>;

    /// Overwrites the quantity for a product, creating the record if absent.
    async fn set_quantity(&self, product_id: ProductId, quantity: u32)
    -> Result<(), InventoryError>;
}

#[derive(Debug, Default)]
struct InMemoryInventoryState {
    quantities: HashMap<ProductId, u32>,
    fail_on_set: bool,
}

/// In-memory inventory store for tests and single-process runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryStore {
    state: Arc<RwLock<InMemoryInventoryState>>,
}

impl InMemoryInventoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-seeded with stock levels.
    pub fn with_stock(stock: impl IntoIterator<Item = (ProductId, u32)>) -> Self {
        let store = Self::new();
        store.state.write().unwrap().quantities.extend(stock);
        store
    }

    /// Configures the store to fail writes, simulating a persistence fault.
    pub fn set_fail_on_set(&self, fail: bool) {
        self.state.write().unwrap().fail_on_set = fail;
    }

    /// Returns the current quantity without going through the trait.
    pub fn quantity(&self, product_id: ProductId) -> Option<u32> {
        self.state.read().unwrap().quantities.get(&product_id).copied()
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn get_quantity(&self, product_id: ProductId) -> Result<u32, InventoryError> {
        self.state
            .read()
            .unwrap()
            .quantities
            .get(&product_id)
            .copied()
            .ok_or(InventoryError::ProductNotFound(product_id))
    }

    async fn set_quantity(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<(), InventoryError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_set {
            return Err(InventoryError::Store("write rejected".to_string()));
        }
        state.quantities.insert(product_id, quantity);
        Ok(())
    }
}
