//! Inventory error types.

use common::ProductId;
use thiserror::Error;

/// Errors that can occur while applying inventory commands.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The product does not have enough stock for the requested reserve.
    /// No mutation happens.
    #[error("not enough quantity available for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        available: u32,
        requested: u32,
    },

    /// The product has no inventory record.
    #[error("no inventory record for product {0}")]
    ProductNotFound(ProductId),

    /// The underlying store failed.
    #[error("inventory store error: {0}")]
    Store(String),
}
