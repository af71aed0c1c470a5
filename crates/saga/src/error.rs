//! Saga error taxonomy.
//!
//! Every failure inside a saga step is converted into the FAILED
//! transition plus compensation; the original cause is preserved here so
//! the caller can translate it (insufficient stock vs. timeout vs.
//! persistence failure).

use channel::ChannelError;
use common::{CorrelationKey, ProductId};
use thiserror::Error;

use crate::store::StoreError;

/// Errors that can occur during saga execution.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Order has no line items. Rejected before any reservation.
    #[error("order must contain at least one item")]
    EmptyOrder,

    /// A line item has a non-positive quantity. Rejected before any
    /// reservation.
    #[error("invalid quantity for product {0}")]
    InvalidQuantity(ProductId),

    /// The reservation engine reported a failure (insufficient stock or
    /// an engine-side fault), carried in the result's error detail.
    #[error("reservation failed for product {product_id}: {reason}")]
    ReservationFailed {
        product_id: ProductId,
        reason: String,
    },

    /// No matching result arrived within the deadline. The underlying
    /// reserve may still have committed on the engine side; the saga
    /// compensates defensively.
    #[error("timed out waiting for inventory result {key}")]
    CorrelationTimeout { key: CorrelationKey },

    /// A waiter is already registered for this key; the orchestrator
    /// never awaits the same key twice concurrently, so this is a caller
    /// bug.
    #[error("a waiter is already registered for {0}")]
    DuplicateWaiter(CorrelationKey),

    /// The result stream reader has stopped (shutdown in progress).
    #[error("result stream reader stopped")]
    CorrelatorClosed,

    /// Command publish or result consumption failed after retries.
    #[error("transport error: {0}")]
    Transport(#[from] ChannelError),

    /// Order store operation failed.
    #[error("order store error: {0}")]
    Store(#[from] StoreError),
}
