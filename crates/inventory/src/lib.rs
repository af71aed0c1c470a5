//! Inventory store and reservation engine.
//!
//! The reservation engine owns the only authority to mutate stock. It
//! consumes reserve/release commands from the command channel, applies
//! them atomically against the [`InventoryStore`], and publishes exactly
//! one [`channel::InventoryResult`] per consumed command.

pub mod engine;
pub mod error;
pub mod store;
pub mod worker;

pub use engine::ReservationEngine;
pub use error::InventoryError;
pub use store::{InMemoryInventoryStore, InventoryStore};
pub use worker::spawn_workers;

/// Convenience type alias for inventory results.
pub type Result<T> = std::result::Result<T, InventoryError>;
