//! Order fulfillment saga.
//!
//! Sequences inventory reservation across an order's line items over the
//! asynchronous command channel, matching late or out-of-order results
//! through the response correlator and unwinding partial reservations
//! with compensating release commands on failure.
//!
//! The saga is sequential and in list order: at any failure point the
//! compensation set is exactly the prefix of items reserved before it.

pub mod correlator;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod state;
pub mod store;

pub use correlator::{PendingResult, ResponseCorrelator};
pub use error::SagaError;
pub use model::{Order, OrderItem, OrderSaga, OrderStatus, Product};
pub use orchestrator::SagaOrchestrator;
pub use state::SagaStatus;
pub use store::{InMemoryOrderStore, OrderStore, StoreError};

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
