//! Saga state machine.

use serde::{Deserialize, Serialize};

/// Durable status of an order fulfillment saga.
///
/// State transitions:
/// ```text
/// STARTED ──► RESERVING ──► INVENTORY_RESERVED ──► COMPLETED
///    │            │                  │
///    └────────────┴──────────────────┴──► FAILED
/// ```
///
/// `RESERVING` covers every per-item reservation attempt; the item index
/// lives in the saga record's step counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaStatus {
    /// Saga record written, no reservation attempted yet.
    #[default]
    #[serde(rename = "STARTED")]
    Started,

    /// A line item reservation is in flight.
    #[serde(rename = "RESERVING")]
    Reserving,

    /// Every line item reserved, order items not yet persisted.
    #[serde(rename = "INVENTORY_RESERVED")]
    InventoryReserved,

    /// Order items persisted, saga done (terminal).
    #[serde(rename = "COMPLETED")]
    Completed,

    /// A step failed and compensation was triggered (terminal).
    #[serde(rename = "FAILED")]
    Failed,
}

impl SagaStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaStatus::Completed | SagaStatus::Failed)
    }

    /// Returns true if the machine may move from `self` to `next`.
    pub fn can_transition_to(&self, next: SagaStatus) -> bool {
        match (self, next) {
            (SagaStatus::Started, SagaStatus::Reserving) => true,
            (SagaStatus::Reserving, SagaStatus::Reserving) => true,
            (SagaStatus::Reserving, SagaStatus::InventoryReserved) => true,
            (SagaStatus::InventoryReserved, SagaStatus::Completed) => true,
            (
                SagaStatus::Started | SagaStatus::Reserving | SagaStatus::InventoryReserved,
                SagaStatus::Failed,
            ) => true,
            _ => false,
        }
    }

    /// Returns the status name as stored and logged.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Started => "STARTED",
            SagaStatus::Reserving => "RESERVING",
            SagaStatus::InventoryReserved => "INVENTORY_RESERVED",
            SagaStatus::Completed => "COMPLETED",
            SagaStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
