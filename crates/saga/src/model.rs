//! Order and saga domain model.

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};
use serde::{Deserialize, Serialize};

use crate::state::SagaStatus;

/// Denormalized product snapshot carried on each line item.
///
/// Name and description are captured at order time; the catalog service
/// owns the live record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
}

impl Product {
    /// Creates a product snapshot.
    pub fn new(id: ProductId, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: description.into(),
        }
    }
}

/// One line item of an order. Immutable once the order is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product: Product,
    pub quantity: u32,
}

impl OrderItem {
    /// Creates a line item for a product.
    pub fn new(product: Product, quantity: u32) -> Self {
        Self { product, quantity }
    }
}

/// Externally visible order status, mirrored from the saga record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Order row exists but no saga has been recorded for it.
    #[serde(rename = "CREATED")]
    Created,
    #[serde(rename = "STARTED")]
    Started,
    #[serde(rename = "RESERVING")]
    Reserving,
    #[serde(rename = "INVENTORY_RESERVED")]
    InventoryReserved,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
}

impl From<SagaStatus> for OrderStatus {
    fn from(status: SagaStatus) -> Self {
        match status {
            SagaStatus::Started => OrderStatus::Started,
            SagaStatus::Reserving => OrderStatus::Reserving,
            SagaStatus::InventoryReserved => OrderStatus::InventoryReserved,
            SagaStatus::Completed => OrderStatus::Completed,
            SagaStatus::Failed => OrderStatus::Failed,
        }
    }
}

/// A customer order with its line items.
///
/// Items are persisted only after every reservation succeeded, so a
/// failed order is never visible with a partial item list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// Durable record of saga progress, written before the first reservation
/// attempt and updated after every transition. One saga per order; never
/// deleted, so a crashed run can be audited or resumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSaga {
    pub order_id: OrderId,
    pub status: SagaStatus,
    /// Count of line items successfully reserved so far.
    pub step: usize,
    pub created_at: DateTime<Utc>,
}

impl OrderSaga {
    /// Creates the initial saga record for an order.
    pub fn new(order_id: OrderId) -> Self {
        Self {
            order_id,
            status: SagaStatus::Started,
            step: 0,
            created_at: Utc::now(),
        }
    }
}
