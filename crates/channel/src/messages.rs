//! Wire message types and JSON codec.
//!
//! Field names are part of the wire contract: commands carry
//! `{order_id, product_id, quantity}`, results carry
//! `{order_id, product_id, success, error}`.

use common::{CorrelationKey, OrderId, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Command asking the reservation engine to decrement stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveCommand {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
}

impl ReserveCommand {
    /// Creates a reserve command for one order line item.
    pub fn new(order_id: OrderId, product_id: ProductId, quantity: u32) -> Self {
        Self {
            order_id,
            product_id,
            quantity,
        }
    }

    /// Returns the correlation key for this command.
    pub fn key(&self) -> CorrelationKey {
        CorrelationKey::new(self.order_id, self.product_id)
    }
}

/// Compensation command asking the engine to restore stock.
///
/// Release amounts mirror a prior reserve exactly; the engine applies them
/// additively without an upper bound, so releasing a reservation that never
/// committed is a safe no-op on the order's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseCommand {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
}

impl ReleaseCommand {
    /// Creates a release command mirroring a prior reserve.
    pub fn new(order_id: OrderId, product_id: ProductId, quantity: u32) -> Self {
        Self {
            order_id,
            product_id,
            quantity,
        }
    }

    /// Returns the correlation key for this command.
    pub fn key(&self) -> CorrelationKey {
        CorrelationKey::new(self.order_id, self.product_id)
    }
}

/// Outcome of a reserve or release command, published by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryResult {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InventoryResult {
    /// Creates a success result for the given key.
    pub fn ok(key: CorrelationKey) -> Self {
        Self {
            order_id: key.order_id,
            product_id: key.product_id,
            success: true,
            error: None,
        }
    }

    /// Creates a failure result carrying the error detail.
    pub fn failure(key: CorrelationKey, error: impl Into<String>) -> Self {
        Self {
            order_id: key.order_id,
            product_id: key.product_id,
            success: false,
            error: Some(error.into()),
        }
    }

    /// Returns the correlation key this result answers.
    pub fn key(&self) -> CorrelationKey {
        CorrelationKey::new(self.order_id, self.product_id)
    }
}

/// Encodes a message body to its JSON wire form.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, ChannelError> {
    serde_json::to_vec(message).map_err(ChannelError::Codec)
}

/// Decodes a message body from its JSON wire form.
pub fn decode<T: for<'de> Deserialize<'de>>(payload: &[u8]) -> Result<T, ChannelError> {
    serde_json::from_slice(payload).map_err(ChannelError::Codec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_command_wire_fields() {
        let cmd = ReserveCommand::new(OrderId::new(1), ProductId::new(2), 3);
        let json: serde_json::Value = serde_json::from_slice(&encode(&cmd).unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"order_id": 1, "product_id": 2, "quantity": 3})
        );
    }

    #[test]
    fn result_omits_error_on_success() {
        let key = CorrelationKey::new(OrderId::new(1), ProductId::new(2));
        let json: serde_json::Value =
            serde_json::from_slice(&encode(&InventoryResult::ok(key)).unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"order_id": 1, "product_id": 2, "success": true})
        );
    }

    #[test]
    fn result_carries_error_on_failure() {
        let key = CorrelationKey::new(OrderId::new(1), ProductId::new(2));
        let result = InventoryResult::failure(key, "not enough quantity available");
        let decoded: InventoryResult = decode(&encode(&result).unwrap()).unwrap();
        assert_eq!(decoded, result);
        assert!(!decoded.success);
        assert_eq!(
            decoded.error.as_deref(),
            Some("not enough quantity available")
        );
    }

    #[test]
    fn command_key_is_composite() {
        let cmd = ReserveCommand::new(OrderId::new(4), ProductId::new(9), 1);
        assert_eq!(cmd.key().to_string(), "4-9");
        let rel = ReleaseCommand::new(OrderId::new(4), ProductId::new(9), 1);
        assert_eq!(rel.key(), cmd.key());
    }

    #[test]
    fn decode_rejects_malformed_payload() {
        let err = decode::<ReserveCommand>(b"{\"order_id\": \"oops\"}");
        assert!(err.is_err());
    }
}
