//! Messages exchanged between the order and payment services.

use common::{Money, OrderId, PaymentId, UserId};
use domain::{Payment, PaymentStatus};
use serde::{Deserialize, Serialize};

/// Body of the synchronous "create payment for order" call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub order_id: OrderId,
    pub user_id: UserId,
    /// Order total in cents.
    pub amount: Money,
    /// Payment method tag, e.g. `CREDIT_CARD`; matched case-insensitively.
    pub method: String,
}

/// The part of the created payment the order service cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAck {
    pub id: PaymentId,
    pub reference: String,
    pub status: PaymentStatus,
}

impl From<&Payment> for PaymentAck {
    fn from(payment: &Payment) -> Self {
        Self {
            id: payment.id(),
            reference: payment.reference().to_string(),
            status: payment.status(),
        }
    }
}

/// Asynchronous payment outcome delivered to the order service webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentNotification {
    pub order_id: OrderId,
    pub status: String,
}

impl PaymentNotification {
    pub fn new(order_id: OrderId, status: PaymentStatus) -> Self {
        Self {
            order_id,
            status: status.as_str().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_payment_request_wire_format() {
        let request = CreatePaymentRequest {
            order_id: OrderId::new(12),
            user_id: UserId::new(3),
            amount: Money::from_cents(2500),
            method: "CREDIT_CARD".to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"orderId": 12, "userId": 3, "amount": 2500, "method": "CREDIT_CARD"})
        );
    }

    #[test]
    fn test_notification_wire_format() {
        let notification = PaymentNotification::new(OrderId::new(7), PaymentStatus::Failed);
        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json, serde_json::json!({"orderId": 7, "status": "FAILED"}));
    }

    #[test]
    fn test_ack_ignores_extra_fields() {
        let ack: PaymentAck = serde_json::from_value(serde_json::json!({
            "id": 4,
            "reference": "PAY-0123456789AB",
            "status": "PENDING",
            "amount": 2500
        }))
        .unwrap();
        assert_eq!(ack.id, PaymentId::new(4));
        assert_eq!(ack.status, PaymentStatus::Pending);
    }
}
