//! Value objects for the order domain.

use common::Money;
use serde::{Deserialize, Serialize};

use super::OrderError;

/// Catalog identifier of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(i64);

impl ProductId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ProductId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A line item in an order.
///
/// Product name and unit price are captured at placement time so the order
/// total stays stable even if the catalog changes later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// The product identifier.
    pub product_id: ProductId,

    /// Human-readable product name.
    pub product_name: String,

    /// Quantity ordered.
    pub quantity: u32,

    /// Price per unit in cents.
    pub unit_price: Money,
}

impl OrderItem {
    /// Creates a new order item.
    pub fn new(
        product_id: i64,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            product_id: ProductId::new(product_id),
            product_name: product_name.into(),
            quantity,
            unit_price,
        }
    }

    /// Checks that the quantity is at least one and the price is not negative.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.quantity == 0 {
            return Err(OrderError::InvalidQuantity {
                product_id: self.product_id,
                quantity: self.quantity,
            });
        }
        if self.unit_price.is_negative() {
            return Err(OrderError::InvalidPrice {
                product_id: self.product_id,
                price: self.unit_price.cents(),
            });
        }
        Ok(())
    }

    /// Returns `quantity * unit_price`, or `None` if it does not fit in cents.
    pub fn subtotal(&self) -> Option<Money> {
        self.unit_price.checked_multiply(self.quantity)
    }
}

/// Computes the exact order total over validated items.
pub(crate) fn total_of(items: &[OrderItem]) -> Result<Money, OrderError> {
    items.iter().try_fold(Money::zero(), |acc, item| {
        item.subtotal()
            .and_then(|subtotal| acc.checked_add(subtotal))
            .ok_or(OrderError::TotalOverflow)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_id_conversion() {
        let id = ProductId::from(42_i64);
        assert_eq!(id.as_i64(), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn test_order_item_subtotal() {
        let item = OrderItem::new(1, "Widget", 3, Money::from_cents(1000));
        assert_eq!(item.subtotal(), Some(Money::from_cents(3000)));
    }

    #[test]
    fn test_zero_quantity_is_rejected() {
        let item = OrderItem::new(1, "Widget", 0, Money::from_cents(1000));
        assert!(matches!(
            item.validate(),
            Err(OrderError::InvalidQuantity { quantity: 0, .. })
        ));
    }

    #[test]
    fn test_negative_price_is_rejected() {
        let item = OrderItem::new(7, "Widget", 1, Money::from_cents(-1));
        assert!(matches!(
            item.validate(),
            Err(OrderError::InvalidPrice { price: -1, .. })
        ));
    }

    #[test]
    fn test_free_item_is_valid() {
        let item = OrderItem::new(1, "Sticker", 5, Money::zero());
        assert!(item.validate().is_ok());
    }

    #[test]
    fn test_total_of_sums_subtotals() {
        let items = vec![
            OrderItem::new(1, "Widget A", 2, Money::from_cents(1000)),
            OrderItem::new(2, "Widget B", 1, Money::from_cents(500)),
        ];
        assert_eq!(total_of(&items).unwrap(), Money::from_cents(2500));
    }

    #[test]
    fn test_total_overflow_is_reported() {
        let items = vec![
            OrderItem::new(1, "Big", 1, Money::from_cents(i64::MAX)),
            OrderItem::new(2, "Bigger", 1, Money::from_cents(1)),
        ];
        assert!(matches!(total_of(&items), Err(OrderError::TotalOverflow)));
    }

    #[test]
    fn test_order_item_serialization() {
        let item = OrderItem::new(3, "Widget", 2, Money::from_cents(999));
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["unit_price"], 999);
        let deserialized: OrderItem = serde_json::from_value(json).unwrap();
        assert_eq!(item, deserialized);
    }
}
