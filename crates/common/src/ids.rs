use serde::{Deserialize, Serialize};

/// Declares a store-assigned numeric identifier.
///
/// Each identifier wraps an `i64` so that order, payment and user ids
/// cannot be mixed up even though they share a representation on the wire.
macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates an identifier from its raw value.
            pub fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw value.
            pub fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

numeric_id!(
    /// Identifier of an order, assigned by the order store.
    OrderId
);

numeric_id!(
    /// Identifier of a payment, assigned by the payment store.
    PaymentId
);

numeric_id!(
    /// Internal identifier of a user, resolved through the identity service.
    UserId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_id_preserves_value() {
        let id = OrderId::new(42);
        assert_eq!(id.as_i64(), 42);
        assert_eq!(i64::from(id), 42);
    }

    #[test]
    fn ids_display_as_raw_numbers() {
        assert_eq!(OrderId::new(7).to_string(), "7");
        assert_eq!(PaymentId::new(8).to_string(), "8");
        assert_eq!(UserId::new(9).to_string(), "9");
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&PaymentId::new(15)).unwrap();
        assert_eq!(json, "15");
        let id: UserId = serde_json::from_str("3").unwrap();
        assert_eq!(id, UserId::new(3));
    }
}
