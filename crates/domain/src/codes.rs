//! Human-readable reference codes.
//!
//! Order numbers, payment references and gateway transaction ids share one
//! shape: a fixed prefix followed by upper-case hex characters taken from a
//! random UUID. Uniqueness is enforced by the stores, not here.

use uuid::Uuid;

/// Prefix of every order number.
pub const ORDER_NUMBER_PREFIX: &str = "ORD-";

/// Prefix of every payment reference.
pub const PAYMENT_REFERENCE_PREFIX: &str = "PAY-";

/// Prefix of every gateway transaction id.
pub const TRANSACTION_ID_PREFIX: &str = "TXN-";

fn random_code(prefix: &str, len: usize) -> String {
    let hex = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("{prefix}{}", &hex[..len])
}

/// Generates a candidate order number, e.g. `ORD-1A2B3C4D`.
pub fn order_number() -> String {
    random_code(ORDER_NUMBER_PREFIX, 8)
}

/// Generates a candidate payment reference, e.g. `PAY-1A2B3C4D5E6F`.
pub fn payment_reference() -> String {
    random_code(PAYMENT_REFERENCE_PREFIX, 12)
}

/// Generates a gateway transaction id, e.g. `TXN-1A2B3C4D5E`.
pub fn transaction_id() -> String {
    random_code(TRANSACTION_ID_PREFIX, 10)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_shape(code: &str, prefix: &str, len: usize) {
        assert!(code.starts_with(prefix));
        let suffix = &code[prefix.len()..];
        assert_eq!(suffix.len(), len);
        assert!(
            suffix
                .chars()
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
        );
    }

    #[test]
    fn test_order_number_shape() {
        assert_shape(&order_number(), ORDER_NUMBER_PREFIX, 8);
    }

    #[test]
    fn test_payment_reference_shape() {
        assert_shape(&payment_reference(), PAYMENT_REFERENCE_PREFIX, 12);
    }

    #[test]
    fn test_transaction_id_shape() {
        assert_shape(&transaction_id(), TRANSACTION_ID_PREFIX, 10);
    }

    #[test]
    fn test_codes_vary() {
        assert_ne!(payment_reference(), payment_reference());
    }
}
