//! Integration tests for the order and payment aggregates.
//!
//! These tests drive both state machines through their public API the way
//! the saga does, without any storage.

use chrono::{TimeDelta, Utc};
use domain::{
    CreatePayment, DomainError, GatewayOutcome, Money, NewOrder, NewPayment, Order, OrderError,
    OrderId, OrderItem, OrderOutcome, OrderStatus, PaymentId, PaymentMethod, PaymentStatus,
    PlaceOrder, Transition, UserId,
};

fn place(items: Vec<OrderItem>) -> Result<Order, OrderError> {
    let cmd = PlaceOrder::new(UserId::new(5), items, "221B Baker St", PaymentMethod::Paypal);
    NewOrder::place(cmd, Utc::now(), TimeDelta::minutes(10)).map(|draft| draft.into_order(OrderId::new(1)))
}

fn scenario_items() -> Vec<OrderItem> {
    vec![
        OrderItem::new(101, "Keyboard", 2, Money::from_cents(1000)),
        OrderItem::new(102, "Mouse", 1, Money::from_cents(500)),
    ]
}

mod order_lifecycle {
    use super::*;

    #[test]
    fn placed_order_totals_exactly() {
        let order = place(scenario_items()).unwrap();

        assert_eq!(order.total_amount(), Money::from_cents(2500));
        assert_eq!(order.total_amount().to_string(), "25.00");
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.items().len(), 2);
        assert_eq!(order.items()[0].product_name, "Keyboard");
    }

    #[test]
    fn total_is_exact_for_fractional_prices() {
        let items = (0..10)
            .map(|i| OrderItem::new(i, "Penny candy", 3, Money::from_cents(33)))
            .collect();
        let order = place(items).unwrap();
        assert_eq!(order.total_amount(), Money::from_cents(990));
    }

    #[test]
    fn completed_payment_confirms_order() {
        let mut order = place(scenario_items()).unwrap();
        let outcome = OrderOutcome::from_payment_status(PaymentStatus::Completed).unwrap();

        let transition = order.advance(outcome, Utc::now());

        assert!(transition.is_applied());
        assert_eq!(order.status(), OrderStatus::Confirmed);
        assert_eq!(order.expires_at(), None);
    }

    #[test]
    fn failed_payment_cancels_order() {
        let mut order = place(scenario_items()).unwrap();
        let outcome = OrderOutcome::from_payment_status(PaymentStatus::Failed).unwrap();

        order.advance(outcome, Utc::now());

        assert_eq!(order.status(), OrderStatus::Cancelled);
    }

    #[test]
    fn first_resolution_wins() {
        let mut order = place(scenario_items()).unwrap();

        let first = order.advance(OrderOutcome::Expired, Utc::now());
        let second = order.advance(OrderOutcome::PaymentConfirmed, Utc::now());

        assert!(first.is_applied());
        assert_eq!(
            second,
            Transition::NoOp {
                current: OrderStatus::Cancelled
            }
        );
        assert_eq!(order.status(), OrderStatus::Cancelled);
    }
}

mod validation {
    use super::*;

    #[test]
    fn empty_order_is_rejected() {
        assert!(matches!(place(vec![]), Err(OrderError::NoItems)));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let items = vec![OrderItem::new(1, "Widget", 0, Money::from_cents(100))];
        assert!(matches!(
            place(items),
            Err(OrderError::InvalidQuantity { .. })
        ));
    }

    #[test]
    fn order_errors_convert_to_domain_errors() {
        let err: DomainError = place(vec![]).unwrap_err().into();
        assert!(matches!(err, DomainError::Order(OrderError::NoItems)));
    }
}

mod payment_lifecycle {
    use super::*;

    #[test]
    fn payment_amount_matches_order_total() {
        let order = place(scenario_items()).unwrap();
        let payment = NewPayment::create(
            CreatePayment {
                order_id: order.id(),
                user_id: order.user_id(),
                amount: order.total_amount(),
                method: order.payment_method(),
            },
            Utc::now(),
        )
        .unwrap()
        .into_payment(PaymentId::new(1));

        assert_eq!(payment.amount(), order.total_amount());
        assert_eq!(payment.order_id(), order.id());
        assert_eq!(payment.method(), PaymentMethod::Paypal);
    }

    #[test]
    fn processed_payment_resolves_exactly_once() {
        let mut payment = NewPayment::create(
            CreatePayment {
                order_id: OrderId::new(1),
                user_id: UserId::new(5),
                amount: Money::from_cents(2500),
                method: PaymentMethod::CreditCard,
            },
            Utc::now(),
        )
        .unwrap()
        .into_payment(PaymentId::new(9));

        payment.begin_processing().unwrap();
        payment
            .record_outcome(GatewayOutcome::approved("TXN-ABCDEF0123"), Utc::now())
            .unwrap();

        assert!(payment.is_terminal());
        assert!(payment.begin_processing().is_err());
        assert_eq!(payment.transaction_id(), Some("TXN-ABCDEF0123"));
    }
}
