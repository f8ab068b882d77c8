//! Storage for orders and payments.
//!
//! Both stores expose the same contract: the store assigns ids on insert,
//! every record carries a [`Version`], and [`OrderStore::update`] /
//! [`PaymentStore::update`] only succeed when the caller read the latest
//! version. Two writers racing on the same record can therefore never both
//! win; the loser receives [`StoreError::ConcurrencyConflict`] and is expected
//! to re-read.
//!
//! Implementations:
//! - [`InMemoryOrderStore`] / [`InMemoryPaymentStore`] for tests and local runs
//! - [`PostgresOrderStore`] / [`PostgresPaymentStore`] backed by sqlx

pub mod error;
pub mod memory;
pub mod order;
pub mod payment;
pub mod postgres;

pub use common::Version;
pub use error::{Result, StoreError};
pub use memory::{InMemoryOrderStore, InMemoryPaymentStore};
pub use order::OrderStore;
pub use payment::PaymentStore;
pub use postgres::{PostgresOrderStore, PostgresPaymentStore, connect, run_migrations};
