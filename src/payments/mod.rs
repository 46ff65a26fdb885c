//! Payment gateway integration and transaction lifecycle
//!
//! `engine` owns the transaction state machine; `providers` hold the
//! concrete gateway clients behind the `PaymentGateway` trait; `reconciler`
//! is the background sweep that re-verifies indeterminate transactions.

pub mod engine;
pub mod providers;
pub mod reconciler;
pub mod traits;
pub mod types;
