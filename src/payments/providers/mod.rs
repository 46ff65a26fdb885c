//! Payment gateway implementations
//!
//! Concrete implementations of the `PaymentGateway` trait.

pub mod chapa;

pub use chapa::{ChapaConfig, ChapaGateway};
