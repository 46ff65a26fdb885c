use std::sync::Arc;

use crate::config::AuthConfig;
use crate::database::reservations::ReservationDirectory;
use crate::database::transaction::TransactionStore;
use crate::payments::engine::PaymentEngine;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PaymentEngine>,
    pub store: Arc<dyn TransactionStore>,
    pub reservations: Arc<dyn ReservationDirectory>,
    pub auth: AuthConfig,
    pub environment: String,
    /// Whether webhook deliveries must carry a valid signature.
    pub enforce_webhook_signature: bool,
}
