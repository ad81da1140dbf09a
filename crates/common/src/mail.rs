//! Mail transport contract shared by the dispatch engine and the concrete
//! transports in `pastime-notifier`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DeliveryError;

/// A fully composed plain-text message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Performs the actual delivery of a message.
///
/// Implementations must classify failures so the dispatch engine can decide
/// between retrying and failing the entry outright.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), DeliveryError>;
}
