use async_trait::async_trait;

use pastime_common::error::DeliveryError;
use pastime_common::mail::{MailTransport, OutgoingMail};

/// Transport that accepts every message and only logs it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), DeliveryError> {
        tracing::info!(
            to = %mail.to,
            subject = %mail.subject,
            body_len = mail.body.len(),
            "Email delivery skipped (log transport)"
        );
        Ok(())
    }
}
