//! Mail transports that deliver composed notifications.
//!
//! - [`ResendTransport`] posts to the Resend HTTP API and classifies failures
//!   into transient and permanent ones.
//! - [`LogTransport`] only logs the message; used for dry runs and local
//!   development when no API key is configured.

use std::sync::Arc;
use std::time::Duration;

use pastime_common::config::AppConfig;
use pastime_common::mail::MailTransport;

pub mod log_transport;
pub mod resend;

pub use log_transport::LogTransport;
pub use resend::ResendTransport;

/// Pick the transport for this deployment: Resend when an API key is
/// configured, otherwise the logging transport.
pub fn transport_from_config(config: &AppConfig) -> anyhow::Result<Arc<dyn MailTransport>> {
    let Some(api_key) = config.resend_api_key.as_deref() else {
        tracing::warn!("RESEND_API_KEY not set, emails will only be logged");
        return Ok(Arc::new(LogTransport));
    };

    let from = config
        .email_from
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("EMAIL_FROM is required when RESEND_API_KEY is set"))?;

    let transport = ResendTransport::new(
        api_key,
        from,
        Duration::from_secs(config.send_timeout_secs.max(1)),
    )?;
    tracing::info!(from, "Email delivery via Resend");
    Ok(Arc::new(transport))
}
