//! Email delivery through the Resend HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;

use pastime_common::error::DeliveryError;
use pastime_common::mail::{MailTransport, OutgoingMail};

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

/// Request body accepted by `POST /emails`.
#[derive(Debug, Serialize, PartialEq, Eq)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

pub struct ResendTransport {
    client: reqwest::Client,
    api_key: String,
    from: String,
    endpoint: String,
}

impl ResendTransport {
    /// `timeout` bounds each HTTP request; the dispatch engine applies its
    /// own timeout around the whole send as well.
    pub fn new(
        api_key: impl Into<String>,
        from: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            from: from.into(),
            endpoint: RESEND_ENDPOINT.to_string(),
        })
    }

    /// Point the transport at a different API base, e.g. a sandbox.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl MailTransport for ResendTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), DeliveryError> {
        let body = SendEmailRequest {
            from: &self.from,
            to: [&mail.to],
            subject: &mail.subject,
            text: &mail.body,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_request_error(&e))?;

        let status = resp.status();
        if status.is_success() {
            tracing::debug!(subject = %mail.subject, "Email accepted by Resend");
            return Ok(());
        }

        let detail = resp.text().await.unwrap_or_default();
        let err = classify_status(status, &detail);
        tracing::warn!(status = %status, error = %err, "Resend rejected email");
        Err(err)
    }
}

/// Map a non-success HTTP status to a delivery failure class.
///
/// Throttling and server errors are worth retrying; any other client error
/// means the request itself is bad (invalid recipient, unverified sender).
pub fn classify_status(status: StatusCode, detail: &str) -> DeliveryError {
    let message = if detail.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {detail}")
    };

    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        DeliveryError::Transient(message)
    } else if status.is_client_error() {
        DeliveryError::Permanent(message)
    } else {
        DeliveryError::Unknown(message)
    }
}

fn classify_request_error(err: &reqwest::Error) -> DeliveryError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        DeliveryError::Transient(err.to_string())
    } else if err.is_builder() {
        DeliveryError::Permanent(err.to_string())
    } else {
        DeliveryError::Unknown(err.to_string())
    }
}
