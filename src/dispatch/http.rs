//! HTTP delivery of outbound events.

use super::{DispatchError, EventSink, OutboundEvent};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Posts each event as JSON to a single dispatcher endpoint.
///
/// 429 and 5xx responses and network failures are retried with exponential
/// backoff; other non-success statuses fail immediately.
#[derive(Debug, Clone)]
pub struct HttpEventSink {
    client: Client,
    url: String,
    max_elapsed: Duration,
}

impl HttpEventSink {
    pub fn new(url: String) -> Self {
        Self {
            client: Client::new(),
            url,
            max_elapsed: Duration::from_secs(30),
        }
    }

    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl EventSink for HttpEventSink {
    async fn emit(&self, event: OutboundEvent) -> Result<(), DispatchError> {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .client
                .post(&self.url)
                .json(&event)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(DispatchError::Network(e.to_string())))?;

            let status = response.status();
            if status.as_u16() == 429 || status.is_server_error() {
                return Err(backoff::Error::transient(DispatchError::Http {
                    status: status.as_u16(),
                    message: "retryable".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(DispatchError::Http {
                    status: status.as_u16(),
                    message: "rejected by dispatcher".to_string(),
                }));
            }

            debug!(event = event.kind(), "outbound event delivered");
            Ok(())
        })
        .await
    }
}
