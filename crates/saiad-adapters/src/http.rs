//! Shared HTTP plumbing for vendor clients.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::debug;

use crate::error::{AdapterError, AdapterResult};
use crate::types::CallOptions;

/// Header carrying the caller's idempotency key.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// reqwest client bound to one vendor name for error mapping.
#[derive(Clone)]
pub struct VendorHttp {
    client: Client,
    vendor: &'static str,
}

impl VendorHttp {
    pub fn new(vendor: &'static str, timeout: Duration) -> AdapterResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::unavailable(vendor, format!("HTTP client: {}", e)))?;
        Ok(Self { client, vendor })
    }

    pub fn vendor(&self) -> &'static str {
        self.vendor
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Send with the idempotency header; non-2xx maps to the taxonomy.
    pub async fn send(
        &self,
        request: RequestBuilder,
        options: &CallOptions,
    ) -> AdapterResult<Response> {
        let response = request
            .header(IDEMPOTENCY_HEADER, &options.idempotency_key)
            .timeout(options.timeout)
            .send()
            .await
            .map_err(|e| AdapterError::from_reqwest(self.vendor, &e, options.timeout.as_secs()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(vendor = self.vendor, status = status.as_u16(), "Vendor returned error");
            return Err(AdapterError::from_status(self.vendor, status, &body));
        }
        Ok(response)
    }

    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        options: &CallOptions,
    ) -> AdapterResult<T> {
        let response = self.send(request, options).await?;
        response.json::<T>().await.map_err(|e| {
            AdapterError::unavailable(self.vendor, format!("Malformed response: {}", e))
        })
    }

    pub async fn send_bytes(
        &self,
        request: RequestBuilder,
        options: &CallOptions,
    ) -> AdapterResult<Vec<u8>> {
        let response = self.send(request, options).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AdapterError::from_reqwest(self.vendor, &e, options.timeout.as_secs()))?;
        if bytes.is_empty() {
            return Err(AdapterError::unavailable(self.vendor, "Empty response body"));
        }
        Ok(bytes.to_vec())
    }
}

/// State of an asynchronous vendor task.
#[derive(Debug)]
pub enum PollState<T> {
    Pending,
    Ready(T),
}

/// Poll `check` every `interval` until it is ready or `max_wait` elapses.
pub async fn poll_until<T, F, Fut>(
    vendor: &str,
    interval: Duration,
    max_wait: Duration,
    mut check: F,
) -> AdapterResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AdapterResult<PollState<T>>>,
{
    let deadline = Instant::now() + max_wait;
    loop {
        if let PollState::Ready(value) = check().await? {
            return Ok(value);
        }
        if Instant::now() + interval > deadline {
            return Err(AdapterError::timeout(vendor, max_wait.as_secs()));
        }
        tokio::time::sleep(interval).await;
    }
}

/// Deterministic key from the parts that identify one logical call.
pub fn derive_idempotency_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let digest = format!("{:x}", hasher.finalize());
    digest[..32].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_idempotency_key_is_stable() {
        let a = derive_idempotency_key(&["job-1", "image", "3"]);
        let b = derive_idempotency_key(&["job-1", "image", "3"]);
        let c = derive_idempotency_key(&["job-1", "image", "4"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_ready() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let value = poll_until("v", Duration::from_secs(5), Duration::from_secs(60), move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Ok(PollState::Pending)
            } else {
                Ok(PollState::Ready(7))
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_times_out() {
        let result: AdapterResult<()> =
            poll_until("v", Duration::from_secs(5), Duration::from_secs(12), || async {
                Ok(PollState::Pending)
            })
            .await;
        assert!(matches!(result, Err(AdapterError::Timeout { .. })));
    }
}
