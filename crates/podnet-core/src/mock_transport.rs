//! Mock transport implementation for testing
//!
//! Provides a scripted in-memory [`PodTransport`] so dispatch and reputation
//! logic can be tested without real network connections.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use podnet_core::{MockPodTransport, MockResponse, PodId};
//!
//! let transport = MockPodTransport::new();
//! transport.respond(PodId::new("pod-c"), MockResponse::Error("refused".into()));
//!
//! // pods without a scripted response answer 200
//! dispatcher.run_round().await?;
//! assert_eq!(transport.deliveries().await.len(), 3);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::error::TransportError;
use crate::identity::PodId;
use crate::pod::PodEndpoint;
use crate::request::RequestBatch;
use crate::transport::PodTransport;

/// Scripted answer of a mock pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockResponse {
    /// Answer with a status code
    Status(u16),
    /// Fail at the transport level
    Error(String),
}

/// A batch the mock transport was asked to send
#[derive(Debug, Clone)]
pub struct MockDelivery {
    /// The pod the batch was addressed to
    pub pod: PodEndpoint,
    /// The batch itself
    pub batch: RequestBatch,
}

/// A mock transport for testing
///
/// Every pod answers `Status(200)` unless scripted otherwise. Optional
/// per-pod delays simulate slow peers; the transport tracks how many sends
/// were in flight at once.
pub struct MockPodTransport {
    /// Scripted responses per pod
    responses: DashMap<PodId, MockResponse>,
    /// Artificial latency per pod
    delays: DashMap<PodId, Duration>,
    /// Response for pods without a script
    default_response: MockResponse,
    /// Every send, in completion order
    deliveries: RwLock<Vec<MockDelivery>>,
    /// Sends currently in flight
    in_flight: AtomicUsize,
    /// Highest number of concurrent sends observed
    max_in_flight: AtomicUsize,
}

impl MockPodTransport {
    /// Create a new mock transport where every pod answers 200
    pub fn new() -> Self {
        Self::with_default_response(MockResponse::Status(200))
    }

    /// Create a mock transport with a custom default response
    pub fn with_default_response(default_response: MockResponse) -> Self {
        Self {
            responses: DashMap::new(),
            delays: DashMap::new(),
            default_response,
            deliveries: RwLock::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Script the response of a pod
    pub fn respond(&self, pod: PodId, response: MockResponse) {
        self.responses.insert(pod, response);
    }

    /// Delay every send to a pod
    pub fn delay(&self, pod: PodId, delay: Duration) {
        self.delays.insert(pod, delay);
    }

    /// All recorded deliveries
    pub async fn deliveries(&self) -> Vec<MockDelivery> {
        self.deliveries.read().await.clone()
    }

    /// Recorded deliveries addressed to one pod
    pub async fn deliveries_to(&self, pod: &PodId) -> Vec<MockDelivery> {
        self.deliveries
            .read()
            .await
            .iter()
            .filter(|d| &d.pod.id == pod)
            .cloned()
            .collect()
    }

    /// Highest number of sends observed in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockPodTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PodTransport for MockPodTransport {
    async fn send(&self, pod: &PodEndpoint, batch: &RequestBatch) -> Result<u16, TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays.get(&pod.id).map(|d| *d.value());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let response = self
            .responses
            .get(&pod.id)
            .map(|r| r.value().clone())
            .unwrap_or_else(|| self.default_response.clone());

        self.deliveries.write().await.push(MockDelivery {
            pod: pod.clone(),
            batch: batch.clone(),
        });
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match response {
            MockResponse::Status(status) => Ok(status),
            MockResponse::Error(reason) => Err(TransportError::Unreachable(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pod::Pod;
    use crate::request::RequestKind;

    fn batch() -> RequestBatch {
        RequestBatch::new(RequestKind::Add, "v1", &[])
    }

    #[tokio::test]
    async fn test_default_response_is_ok() {
        let transport = MockPodTransport::new();
        let pod = Pod::new("pod-a", "https://a.example", "key");

        let status = transport.send(&pod.endpoint(), &batch()).await.unwrap();
        assert_eq!(status, 200);
        assert_eq!(transport.deliveries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_scripted_responses() {
        let transport = MockPodTransport::new();
        let a = Pod::new("pod-a", "https://a.example", "key");
        let b = Pod::new("pod-b", "https://b.example", "key");
        transport.respond(a.id.clone(), MockResponse::Status(500));
        transport.respond(b.id.clone(), MockResponse::Error("refused".into()));

        assert_eq!(transport.send(&a.endpoint(), &batch()).await.unwrap(), 500);
        assert!(matches!(
            transport.send(&b.endpoint(), &batch()).await,
            Err(TransportError::Unreachable(_))
        ));
        assert_eq!(transport.deliveries_to(&b.id).await.len(), 1);
    }
}
