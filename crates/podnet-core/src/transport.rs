//! Transport abstraction for pod-to-pod delivery
//!
//! The [`PodTransport`] trait is the only thing the federation core knows
//! about the network. Implementations sign and encrypt the batch for the
//! target pod, post it to `batch.path` on the pod's URL, and report the
//! response status. Retries and backoff, if any, belong to the
//! implementation.
//!
//! ## Implementations
//!
//! - [`MockPodTransport`](crate::MockPodTransport): scripted in-memory transport for testing

use async_trait::async_trait;

use crate::error::TransportError;
use crate::pod::PodEndpoint;
use crate::request::RequestBatch;

/// HTTP statuses a pod answers with when it accepted a batch
pub const SUCCESS_STATUSES: [u16; 2] = [200, 204];

/// Whether a response status counts as a successful delivery
pub fn is_success_status(status: u16) -> bool {
    SUCCESS_STATUSES.contains(&status)
}

/// Delivery of one signed batch to one pod
///
/// # Example
///
/// ```rust,ignore
/// use podnet_core::{PodTransport, RequestBatch, Pod};
///
/// async fn deliver<T: PodTransport>(transport: &T, pod: &Pod, batch: &RequestBatch) -> bool {
///     matches!(transport.send(&pod.endpoint(), batch).await, Ok(status) if podnet_core::is_success_status(status))
/// }
/// ```
#[async_trait]
pub trait PodTransport: Send + Sync {
    /// Send a batch to a pod
    ///
    /// # Returns
    ///
    /// The response status code. A non-success status is returned as `Ok`;
    /// classifying it is the caller's job.
    ///
    /// # Errors
    ///
    /// Returns an error if the pod could not be reached or the request
    /// could not be sent.
    async fn send(&self, pod: &PodEndpoint, batch: &RequestBatch) -> Result<u16, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_statuses() {
        assert!(is_success_status(200));
        assert!(is_success_status(204));
        assert!(!is_success_status(201));
        assert!(!is_success_status(500));
    }
}
