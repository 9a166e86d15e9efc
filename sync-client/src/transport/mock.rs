//! Mock transport for testing.
//!
//! Allows queueing responses and capturing sent requests for verification.

use super::{SyncTransport, TransportError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use sync_types::{HealthReport, SyncRequest, SyncResponse};

/// Mock transport for testing.
///
/// With nothing queued it behaves like an empty, healthy server that accepts
/// every envelope: the snapshot echoes the request and every id is reported
/// as updated.
#[derive(Debug, Default, Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    requests: Vec<SyncRequest>,
    health_calls: usize,
    health_queue: VecDeque<Result<HealthReport, TransportError>>,
    sync_queue: VecDeque<Result<SyncResponse, TransportError>>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue the result of the next `health()` call.
    pub fn queue_health(&self, result: Result<HealthReport, TransportError>) {
        self.lock().health_queue.push_back(result);
    }

    /// Queue the result of the next `sync()` call.
    pub fn queue_response(&self, response: SyncResponse) {
        self.lock().sync_queue.push_back(Ok(response));
    }

    /// Cause the next `sync()` to fail with `error`.
    pub fn fail_next_sync(&self, error: TransportError) {
        self.lock().sync_queue.push_back(Err(error));
    }

    /// Cause the next `health()` to fail with `error`.
    pub fn fail_next_health(&self, error: TransportError) {
        self.lock().health_queue.push_back(Err(error));
    }

    /// Every sync request received, in order.
    pub fn requests(&self) -> Vec<SyncRequest> {
        self.lock().requests.clone()
    }

    /// The most recent sync request.
    pub fn last_request(&self) -> Option<SyncRequest> {
        self.lock().requests.last().cloned()
    }

    /// Number of health probes made.
    pub fn health_calls(&self) -> usize {
        self.lock().health_calls
    }

    /// Clear all state (requests, queues, counters).
    pub fn reset(&self) {
        *self.lock() = MockTransportInner::default();
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn health(&self) -> Result<HealthReport, TransportError> {
        let mut inner = self.lock();
        inner.health_calls += 1;
        inner
            .health_queue
            .pop_front()
            .unwrap_or_else(|| Ok(HealthReport::new(true, true)))
    }

    async fn sync(&self, request: &SyncRequest) -> Result<SyncResponse, TransportError> {
        let mut inner = self.lock();
        inner.requests.push(request.clone());
        inner.sync_queue.pop_front().unwrap_or_else(|| {
            Ok(SyncResponse {
                notes: request.notes.clone(),
                updated: request.notes.iter().map(|n| n.id.clone()).collect(),
                conflicts: Vec::new(),
            })
        })
    }
}
