//! Delivery channel abstraction.
//!
//! This module defines the `DeliveryChannel` trait to abstract the actual
//! delivery of a document to a recipient, enabling testability with mock
//! implementations. Deliveries are externally visible and irreversible; the
//! dispatch controller therefore never retries a send on its own.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{Result, VolleyError};
use crate::item::ItemId;
use crate::render::{CallLog, RenderedDocument};

/// Metadata accompanying a delivery attempt.
#[derive(Debug, Clone)]
pub struct DeliveryMetadata {
    /// The work item this delivery belongs to.
    pub item_id: ItemId,
    /// Display label, forwarded for channel-side tracking.
    pub label: String,
}

/// Acknowledgement returned by a successful delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Channel-side tracking identifier, if the channel issued one.
    pub delivery_id: Option<String>,
    /// URI of the document as persisted by the channel, if any. Stored on
    /// the item for later preview/download without re-rendering.
    pub document_reference: Option<String>,
}

/// Trait for delivering a rendered document to a recipient address.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Attempt a delivery.
    ///
    /// `document` is `None` for a degraded-mode send after a render failure.
    ///
    /// # Errors
    /// Returns an error if the channel rejects or fails the attempt. The
    /// dispatch controller captures this into the item's state rather than
    /// propagating it.
    async fn send(
        &self,
        recipient: &str,
        document: Option<&RenderedDocument>,
        metadata: &DeliveryMetadata,
    ) -> Result<DeliveryReceipt>;
}

/// Record of a call made to the mock delivery channel.
#[derive(Debug, Clone)]
pub struct MockDelivery {
    pub recipient: String,
    pub item_id: ItemId,
    pub label: String,
    pub had_document: bool,
}

/// Mock delivery channel for testing.
///
/// Succeeds by default; individual recipients can be scripted to fail or to
/// return a specific receipt. Records every call and tracks the peak number
/// of concurrently executing sends so tests can assert at-most-one in-flight
/// delivery.
#[derive(Clone, Default)]
pub struct MockDeliveryChannel {
    failures: Arc<Mutex<HashMap<String, String>>>,
    receipts: Arc<Mutex<HashMap<String, DeliveryReceipt>>>,
    calls: Arc<Mutex<Vec<MockDelivery>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    log: Option<CallLog>,
}

impl MockDeliveryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a shared call log recording `send <label>` entries.
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Script a failure for this recipient.
    pub fn fail_for(&self, recipient: &str, message: &str) {
        self.failures
            .lock()
            .insert(recipient.to_string(), message.to_string());
    }

    /// Script the receipt returned for this recipient.
    pub fn receipt_for(&self, recipient: &str, receipt: DeliveryReceipt) {
        self.receipts.lock().insert(recipient.to_string(), receipt);
    }

    /// All deliveries attempted so far, in call order.
    pub fn calls(&self) -> Vec<MockDelivery> {
        self.calls.lock().clone()
    }

    /// Number of delivery attempts made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Peak number of sends that were executing at the same instant.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeliveryChannel for MockDeliveryChannel {
    async fn send(
        &self,
        recipient: &str,
        document: Option<&RenderedDocument>,
        metadata: &DeliveryMetadata,
    ) -> Result<DeliveryReceipt> {
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        // Guard to ensure we decrement even if cancelled
        let in_flight = self.in_flight.clone();
        let _guard = scopeguard::guard((), move |_| {
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });

        self.calls.lock().push(MockDelivery {
            recipient: recipient.to_string(),
            item_id: metadata.item_id,
            label: metadata.label.clone(),
            had_document: document.is_some(),
        });
        if let Some(log) = &self.log {
            log.lock().push(format!("send {}", metadata.label));
        }

        // Yield so overlapping sends would actually interleave if the
        // controller ever issued them concurrently.
        tokio::task::yield_now().await;

        let failure = self.failures.lock().get(recipient).cloned();
        if let Some(message) = failure {
            return Err(VolleyError::Delivery(message));
        }

        let receipt = self
            .receipts
            .lock()
            .get(recipient)
            .cloned()
            .unwrap_or_else(|| DeliveryReceipt {
                delivery_id: Some(format!("mock-{}", self.calls.lock().len())),
                document_reference: None,
            });
        Ok(receipt)
    }
}
