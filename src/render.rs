//! Document renderer abstraction.
//!
//! This module defines the `DocumentRenderer` trait to abstract document
//! generation, enabling testability with mock implementations. From the
//! controller's perspective rendering is a pure function of the payload; the
//! renderer itself implies no retries.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{Result, VolleyError};
use crate::item::RenderPayload;

/// A rendered binary document plus the file extension it should carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    /// Raw document bytes (e.g., a PDF).
    pub bytes: Vec<u8>,
    /// File extension without the dot (e.g., "pdf").
    pub extension: String,
}

/// Trait for rendering a work item's payload into a binary document.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    /// Render the payload into a document.
    ///
    /// # Errors
    /// Returns an error if the document cannot be produced. The dispatch
    /// controller treats this as recoverable (degraded-mode send); the
    /// exporter skips the item.
    async fn render(&self, payload: &RenderPayload) -> Result<RenderedDocument>;
}

/// Shared, ordered record of collaborator calls.
///
/// Tests thread one log through both the mock renderer and the mock delivery
/// channel to assert strict per-item sequencing across collaborators.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Create an empty shared call log.
pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Mock renderer for testing.
///
/// Produces deterministic placeholder bytes per payload, records the order of
/// render calls, and can be scripted to fail for specific labels.
#[derive(Clone, Default)]
pub struct MockRenderer {
    failing_labels: Arc<Mutex<HashSet<String>>>,
    rendered: Arc<Mutex<Vec<String>>>,
    log: Option<CallLog>,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a shared call log recording `render <label>` entries.
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Make renders fail for payloads with this label.
    pub fn fail_for(&self, label: &str) {
        self.failing_labels.lock().insert(label.to_string());
    }

    /// Labels rendered so far, in call order.
    pub fn rendered_labels(&self) -> Vec<String> {
        self.rendered.lock().clone()
    }

    /// Number of render calls made.
    pub fn render_count(&self) -> usize {
        self.rendered.lock().len()
    }
}

#[async_trait]
impl DocumentRenderer for MockRenderer {
    async fn render(&self, payload: &RenderPayload) -> Result<RenderedDocument> {
        self.rendered.lock().push(payload.label.clone());
        if let Some(log) = &self.log {
            log.lock().push(format!("render {}", payload.label));
        }

        if self.failing_labels.lock().contains(&payload.label) {
            return Err(VolleyError::Render(format!(
                "no template for '{}'",
                payload.label
            )));
        }

        Ok(RenderedDocument {
            bytes: format!("%DOC {}", payload.label).into_bytes(),
            extension: "pdf".to_string(),
        })
    }
}
