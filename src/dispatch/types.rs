//! Value objects for dispatch runs: configuration, progress snapshots, and
//! the per-run bookkeeping.

use serde::{Deserialize, Serialize};

use crate::item::ItemId;

/// Configuration for the dispatch controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Fixed throttle inserted after each successful delivery, to respect
    /// downstream rate limits. Skipped while cancelling.
    pub inter_item_delay_ms: u64,

    /// Timeout applied individually to each render and delivery call.
    /// `None` disables the timeout, letting a hung collaborator stall the
    /// run indefinitely.
    pub per_item_timeout_ms: Option<u64>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            inter_item_delay_ms: 1200,
            per_item_timeout_ms: Some(600_000), // 10 minutes
        }
    }
}

/// Phase of the per-item step chain currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPhase {
    Idle,
    Rendering,
    Delivering,
    Persisting,
    Throttling,
}

/// Snapshot of an in-flight dispatch run, published for UI consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchProgress {
    /// Whether a run is currently executing.
    pub active: bool,
    /// 1-based position of the item being processed.
    pub current: usize,
    /// Total number of items in the run.
    pub total: usize,
    /// Display label of the item being processed.
    pub current_label: Option<String>,
    /// Step currently executing for that item.
    pub phase: DispatchPhase,
}

impl Default for DispatchProgress {
    fn default() -> Self {
        Self {
            active: false,
            current: 0,
            total: 0,
            current_label: None,
            phase: DispatchPhase::Idle,
        }
    }
}

/// Final tally reported to the caller once a run ends, whether by exhausting
/// its targets or by cancellation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Items whose delivery succeeded.
    pub sent: usize,
    /// Items whose delivery failed.
    pub failed: usize,
    /// Non-fatal warnings surfaced during the run (render failures,
    /// persistence errors after a completed delivery).
    pub warnings: Vec<String>,
}

impl RunSummary {
    /// Total number of items processed.
    pub fn processed(&self) -> usize {
        self.sent + self.failed
    }
}

/// In-memory aggregate describing one dispatch pass.
///
/// Created when a dispatch operation is invoked, held in controller-local
/// state for the duration of the loop, and discarded when the loop ends. A
/// cancelled run is never resumed; continuing requires a fresh invocation
/// over the remaining eligible items, which is a new run.
#[derive(Debug, Clone)]
pub struct BatchRun {
    /// Ordered item ids fixed at run start. Items are never added or removed
    /// mid-run.
    pub targets: Vec<ItemId>,
    /// Index of the item currently being processed (0-based).
    pub cursor: usize,
    /// Running outcome tally.
    pub summary: RunSummary,
}

impl BatchRun {
    pub fn new(targets: Vec<ItemId>) -> Self {
        Self {
            targets,
            cursor: 0,
            summary: RunSummary::default(),
        }
    }

    /// Number of items in this run.
    pub fn total(&self) -> usize {
        self.targets.len()
    }
}
