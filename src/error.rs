//! Error types for the dispatch system.

use thiserror::Error;

use crate::item::ItemId;

/// Result type alias using the volley error type.
pub type Result<T> = std::result::Result<T, VolleyError>;

/// Main error type for the dispatch system.
#[derive(Error, Debug)]
pub enum VolleyError {
    /// Item not found in the store
    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    /// A dispatch or export run is already active on this controller
    #[error("A batch run is already active")]
    RunActive,

    /// The target set resolved to zero eligible items before a run was created
    #[error("No eligible items in selection")]
    NoEligibleItems,

    /// Item is in an invalid state for the requested transition
    #[error("Invalid state transition: item {0} is in state '{1}', expected '{2}'")]
    InvalidTransition(ItemId, String, String),

    /// Document rendering failed
    #[error("Render failed: {0}")]
    Render(String),

    /// Delivery attempt rejected or failed
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// A render or delivery call exceeded the configured per-item timeout
    #[error("Step timed out after {waited_ms}ms")]
    Timeout { waited_ms: u64 },

    /// Archive packing error
    #[error("Archive packing failed: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Filesystem error from the download sink
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General error from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
