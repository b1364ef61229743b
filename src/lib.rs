//! Batch dispatch controller for per-item document generation and delivery.
//!
//! This crate drives sequential render-then-deliver passes over a set of work
//! items: for each item a document is rendered, handed to a delivery channel,
//! and the outcome is persisted back to the item store before the next item
//! starts. Runs report progress snapshots, honor cooperative cancellation,
//! and isolate per-item failures so one bad item never sinks the batch.
//!
//! The item store, document renderer, and delivery channel are consumed as
//! trait collaborators; mock implementations for all three ship alongside the
//! production ones for testing.

pub mod deliver;
pub mod dispatch;
pub mod error;
pub mod export;
pub mod item;
pub mod render;
pub mod select;
pub mod store;

// Re-export commonly used types
pub use deliver::{DeliveryChannel, DeliveryMetadata, DeliveryReceipt, MockDeliveryChannel};
pub use dispatch::{
    BatchRun, DispatchConfig, DispatchPhase, DispatchProgress, Dispatcher, RunSummary,
};
pub use error::{Result, VolleyError};
pub use export::{
    ArchiveEntry, ArchivePacker, DirectorySink, DownloadSink, ExportConfig, ExportProgress,
    ExportSummary, Exporter, MockSink, ZipPacker,
};
pub use item::{DeliveryStatus, FollowUp, FollowUpStatus, ItemId, RenderPayload, WorkItem};
pub use render::{DocumentRenderer, MockRenderer, RenderedDocument};
pub use select::Selection;
pub use store::{ItemFilter, ItemPatch, ItemStore, MemoryItemStore};
