//! Archive exporter.
//!
//! [`Exporter`] packages one rendered document per download-eligible item
//! into a single archive, falling back to sequential per-file delivery when
//! archive packing is unavailable or fails. Rendering is strictly sequential
//! so only one document buffer is alive at a time and progress stays linear.
//! A render failure skips the item with a warning; it never aborts the rest.

use async_trait::async_trait;
use metrics::counter;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{Result, VolleyError};
use crate::item::WorkItem;
use crate::render::DocumentRenderer;

pub mod name;

pub use name::{entry_name, sanitize_label};

/// One named document destined for the archive.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Strategy for packing rendered documents into a single archive buffer.
///
/// Both the primary packer and the sequential-download fallback satisfy the
/// same "produce output for these entries" contract; the exporter switches to
/// the fallback when `is_available` is false or `pack` fails.
pub trait ArchivePacker: Send + Sync {
    /// Whether archive packing capability is present at all.
    fn is_available(&self) -> bool {
        true
    }

    /// Pack the entries into one archive buffer.
    fn pack(&self, entries: &[ArchiveEntry]) -> Result<Vec<u8>>;
}

/// Zip packer (deflate), the default archive strategy.
#[derive(Debug, Clone, Default)]
pub struct ZipPacker;

impl ArchivePacker for ZipPacker {
    fn pack(&self, entries: &[ArchiveEntry]) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for entry in entries {
            writer.start_file(entry.name.as_str(), options)?;
            writer.write_all(&entry.bytes)?;
        }

        Ok(writer.finish()?.into_inner())
    }
}

/// Destination for produced files: the archive blob on the primary path, or
/// one file per item on the fallback path.
#[async_trait]
pub trait DownloadSink: Send + Sync {
    /// Deliver one named file to the destination.
    async fn deliver(&self, name: &str, bytes: &[u8]) -> Result<()>;
}

/// Sink that writes files into a directory via `tokio::fs`.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl DownloadSink for DirectorySink {
    async fn deliver(&self, name: &str, bytes: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(name);
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(path = %path.display(), size = bytes.len(), "Wrote export file");
        Ok(())
    }
}

/// Mock sink for testing: records every delivered file.
#[derive(Clone, Default)]
pub struct MockSink {
    delivered: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files delivered so far, in order.
    pub fn delivered(&self) -> Vec<(String, Vec<u8>)> {
        self.delivered.lock().clone()
    }

    /// Names of the files delivered so far, in order.
    pub fn delivered_names(&self) -> Vec<String> {
        self.delivered.lock().iter().map(|(n, _)| n.clone()).collect()
    }
}

#[async_trait]
impl DownloadSink for MockSink {
    async fn deliver(&self, name: &str, bytes: &[u8]) -> Result<()> {
        self.delivered.lock().push((name.to_string(), bytes.to_vec()));
        Ok(())
    }
}

/// Configuration for the exporter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Delay between per-file deliveries on the fallback path, so rapid
    /// successive downloads don't get blocked downstream.
    pub fallback_delay_ms: u64,
    /// Name of the archive file on the primary path.
    pub archive_name: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            fallback_delay_ms: 400,
            archive_name: "documents.zip".to_string(),
        }
    }
}

/// Snapshot of an in-flight export, published for UI consumption.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportProgress {
    pub active: bool,
    /// 1-based position of the item being rendered.
    pub current: usize,
    pub total: usize,
    pub current_label: Option<String>,
}

/// Final tally of an export run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSummary {
    /// Documents that made it into the output (archive or fallback files).
    pub archived: usize,
    /// Items skipped because their document could not be rendered.
    pub skipped: usize,
    /// Whether the sequential-download fallback was used.
    pub used_fallback: bool,
    /// Per-item warnings (render failures, fallback delivery failures).
    pub warnings: Vec<String>,
}

/// Sequential exporter over download-eligible items.
pub struct Exporter<R, D>
where
    R: DocumentRenderer,
    D: DownloadSink,
{
    renderer: Arc<R>,
    sink: Arc<D>,
    packer: Box<dyn ArchivePacker>,
    config: ExportConfig,
    active: Arc<AtomicBool>,
    progress_tx: watch::Sender<ExportProgress>,
}

impl<R, D> Exporter<R, D>
where
    R: DocumentRenderer,
    D: DownloadSink,
{
    /// Create an exporter with the default zip packing strategy.
    pub fn new(renderer: Arc<R>, sink: Arc<D>, config: ExportConfig) -> Self {
        Self::with_packer(renderer, sink, Box::new(ZipPacker), config)
    }

    /// Create an exporter with a custom packing strategy.
    pub fn with_packer(
        renderer: Arc<R>,
        sink: Arc<D>,
        packer: Box<dyn ArchivePacker>,
        config: ExportConfig,
    ) -> Self {
        let (progress_tx, _) = watch::channel(ExportProgress::default());
        Self {
            renderer,
            sink,
            packer,
            config,
            active: Arc::new(AtomicBool::new(false)),
            progress_tx,
        }
    }

    /// Subscribe to progress snapshots of the active (or next) export.
    pub fn progress(&self) -> watch::Receiver<ExportProgress> {
        self.progress_tx.subscribe()
    }

    /// Render every download-eligible item and produce a single archive,
    /// falling back to sequential per-file delivery when packing is
    /// unavailable or fails.
    ///
    /// An empty eligible set is a no-op returning an empty summary.
    #[tracing::instrument(skip(self, items), fields(count = items.len()))]
    pub async fn export_archive(&self, items: Vec<WorkItem>) -> Result<ExportSummary> {
        let eligible: Vec<WorkItem> = items
            .into_iter()
            .filter(WorkItem::is_download_eligible)
            .collect();

        if eligible.is_empty() {
            tracing::debug!("No download-eligible items, nothing to export");
            return Ok(ExportSummary::default());
        }

        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(VolleyError::RunActive);
        }
        let active = self.active.clone();
        let progress_tx = self.progress_tx.clone();
        let _cleanup = scopeguard::guard((), move |_| {
            progress_tx.send_replace(ExportProgress::default());
            active.store(false, Ordering::SeqCst);
        });

        let total = eligible.len();
        let mut summary = ExportSummary::default();
        let mut entries: Vec<ArchiveEntry> = Vec::with_capacity(total);
        tracing::info!(total, "Export run starting");

        // One rendered document buffer alive at a time: render sequentially,
        // accumulate named entries, skip failures.
        for (index, item) in eligible.iter().enumerate() {
            let label = item.label();
            self.progress_tx.send_replace(ExportProgress {
                active: true,
                current: index + 1,
                total,
                current_label: Some(label.clone()),
            });

            // Eligibility guarantees the payload is present.
            let payload = match &item.payload {
                Some(payload) => payload,
                None => continue,
            };

            match self.renderer.render(payload).await {
                Ok(document) => {
                    entries.push(ArchiveEntry {
                        name: entry_name(index + 1, &label, &document.extension),
                        bytes: document.bytes,
                    });
                }
                Err(e) => {
                    counter!("volley_export_render_failures_total").increment(1);
                    tracing::warn!(
                        item_id = %item.id,
                        error = %e,
                        "Render failed, skipping item in export"
                    );
                    summary.skipped += 1;
                    summary
                        .warnings
                        .push(format!("render failed for '{}': {}", label, e));
                }
            }
        }

        if entries.is_empty() {
            tracing::warn!(skipped = summary.skipped, "No documents rendered, nothing to deliver");
            return Ok(summary);
        }

        let packed = if self.packer.is_available() {
            self.packer.pack(&entries)
        } else {
            Err(VolleyError::Delivery("archive packing unavailable".to_string()))
        };

        match packed {
            Ok(archive) => {
                self.sink.deliver(&self.config.archive_name, &archive).await?;
                summary.archived = entries.len();
                tracing::info!(
                    entries = entries.len(),
                    archive = %self.config.archive_name,
                    size = archive.len(),
                    "Export archive delivered"
                );
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Archive packing failed, falling back to sequential downloads"
                );
                summary.used_fallback = true;
                let last = entries.len() - 1;
                for (index, entry) in entries.iter().enumerate() {
                    match self.sink.deliver(&entry.name, &entry.bytes).await {
                        Ok(()) => summary.archived += 1,
                        Err(e) => {
                            tracing::warn!(
                                entry = %entry.name,
                                error = %e,
                                "Fallback delivery failed, continuing"
                            );
                            summary
                                .warnings
                                .push(format!("download failed for '{}': {}", entry.name, e));
                        }
                    }
                    if index < last && self.config.fallback_delay_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(self.config.fallback_delay_ms))
                            .await;
                    }
                }
            }
        }

        tracing::info!(
            archived = summary.archived,
            skipped = summary.skipped,
            used_fallback = summary.used_fallback,
            "Export run finished"
        );
        Ok(summary)
    }

    /// Render one item's document and deliver it immediately as a single
    /// file. Independent of any active run.
    #[tracing::instrument(skip(self, item), fields(item_id = %item.id))]
    pub async fn export_single(&self, item: &WorkItem) -> Result<()> {
        let payload = item
            .payload
            .as_ref()
            .ok_or_else(|| VolleyError::Render(format!("item {} has no payload", item.id)))?;

        let document = self.renderer.render(payload).await?;
        let file_name = format!(
            "{}.{}",
            sanitize_label(&item.label()),
            document.extension
        );
        self.sink.deliver(&file_name, &document.bytes).await?;
        tracing::info!(file = %file_name, "Single document exported");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn zip_packer_round_trips_entries() {
        let entries = vec![
            ArchiveEntry {
                name: "001_a.pdf".to_string(),
                bytes: b"%DOC a".to_vec(),
            },
            ArchiveEntry {
                name: "002_b.pdf".to_string(),
                bytes: b"%DOC b".to_vec(),
            },
        ];

        let bytes = ZipPacker.pack(&entries).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);

        let mut contents = String::new();
        archive
            .by_name("001_a.pdf")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "%DOC a");
    }

    #[test]
    fn zip_packer_handles_empty_entry_list() {
        let bytes = ZipPacker.pack(&[]).unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 0);
    }
}
