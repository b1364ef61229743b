//! Integration tests for the archive exporter and its fallback path.

use std::io::Cursor;
use std::sync::Arc;

use volley::export::{
    ArchiveEntry, ArchivePacker, DirectorySink, DownloadSink, ExportConfig, Exporter, MockSink,
};
use volley::item::{DeliveryStatus, RenderPayload, WorkItem};
use volley::render::MockRenderer;
use volley::Result;

fn item(label: &str, status: DeliveryStatus) -> WorkItem {
    let mut item = WorkItem::new(
        Some(format!("{}@x.test", label)),
        Some(RenderPayload {
            label: label.to_string(),
            fields: serde_json::json!({}),
        }),
    );
    item.status = status;
    item
}

fn fast_config() -> ExportConfig {
    ExportConfig {
        fallback_delay_ms: 0, // No inter-download delay in tests
        archive_name: "documents.zip".to_string(),
    }
}

/// Packer whose pack step always throws, for fallback coverage.
struct BrokenPacker;

impl ArchivePacker for BrokenPacker {
    fn pack(&self, _entries: &[ArchiveEntry]) -> Result<Vec<u8>> {
        Err(anyhow::anyhow!("archiver crashed").into())
    }
}

/// Packer that reports no archiving capability at all.
struct UnavailablePacker;

impl ArchivePacker for UnavailablePacker {
    fn is_available(&self) -> bool {
        false
    }

    fn pack(&self, _entries: &[ArchiveEntry]) -> Result<Vec<u8>> {
        unreachable!("pack must not be called when unavailable")
    }
}

#[test_log::test(tokio::test)]
async fn archive_path_delivers_one_zip_with_named_entries() {
    let renderer = Arc::new(MockRenderer::new());
    let sink = Arc::new(MockSink::new());
    let exporter = Exporter::new(renderer, sink.clone(), fast_config());

    let items = vec![
        item("Acme Corp", DeliveryStatus::Ready),
        item("beta", DeliveryStatus::Sent),
        item("gamma", DeliveryStatus::Pending),
    ];

    let summary = exporter.export_archive(items).await.unwrap();
    assert_eq!(summary.archived, 3);
    assert_eq!(summary.skipped, 0);
    assert!(!summary.used_fallback);

    let delivered = sink.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0, "documents.zip");

    let mut archive = zip::ZipArchive::new(Cursor::new(delivered[0].1.clone())).unwrap();
    assert_eq!(archive.len(), 3);
    assert!(archive.by_name("001_Acme_Corp.pdf").is_ok());
    assert!(archive.by_name("002_beta.pdf").is_ok());
    assert!(archive.by_name("003_gamma.pdf").is_ok());
}

#[test_log::test(tokio::test)]
async fn sent_items_remain_downloadable_but_payloadless_items_do_not() {
    let renderer = Arc::new(MockRenderer::new());
    let sink = Arc::new(MockSink::new());
    let exporter = Exporter::new(renderer.clone(), sink.clone(), fast_config());

    let mut no_payload = item("ghost", DeliveryStatus::Ready);
    no_payload.payload = None;
    let items = vec![item("sent", DeliveryStatus::Sent), no_payload];

    let summary = exporter.export_archive(items).await.unwrap();
    assert_eq!(summary.archived, 1);
    assert_eq!(renderer.rendered_labels(), vec!["sent"]);
}

#[test_log::test(tokio::test)]
async fn broken_packer_falls_back_to_sequential_downloads() {
    let renderer = Arc::new(MockRenderer::new());
    let sink = Arc::new(MockSink::new());
    let exporter = Exporter::with_packer(
        renderer,
        sink.clone(),
        Box::new(BrokenPacker),
        fast_config(),
    );

    let items = vec![
        item("a", DeliveryStatus::Ready),
        item("b", DeliveryStatus::Ready),
        item("c", DeliveryStatus::Ready),
    ];

    let summary = exporter.export_archive(items).await.unwrap();
    assert!(summary.used_fallback);
    assert_eq!(summary.archived, 3);

    // Exactly one download per item, in order, none of them a zip.
    assert_eq!(
        sink.delivered_names(),
        vec!["001_a.pdf", "002_b.pdf", "003_c.pdf"]
    );
}

#[test_log::test(tokio::test)]
async fn render_failure_mid_export_skips_only_that_item() {
    let renderer = Arc::new(MockRenderer::new());
    renderer.fail_for("b");
    let sink = Arc::new(MockSink::new());
    let exporter = Exporter::with_packer(
        renderer,
        sink.clone(),
        Box::new(BrokenPacker),
        fast_config(),
    );

    let items = vec![
        item("a", DeliveryStatus::Ready),
        item("b", DeliveryStatus::Ready),
        item("c", DeliveryStatus::Ready),
    ];

    let summary = exporter.export_archive(items).await.unwrap();
    assert_eq!(summary.archived, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.warnings.len(), 1);

    // Entry names keep their item positions, so the skip is visible.
    assert_eq!(sink.delivered_names(), vec!["001_a.pdf", "003_c.pdf"]);
}

#[test_log::test(tokio::test)]
async fn unavailable_packer_uses_fallback_without_packing() {
    let renderer = Arc::new(MockRenderer::new());
    let sink = Arc::new(MockSink::new());
    let exporter = Exporter::with_packer(
        renderer,
        sink.clone(),
        Box::new(UnavailablePacker),
        fast_config(),
    );

    let items = vec![item("a", DeliveryStatus::Ready)];
    let summary = exporter.export_archive(items).await.unwrap();
    assert!(summary.used_fallback);
    assert_eq!(sink.delivered_names(), vec!["001_a.pdf"]);
}

#[test_log::test(tokio::test)]
async fn empty_eligible_set_is_a_quiet_noop() {
    let renderer = Arc::new(MockRenderer::new());
    let sink = Arc::new(MockSink::new());
    let exporter = Exporter::new(renderer, sink.clone(), fast_config());

    let mut no_payload = item("ghost", DeliveryStatus::Ready);
    no_payload.payload = None;

    let summary = exporter.export_archive(vec![no_payload]).await.unwrap();
    assert_eq!(summary, Default::default());
    assert!(sink.delivered().is_empty());
}

#[test_log::test(tokio::test)]
async fn export_single_delivers_one_file() {
    let renderer = Arc::new(MockRenderer::new());
    let sink = Arc::new(MockSink::new());
    let exporter = Exporter::new(renderer, sink.clone(), fast_config());

    exporter
        .export_single(&item("Acme Corp", DeliveryStatus::Sent))
        .await
        .unwrap();

    let delivered = sink.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0, "Acme_Corp.pdf");
    assert_eq!(delivered[0].1, b"%DOC Acme Corp".to_vec());
}

#[test_log::test(tokio::test)]
async fn export_single_without_payload_is_an_error() {
    let renderer = Arc::new(MockRenderer::new());
    let sink = Arc::new(MockSink::new());
    let exporter = Exporter::new(renderer, sink, fast_config());

    let mut no_payload = item("ghost", DeliveryStatus::Ready);
    no_payload.payload = None;
    assert!(exporter.export_single(&no_payload).await.is_err());
}

#[test_log::test(tokio::test)]
async fn directory_sink_writes_files_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let sink = DirectorySink::new(dir.path().join("exports"));

    sink.deliver("001_a.pdf", b"%DOC a").await.unwrap();

    let written = std::fs::read(dir.path().join("exports").join("001_a.pdf")).unwrap();
    assert_eq!(written, b"%DOC a");
}
