//! Batch dispatch controller.
//!
//! [`Dispatcher`] drives one strictly sequential pass over a list of
//! send-eligible work items: render the document, attempt delivery, persist
//! the outcome, publish progress, throttle, then move on. Per-item failures
//! are captured into item state and never abort the run; cancellation is
//! cooperative and takes effect at the next inter-item boundary.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::counter;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::deliver::{DeliveryChannel, DeliveryMetadata};
use crate::error::{Result, VolleyError};
use crate::item::{ItemId, WorkItem};
use crate::render::{DocumentRenderer, RenderedDocument};
use crate::store::{ItemPatch, ItemStore};

pub mod types;

pub use types::{BatchRun, DispatchConfig, DispatchPhase, DispatchProgress, RunSummary};

/// Controller for sequential render-then-deliver passes over work items.
///
/// At most one run is active per controller at any time; a second dispatch
/// invocation while one is in flight returns [`VolleyError::RunActive`]
/// rather than relying on the caller to serialize triggers.
pub struct Dispatcher<S, R, D>
where
    S: ItemStore,
    R: DocumentRenderer,
    D: DeliveryChannel,
{
    store: Arc<S>,
    renderer: Arc<R>,
    channel: Arc<D>,
    config: DispatchConfig,
    active: Arc<AtomicBool>,
    cancel: parking_lot::Mutex<Option<CancellationToken>>,
    progress_tx: watch::Sender<DispatchProgress>,
}

impl<S, R, D> Dispatcher<S, R, D>
where
    S: ItemStore,
    R: DocumentRenderer,
    D: DeliveryChannel,
{
    /// Create a new dispatcher over the three collaborators.
    pub fn new(store: Arc<S>, renderer: Arc<R>, channel: Arc<D>, config: DispatchConfig) -> Self {
        let (progress_tx, _) = watch::channel(DispatchProgress::default());
        Self {
            store,
            renderer,
            channel,
            config,
            active: Arc::new(AtomicBool::new(false)),
            cancel: parking_lot::Mutex::new(None),
            progress_tx,
        }
    }

    /// Subscribe to progress snapshots of the active (or next) run.
    pub fn progress(&self) -> watch::Receiver<DispatchProgress> {
        self.progress_tx.subscribe()
    }

    /// Request cancellation of the active run, if any. Idempotent.
    ///
    /// Takes effect at the next inter-item boundary; the in-flight item's
    /// render/deliver/persist chain is allowed to complete.
    pub fn request_cancel(&self) {
        let token = self.cancel.lock().clone();
        if let Some(token) = token {
            token.cancel();
            tracing::info!("Cancellation requested for active dispatch run");
        } else {
            tracing::debug!("Cancellation requested but no run is active");
        }
    }

    /// Dispatch every send-eligible item in the given list, in order.
    ///
    /// Ineligible items (no recipient, or already sent) are dropped
    /// defensively. An empty eligible set is a no-op: no run is created and
    /// an empty summary is returned.
    #[tracing::instrument(skip(self, items), fields(count = items.len()))]
    pub async fn dispatch_all(&self, items: Vec<WorkItem>) -> Result<RunSummary> {
        let eligible: Vec<WorkItem> = items
            .into_iter()
            .filter(WorkItem::is_send_eligible)
            .collect();

        if eligible.is_empty() {
            tracing::debug!("No eligible items, nothing to dispatch");
            return Ok(RunSummary::default());
        }

        self.run_batch(eligible).await
    }

    /// Dispatch the send-eligible subset of `ids` from the given list.
    ///
    /// Ids that do not meet eligibility are silently excluded. If the
    /// resulting set is empty the caller is informed via
    /// [`VolleyError::NoEligibleItems`] and no run is created.
    #[tracing::instrument(skip(self, ids, items), fields(selected = ids.len()))]
    pub async fn dispatch_selected(
        &self,
        ids: &[ItemId],
        items: Vec<WorkItem>,
    ) -> Result<RunSummary> {
        let selected: std::collections::HashSet<ItemId> = ids.iter().copied().collect();
        let eligible: Vec<WorkItem> = items
            .into_iter()
            .filter(|item| selected.contains(&item.id) && item.is_send_eligible())
            .collect();

        if eligible.is_empty() {
            return Err(VolleyError::NoEligibleItems);
        }

        self.run_batch(eligible).await
    }

    /// Reset every `failed` item in the given set back to `ready`, clearing
    /// its failure message, and persist each reset.
    ///
    /// Does not dispatch anything; the caller follows up with
    /// [`dispatch_all`](Self::dispatch_all) or
    /// [`dispatch_selected`](Self::dispatch_selected) to actually resend.
    /// Returns the number of items reset.
    pub async fn retry_failed(&self, items: &[WorkItem]) -> Result<usize> {
        let mut reset = 0;
        for item in items {
            let mut item = item.clone();
            if item.reset_for_retry().is_ok() {
                self.store
                    .update(
                        item.id,
                        ItemPatch {
                            status: Some(item.status),
                            last_error: Some(None),
                            ..Default::default()
                        },
                    )
                    .await?;
                reset += 1;
            }
        }
        tracing::info!(reset, "Reset failed items for retry");
        Ok(reset)
    }

    /// Execute one sequential pass over the already-filtered eligible items.
    async fn run_batch(&self, items: Vec<WorkItem>) -> Result<RunSummary> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(VolleyError::RunActive);
        }

        let token = CancellationToken::new();
        *self.cancel.lock() = Some(token.clone());

        // Reset active flag, token slot, and progress when the loop ends,
        // whatever path it takes out.
        let active = self.active.clone();
        let progress_tx = self.progress_tx.clone();
        let run_cleanup = {
            let tx = progress_tx.clone();
            scopeguard::guard((), move |_| {
                tx.send_replace(DispatchProgress::default());
                active.store(false, Ordering::SeqCst);
            })
        };

        let mut run = BatchRun::new(items.iter().map(|item| item.id).collect());
        let total = run.total();
        tracing::info!(total, "Dispatch run starting");

        for (index, item) in items.into_iter().enumerate() {
            if token.is_cancelled() {
                tracing::info!(
                    processed = run.cursor,
                    remaining = total - run.cursor,
                    "Dispatch run cancelled, stopping before next item"
                );
                break;
            }

            run.cursor = index;
            let label = item.label();
            self.publish(index + 1, total, &label, DispatchPhase::Rendering);

            let document = self.render_step(&item, &mut run.summary).await;

            self.publish(index + 1, total, &label, DispatchPhase::Delivering);
            let delivered = self.deliver_step(&item, document.as_ref()).await;

            let mut item = item;
            let succeeded = match delivered {
                Ok(receipt) => {
                    if let Err(e) = item.mark_sent(receipt.document_reference) {
                        // Eligibility filtering keeps sent items out of runs,
                        // so this only fires if the caller handed us stale data.
                        tracing::error!(item_id = %item.id, error = %e, "Refusing sent transition");
                    }
                    run.summary.sent += 1;
                    counter!("volley_items_sent_total").increment(1);
                    tracing::info!(item_id = %item.id, label = %label, "Item delivered");
                    true
                }
                Err(e) => {
                    let message = e.to_string();
                    if let Err(e) = item.mark_failed(&message) {
                        tracing::error!(item_id = %item.id, error = %e, "Refusing failed transition");
                    }
                    run.summary.failed += 1;
                    counter!("volley_items_failed_total").increment(1);
                    tracing::warn!(
                        item_id = %item.id,
                        label = %label,
                        error = %message,
                        "Delivery failed, continuing with next item"
                    );
                    false
                }
            };

            self.publish(index + 1, total, &label, DispatchPhase::Persisting);
            if let Err(e) = self
                .store
                .update(item.id, ItemPatch::from_item(&item))
                .await
            {
                // At-least-once semantics: the delivery already happened, so
                // the sent transition is not rolled back. Logged for operator
                // follow-up.
                tracing::error!(
                    item_id = %item.id,
                    error = %e,
                    "Failed to persist item state after dispatch attempt"
                );
                run.summary
                    .warnings
                    .push(format!("persist failed for '{}': {}", label, e));
            }

            if succeeded && self.config.inter_item_delay_ms > 0 && !token.is_cancelled() {
                self.publish(index + 1, total, &label, DispatchPhase::Throttling);
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(self.config.inter_item_delay_ms)) => {}
                    _ = token.cancelled() => {}
                }
            }

            run.cursor = index + 1;
        }

        *self.cancel.lock() = None;
        drop(run_cleanup);

        tracing::info!(
            sent = run.summary.sent,
            failed = run.summary.failed,
            warnings = run.summary.warnings.len(),
            "Dispatch run finished"
        );
        Ok(run.summary)
    }

    /// Render the item's document, degrading to `None` on any failure.
    ///
    /// A missing payload or a renderer error produces a warning and a
    /// no-attachment send; it never marks the item failed and never aborts
    /// the run.
    async fn render_step(
        &self,
        item: &WorkItem,
        summary: &mut RunSummary,
    ) -> Option<RenderedDocument> {
        let payload = match &item.payload {
            Some(payload) => payload,
            None => {
                tracing::warn!(item_id = %item.id, "Item has no payload, sending without attachment");
                summary
                    .warnings
                    .push(format!("no payload for '{}', sent without attachment", item.label()));
                return None;
            }
        };

        match self.with_timeout(self.renderer.render(payload)).await {
            Ok(document) => Some(document),
            Err(e) => {
                counter!("volley_render_failures_total").increment(1);
                tracing::warn!(
                    item_id = %item.id,
                    error = %e,
                    "Render failed, sending without attachment"
                );
                summary.warnings.push(format!(
                    "render failed for '{}', sent without attachment: {}",
                    item.label(),
                    e
                ));
                None
            }
        }
    }

    /// Attempt the delivery, applying the per-item timeout when configured.
    async fn deliver_step(
        &self,
        item: &WorkItem,
        document: Option<&RenderedDocument>,
    ) -> Result<crate::deliver::DeliveryReceipt> {
        // Eligibility guarantees a recipient is present.
        let recipient = item
            .recipient
            .as_deref()
            .ok_or(VolleyError::Delivery("item has no recipient".to_string()))?;
        let metadata = DeliveryMetadata {
            item_id: item.id,
            label: item.label(),
        };
        self.with_timeout(self.channel.send(recipient, document, &metadata))
            .await
    }

    async fn with_timeout<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match self.config.per_item_timeout_ms {
            Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), fut).await {
                Ok(result) => result,
                Err(_) => Err(VolleyError::Timeout { waited_ms: ms }),
            },
            None => fut.await,
        }
    }

    fn publish(&self, current: usize, total: usize, label: &str, phase: DispatchPhase) {
        self.progress_tx.send_replace(DispatchProgress {
            active: true,
            current,
            total,
            current_label: Some(label.to_string()),
            phase,
        });
    }
}
