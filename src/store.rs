//! Item store collaborator.
//!
//! This module defines the [`ItemStore`] trait used to list and update work
//! items. The dispatch controller is the sole writer of dispatch-relevant
//! fields during a run; each update is independent and no transactions are
//! assumed. [`MemoryItemStore`] is the bundled implementation, suitable for
//! small fleets and for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Result, VolleyError};
use crate::item::{DeliveryStatus, FollowUpStatus, ItemId, WorkItem};

/// Filter criteria for listing items.
///
/// All fields are conjunctive; `None` means "don't care".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemFilter {
    /// Restrict to a single delivery status.
    pub status: Option<DeliveryStatus>,
    /// Require (or forbid) a recipient address.
    pub has_recipient: Option<bool>,
    /// Restrict to a follow-up status.
    pub follow_up: Option<FollowUpStatus>,
}

impl ItemFilter {
    /// Check whether an item passes this filter.
    pub fn matches(&self, item: &WorkItem) -> bool {
        if let Some(status) = self.status
            && item.status != status
        {
            return false;
        }
        if let Some(has_recipient) = self.has_recipient
            && item.recipient.is_some() != has_recipient
        {
            return false;
        }
        if let Some(follow_up) = self.follow_up
            && item.follow_up.map(|f| f.status) != Some(follow_up)
        {
            return false;
        }
        true
    }
}

/// Partial update applied to a stored item.
///
/// `last_error` and `document_ref` use a double `Option` so a patch can
/// distinguish "leave unchanged" (`None`) from "set to this value or clear"
/// (`Some(..)`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemPatch {
    pub status: Option<DeliveryStatus>,
    pub last_error: Option<Option<String>>,
    pub document_ref: Option<Option<String>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl ItemPatch {
    /// Build the patch that persists an item's current dispatch outcome.
    pub fn from_item(item: &WorkItem) -> Self {
        Self {
            status: Some(item.status),
            last_error: Some(item.last_error.clone()),
            document_ref: Some(item.document_ref.clone()),
            last_attempt_at: item.last_attempt_at,
        }
    }
}

/// Storage trait for listing and updating work items.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// List items matching the filter, in stable insertion order.
    async fn list(&self, filter: &ItemFilter) -> Result<Vec<WorkItem>>;

    /// Get a single item by id.
    async fn get(&self, id: ItemId) -> Result<WorkItem>;

    /// Apply a partial update to an item by id.
    async fn update(&self, id: ItemId, patch: ItemPatch) -> Result<()>;
}

/// In-memory item store.
///
/// Preserves insertion order for deterministic listing. Supports injecting
/// update failures for specific ids, which tests use to exercise the
/// persistence-error path without a real backend.
#[derive(Default)]
pub struct MemoryItemStore {
    items: RwLock<Vec<WorkItem>>,
    failing_updates: RwLock<HashSet<ItemId>>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an item, replacing any existing item with the same id.
    pub fn insert(&self, item: WorkItem) {
        let mut items = self.items.write();
        if let Some(existing) = items.iter_mut().find(|i| i.id == item.id) {
            *existing = item;
        } else {
            items.push(item);
        }
    }

    /// Make subsequent `update` calls for this id fail.
    pub fn fail_updates_for(&self, id: ItemId) {
        self.failing_updates.write().insert(id);
    }

    /// Snapshot of all stored items.
    pub fn all(&self) -> Vec<WorkItem> {
        self.items.read().clone()
    }
}

#[async_trait]
impl ItemStore for MemoryItemStore {
    async fn list(&self, filter: &ItemFilter) -> Result<Vec<WorkItem>> {
        Ok(self
            .items
            .read()
            .iter()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect())
    }

    async fn get(&self, id: ItemId) -> Result<WorkItem> {
        self.items
            .read()
            .iter()
            .find(|item| item.id == id)
            .cloned()
            .ok_or(VolleyError::ItemNotFound(id))
    }

    async fn update(&self, id: ItemId, patch: ItemPatch) -> Result<()> {
        if self.failing_updates.read().contains(&id) {
            return Err(VolleyError::Other(anyhow::anyhow!(
                "injected update failure for item {}",
                id
            )));
        }

        let mut items = self.items.write();
        let item = items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or(VolleyError::ItemNotFound(id))?;

        if let Some(status) = patch.status {
            item.status = status;
        }
        if let Some(last_error) = patch.last_error {
            item.last_error = last_error;
        }
        if let Some(document_ref) = patch.document_ref {
            item.document_ref = document_ref;
        }
        if let Some(last_attempt_at) = patch.last_attempt_at {
            item.last_attempt_at = Some(last_attempt_at);
        }
        Ok(())
    }
}
