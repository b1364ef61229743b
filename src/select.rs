//! Selection and filtering layer.
//!
//! [`Selection`] tracks a user-controlled set of item ids, independent of the
//! active view filter and of any in-flight run: items stay selected while
//! hidden by a filter, and selection changes during a run never affect that
//! run (targets are snapshotted at invocation). The eligibility derivations
//! are pure functions over items; this layer never mutates item state.

use std::collections::HashSet;

use crate::item::{ItemId, WorkItem};

/// A set of selected work item ids.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    ids: HashSet<ItemId>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the id if absent, remove it if present.
    pub fn toggle(&mut self, id: ItemId) {
        if !self.ids.insert(id) {
            self.ids.remove(&id);
        }
    }

    /// Toggle-all relative to the current view.
    ///
    /// If every visible id is already selected, deselect exactly that set,
    /// preserving selections outside the view. Otherwise union the visible
    /// ids into the selection. This keeps "select all" scoped to what is on
    /// screen under the active filter.
    pub fn select_all_visible(&mut self, visible: &[ItemId]) {
        let all_selected = !visible.is_empty() && visible.iter().all(|id| self.ids.contains(id));
        if all_selected {
            for id in visible {
                self.ids.remove(id);
            }
        } else {
            self.ids.extend(visible.iter().copied());
        }
    }

    /// Empty the selection.
    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The selected ids, in arbitrary order.
    pub fn ids(&self) -> Vec<ItemId> {
        self.ids.iter().copied().collect()
    }
}

/// Selected items that are eligible for send, in item order.
pub fn sendable<'a>(selection: &Selection, items: &'a [WorkItem]) -> Vec<&'a WorkItem> {
    items
        .iter()
        .filter(|item| selection.contains(item.id) && item.is_send_eligible())
        .collect()
}

/// Selected items that are eligible for download, in item order.
pub fn downloadable<'a>(selection: &Selection, items: &'a [WorkItem]) -> Vec<&'a WorkItem> {
    items
        .iter()
        .filter(|item| selection.contains(item.id) && item.is_download_eligible())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{DeliveryStatus, RenderPayload};

    fn item(label: &str, recipient: Option<&str>, status: DeliveryStatus) -> WorkItem {
        let mut item = WorkItem::new(
            recipient.map(str::to_string),
            Some(RenderPayload {
                label: label.to_string(),
                fields: serde_json::json!({}),
            }),
        );
        item.status = status;
        item
    }

    #[test]
    fn toggle_adds_then_removes() {
        let mut selection = Selection::new();
        let id = ItemId::new();

        selection.toggle(id);
        assert!(selection.contains(id));

        selection.toggle(id);
        assert!(!selection.contains(id));
    }

    #[test]
    fn select_all_visible_unions_when_partially_selected() {
        let mut selection = Selection::new();
        let visible: Vec<ItemId> = (0..3).map(|_| ItemId::new()).collect();
        selection.toggle(visible[0]);

        selection.select_all_visible(&visible);
        assert_eq!(selection.len(), 3);
    }

    #[test]
    fn select_all_visible_deselects_only_the_visible_set() {
        let mut selection = Selection::new();
        let hidden = ItemId::new();
        let visible: Vec<ItemId> = (0..2).map(|_| ItemId::new()).collect();

        selection.toggle(hidden);
        selection.select_all_visible(&visible);
        assert_eq!(selection.len(), 3);

        // All visible now selected: second invocation deselects exactly them.
        selection.select_all_visible(&visible);
        assert_eq!(selection.len(), 1);
        assert!(selection.contains(hidden));
    }

    #[test]
    fn select_all_visible_on_empty_view_is_a_noop() {
        let mut selection = Selection::new();
        let id = ItemId::new();
        selection.toggle(id);

        selection.select_all_visible(&[]);
        assert!(selection.contains(id));
    }

    #[test]
    fn sendable_intersects_selection_with_eligibility() {
        let items = vec![
            item("a", Some("a@x.test"), DeliveryStatus::Ready),
            item("b", None, DeliveryStatus::Ready),
            item("c", Some("c@x.test"), DeliveryStatus::Sent),
            item("d", Some("d@x.test"), DeliveryStatus::Failed),
        ];

        let mut selection = Selection::new();
        for i in &items {
            selection.toggle(i.id);
        }

        let labels: Vec<String> = sendable(&selection, &items)
            .iter()
            .map(|i| i.label())
            .collect();
        assert_eq!(labels, vec!["a", "d"]);
    }

    #[test]
    fn downloadable_keeps_sent_items() {
        let mut items = vec![
            item("a", Some("a@x.test"), DeliveryStatus::Sent),
            item("b", Some("b@x.test"), DeliveryStatus::Pending),
        ];
        items.push({
            let mut no_payload = item("c", Some("c@x.test"), DeliveryStatus::Ready);
            no_payload.payload = None;
            no_payload
        });

        let mut selection = Selection::new();
        for i in &items {
            selection.toggle(i.id);
        }

        let labels: Vec<String> = downloadable(&selection, &items)
            .iter()
            .map(|i| i.label())
            .collect();
        assert_eq!(labels, vec!["a", "b"]);
    }

    #[test]
    fn selection_survives_filter_changes() {
        // Selection holds bare ids: filtering the item list differently has
        // no effect on membership.
        let items = vec![
            item("a", Some("a@x.test"), DeliveryStatus::Ready),
            item("b", Some("b@x.test"), DeliveryStatus::Sent),
        ];
        let mut selection = Selection::new();
        selection.toggle(items[1].id);

        let ready_view: Vec<&WorkItem> = items
            .iter()
            .filter(|i| i.status == DeliveryStatus::Ready)
            .collect();
        assert!(!ready_view.iter().any(|i| i.id == items[1].id));
        assert!(selection.contains(items[1].id));

        let sent_view: Vec<&WorkItem> = items
            .iter()
            .filter(|i| i.status == DeliveryStatus::Sent)
            .collect();
        assert!(sent_view.iter().any(|i| selection.contains(i.id)));
    }
}
