//! Core types for dispatchable work items.
//!
//! A [`WorkItem`] is one unit of document-generation-and-delivery work. Its
//! delivery lifecycle is a small state machine enforced at runtime by the
//! guarded transition methods in [`transitions`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod transitions;

/// Unique identifier for a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub Uuid);

impl ItemId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        ItemId(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Display only first 8 characters for readability in logs
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl From<Uuid> for ItemId {
    fn from(uuid: Uuid) -> Self {
        ItemId(uuid)
    }
}

impl std::ops::Deref for ItemId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Delivery lifecycle state of a work item.
///
/// `Sent` is terminal. `Failed` is terminal-but-retriable: an explicit
/// retry-reset moves it back to `Ready`, nothing else does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Ready,
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Ready => "ready",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "ready" => Ok(DeliveryStatus::Ready),
            "sent" => Ok(DeliveryStatus::Sent),
            "failed" => Ok(DeliveryStatus::Failed),
            _ => Err(format!("Invalid delivery status: {}", s)),
        }
    }
}

/// The domain fields needed by the document renderer.
///
/// Opaque to the dispatch controller beyond the label used for progress
/// reporting and archive entry names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderPayload {
    /// Human-readable label for progress display and file naming.
    pub label: String,
    /// Renderer-specific fields, passed through untouched.
    pub fields: serde_json::Value,
}

/// Status of the secondary follow-up tracking attribute.
///
/// Irrelevant to dispatch logic; only the selection/filtering layer reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpStatus {
    Scheduled,
    Sent,
    Responded,
}

/// Secondary follow-up tracking attribute (status + count).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUp {
    pub status: FollowUpStatus,
    pub count: u32,
}

/// One unit of dispatchable work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// Unique identifier.
    pub id: ItemId,

    /// Recipient address. Items without one are never send-eligible.
    pub recipient: Option<String>,

    /// Current delivery lifecycle state.
    pub status: DeliveryStatus,

    /// Failure message from the last dispatch attempt, set iff `Failed`.
    pub last_error: Option<String>,

    /// URI of a previously persisted rendered document, set from a delivery
    /// receipt. Reusable for preview/download without re-rendering.
    pub document_ref: Option<String>,

    /// Renderer input. `None` means the item can never produce a document.
    pub payload: Option<RenderPayload>,

    /// Secondary follow-up tracking, used only by view filtering.
    pub follow_up: Option<FollowUp>,

    /// When the last dispatch attempt (success or failure) concluded.
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    /// Create a new item in the `Ready` state with a renderable payload.
    pub fn new(recipient: Option<String>, payload: Option<RenderPayload>) -> Self {
        Self {
            id: ItemId::new(),
            recipient,
            status: DeliveryStatus::Ready,
            last_error: None,
            document_ref: None,
            payload,
            follow_up: None,
            last_attempt_at: None,
        }
    }

    /// Display label: the payload label, falling back to the recipient, then
    /// the short id.
    pub fn label(&self) -> String {
        if let Some(payload) = &self.payload
            && !payload.label.is_empty()
        {
            return payload.label.clone();
        }
        match &self.recipient {
            Some(addr) => addr.clone(),
            None => self.id.to_string(),
        }
    }

    /// An item is send-eligible when it has a recipient and is not already in
    /// the terminal `Sent` state.
    pub fn is_send_eligible(&self) -> bool {
        self.recipient.is_some() && self.status != DeliveryStatus::Sent
    }

    /// An item is download-eligible when it has a renderable payload at all,
    /// regardless of delivery status. Already-sent items stay downloadable.
    pub fn is_download_eligible(&self) -> bool {
        self.payload.is_some()
    }
}
