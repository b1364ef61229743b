//! Guarded state transitions for work items.
//!
//! The delivery lifecycle is deliberately narrow:
//!
//! ```text
//! pending/ready ──[deliver OK]──> sent      (terminal)
//! pending/ready ──[deliver FAIL]─> failed
//! failed ──[retry reset]──> ready
//! sent ──X──> (no transition)
//! ```
//!
//! Status lives on a mutable record rather than a typestate parameter, so
//! these methods enforce the machine at runtime: any transition not listed
//! above returns [`VolleyError::InvalidTransition`]. An item only moves
//! `ready → sent` or `ready → failed` as the direct result of a dispatch
//! attempt; nothing transitions spontaneously.

use chrono::Utc;

use crate::error::{Result, VolleyError};
use crate::item::{DeliveryStatus, WorkItem};

impl WorkItem {
    /// Record a successful delivery: `pending/ready/failed → sent`.
    ///
    /// Clears any stale failure message and stamps the attempt time. If the
    /// delivery receipt carried a document reference it is persisted on the
    /// item for later preview/download.
    pub fn mark_sent(&mut self, document_ref: Option<String>) -> Result<()> {
        match self.status {
            DeliveryStatus::Pending | DeliveryStatus::Ready | DeliveryStatus::Failed => {
                self.status = DeliveryStatus::Sent;
                self.last_error = None;
                self.last_attempt_at = Some(Utc::now());
                if document_ref.is_some() {
                    self.document_ref = document_ref;
                }
                Ok(())
            }
            DeliveryStatus::Sent => Err(VolleyError::InvalidTransition(
                self.id,
                self.status.as_str().to_string(),
                "pending, ready, or failed".to_string(),
            )),
        }
    }

    /// Record a failed delivery: `pending/ready/failed → failed`.
    ///
    /// `sent` is terminal and can never regress to `failed`.
    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<()> {
        match self.status {
            DeliveryStatus::Pending | DeliveryStatus::Ready | DeliveryStatus::Failed => {
                self.status = DeliveryStatus::Failed;
                self.last_error = Some(error.into());
                self.last_attempt_at = Some(Utc::now());
                Ok(())
            }
            DeliveryStatus::Sent => Err(VolleyError::InvalidTransition(
                self.id,
                self.status.as_str().to_string(),
                "pending, ready, or failed".to_string(),
            )),
        }
    }

    /// Explicit retry-reset: `failed → ready`, clearing the failure message.
    ///
    /// The reset does not dispatch; the caller re-invokes a dispatch
    /// operation to actually resend.
    pub fn reset_for_retry(&mut self) -> Result<()> {
        match self.status {
            DeliveryStatus::Failed => {
                self.status = DeliveryStatus::Ready;
                self.last_error = None;
                Ok(())
            }
            _ => Err(VolleyError::InvalidTransition(
                self.id,
                self.status.as_str().to_string(),
                "failed".to_string(),
            )),
        }
    }
}
