//! services/client/src/lifecycle.rs
//!
//! Client-side bookkeeping for the document processing state machine. The
//! server owns the transitions; these types make sure what the client shows
//! never runs backwards and that completion side effects fire once.

use docunexus_core::domain::ProcessingStatus;
use tracing::{debug, warn};

/// Outcome of feeding one observed status into a `StatusTimeline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First status seen for this document.
    Initial,
    /// A legal forward transition.
    Advanced,
    /// Same status as before.
    Unchanged,
    /// An older snapshot arrived after a newer one. Not applied.
    Regressed,
}

/// The statuses observed for one document, in order.
#[derive(Debug, Clone, Default)]
pub struct StatusTimeline {
    observed: Vec<ProcessingStatus>,
}

impl StatusTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<ProcessingStatus> {
        self.observed.last().copied()
    }

    /// Every distinct status accepted so far.
    pub fn history(&self) -> &[ProcessingStatus] {
        &self.observed
    }

    pub fn observe(&mut self, status: ProcessingStatus) -> Observation {
        let Some(current) = self.current() else {
            self.observed.push(status);
            return Observation::Initial;
        };

        if current == status {
            return Observation::Unchanged;
        }

        if current.can_transition_to(status) {
            debug!(from = %current, to = %status, "Document status advanced");
            self.observed.push(status);
            Observation::Advanced
        } else {
            warn!(current = %current, stale = %status, "Ignoring out-of-order document status");
            Observation::Regressed
        }
    }
}

/// Fires once each time the watched status *becomes* `Completed`.
///
/// The trigger is keyed on the status value, not on how often it is
/// evaluated, so re-evaluating with an unchanged status is a no-op.
#[derive(Debug, Clone, Default)]
pub struct CompletionEffect {
    last_seen: Option<ProcessingStatus>,
}

impl CompletionEffect {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the caller should refetch the full document.
    pub fn on_status(&mut self, status: Option<ProcessingStatus>) -> bool {
        if status == self.last_seen {
            return false;
        }
        self.last_seen = status;
        status == Some(ProcessingStatus::Completed)
    }

    /// Forgets the last status so the next `on_status` fires again. Used
    /// when the side effect it triggered did not succeed.
    pub fn rearm(&mut self) {
        self.last_seen = None;
    }
}
