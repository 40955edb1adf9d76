//! services/client/src/web/poller.rs
//!
//! The manual status check for one document.
//!
//! A status change made by the server's background worker is invisible to
//! the tagged cache, because no client write ever invalidates it. The poller
//! goes straight to the status endpoint instead, keeps the answer locally,
//! and the viewer prefers that answer over the cached document.

use crate::error::ClientError;
use crate::web::session::SessionReader;
use docunexus_core::domain::{DocumentStatus, ProcessingStatus};
use docunexus_core::ports::DocumentService;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a call to `StatusPoller::check` did.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// A fresh status was read and stored.
    Updated(DocumentStatus),
    /// Another check is still outstanding; nothing was sent.
    AlreadyInFlight,
    /// The owning view went away; nothing was stored.
    Detached,
}

/// Clones share state, so a check can run on a spawned task while the view
/// keeps its own handle.
#[derive(Clone)]
pub struct StatusPoller {
    service: Arc<dyn DocumentService>,
    session: SessionReader,
    document_id: String,
    latest: Arc<Mutex<Option<DocumentStatus>>>,
    in_flight: Arc<AtomicBool>,
    /// Cancelled when the owning view is gone.
    detached: CancellationToken,
}

/// Clears the in-flight flag however the check ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl StatusPoller {
    pub fn new(service: Arc<dyn DocumentService>, session: SessionReader, document_id: &str) -> Self {
        Self {
            service,
            session,
            document_id: document_id.to_string(),
            latest: Arc::new(Mutex::new(None)),
            in_flight: Arc::new(AtomicBool::new(false)),
            detached: CancellationToken::new(),
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Whether the "check status" trigger should be enabled.
    pub fn can_check(&self) -> bool {
        !self.in_flight.load(Ordering::SeqCst) && !self.detached.is_cancelled()
    }

    pub fn is_checking(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// The most recent status this poller read, if any.
    pub fn latest(&self) -> Option<DocumentStatus> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn latest_status(&self) -> Option<ProcessingStatus> {
        self.latest().map(|s| s.processing_status)
    }

    /// Stops all future and outstanding checks from touching state.
    pub fn detach(&self) {
        if !self.detached.is_cancelled() {
            debug!(document_id = %self.document_id, "Status poller detached");
            self.detached.cancel();
        }
    }

    pub fn is_detached(&self) -> bool {
        self.detached.is_cancelled()
    }

    /// Reads the authoritative status once, outside the cache.
    ///
    /// On failure the previously stored status is left untouched.
    pub async fn check(&self) -> Result<PollOutcome, ClientError> {
        if self.detached.is_cancelled() {
            return Ok(PollOutcome::Detached);
        }
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!(document_id = %self.document_id, "Status check already in flight");
            return Ok(PollOutcome::AlreadyInFlight);
        }
        let _guard = InFlightGuard(&self.in_flight);

        let token = self.session.access_token();
        let result = tokio::select! {
            _ = self.detached.cancelled() => return Ok(PollOutcome::Detached),
            result = self.service.get_document_status(token.as_deref(), &self.document_id) => result,
        };

        let status = result.map_err(|e| {
            error!("Failed to check status of {}: {:?}", self.document_id, e);
            e
        })?;

        if self.detached.is_cancelled() {
            return Ok(PollOutcome::Detached);
        }

        info!(
            document_id = %self.document_id,
            status = %status.processing_status,
            "Document status checked"
        );
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(status.clone());
        Ok(PollOutcome::Updated(status))
    }

    /// Repeats `check` every `interval` until the document reaches a
    /// terminal status, `max_attempts` checks have been made, or the poller
    /// is detached. Transport failures and 5xx responses are retried on the
    /// next tick; anything else ends the loop with an error.
    pub async fn poll_until_terminal(
        &self,
        interval: Duration,
        max_attempts: u32,
    ) -> Result<Option<DocumentStatus>, ClientError> {
        if interval.is_zero() {
            return Err(ClientError::Internal(
                "status poll interval must be greater than zero".to_string(),
            ));
        }
        let mut ticker = tokio::time::interval(interval);

        for attempt in 1..=max_attempts {
            tokio::select! {
                _ = self.detached.cancelled() => return Ok(None),
                _ = ticker.tick() => {}
            }

            match self.check().await {
                Ok(PollOutcome::Updated(status)) if status.processing_status.is_terminal() => {
                    return Ok(Some(status));
                }
                Ok(PollOutcome::Updated(status)) => {
                    debug!(attempt, status = %status.processing_status, "Document not finished yet");
                }
                Ok(PollOutcome::AlreadyInFlight) => {}
                Ok(PollOutcome::Detached) => return Ok(None),
                Err(ClientError::Port(e)) if e.is_retryable() => {
                    warn!(attempt, error = %e, "Status check failed; retrying");
                }
                Err(e) => return Err(e),
            }
        }

        warn!(
            document_id = %self.document_id,
            max_attempts,
            "Gave up waiting for a terminal status"
        );
        Ok(self.latest())
    }
}
