//! services/client/src/web/viewer.rs
//!
//! View-model behind the single-document page.

use crate::cache::QueryState;
use crate::error::ClientError;
use crate::lifecycle::{CompletionEffect, StatusTimeline};
use crate::repository::{DocumentRepository, Watch};
use crate::web::poller::{PollOutcome, StatusPoller};
use docunexus_core::domain::{Document, ProcessingStatus};
use tracing::{info, warn};

pub struct DocumentView {
    repository: DocumentRepository,
    document_id: String,
    document: Watch<Document>,
    poller: StatusPoller,
    timeline: StatusTimeline,
    completion: CompletionEffect,
}

impl DocumentView {
    /// Subscribes to the cached document, which starts loading it.
    pub fn open(repository: &DocumentRepository, document_id: &str) -> Self {
        let poller = StatusPoller::new(
            repository.document_service(),
            repository.session().clone(),
            document_id,
        );
        Self {
            repository: repository.clone(),
            document_id: document_id.to_string(),
            document: repository.subscribe_document(document_id),
            poller,
            timeline: StatusTimeline::new(),
            completion: CompletionEffect::new(),
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn document(&self) -> QueryState<Document> {
        self.document.current()
    }

    /// Waits for the document load in progress, if any, to finish.
    pub async fn loaded(&mut self) -> QueryState<Document> {
        self.document.settled().await
    }

    pub fn poller(&self) -> &StatusPoller {
        &self.poller
    }

    pub fn can_check_status(&self) -> bool {
        self.poller.can_check()
    }

    pub async fn check_status(&self) -> Result<PollOutcome, ClientError> {
        self.poller.check().await
    }

    /// The status to display: the poller's reading when it has one, the
    /// cached document's otherwise. Never moves backwards.
    pub fn effective_status(&mut self) -> Option<ProcessingStatus> {
        let candidate = self.poller.latest_status().or_else(|| {
            self.document
                .current()
                .data
                .map(|document| document.processing_status)
        });
        if let Some(status) = candidate {
            self.timeline.observe(status);
        }
        self.timeline.current()
    }

    /// Why processing failed, when it did.
    pub fn error_message(&self) -> Option<String> {
        self.poller
            .latest()
            .and_then(|status| status.error_message)
            .or_else(|| {
                self.document
                    .current()
                    .data
                    .and_then(|document| document.error_message)
            })
    }

    /// Chat opens once the document has completed processing.
    pub fn chat_available(&mut self) -> bool {
        self.effective_status() == Some(ProcessingStatus::Completed)
    }

    /// Runs the completion effect: the first time the effective status
    /// becomes `Completed`, refetch the full record so fields populated at
    /// completion (insights) show up. Returns whether a refetch happened.
    /// A failed refetch is retried by the next call.
    pub async fn sync(&mut self) -> Result<bool, ClientError> {
        let status = self.effective_status();
        if !self.completion.on_status(status) {
            return Ok(false);
        }

        info!(document_id = %self.document_id, "Document completed; refetching full record");
        if let Err(e) = self.repository.refetch_document(&self.document_id).await {
            warn!(document_id = %self.document_id, error = %e, "Completion refetch failed; will retry on next sync");
            self.completion.rearm();
            return Err(e);
        }
        Ok(true)
    }
}

impl Drop for DocumentView {
    fn drop(&mut self) {
        self.poller.detach();
    }
}
