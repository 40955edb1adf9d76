//! crates/docunexus_core/src/ports.rs
//!
//! Defines the service contracts (traits) the client core talks to.
//! These traits form the boundary of the hexagonal architecture: the cache,
//! poller and views depend only on them, and the HTTP adapter (or a test
//! double) supplies the implementation.
//!
//! Every operation takes the bearer token explicitly. `None` means the
//! request goes out unauthenticated and the server decides what to do.

use async_trait::async_trait;

use crate::domain::{
    Credentials, DeleteReceipt, Document, DocumentList, DocumentStatus, NewAccount, NewQuery,
    Profile, Query, TokenGrant, UploadFile, UploadReceipt, User,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
///
/// It is `Clone` because one failed network call may be reported to every
/// reader that was waiting on the same coalesced request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("Transport failure: {0}")]
    Transport(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    /// Transport failures and server-side 5xx responses are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            PortError::Transport(_) => true,
            PortError::Rejected { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DocumentService: Send + Sync {
    async fn list_documents(&self, token: Option<&str>) -> PortResult<DocumentList>;

    async fn get_document(&self, token: Option<&str>, document_id: &str) -> PortResult<Document>;

    async fn get_document_status(
        &self,
        token: Option<&str>,
        document_id: &str,
    ) -> PortResult<DocumentStatus>;

    /// Sends the file as the multipart field `doc_file`.
    async fn upload_document(
        &self,
        token: Option<&str>,
        file: &UploadFile,
    ) -> PortResult<UploadReceipt>;

    async fn delete_document(
        &self,
        token: Option<&str>,
        document_id: &str,
    ) -> PortResult<DeleteReceipt>;
}

#[async_trait]
pub trait QueryService: Send + Sync {
    /// All chat turns recorded for a document, oldest first.
    async fn list_queries(&self, token: Option<&str>, document_id: &str) -> PortResult<Vec<Query>>;

    /// Asks a question; the server answers and stores the pair atomically.
    async fn submit_query(&self, token: Option<&str>, query: &NewQuery) -> PortResult<Query>;
}

#[async_trait]
pub trait AuthService: Send + Sync {
    /// Registers an account. Does not sign it in.
    async fn sign_up(&self, account: &NewAccount) -> PortResult<Profile>;

    async fn sign_in(&self, credentials: &Credentials) -> PortResult<User>;

    async fn sign_out(&self, token: &str) -> PortResult<()>;

    /// Exchanges the refresh credential issued at sign-in for a new access
    /// token.
    async fn refresh(&self) -> PortResult<TokenGrant>;

    /// The account behind `token`.
    async fn me(&self, token: &str) -> PortResult<Profile>;
}
