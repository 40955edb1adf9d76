//! services/client/src/repository.rs
//!
//! The document repository: typed reads and writes against the document and
//! query services, with reads going through the tagged cache.
//!
//! | Operation         | Provides tag           | Invalidates tag        |
//! |-------------------|------------------------|------------------------|
//! | list documents    | `Documents`            |                        |
//! | get document      |                        |                        |
//! | get status        |                        |                        |
//! | upload document   |                        | `Documents`            |
//! | delete document   |                        | `Documents`            |
//! | list queries      | `Queries:{document}`   |                        |
//! | submit query      |                        | `Queries:{document}`   |

use crate::cache::{Fetcher, Fingerprint, QueryState, Subscription, Tag, TaggedCache};
use crate::error::ClientError;
use crate::validation::{validate_query_text, validate_upload};
use crate::web::session::SessionReader;
use docunexus_core::domain::{
    DeleteReceipt, Document, DocumentList, DocumentStatus, NewQuery, Query, UploadFile,
    UploadReceipt,
};
use docunexus_core::ports::{DocumentService, QueryService};
use futures::FutureExt;
use std::sync::Arc;
use tracing::{error, info};

//=========================================================================================
// Cached Payloads
//=========================================================================================

/// Everything the repository keeps in its cache.
#[derive(Debug, Clone)]
pub enum Payload {
    Documents(DocumentList),
    Document(Document),
    Status(DocumentStatus),
    Queries(Vec<Query>),
}

fn as_documents(payload: Payload) -> Option<DocumentList> {
    match payload {
        Payload::Documents(list) => Some(list),
        _ => None,
    }
}

fn as_document(payload: Payload) -> Option<Document> {
    match payload {
        Payload::Document(document) => Some(document),
        _ => None,
    }
}

fn as_status(payload: Payload) -> Option<DocumentStatus> {
    match payload {
        Payload::Status(status) => Some(status),
        _ => None,
    }
}

fn as_queries(payload: Payload) -> Option<Vec<Query>> {
    match payload {
        Payload::Queries(queries) => Some(queries),
        _ => None,
    }
}

fn unexpected_payload(fingerprint: &Fingerprint) -> ClientError {
    ClientError::Internal(format!("cache entry {} holds an unexpected payload", fingerprint))
}

//=========================================================================================
// Fingerprints
//=========================================================================================

fn documents_key() -> Fingerprint {
    Fingerprint::new("GET /documents", &[])
}

// Ids go in as parameters, never spliced into the route, so no id can make
// one endpoint's key look like another's.

fn document_key(document_id: &str) -> Fingerprint {
    Fingerprint::new("GET /documents/{id}", &[("id", document_id)])
}

fn status_key(document_id: &str) -> Fingerprint {
    Fingerprint::new("GET /documents/{id}/status", &[("id", document_id)])
}

fn queries_key(document_id: &str) -> Fingerprint {
    Fingerprint::new("GET /contracts/queries", &[("document_id", document_id)])
}

//=========================================================================================
// Typed Watches
//=========================================================================================

/// A live, typed view of one cached read.
pub struct Watch<T> {
    subscription: Subscription<Payload>,
    project: fn(Payload) -> Option<T>,
}

impl<T> Watch<T> {
    pub fn current(&self) -> QueryState<T> {
        self.subscription.current().map(self.project)
    }

    /// Waits for the next state change. Returns `false` if the entry is gone.
    pub async fn changed(&mut self) -> bool {
        self.subscription.changed().await
    }

    /// Waits until no fetch is running and the state is current or errored.
    pub async fn settled(&mut self) -> QueryState<T> {
        self.subscription.settled().await.map(self.project)
    }

    /// Current data, refetched first if a write has superseded it.
    pub async fn read(&self) -> Result<T, ClientError> {
        let payload = self.subscription.read().await?;
        (self.project)(payload).ok_or_else(|| unexpected_payload(self.subscription.fingerprint()))
    }
}

//=========================================================================================
// The Repository
//=========================================================================================

#[derive(Clone)]
pub struct DocumentRepository {
    documents: Arc<dyn DocumentService>,
    queries: Arc<dyn QueryService>,
    session: SessionReader,
    cache: TaggedCache<Payload>,
}

impl DocumentRepository {
    pub fn new(
        documents: Arc<dyn DocumentService>,
        queries: Arc<dyn QueryService>,
        session: SessionReader,
    ) -> Self {
        Self {
            documents,
            queries,
            session,
            cache: TaggedCache::new(),
        }
    }

    pub fn session(&self) -> &SessionReader {
        &self.session
    }

    /// The uncached document port, for reads that must bypass the cache.
    pub fn document_service(&self) -> Arc<dyn DocumentService> {
        Arc::clone(&self.documents)
    }

    /// Drops every cached response, e.g. after sign-out.
    pub fn reset(&self) {
        self.cache.reset();
    }

    // --- Fetchers: the token is read when the request is made, not when
    // --- the fetcher is built, so refetches pick up a new session.

    fn documents_fetcher(&self) -> Fetcher<Payload> {
        let service = Arc::clone(&self.documents);
        let session = self.session.clone();
        Arc::new(move || {
            let service = Arc::clone(&service);
            let token = session.access_token();
            async move {
                service
                    .list_documents(token.as_deref())
                    .await
                    .map(Payload::Documents)
            }
            .boxed()
        })
    }

    fn document_fetcher(&self, document_id: &str) -> Fetcher<Payload> {
        let service = Arc::clone(&self.documents);
        let session = self.session.clone();
        let document_id = document_id.to_string();
        Arc::new(move || {
            let service = Arc::clone(&service);
            let token = session.access_token();
            let document_id = document_id.clone();
            async move {
                service
                    .get_document(token.as_deref(), &document_id)
                    .await
                    .map(Payload::Document)
            }
            .boxed()
        })
    }

    fn status_fetcher(&self, document_id: &str) -> Fetcher<Payload> {
        let service = Arc::clone(&self.documents);
        let session = self.session.clone();
        let document_id = document_id.to_string();
        Arc::new(move || {
            let service = Arc::clone(&service);
            let token = session.access_token();
            let document_id = document_id.clone();
            async move {
                service
                    .get_document_status(token.as_deref(), &document_id)
                    .await
                    .map(Payload::Status)
            }
            .boxed()
        })
    }

    fn queries_fetcher(&self, document_id: &str) -> Fetcher<Payload> {
        let service = Arc::clone(&self.queries);
        let session = self.session.clone();
        let document_id = document_id.to_string();
        Arc::new(move || {
            let service = Arc::clone(&service);
            let token = session.access_token();
            let document_id = document_id.clone();
            async move {
                service
                    .list_queries(token.as_deref(), &document_id)
                    .await
                    .map(|queries| {
                        Payload::Queries(
                            queries
                                .into_iter()
                                .map(|query| attach_document(query, &document_id))
                                .collect(),
                        )
                    })
            }
            .boxed()
        })
    }

    async fn read<T>(
        &self,
        fingerprint: Fingerprint,
        tags: Vec<Tag>,
        fetcher: Fetcher<Payload>,
        project: fn(Payload) -> Option<T>,
    ) -> Result<T, ClientError> {
        let payload = self.cache.query(fingerprint.clone(), tags, fetcher).await?;
        project(payload).ok_or_else(|| unexpected_payload(&fingerprint))
    }

    //=====================================================================================
    // Reads
    //=====================================================================================

    pub async fn list_documents(&self) -> Result<DocumentList, ClientError> {
        self.read(
            documents_key(),
            vec![Tag::Documents],
            self.documents_fetcher(),
            as_documents,
        )
        .await
    }

    pub async fn get_document(&self, document_id: &str) -> Result<Document, ClientError> {
        self.read(
            document_key(document_id),
            Vec::new(),
            self.document_fetcher(document_id),
            as_document,
        )
        .await
    }

    pub async fn get_document_status(&self, document_id: &str) -> Result<DocumentStatus, ClientError> {
        self.read(
            status_key(document_id),
            Vec::new(),
            self.status_fetcher(document_id),
            as_status,
        )
        .await
    }

    pub async fn list_queries(&self, document_id: &str) -> Result<Vec<Query>, ClientError> {
        self.read(
            queries_key(document_id),
            vec![Tag::Queries(document_id.to_string())],
            self.queries_fetcher(document_id),
            as_queries,
        )
        .await
    }

    /// Bypasses any cached copy of the document and waits for a new one.
    pub async fn refetch_document(&self, document_id: &str) -> Result<Document, ClientError> {
        let fingerprint = document_key(document_id);
        let payload = self
            .cache
            .refetch(fingerprint.clone(), Vec::new(), self.document_fetcher(document_id))
            .await?;
        as_document(payload).ok_or_else(|| unexpected_payload(&fingerprint))
    }

    //=====================================================================================
    // Subscriptions
    //=====================================================================================

    pub fn subscribe_documents(&self) -> Watch<DocumentList> {
        Watch {
            subscription: self.cache.subscribe(
                documents_key(),
                vec![Tag::Documents],
                self.documents_fetcher(),
            ),
            project: as_documents,
        }
    }

    pub fn subscribe_document(&self, document_id: &str) -> Watch<Document> {
        Watch {
            subscription: self.cache.subscribe(
                document_key(document_id),
                Vec::new(),
                self.document_fetcher(document_id),
            ),
            project: as_document,
        }
    }

    pub fn subscribe_queries(&self, document_id: &str) -> Watch<Vec<Query>> {
        Watch {
            subscription: self.cache.subscribe(
                queries_key(document_id),
                vec![Tag::Queries(document_id.to_string())],
                self.queries_fetcher(document_id),
            ),
            project: as_queries,
        }
    }

    //=====================================================================================
    // Writes
    //=====================================================================================

    /// Validates locally, uploads, then invalidates the document list.
    /// A file that fails validation never reaches the network.
    pub async fn upload_document(&self, file: UploadFile) -> Result<UploadReceipt, ClientError> {
        validate_upload(&file)?;

        info!(filename = %file.filename, size = file.size(), "Uploading document");
        let token = self.session.access_token();
        let receipt = self
            .documents
            .upload_document(token.as_deref(), &file)
            .await
            .map_err(|e| {
                error!("Failed to upload document: {:?}", e);
                e
            })?;

        info!(document_id = %receipt.document_id, status = %receipt.processing_status, "Document uploaded");
        self.cache.invalidate_tags(&[Tag::Documents]);
        Ok(receipt)
    }

    pub async fn delete_document(&self, document_id: &str) -> Result<DeleteReceipt, ClientError> {
        let token = self.session.access_token();
        let receipt = self
            .documents
            .delete_document(token.as_deref(), document_id)
            .await
            .map_err(|e| {
                error!("Failed to delete document {}: {:?}", document_id, e);
                e
            })?;

        info!(document_id = %document_id, "Document deleted");
        self.cache.invalidate_tags(&[Tag::Documents]);
        Ok(receipt)
    }

    /// Asks a question about a document. Only that document's chat history
    /// is invalidated.
    pub async fn submit_query(&self, document_id: &str, text: &str) -> Result<Query, ClientError> {
        let query_text = validate_query_text(text)?;
        let request = NewQuery {
            query_text,
            document_id: document_id.to_string(),
        };

        let token = self.session.access_token();
        let query = self
            .queries
            .submit_query(token.as_deref(), &request)
            .await
            .map_err(|e| {
                error!("Failed to submit query for {}: {:?}", document_id, e);
                e
            })?;

        self.cache
            .invalidate_tags(&[Tag::Queries(document_id.to_string())]);
        Ok(attach_document(query, document_id))
    }
}

fn attach_document(mut query: Query, document_id: &str) -> Query {
    if query.document_id.is_empty() {
        query.document_id = document_id.to_string();
    }
    query
}
