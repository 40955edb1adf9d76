//! An in-memory DocuNexus backend for integration tests.
//!
//! Implements every service port, counts calls per endpoint, and lets a test
//! script status sequences, add latency, or make the next call fail.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use client_lib::web::SessionStore;
use client_lib::DocumentRepository;
use docunexus_core::domain::{
    Credentials, DeleteReceipt, Document, DocumentList, DocumentStatus, NewAccount, NewQuery,
    ProcessingStatus, Profile, Query, TokenGrant, UploadFile, UploadReceipt, User,
};
use docunexus_core::ports::{
    AuthService, DocumentService, PortError, PortResult, QueryService,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub const TOKEN: &str = "test-token";
pub const REFRESHED_TOKEN: &str = "refreshed-token";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    ListDocuments,
    GetDocument,
    GetStatus,
    Upload,
    Delete,
    ListQueries,
    SubmitQuery,
    SignUp,
    SignIn,
    SignOut,
    Refresh,
    Me,
}

#[derive(Default)]
struct State {
    documents: Vec<Document>,
    queries: HashMap<String, Vec<Query>>,
    /// Statuses handed out by successive status calls, per document.
    status_script: HashMap<String, VecDeque<ProcessingStatus>>,
    calls: HashMap<Endpoint, usize>,
    failures: HashMap<Endpoint, PortError>,
    delays: HashMap<Endpoint, Duration>,
    tokens_seen: Vec<Option<String>>,
}

#[derive(Default)]
pub struct FakeService {
    state: Mutex<State>,
}

pub fn document(id: &str, status: ProcessingStatus) -> Document {
    Document {
        id: id.to_string(),
        user_id: "user-1".to_string(),
        filename: format!("{}.pdf", id),
        file_size: 1024,
        cloudinary_url: format!("https://files.example.com/{}.pdf", id),
        cloudinary_public_id: None,
        processing_status: status,
        error_message: None,
        insights_available: status == ProcessingStatus::Completed,
        insights: None,
        created_at: Utc::now(),
        updated_at: None,
    }
}

pub fn user() -> User {
    User {
        id: "user-1".to_string(),
        email: "reader@example.com".to_string(),
        username: "reader".to_string(),
        access_token: TOKEN.to_string(),
        created_at: Utc::now(),
        credits: 0,
        expires_in: Some(3600),
    }
}

pub fn pdf(size: usize) -> UploadFile {
    UploadFile::new("contract.pdf", "application/pdf", vec![b'%'; size])
}

impl FakeService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_documents(documents: Vec<Document>) -> Arc<Self> {
        let service = Self::default();
        service.state.lock().unwrap().documents = documents;
        service.into()
    }

    pub fn calls(&self, endpoint: Endpoint) -> usize {
        *self.state.lock().unwrap().calls.get(&endpoint).unwrap_or(&0)
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().unwrap().calls.values().sum()
    }

    /// The next call to `endpoint` fails with `error`.
    pub fn fail_next(&self, endpoint: Endpoint, error: PortError) {
        self.state.lock().unwrap().failures.insert(endpoint, error);
    }

    pub fn delay(&self, endpoint: Endpoint, delay: Duration) {
        self.state.lock().unwrap().delays.insert(endpoint, delay);
    }

    pub fn script_statuses(&self, document_id: &str, statuses: &[ProcessingStatus]) {
        self.state
            .lock()
            .unwrap()
            .status_script
            .insert(document_id.to_string(), statuses.iter().copied().collect());
    }

    /// Changes a document server-side, as the background worker would.
    pub fn set_status(&self, document_id: &str, status: ProcessingStatus) {
        let mut state = self.state.lock().unwrap();
        if let Some(document) = state.documents.iter_mut().find(|d| d.id == document_id) {
            document.processing_status = status;
            document.insights_available = status == ProcessingStatus::Completed;
            if status == ProcessingStatus::Completed {
                document.insights = Some(serde_json::json!({ "summary": "A lease." }));
            }
        }
    }

    pub fn tokens_seen(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().tokens_seen.clone()
    }

    /// Records the call and returns the latency to apply, or the scripted failure.
    fn enter(&self, endpoint: Endpoint, token: Option<&str>) -> PortResult<Option<Duration>> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(endpoint).or_insert(0) += 1;
        state.tokens_seen.push(token.map(str::to_string));
        if let Some(error) = state.failures.remove(&endpoint) {
            return Err(error);
        }
        Ok(state.delays.get(&endpoint).copied())
    }

    async fn call(&self, endpoint: Endpoint, token: Option<&str>) -> PortResult<()> {
        let delay = self.enter(endpoint, token)?;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentService for FakeService {
    async fn list_documents(&self, token: Option<&str>) -> PortResult<DocumentList> {
        self.call(Endpoint::ListDocuments, token).await?;
        let state = self.state.lock().unwrap();
        Ok(DocumentList {
            documents: state.documents.clone(),
            total: state.documents.len() as u64,
        })
    }

    async fn get_document(&self, token: Option<&str>, document_id: &str) -> PortResult<Document> {
        self.call(Endpoint::GetDocument, token).await?;
        let state = self.state.lock().unwrap();
        state
            .documents
            .iter()
            .find(|d| d.id == document_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Document {} not found", document_id)))
    }

    async fn get_document_status(
        &self,
        token: Option<&str>,
        document_id: &str,
    ) -> PortResult<DocumentStatus> {
        self.call(Endpoint::GetStatus, token).await?;
        let mut state = self.state.lock().unwrap();
        let scripted = state
            .status_script
            .get_mut(document_id)
            .and_then(|script| script.pop_front());
        let status = match scripted {
            Some(status) => status,
            None => state
                .documents
                .iter()
                .find(|d| d.id == document_id)
                .map(|d| d.processing_status)
                .ok_or_else(|| PortError::NotFound(format!("Document {} not found", document_id)))?,
        };
        Ok(DocumentStatus {
            document_id: document_id.to_string(),
            processing_status: status,
            error_message: None,
        })
    }

    async fn upload_document(
        &self,
        token: Option<&str>,
        file: &UploadFile,
    ) -> PortResult<UploadReceipt> {
        self.call(Endpoint::Upload, token).await?;
        let id = Uuid::new_v4().to_string();
        let mut created = document(&id, ProcessingStatus::Uploaded);
        created.filename = file.filename.clone();
        created.file_size = file.size();
        let receipt = UploadReceipt {
            document_id: id,
            filename: created.filename.clone(),
            cloudinary_url: created.cloudinary_url.clone(),
            processing_status: ProcessingStatus::Uploaded,
            created_at: created.created_at,
            message: "Document uploaded successfully".to_string(),
            insights_available: false,
        };
        self.state.lock().unwrap().documents.push(created);
        Ok(receipt)
    }

    async fn delete_document(
        &self,
        token: Option<&str>,
        document_id: &str,
    ) -> PortResult<DeleteReceipt> {
        self.call(Endpoint::Delete, token).await?;
        let mut state = self.state.lock().unwrap();
        let before = state.documents.len();
        state.documents.retain(|d| d.id != document_id);
        if state.documents.len() == before {
            return Err(PortError::NotFound(format!("Document {} not found", document_id)));
        }
        Ok(DeleteReceipt {
            document_id: document_id.to_string(),
            message: "Document deleted successfully".to_string(),
        })
    }
}

#[async_trait]
impl QueryService for FakeService {
    async fn list_queries(&self, token: Option<&str>, document_id: &str) -> PortResult<Vec<Query>> {
        self.call(Endpoint::ListQueries, token).await?;
        let state = self.state.lock().unwrap();
        Ok(state.queries.get(document_id).cloned().unwrap_or_default())
    }

    async fn submit_query(&self, token: Option<&str>, query: &NewQuery) -> PortResult<Query> {
        self.call(Endpoint::SubmitQuery, token).await?;
        let answered = Query {
            id: Uuid::new_v4().to_string(),
            document_id: String::new(),
            query_text: query.query_text.clone(),
            response_text: format!("About '{}': it depends.", query.query_text),
            confidence_score: Some(0.8),
            created_at: Utc::now(),
        };
        self.state
            .lock()
            .unwrap()
            .queries
            .entry(query.document_id.clone())
            .or_default()
            .push(answered.clone());
        Ok(answered)
    }
}

#[async_trait]
impl AuthService for FakeService {
    async fn sign_up(&self, account: &NewAccount) -> PortResult<Profile> {
        self.call(Endpoint::SignUp, None).await?;
        if account.email == "taken@example.com" {
            return Err(PortError::Rejected {
                status: 400,
                message: "Email already registered".to_string(),
            });
        }
        Ok(Profile {
            id: Uuid::new_v4().to_string(),
            email: account.email.clone(),
            username: account.username.clone(),
            created_at: Utc::now(),
            updated_at: None,
        })
    }

    async fn sign_in(&self, credentials: &Credentials) -> PortResult<User> {
        self.call(Endpoint::SignIn, None).await?;
        if credentials.password != "correct horse" {
            return Err(PortError::Unauthorized);
        }
        let mut user = user();
        user.email = credentials.email.clone();
        Ok(user)
    }

    async fn sign_out(&self, token: &str) -> PortResult<()> {
        self.call(Endpoint::SignOut, Some(token)).await
    }

    async fn refresh(&self) -> PortResult<TokenGrant> {
        self.call(Endpoint::Refresh, None).await?;
        Ok(TokenGrant {
            access_token: REFRESHED_TOKEN.to_string(),
            expires_in: Some(900),
        })
    }

    async fn me(&self, token: &str) -> PortResult<Profile> {
        self.call(Endpoint::Me, Some(token)).await?;
        let user = user();
        Ok(Profile {
            id: user.id,
            email: user.email,
            username: user.username,
            created_at: user.created_at,
            updated_at: None,
        })
    }
}

/// A signed-in session and a repository wired to `service`.
pub fn signed_in(service: &Arc<FakeService>) -> (SessionStore, DocumentRepository) {
    let session = SessionStore::new();
    session.set_user(user());
    let repository = DocumentRepository::new(service.clone(), service.clone(), session.reader());
    (session, repository)
}
