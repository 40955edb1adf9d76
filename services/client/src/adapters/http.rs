//! services/client/src/adapters/http.rs
//!
//! This module contains the HTTP adapter, the concrete implementation of the
//! `DocumentService`, `QueryService` and `AuthService` ports from the `core`
//! crate. It talks to the DocuNexus REST API using `reqwest`.

use crate::config::Config;
use crate::error::ClientError;
use async_trait::async_trait;
use docunexus_core::domain::{
    Credentials, DeleteReceipt, Document, DocumentList, DocumentStatus, NewAccount, NewQuery,
    Profile, Query, TokenGrant, UploadFile, UploadReceipt, User,
};
use docunexus_core::ports::{
    AuthService, DocumentService, PortError, PortResult, QueryService,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const USER_AGENT: &str = concat!("docunexus/", env!("CARGO_PKG_VERSION"));

/// Multipart field the upload endpoint reads the file from.
const UPLOAD_FIELD: &str = "doc_file";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An HTTP adapter that implements the service ports.
#[derive(Debug, Clone)]
pub struct HttpAdapter {
    /// Base endpoint of the API. Always ends in `/`.
    base: Url,
    client: Client,
}

impl HttpAdapter {
    /// Creates a new `HttpAdapter`.
    ///
    /// The client keeps cookies: the server hands out its refresh token as
    /// a cookie scoped to the refresh endpoint.
    pub fn new(base: Url, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()
            .map_err(|e| ClientError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { base, client })
    }

    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        Self::new(config.api_url.clone(), config.request_timeout)
    }

    /// Appends path segments to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> PortResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| PortError::Unexpected(format!("'{}' cannot be a base URL", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> PortResult<T> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        debug!(url = %response.url(), %status, "Response received");

        if status.is_success() {
            response
                .json::<T>()
                .await
                .map_err(|e| PortError::Unexpected(format!("Invalid response body: {}", e)))
        } else {
            Err(error_from_response(response).await)
        }
    }
}

fn authorize(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

//=========================================================================================
// Error Mapping
//=========================================================================================

/// Failure bodies come in two shapes: the service's own
/// `{"error": {"code", "message"}}` and the framework's `{"detail": ...}`.
#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
    detail: Option<serde_json::Value>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Deserialize)]
struct MessageResponse {
    message: String,
}

fn transport_error(e: reqwest::Error) -> PortError {
    if e.is_timeout() {
        PortError::Transport(format!("Request timed out: {}", e))
    } else {
        PortError::Transport(e.to_string())
    }
}

fn error_message(body: &str) -> Option<String> {
    let envelope: ErrorEnvelope = serde_json::from_str(body).ok()?;
    if let Some(error) = envelope.error {
        return Some(error.message);
    }
    match envelope.detail {
        Some(serde_json::Value::String(detail)) => Some(detail),
        Some(detail) => Some(detail.to_string()),
        None => envelope.message,
    }
}

async fn error_from_response(response: Response) -> PortError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body).unwrap_or_else(|| {
        if body.trim().is_empty() {
            status.canonical_reason().unwrap_or("Request failed").to_string()
        } else {
            body
        }
    });

    match status {
        StatusCode::UNAUTHORIZED => PortError::Unauthorized,
        StatusCode::FORBIDDEN => PortError::Forbidden(message),
        StatusCode::NOT_FOUND => PortError::NotFound(message),
        _ => PortError::Rejected {
            status: status.as_u16(),
            message,
        },
    }
}

//=========================================================================================
// Port Implementations
//=========================================================================================

#[async_trait]
impl DocumentService for HttpAdapter {
    async fn list_documents(&self, token: Option<&str>) -> PortResult<DocumentList> {
        let url = self.endpoint(&["documents"])?;
        self.send(authorize(self.client.get(url), token)).await
    }

    async fn get_document(&self, token: Option<&str>, document_id: &str) -> PortResult<Document> {
        let url = self.endpoint(&["documents", document_id])?;
        self.send(authorize(self.client.get(url), token)).await
    }

    async fn get_document_status(
        &self,
        token: Option<&str>,
        document_id: &str,
    ) -> PortResult<DocumentStatus> {
        let url = self.endpoint(&["documents", document_id, "status"])?;
        self.send(authorize(self.client.get(url), token)).await
    }

    async fn upload_document(
        &self,
        token: Option<&str>,
        file: &UploadFile,
    ) -> PortResult<UploadReceipt> {
        let url = self.endpoint(&["documents"])?;
        let part = Part::bytes(file.bytes.to_vec())
            .file_name(file.filename.clone())
            .mime_str(&file.mime_type)
            .map_err(|e| PortError::Unexpected(format!("Invalid MIME type: {}", e)))?;
        let form = Form::new().part(UPLOAD_FIELD, part);
        self.send(authorize(self.client.post(url).multipart(form), token))
            .await
    }

    async fn delete_document(
        &self,
        token: Option<&str>,
        document_id: &str,
    ) -> PortResult<DeleteReceipt> {
        let url = self.endpoint(&["documents", document_id])?;
        self.send(authorize(self.client.delete(url), token)).await
    }
}

#[async_trait]
impl QueryService for HttpAdapter {
    async fn list_queries(&self, token: Option<&str>, document_id: &str) -> PortResult<Vec<Query>> {
        let url = self.endpoint(&["contracts", "queries"])?;
        let request = self.client.get(url).query(&[("document_id", document_id)]);
        self.send(authorize(request, token)).await
    }

    async fn submit_query(&self, token: Option<&str>, query: &NewQuery) -> PortResult<Query> {
        let url = self.endpoint(&["contracts", "queries"])?;
        self.send(authorize(self.client.post(url).json(query), token))
            .await
    }
}

#[async_trait]
impl AuthService for HttpAdapter {
    async fn sign_up(&self, account: &NewAccount) -> PortResult<Profile> {
        let url = self.endpoint(&["sign_up"])?;
        self.send(self.client.post(url).json(account)).await
    }

    async fn sign_in(&self, credentials: &Credentials) -> PortResult<User> {
        let url = self.endpoint(&["sign_in"])?;
        self.send(self.client.post(url).json(credentials)).await
    }

    async fn sign_out(&self, token: &str) -> PortResult<()> {
        let url = self.endpoint(&["sign_out"])?;
        let response: MessageResponse = self
            .send(authorize(self.client.post(url), Some(token)))
            .await?;
        info!("{}", response.message);
        Ok(())
    }

    async fn refresh(&self) -> PortResult<TokenGrant> {
        let url = self.endpoint(&["refresh"])?;
        self.send(self.client.post(url)).await
    }

    async fn me(&self, token: &str) -> PortResult<Profile> {
        let url = self.endpoint(&["me"])?;
        self.send(authorize(self.client.get(url), Some(token))).await
    }
}
