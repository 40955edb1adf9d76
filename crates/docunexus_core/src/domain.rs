//! crates/docunexus_core/src/domain.rs
//!
//! Defines the core data structures shared by every layer of the client.
//! The shapes mirror the document service's JSON payloads, so they carry
//! serde derives; nothing here knows about HTTP or caching.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

//=========================================================================================
// Processing Status
//=========================================================================================

/// Where a document is in the server-side extraction pipeline.
///
/// Only the remote service moves a document between states; the client
/// observes them. The legal order is `Uploaded -> Processing -> Completed`,
/// with `Failed` reachable from either non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Uploaded,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    /// Position along the lifecycle. Both terminal states share the top rank.
    pub fn rank(self) -> u8 {
        match self {
            ProcessingStatus::Uploaded => 0,
            ProcessingStatus::Processing => 1,
            ProcessingStatus::Completed | ProcessingStatus::Failed => 2,
        }
    }

    /// `Completed` and `Failed` never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Failed)
    }

    /// Whether the service may move a document from `self` to `next`.
    /// Staying in the same state is always allowed.
    pub fn can_transition_to(self, next: ProcessingStatus) -> bool {
        if self == next {
            return true;
        }
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingStatus::Uploaded => "uploaded",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a status string is not one of the four known values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown processing status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for ProcessingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uploaded" => Ok(ProcessingStatus::Uploaded),
            "processing" => Ok(ProcessingStatus::Processing),
            "completed" => Ok(ProcessingStatus::Completed),
            "failed" => Ok(ProcessingStatus::Failed),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

//=========================================================================================
// Users
//=========================================================================================

/// The signed-in user, as returned by the sign-in endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
    pub access_token: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// Not part of the sign-in payload today; defaults to zero.
    #[serde(default)]
    pub credits: i64,
    /// Lifetime of `access_token` in seconds, when the server reports it.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Email/password pair posted to the sign-in endpoint.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Body of `POST /sign_up`.
#[derive(Clone, PartialEq, Serialize)]
pub struct NewAccount {
    pub email: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewAccount")
            .field("email", &self.email)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A registered account as returned by `POST /sign_up` and `GET /me`.
/// Carries no token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub email: String,
    pub username: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Response of `POST /refresh`. The refresh token itself travels in a
/// cookie and is never visible here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

//=========================================================================================
// Documents
//=========================================================================================

/// A PDF uploaded by a user, as listed by the document service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub user_id: String,
    pub filename: String,
    pub file_size: u64,
    pub cloudinary_url: String,
    #[serde(default)]
    pub cloudinary_public_id: Option<String>,
    pub processing_status: ProcessingStatus,
    /// Only present when `processing_status` is `Failed`.
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub insights_available: bool,
    /// Populated by the service once processing completes.
    #[serde(default)]
    pub insights: Option<serde_json::Value>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Response of `GET /documents`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentList {
    pub documents: Vec<Document>,
    pub total: u64,
}

impl DocumentList {
    pub fn contains(&self, document_id: &str) -> bool {
        self.documents.iter().any(|d| d.id == document_id)
    }
}

/// Response of `GET /documents/{id}/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentStatus {
    pub document_id: String,
    pub processing_status: ProcessingStatus,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Response of `POST /documents`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub document_id: String,
    pub filename: String,
    pub cloudinary_url: String,
    pub processing_status: ProcessingStatus,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    pub message: String,
    #[serde(default)]
    pub insights_available: bool,
}

/// Response of `DELETE /documents/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteReceipt {
    pub document_id: String,
    pub message: String,
}

/// A file selected for upload. Validated locally before any request is made.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

//=========================================================================================
// Queries (chat turns)
//=========================================================================================

/// A single question-and-answer exchange about a document.
/// The server writes both halves at once; the client never edits one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub id: String,
    /// Not part of the wire payload; filled in from the request.
    #[serde(default)]
    pub document_id: String,
    pub query_text: String,
    pub response_text: String,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /contracts/queries`.
#[derive(Debug, Clone, Serialize)]
pub struct NewQuery {
    pub query_text: String,
    pub document_id: String,
}

//=========================================================================================
// Timestamp handling
//=========================================================================================

/// The service emits ISO-8601 timestamps that sometimes lack an offset.
/// Offset-less values are taken to be UTC.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            ts: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => serializer.serialize_some(&ts.to_rfc3339()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) => super::parse(&raw)
                    .map(Some)
                    .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'"))),
                None => Ok(None),
            }
        }
    }
}
