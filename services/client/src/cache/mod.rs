//! services/client/src/cache/mod.rs
//!
//! Response cache keyed by request fingerprint, with tag-based invalidation.

pub mod store;

pub use store::{Fetcher, Subscription, TaggedCache};

use docunexus_core::ports::PortError;
use std::fmt;

//=========================================================================================
// Keys
//=========================================================================================

/// A label attached to cached reads and to the writes that supersede them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    /// The document list.
    Documents,
    /// The chat history of one document.
    Queries(String),
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Documents => f.write_str("Documents"),
            Tag::Queries(document_id) => write!(f, "Queries:{}", document_id),
        }
    }
}

/// The identity of a cached request: endpoint plus parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// `endpoint` is a fixed route template such as `GET /documents/{id}`;
    /// caller-supplied values belong in `params`. Parameters are sorted so
    /// that their order never changes the identity, and escaped so that a
    /// value can never read as a separator.
    pub fn new(endpoint: &str, params: &[(&str, &str)]) -> Self {
        if params.is_empty() {
            return Self(endpoint.to_string());
        }
        let mut params = params.to_vec();
        params.sort();
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", escape(k), escape(v)))
            .collect::<Vec<_>>()
            .join("&");
        Self(format!("{}?{}", endpoint, query))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn escape(raw: &str) -> String {
    raw.replace('%', "%25").replace('&', "%26").replace('=', "%3D")
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//=========================================================================================
// Entry state as seen by subscribers
//=========================================================================================

/// What a reader currently knows about one cached request.
#[derive(Debug, Clone)]
pub struct QueryState<V> {
    /// Last successful response. Kept visible across later failures.
    pub data: Option<V>,
    /// Failure of the most recent fetch, cleared by the next success.
    pub error: Option<PortError>,
    pub is_fetching: bool,
    /// A write has superseded `data`; a refetch is due or underway.
    pub is_stale: bool,
}

impl<V> Default for QueryState<V> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            is_fetching: false,
            is_stale: false,
        }
    }
}

impl<V> QueryState<V> {
    /// No fetch is running and the entry holds either current data or the
    /// error of its latest attempt.
    pub fn is_settled(&self) -> bool {
        !self.is_fetching && (self.error.is_some() || (self.data.is_some() && !self.is_stale))
    }

    pub fn is_errored(&self) -> bool {
        self.error.is_some()
    }

    pub fn map<U>(self, f: impl FnOnce(V) -> Option<U>) -> QueryState<U> {
        QueryState {
            data: self.data.and_then(f),
            error: self.error,
            is_fetching: self.is_fetching,
            is_stale: self.is_stale,
        }
    }
}
