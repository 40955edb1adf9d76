pub mod adapters;
pub mod cache;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod repository;
pub mod validation;
pub mod web;

pub use error::ClientError;
pub use repository::{DocumentRepository, Payload, Watch};
