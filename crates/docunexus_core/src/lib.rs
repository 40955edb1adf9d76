pub mod domain;
pub mod ports;

pub use domain::{
    Credentials, DeleteReceipt, Document, DocumentList, DocumentStatus, NewAccount, NewQuery,
    ProcessingStatus, Profile, Query, TokenGrant, UploadFile, UploadReceipt, User,
};
pub use ports::{AuthService, DocumentService, PortError, PortResult, QueryService};
