pub mod auth;
pub mod poller;
pub mod routes;
pub mod session;
pub mod viewer;

// Re-export the pieces every front-end needs to wire a page together.
pub use poller::{PollOutcome, StatusPoller};
pub use routes::{guard, resolve, Route, RouteDecision};
pub use session::{Session, SessionReader, SessionStore};
pub use viewer::DocumentView;
