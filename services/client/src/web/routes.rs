//! services/client/src/web/routes.rs
//!
//! The route table and the authentication guard evaluated before a page is
//! entered.

use crate::web::session::Session;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Landing,
    SignIn,
    SignUp,
    Dashboard,
    Profile,
    /// The viewer for one document.
    Document(String),
    NotFound(String),
}

/// Who may enter a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Only signed-out visitors; signed-in users go to the dashboard.
    GuestOnly,
    /// Only signed-in users; everyone else goes to the landing page.
    Protected,
    Open,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Enter(Route),
    Redirect(Route),
}

impl Route {
    pub fn parse(path: &str) -> Route {
        let trimmed = path.split(['?', '#']).next().unwrap_or("");
        let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [] => Route::Landing,
            ["sign-in"] => Route::SignIn,
            ["sign-up"] => Route::SignUp,
            ["dashboard"] => Route::Dashboard,
            ["user-profile"] => Route::Profile,
            ["project", document_id] => Route::Document(document_id.to_string()),
            _ => Route::NotFound(path.to_string()),
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Landing => "/".to_string(),
            Route::SignIn => "/sign-in".to_string(),
            Route::SignUp => "/sign-up".to_string(),
            Route::Dashboard => "/dashboard".to_string(),
            Route::Profile => "/user-profile".to_string(),
            Route::Document(document_id) => format!("/project/{}", document_id),
            Route::NotFound(path) => path.clone(),
        }
    }

    pub fn access(&self) -> Access {
        match self {
            Route::Landing | Route::SignIn | Route::SignUp => Access::GuestOnly,
            Route::Dashboard | Route::Profile | Route::Document(_) => Access::Protected,
            Route::NotFound(_) => Access::Open,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Decides whether `route` may be entered with the given session.
pub fn guard(route: Route, session: &Session) -> RouteDecision {
    match (route.access(), session.is_authenticated()) {
        (Access::Protected, false) => RouteDecision::Redirect(Route::Landing),
        (Access::GuestOnly, true) => RouteDecision::Redirect(Route::Dashboard),
        _ => RouteDecision::Enter(route),
    }
}

pub fn resolve(path: &str, session: &Session) -> RouteDecision {
    guard(Route::parse(path), session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::session::SessionStore;
    use chrono::Utc;
    use docunexus_core::domain::User;

    fn signed_in() -> Session {
        let store = SessionStore::new();
        store.set_user(User {
            id: "u1".into(),
            email: "a@b.c".into(),
            username: "abc".into(),
            access_token: "t".into(),
            created_at: Utc::now(),
            credits: 0,
            expires_in: None,
        });
        store.snapshot()
    }

    #[test]
    fn parses_known_paths() {
        assert_eq!(Route::parse("/"), Route::Landing);
        assert_eq!(Route::parse("/dashboard/"), Route::Dashboard);
        assert_eq!(Route::parse("/project/abc-123?tab=chat"), Route::Document("abc-123".into()));
        assert_eq!(Route::parse("/billing"), Route::NotFound("/billing".into()));
        assert_eq!(Route::Document("x".into()).path(), "/project/x");
    }

    #[test]
    fn protected_routes_redirect_guests_to_landing() {
        let guest = Session::default();
        assert_eq!(resolve("/dashboard", &guest), RouteDecision::Redirect(Route::Landing));
        assert_eq!(resolve("/project/d1", &guest), RouteDecision::Redirect(Route::Landing));
        assert_eq!(resolve("/sign-in", &guest), RouteDecision::Enter(Route::SignIn));
    }

    #[test]
    fn guest_routes_redirect_users_to_dashboard() {
        let user = signed_in();
        assert_eq!(resolve("/", &user), RouteDecision::Redirect(Route::Dashboard));
        assert_eq!(resolve("/sign-up", &user), RouteDecision::Redirect(Route::Dashboard));
        assert_eq!(resolve("/user-profile", &user), RouteDecision::Enter(Route::Profile));
    }
}
