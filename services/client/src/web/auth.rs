//! services/client/src/web/auth.rs
//!
//! Account flows: sign-up, sign-in, token refresh and sign-out. These are
//! the only writers of the session store.

use crate::error::ClientError;
use crate::repository::DocumentRepository;
use crate::web::routes::Route;
use crate::validation::validate_sign_up;
use crate::web::session::SessionStore;
use docunexus_core::domain::{Credentials, NewAccount, Profile, User};
use docunexus_core::ports::{AuthService, PortError};
use tracing::{error, info, warn};

/// Validates locally, then POST /sign_up. The session is left untouched;
/// the new account still has to sign in, so the caller navigates to the
/// sign-in route.
pub async fn sign_up(auth: &dyn AuthService, account: &NewAccount) -> Result<Profile, ClientError> {
    let account = validate_sign_up(account)?;
    let profile = auth.sign_up(&account).await.map_err(|e| {
        error!("Failed to register {}: {:?}", account.email, e);
        e
    })?;

    info!(user_id = %profile.id, "Account registered");
    Ok(profile)
}

/// POST /sign_in, then store the returned user as the current session.
pub async fn sign_in(
    auth: &dyn AuthService,
    store: &SessionStore,
    credentials: &Credentials,
) -> Result<User, ClientError> {
    let user = auth.sign_in(credentials).await.map_err(|e| {
        error!("Failed to sign in {}: {:?}", credentials.email, e);
        e
    })?;

    info!(user_id = %user.id, "Signed in");
    store.set_user(user.clone());
    Ok(user)
}

/// POST /sign_out, then clear the session and every cached response.
///
/// A 401 means the server already considers the token dead, so the local
/// session is cleared anyway. Any other failure leaves the session intact.
/// Returns where the caller should navigate next.
pub async fn sign_out(
    auth: &dyn AuthService,
    store: &SessionStore,
    repository: &DocumentRepository,
) -> Result<Route, ClientError> {
    let session = store.snapshot();
    let Some(token) = session.access_token() else {
        repository.reset();
        return Ok(Route::Landing);
    };

    match auth.sign_out(token).await {
        Ok(()) => info!("Signed out"),
        Err(PortError::Unauthorized) => warn!("Token already rejected by server; clearing session"),
        Err(e) => {
            error!("Failed to sign out: {:?}", e);
            return Err(e.into());
        }
    }

    store.clear_user();
    repository.reset();
    Ok(Route::Landing)
}

/// POST /refresh, then swap the new access token into the session.
///
/// A 401 means the refresh credential is gone too, so the session is
/// cleared before the error is returned.
pub async fn refresh(auth: &dyn AuthService, store: &SessionStore) -> Result<User, ClientError> {
    if !store.is_authenticated() {
        return Err(ClientError::NotSignedIn);
    }

    let grant = match auth.refresh().await {
        Ok(grant) => grant,
        Err(PortError::Unauthorized) => {
            warn!("Refresh token rejected; clearing session");
            store.clear_user();
            return Err(PortError::Unauthorized.into());
        }
        Err(e) => {
            error!("Failed to refresh access token: {:?}", e);
            return Err(e.into());
        }
    };

    store.replace_token(grant.access_token, grant.expires_in);
    info!("Access token refreshed");
    store
        .snapshot()
        .user()
        .cloned()
        .ok_or(ClientError::NotSignedIn)
}

/// GET /me with the session's token.
pub async fn current_user(auth: &dyn AuthService, store: &SessionStore) -> Result<Profile, ClientError> {
    let session = store.snapshot();
    let token = session.access_token().ok_or(ClientError::NotSignedIn)?;
    Ok(auth.me(token).await?)
}
