//! Authentication: registration, login/logout, and the session extractor

use axum::{
    extract::{FromRequestParts, State},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    Json,
};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use tracing::{info, warn};

use coursecraft_common::User;
use coursecraft_storage::{MetadataStore, StorageError};

use crate::sessions::{
    expired_session_cookie, hash_password, hash_token, new_raw_token, session_cookie,
    verify_password, SESSION_COOKIE_NAME,
};
use crate::types::{Credentials, UserResponse};
use crate::ApiState;

fn unauthorized() -> (StatusCode, String) {
    (StatusCode::UNAUTHORIZED, "authentication required".to_string())
}

fn internal(err: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// The authenticated caller, resolved from the session cookie
///
/// Rejects with 401 when the cookie is missing, the session is revoked or
/// expired (absolute or idle), or the account is gone/inactive. Idle-expired
/// sessions are revoked server-side so the token cannot be replayed.
pub struct CurrentUser(pub User);

impl FromRequestParts<ApiState> for CurrentUser {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let raw = jar
            .get(SESSION_COOKIE_NAME)
            .map(|cookie| cookie.value().to_string())
            .ok_or_else(unauthorized)?;

        let token_hash = hash_token(&raw);
        let session = state
            .store
            .session_by_token_hash(&token_hash)
            .await
            .map_err(internal)?
            .ok_or_else(unauthorized)?;

        let now = Utc::now();
        if session.expires_at <= now {
            return Err(unauthorized());
        }

        if state.sessions.idle_deadline(session.last_seen_at) <= now {
            // Revoke server-side so the token can't be reused
            state
                .store
                .revoke_session(session.id, now)
                .await
                .map_err(internal)?;
            return Err(unauthorized());
        }

        state
            .store
            .touch_session(session.id, now)
            .await
            .map_err(internal)?;

        let user = state
            .store
            .user_by_id(session.user_id)
            .await
            .map_err(internal)?
            .filter(|user| user.is_active)
            .ok_or_else(unauthorized)?;

        Ok(CurrentUser(user))
    }
}

/// Register a new account
pub async fn register(
    State(state): State<ApiState>,
    Json(credentials): Json<Credentials>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let email = normalize_email(&credentials.email);
    if email.is_empty() || credentials.password.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "email and password are required".to_string(),
        ));
    }

    if state
        .store
        .user_by_email(&email)
        .await
        .map_err(internal)?
        .is_some()
    {
        return Err((StatusCode::CONFLICT, "email already registered".to_string()));
    }

    let password_hash = hash_password(&credentials.password).map_err(internal)?;
    let user = match state.store.create_user(&email, &password_hash).await {
        Ok(user) => user,
        // Lost a race with a concurrent registration for the same email
        Err(StorageError::Conflict(_)) => {
            return Err((StatusCode::CONFLICT, "email already registered".to_string()))
        }
        Err(e) => return Err(internal(e)),
    };

    info!(user_id = %user.id, "registered new account");

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            id: user.id,
            email: user.email,
        }),
    ))
}

/// Log in and establish a session
pub async fn login(
    State(state): State<ApiState>,
    jar: CookieJar,
    Json(credentials): Json<Credentials>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let email = normalize_email(&credentials.email);
    let user = state.store.user_by_email(&email).await.map_err(internal)?;

    // One rejection for unknown email and wrong password alike
    let verified = user
        .as_ref()
        .is_some_and(|user| verify_password(&credentials.password, &user.password_hash));
    let Some(user) = user.filter(|_| verified) else {
        warn!("rejected login attempt");
        return Err((StatusCode::UNAUTHORIZED, "bad credentials".to_string()));
    };

    let raw = new_raw_token();
    let expires_at = state.sessions.absolute_expiry(Utc::now());
    state
        .store
        .create_session(user.id, &hash_token(&raw), expires_at)
        .await
        .map_err(internal)?;

    info!(user_id = %user.id, "session established");

    let jar = jar.add(session_cookie(raw, &state.sessions));
    Ok((
        jar,
        Json(UserResponse {
            id: user.id,
            email: user.email,
        }),
    ))
}

/// Log out: revoke the presented session and clear the cookie
pub async fn logout(
    State(state): State<ApiState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if let Some(cookie) = jar.get(SESSION_COOKIE_NAME) {
        let token_hash = hash_token(cookie.value());
        if let Some(session) = state
            .store
            .session_by_token_hash(&token_hash)
            .await
            .map_err(internal)?
        {
            state
                .store
                .revoke_session(session.id, Utc::now())
                .await
                .map_err(internal)?;
            info!(user_id = %session.user_id, "session revoked");
        }
    }

    let jar = jar.remove(expired_session_cookie());
    Ok((jar, StatusCode::NO_CONTENT))
}
