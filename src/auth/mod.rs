//! Session authentication: extractors, password hashing and reset tokens.
//!
//! Browser routes that need a user redirect to the login page with a flash;
//! API routes answer with a JSON 401 instead.

use argon2::{
    password_hash::{
        rand_core::{OsRng, RngCore},
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    },
    Argon2,
};
use axum::{
    extract::{FromRequestParts, OriginalUri},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use chrono::{Duration, Utc};
use tower_sessions::Session;

use crate::db::timestamp;
use crate::errors::{AppError, ErrorResponse};
use crate::models::Store;
use crate::session::{self, SessionUser};

/// Flash shown when a guest hits a protected page.
pub const LOGIN_REQUIRED_MESSAGE: &str = "Oops you must be logged in to do that!";

/// Lifetime of a password reset token.
const RESET_TOKEN_TTL_HOURS: i64 = 1;

/// Extractor that requires a logged-in user.
pub struct RequireUser(pub SessionUser);

/// Rejection for [`RequireUser`].
pub enum AuthRejection {
    /// Redirect to the login page (browser requests).
    RedirectToLogin,
    /// JSON 401 (API requests).
    Unauthorized,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin => Redirect::to("/login").into_response(),
            Self::Unauthorized => {
                let err = AppError::Unauthorized(LOGIN_REQUIRED_MESSAGE.to_string());
                (StatusCode::UNAUTHORIZED, Json(ErrorResponse::new(&err))).into_response()
            }
        }
    }
}

impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Nested routers strip their prefix from `parts.uri`.
        let is_api = parts
            .extensions
            .get::<OriginalUri>()
            .map_or(parts.uri.path(), |uri| uri.0.path())
            .starts_with("/api/");
        let session = parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or(AuthRejection::Unauthorized)?;

        let user = session::current_user(&session).await.unwrap_or_else(|e| {
            tracing::warn!("Failed to read session user: {}", e);
            None
        });

        match user {
            Some(user) => Ok(Self(user)),
            None if is_api => Err(AuthRejection::Unauthorized),
            None => {
                if let Err(e) = session::flash_error(&session, LOGIN_REQUIRED_MESSAGE).await {
                    tracing::warn!("Failed to flash login notice: {}", e);
                }
                Err(AuthRejection::RedirectToLogin)
            }
        }
    }
}

/// Hash a password with Argon2id and a random salt.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// Check a password against a stored hash. A malformed hash never matches.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        return false;
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Fail with 403 unless `user` authored `store`.
pub fn confirm_owner(store: &Store, user: &SessionUser) -> Result<(), AppError> {
    if store.is_owned_by(&user.id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "You are not the owner of this store!".to_string(),
        ))
    }
}

/// A fresh reset token (40 hex characters) and its expiry timestamp.
pub fn generate_reset_token() -> (String, String) {
    let mut bytes = [0u8; 20];
    OsRng.fill_bytes(&mut bytes);
    let token = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    let expires = timestamp(Utc::now() + Duration::hours(RESET_TOKEN_TTL_HOURS));
    (token, expires)
}

/// Stand-in for the reset mail: write the link to the log.
pub fn send_reset_link(email: &str, base_url: &str, token: &str) -> String {
    let reset_url = format!("{}/account/reset/{}", base_url, token);
    tracing::info!(email = %email, reset_url = %reset_url, "Password reset requested");
    reset_url
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tower_sessions::MemoryStore;

    use crate::models::Location;

    #[test]
    fn test_password_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("battery staple", &hash));
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(!verify_password("anything", "not-a-hash"));
        assert!(!verify_password("", ""));
    }

    #[test]
    fn test_reset_token_shape() {
        let (token, expires) = generate_reset_token();
        assert_eq!(token.len(), 40);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(expires > crate::db::now());

        let (other, _) = generate_reset_token();
        assert_ne!(token, other);
    }

    fn parts_with_session(path: &str, session: &Session) -> Parts {
        let (mut parts, _) = axum::http::Request::builder()
            .uri(path)
            .body(())
            .unwrap()
            .into_parts();
        parts.extensions.insert(session.clone());
        parts
    }

    #[tokio::test]
    async fn test_unreadable_session_user_is_treated_as_guest() {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);
        session
            .insert(session::keys::USER, "not a user record")
            .await
            .unwrap();

        let mut parts = parts_with_session("/api/stores/abc/heart", &session);
        match RequireUser::from_request_parts(&mut parts, &()).await {
            Err(AuthRejection::Unauthorized) => {}
            _ => panic!("expected a JSON 401"),
        }

        let mut parts = parts_with_session("/add", &session);
        match RequireUser::from_request_parts(&mut parts, &()).await {
            Err(AuthRejection::RedirectToLogin) => {}
            _ => panic!("expected a login redirect"),
        }
        let flashes = session::take_flashes(&session).await.unwrap();
        assert_eq!(flashes[0].message, LOGIN_REQUIRED_MESSAGE);
    }

    #[test]
    fn test_confirm_owner() {
        let store = Store {
            id: "s1".to_string(),
            name: "Shop".to_string(),
            slug: "shop".to_string(),
            description: None,
            tags: vec![],
            created: crate::db::now(),
            location: Location::point(0.0, 0.0, "Somewhere"),
            photo: None,
            author: "u1".to_string(),
        };
        let owner = SessionUser {
            id: "u1".to_string(),
            name: "Owner".to_string(),
            email: "owner@example.com".to_string(),
        };
        let stranger = SessionUser {
            id: "u2".to_string(),
            ..owner.clone()
        };

        assert!(confirm_owner(&store, &owner).is_ok());
        let err = confirm_owner(&store, &stranger).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }
}
