//! Server-rendered pages.
//!
//! Handlers render askama templates or redirect with a flash message. Form
//! handlers turn validation problems into flashes and send the user back to
//! where they came from.

mod account;
mod auth;
mod reviews;
mod stores;
mod tags;

pub use account::*;
pub use auth::*;
pub use reviews::*;
pub use stores::*;
pub use tags::*;

use axum::{
    http::{header, HeaderMap},
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use crate::errors::AppError;
use crate::models::Store;
use crate::session;

/// Number of words kept from a description on store cards.
const EXCERPT_WORDS: usize = 25;

/// Redirect to the page that submitted the form, or `fallback`.
///
/// Only the path of the `Referer` is used, so a forged header cannot bounce
/// the user to another site.
pub fn redirect_back(headers: &HeaderMap, fallback: &str) -> Redirect {
    let target = headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .and_then(referer_path)
        .unwrap_or_else(|| fallback.to_string());

    Redirect::to(&target)
}

fn referer_path(referer: &str) -> Option<String> {
    let path = match referer.split_once("://") {
        Some((_, rest)) => &rest[rest.find('/')?..],
        None => referer,
    };

    (path.starts_with('/') && !path.starts_with("//")).then(|| path.to_string())
}

/// Flash user-facing errors and go back; anything else propagates.
pub async fn flash_back(
    session: &Session,
    headers: &HeaderMap,
    fallback: &str,
    err: AppError,
) -> Result<Response, AppError> {
    match err {
        AppError::Validation(_) | AppError::Image(_) => {
            session::flash_errors(session, &err).await?;
            Ok(redirect_back(headers, fallback).into_response())
        }
        other => Err(other),
    }
}

/// Flash a success message and redirect.
pub async fn flash_redirect(session: &Session, message: &str, to: &str) -> Result<Response, AppError> {
    session::flash_success(session, message).await?;
    Ok(Redirect::to(to).into_response())
}

/// A store as shown in a grid of cards.
#[derive(Debug, Clone)]
pub struct StoreCard {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub excerpt: String,
    pub photo_url: Option<String>,
    pub is_owner: bool,
    pub hearted: bool,
}

impl StoreCard {
    pub fn new(store: &Store, user_id: Option<&str>, hearts: &[String]) -> Self {
        let excerpt = store
            .description
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .take(EXCERPT_WORDS)
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            id: store.id.clone(),
            name: store.name.clone(),
            slug: store.slug.clone(),
            excerpt,
            photo_url: store.photo_url(),
            is_owner: user_id.is_some_and(|id| store.is_owned_by(id)),
            hearted: hearts.contains(&store.id),
        }
    }

    pub fn from_stores(stores: &[Store], user_id: Option<&str>, hearts: &[String]) -> Vec<Self> {
        stores
            .iter()
            .map(|store| StoreCard::new(store, user_id, hearts))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn location(headers: Redirect) -> String {
        let response = headers.into_response();
        response.headers()[header::LOCATION]
            .to_str()
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_redirect_back_uses_referer_path() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::REFERER,
            HeaderValue::from_static("http://localhost:7777/stores/abc/edit?x=1"),
        );
        assert_eq!(location(redirect_back(&headers, "/")), "/stores/abc/edit?x=1");
    }

    #[test]
    fn test_redirect_back_falls_back() {
        assert_eq!(location(redirect_back(&HeaderMap::new(), "/add")), "/add");

        let mut headers = HeaderMap::new();
        headers.insert(header::REFERER, HeaderValue::from_static("//evil.example"));
        assert_eq!(location(redirect_back(&headers, "/add")), "/add");

        headers.insert(header::REFERER, HeaderValue::from_static("https://evil.example"));
        assert_eq!(location(redirect_back(&headers, "/add")), "/add");
    }
}
