//! Review submission.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Form,
};
use tower_sessions::Session;

use super::{flash_back, redirect_back};
use crate::auth::RequireUser;
use crate::errors::AppError;
use crate::models::CreateReviewRequest;
use crate::session;
use crate::AppState;

/// POST /reviews/{store_id}
pub async fn add_review(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    session: Session,
    headers: HeaderMap,
    Path(store_id): Path<String>,
    Form(form): Form<CreateReviewRequest>,
) -> Result<Response, AppError> {
    let (text, rating) = match form.validate() {
        Ok(valid) => valid,
        Err(e) => return flash_back(&session, &headers, "/stores", e).await,
    };

    let review = state
        .repo
        .create_review(&store_id, &user.id, &text, rating)
        .await?;
    tracing::info!("User {} reviewed store {} ({} stars)", user.id, store_id, review.rating);

    session::flash_success(&session, "Review Saved!").await?;
    Ok(redirect_back(&headers, "/stores").into_response())
}
