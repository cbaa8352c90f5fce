//! Account page.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Form,
};
use tower_sessions::Session;

use super::{flash_back, redirect_back};
use crate::auth::RequireUser;
use crate::errors::AppError;
use crate::models::UpdateAccountRequest;
use crate::session::{self, PageContext};
use crate::AppState;

#[derive(Template, WebTemplate)]
#[template(path = "account.html")]
pub struct AccountTemplate {
    pub ctx: PageContext,
    pub title: String,
    pub name: String,
    pub email: String,
}

/// GET /account
pub async fn account_form(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    ctx: PageContext,
) -> Result<Response, AppError> {
    let user = state
        .repo
        .get_user(&user.id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.id)))?;

    Ok(AccountTemplate {
        ctx,
        title: "Edit Your Account".to_string(),
        name: user.name,
        email: user.email,
    }
    .into_response())
}

/// POST /account - Change name and email.
pub async fn update_account(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    session: Session,
    headers: HeaderMap,
    Form(form): Form<UpdateAccountRequest>,
) -> Result<Response, AppError> {
    let updated = match form.validate() {
        Ok((name, email)) => state.repo.update_account(&user.id, &name, &email).await,
        Err(e) => Err(e),
    };
    let updated = match updated {
        Ok(updated) => updated,
        Err(e) => return flash_back(&session, &headers, "/account", e).await,
    };

    // Keep the name shown in the header in sync.
    session::login(&session, &updated).await?;
    session::flash_success(&session, "Updated the profile!").await?;
    Ok(redirect_back(&headers, "/account").into_response())
}
