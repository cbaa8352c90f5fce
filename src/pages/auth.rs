//! Login, registration, logout and password reset pages.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use tower_sessions::Session;

use super::{flash_back, flash_redirect};
use crate::auth::{generate_reset_token, hash_password, send_reset_link, verify_password};
use crate::errors::AppError;
use crate::models::{
    normalize_email, ForgotPasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest,
};
use crate::session::{self, Flash, PageContext};
use crate::AppState;

const LOGGED_IN: &str = "You are now logged in!";
const RESET_INVALID: &str = "Password reset is invalid or has expired";

// =============================================================================
// Templates
// =============================================================================

/// Login page; also carries the forgot-password form.
#[derive(Template, WebTemplate)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub ctx: PageContext,
    pub title: String,
}

/// Registration page, re-rendered with the submitted values on error.
#[derive(Template, WebTemplate)]
#[template(path = "register.html")]
pub struct RegisterTemplate {
    pub ctx: PageContext,
    pub title: String,
    pub name: String,
    pub email: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "reset.html")]
pub struct ResetTemplate {
    pub ctx: PageContext,
    pub title: String,
    pub token: String,
}

// =============================================================================
// Login / Logout
// =============================================================================

/// GET /login
pub async fn login_form(ctx: PageContext) -> impl IntoResponse {
    LoginTemplate {
        ctx,
        title: "Login".to_string(),
    }
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginRequest>,
) -> Result<Response, AppError> {
    let user = match normalize_email(&form.email) {
        Some(email) => state.repo.find_user_by_email(&email).await?,
        None => None,
    };

    match user {
        Some(user) if verify_password(&form.password, &user.password_hash) => {
            session::login(&session, &user).await?;
            tracing::info!("User {} logged in", user.id);
            flash_redirect(&session, LOGGED_IN, "/").await
        }
        _ => {
            tracing::debug!("Failed login for {:?}", form.email);
            session::flash_error(&session, "Failed Login!").await?;
            Ok(Redirect::to("/login").into_response())
        }
    }
}

/// GET /logout
pub async fn logout(session: Session) -> Result<Response, AppError> {
    session::logout(&session).await?;
    flash_redirect(&session, "You are now logged out! 👋", "/").await
}

// =============================================================================
// Registration
// =============================================================================

/// GET /register
pub async fn register_form(ctx: PageContext) -> impl IntoResponse {
    RegisterTemplate {
        ctx,
        title: "Register".to_string(),
        name: String::new(),
        email: String::new(),
    }
}

/// POST /register - Create the account and log it in.
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RegisterRequest>,
) -> Result<Response, AppError> {
    let created = match form.validate() {
        Ok(new_user) => {
            let password_hash = hash_password(&new_user.password)?;
            state.repo.create_user(&new_user, &password_hash).await
        }
        Err(e) => Err(e),
    };

    let user = match created {
        Ok(user) => user,
        Err(AppError::Validation(messages)) => {
            let mut ctx = PageContext::load(&session).await?;
            ctx.flashes.extend(messages.into_iter().map(|message| Flash {
                kind: "error".to_string(),
                message,
            }));
            return Ok(RegisterTemplate {
                ctx,
                title: "Register".to_string(),
                name: form.name,
                email: form.email,
            }
            .into_response());
        }
        Err(e) => return Err(e),
    };

    tracing::info!("Registered user {}", user.id);
    session::login(&session, &user).await?;
    flash_redirect(&session, LOGGED_IN, "/").await
}

// =============================================================================
// Password reset
// =============================================================================

/// POST /account/forgot - Issue a reset token and "mail" the link.
pub async fn forgot_password(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<ForgotPasswordRequest>,
) -> Result<Response, AppError> {
    let user = match normalize_email(&form.email) {
        Some(email) => state.repo.find_user_by_email(&email).await?,
        None => None,
    };

    let Some(user) = user else {
        session::flash_error(&session, "No account with that email exists.").await?;
        return Ok(Redirect::to("/login").into_response());
    };

    let (token, expires) = generate_reset_token();
    state.repo.set_reset_token(&user.id, &token, &expires).await?;
    send_reset_link(&user.email, &state.config.base_url, &token);

    flash_redirect(&session, "You have been emailed a password reset link.", "/login").await
}

/// GET /account/reset/{token}
pub async fn reset_form(
    State(state): State<AppState>,
    session: Session,
    Path(token): Path<String>,
) -> Result<Response, AppError> {
    if state.repo.find_user_by_reset_token(&token).await?.is_none() {
        session::flash_error(&session, RESET_INVALID).await?;
        return Ok(Redirect::to("/login").into_response());
    }

    Ok(ResetTemplate {
        ctx: PageContext::load(&session).await?,
        title: "Reset your Password".to_string(),
        token,
    }
    .into_response())
}

/// POST /account/reset/{token} - Set the new password and log in.
pub async fn reset_password(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Path(token): Path<String>,
    Form(form): Form<ResetPasswordRequest>,
) -> Result<Response, AppError> {
    let password = match form.validate() {
        Ok(password) => password,
        Err(e) => {
            let fallback = format!("/account/reset/{}", token);
            return flash_back(&session, &headers, &fallback, e).await;
        }
    };

    let Some(user) = state.repo.find_user_by_reset_token(&token).await? else {
        session::flash_error(&session, RESET_INVALID).await?;
        return Ok(Redirect::to("/login").into_response());
    };

    let password_hash = hash_password(password)?;
    state.repo.reset_password(&user.id, &password_hash).await?;
    session::login(&session, &user).await?;
    tracing::info!("User {} reset their password", user.id);

    flash_redirect(
        &session,
        "💃 Nice! Your password has been reset! You are now logged in!",
        "/",
    )
    .await
}
