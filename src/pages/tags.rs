//! Tag browser.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
};

use super::StoreCard;
use crate::errors::AppError;
use crate::session::PageContext;
use crate::AppState;

/// A tag pill with its store count.
#[derive(Debug, Clone)]
pub struct TagLink {
    pub tag: String,
    pub count: i64,
    pub active: bool,
}

#[derive(Template, WebTemplate)]
#[template(path = "tags.html")]
pub struct TagsTemplate {
    pub ctx: PageContext,
    pub title: String,
    pub tag: Option<String>,
    pub tags: Vec<TagLink>,
    pub stores: Vec<StoreCard>,
}

/// GET /tags - Every tag and every store.
pub async fn tags_page(State(state): State<AppState>, ctx: PageContext) -> Result<Response, AppError> {
    render_tags(&state, ctx, None).await
}

/// GET /tags/{tag} - Stores carrying one tag.
pub async fn tag_page(
    State(state): State<AppState>,
    ctx: PageContext,
    Path(tag): Path<String>,
) -> Result<Response, AppError> {
    render_tags(&state, ctx, Some(tag)).await
}

async fn render_tags(
    state: &AppState,
    ctx: PageContext,
    tag: Option<String>,
) -> Result<Response, AppError> {
    let (tags, stores) = tokio::try_join!(
        state.repo.list_tags(),
        state.repo.list_stores_by_tag(tag.as_deref()),
    )?;

    let tags = tags
        .into_iter()
        .map(|t| TagLink {
            active: tag.as_deref() == Some(t.tag.as_str()),
            tag: t.tag,
            count: t.count,
        })
        .collect();
    let stores = super::stores::cards_for(state, &ctx, &stores).await?;

    Ok(TagsTemplate {
        ctx,
        title: tag.clone().unwrap_or_else(|| "Tags".to_string()),
        tag,
        tags,
        stores,
    }
    .into_response())
}
