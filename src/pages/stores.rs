//! Store pages: listing, add/edit forms, the store page, map, hearts and top.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Multipart, Path, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use super::{flash_back, flash_redirect, StoreCard};
use crate::auth::{confirm_owner, RequireUser};
use crate::errors::AppError;
use crate::images::{self, PhotoUpload};
use crate::models::{Store, StoreForm, TAG_CHOICES};
use crate::session::{self, PageContext};
use crate::AppState;

/// Stores per listing page.
pub const PAGE_SIZE: i64 = 6;

/// Number of entries on the top stores page.
pub const TOP_STORES_LIMIT: i64 = 10;

// =============================================================================
// Templates
// =============================================================================

/// Store grid, used for the paginated listing and the hearted stores.
#[derive(Template, WebTemplate)]
#[template(path = "stores.html")]
pub struct StoresTemplate {
    pub ctx: PageContext,
    pub title: String,
    pub stores: Vec<StoreCard>,
    pub count: i64,
    pub page: i64,
    pub pages: i64,
    pub paginate: bool,
}

/// One checkbox of the tag picker.
#[derive(Debug, Clone)]
pub struct TagOption {
    pub name: String,
    pub checked: bool,
}

/// Values pre-filled in the store form.
#[derive(Debug, Clone, Default)]
pub struct StoreFormView {
    pub name: String,
    pub description: String,
    pub address: String,
    pub lng: String,
    pub lat: String,
    pub photo_url: Option<String>,
    pub tags: Vec<TagOption>,
}

impl StoreFormView {
    fn empty() -> Self {
        Self {
            tags: tag_options(&[]),
            ..Self::default()
        }
    }

    fn from_store(store: &Store) -> Self {
        Self {
            name: store.name.clone(),
            description: store.description.clone().unwrap_or_default(),
            address: store.location.address.clone(),
            lng: store.location.lng().to_string(),
            lat: store.location.lat().to_string(),
            photo_url: store.photo_url(),
            tags: tag_options(&store.tags),
        }
    }
}

fn tag_options(selected: &[String]) -> Vec<TagOption> {
    TAG_CHOICES
        .iter()
        .map(|choice| TagOption {
            name: choice.to_string(),
            checked: selected.iter().any(|t| t == choice),
        })
        .collect()
}

/// Add and edit form.
#[derive(Template, WebTemplate)]
#[template(path = "edit_store.html")]
pub struct EditStoreTemplate {
    pub ctx: PageContext,
    pub title: String,
    pub action: String,
    pub store: StoreFormView,
}

/// A review as rendered on the store page.
#[derive(Debug, Clone)]
pub struct ReviewView {
    pub author_name: String,
    pub text: String,
    pub stars: String,
    pub date: String,
}

/// Single store page.
#[derive(Template, WebTemplate)]
#[template(path = "store.html")]
pub struct StoreTemplate {
    pub ctx: PageContext,
    pub title: String,
    pub store: Store,
    pub photo_url: Option<String>,
    pub author_name: String,
    pub is_owner: bool,
    pub reviews: Vec<ReviewView>,
}

#[derive(Template, WebTemplate)]
#[template(path = "map.html")]
pub struct MapTemplate {
    pub ctx: PageContext,
    pub title: String,
}

/// A row of the top stores table.
#[derive(Debug, Clone)]
pub struct TopRow {
    pub position: usize,
    pub name: String,
    pub slug: String,
    pub photo_url: Option<String>,
    pub review_count: i64,
    pub average_rating: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "top.html")]
pub struct TopTemplate {
    pub ctx: PageContext,
    pub title: String,
    pub stores: Vec<TopRow>,
}

// =============================================================================
// Listing
// =============================================================================

/// GET / and GET /stores - First page of stores.
pub async fn list_stores(State(state): State<AppState>, session: Session) -> Result<Response, AppError> {
    render_page(&state, &session, 1).await
}

/// GET /stores/pages/{page} - A page of stores, newest first.
pub async fn list_stores_page(
    State(state): State<AppState>,
    session: Session,
    Path(page): Path<String>,
) -> Result<Response, AppError> {
    render_page(&state, &session, parse_page(&page)).await
}

/// Page numbers below 1 or unparsable ones mean the first page.
pub fn parse_page(raw: &str) -> i64 {
    raw.trim().parse::<i64>().unwrap_or(1).max(1)
}

async fn render_page(state: &AppState, session: &Session, page: i64) -> Result<Response, AppError> {
    let skip = (page - 1).saturating_mul(PAGE_SIZE);
    let count = state.repo.count_stores().await?;
    let stores = state.repo.list_stores(PAGE_SIZE, skip).await?;
    let pages = (count + PAGE_SIZE - 1) / PAGE_SIZE;

    if stores.is_empty() && skip > 0 {
        session::flash_error(session, &format!("No results found for page {}", page)).await?;
        return Ok(Redirect::to(&format!("/stores/pages/{}", pages.max(1))).into_response());
    }

    let ctx = PageContext::load(session).await?;
    let stores = cards_for(state, &ctx, &stores).await?;

    Ok(StoresTemplate {
        ctx,
        title: "Stores".to_string(),
        stores,
        count,
        page,
        pages,
        paginate: true,
    }
    .into_response())
}

/// Build cards, marking the stores the viewer owns or hearted.
pub(crate) async fn cards_for(
    state: &AppState,
    ctx: &PageContext,
    stores: &[Store],
) -> Result<Vec<StoreCard>, AppError> {
    let user_id = ctx.user.as_ref().map(|u| u.id.as_str());
    let hearts = match user_id {
        Some(id) => state.repo.heart_ids(id).await?,
        None => Vec::new(),
    };
    Ok(StoreCard::from_stores(stores, user_id, &hearts))
}

// =============================================================================
// Add / Edit
// =============================================================================

/// GET /add - Empty store form.
pub async fn add_store_form(RequireUser(_user): RequireUser, ctx: PageContext) -> impl IntoResponse {
    EditStoreTemplate {
        ctx,
        title: "Add Store".to_string(),
        action: "/add".to_string(),
        store: StoreFormView::empty(),
    }
}

/// POST /add - Create a store from the multipart form.
pub async fn create_store(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    session: Session,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let (form, upload) = match read_store_form(multipart).await {
        Ok(parts) => parts,
        Err(e) => return flash_back(&session, &headers, "/add", e).await,
    };
    let input = match form.validate() {
        Ok(input) => input,
        Err(e) => return flash_back(&session, &headers, "/add", e).await,
    };
    let photo = match store_photo(&state, upload).await {
        Ok(photo) => photo,
        Err(e) => return flash_back(&session, &headers, "/add", e).await,
    };

    let store = state
        .repo
        .create_store(&input, photo.as_deref(), &user.id)
        .await?;

    if let Err(e) = state.search.index_store(&store).await {
        tracing::warn!("Failed to index store {}: {}", store.id, e);
    }

    flash_redirect(
        &session,
        &format!("Successfully created {}.", store.name),
        &format!("/stores/{}", store.slug),
    )
    .await
}

/// GET /stores/{id}/edit - Store form for the owner.
pub async fn edit_store_form(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    session: Session,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let store = state
        .repo
        .get_store(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Store {} not found", id)))?;
    confirm_owner(&store, &user)?;

    Ok(EditStoreTemplate {
        ctx: PageContext::load(&session).await?,
        title: format!("Edit {}", store.name),
        action: format!("/add/{}", store.id),
        store: StoreFormView::from_store(&store),
    }
    .into_response())
}

/// POST /add/{id} - Update a store the user owns.
pub async fn update_store(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    session: Session,
    headers: HeaderMap,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let store = state
        .repo
        .get_store(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Store {} not found", id)))?;
    confirm_owner(&store, &user)?;

    let fallback = format!("/stores/{}/edit", store.id);
    let (form, upload) = match read_store_form(multipart).await {
        Ok(parts) => parts,
        Err(e) => return flash_back(&session, &headers, &fallback, e).await,
    };
    let input = match form.validate() {
        Ok(input) => input,
        Err(e) => return flash_back(&session, &headers, &fallback, e).await,
    };
    let photo = match store_photo(&state, upload).await {
        Ok(photo) => photo,
        Err(e) => return flash_back(&session, &headers, &fallback, e).await,
    };

    let updated = state
        .repo
        .update_store(&store.id, &input, photo.as_deref())
        .await?;

    if let Err(e) = state.search.index_store(&updated).await {
        tracing::warn!("Failed to index store {}: {}", updated.id, e);
    }

    flash_redirect(
        &session,
        &format!("Successfully updated {}.", updated.name),
        &format!("/stores/{}/edit", updated.id),
    )
    .await
}

/// Collect the store fields and the optional photo from a multipart body.
async fn read_store_form(
    mut multipart: Multipart,
) -> Result<(StoreForm, Option<PhotoUpload>), AppError> {
    let mut form = StoreForm::default();
    let mut photo = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "photo" => {
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                photo = PhotoUpload::new(content_type.as_deref(), bytes.to_vec())?;
            }
            "name" => form.name = field.text().await?,
            "description" => form.description = field.text().await?,
            "tags" => form.tags.push(field.text().await?),
            "location[address]" => form.address = field.text().await?,
            "location[coordinates][0]" => form.lng = field.text().await?,
            "location[coordinates][1]" => form.lat = field.text().await?,
            other => tracing::debug!("Ignoring unexpected form field {:?}", other),
        }
    }

    Ok((form, photo))
}

async fn store_photo(
    state: &AppState,
    upload: Option<PhotoUpload>,
) -> Result<Option<String>, AppError> {
    match upload {
        Some(upload) => Ok(Some(
            images::save_photo(upload, &state.config.uploads_dir).await?,
        )),
        None => Ok(None),
    }
}

// =============================================================================
// Store page
// =============================================================================

/// GET /stores/{slug} - A store with its reviews.
pub async fn store_page(
    State(state): State<AppState>,
    session: Session,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    let store = state
        .repo
        .get_store_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No store called {}", slug)))?;

    let author_name = state
        .repo
        .get_user(&store.author)
        .await?
        .map(|u| u.name)
        .unwrap_or_default();

    let reviews = state
        .repo
        .list_reviews(&store.id)
        .await?
        .iter()
        .map(|review| ReviewView {
            author_name: review.author_name.clone(),
            text: review.text.clone(),
            stars: review.stars(),
            date: review.created.get(..10).unwrap_or(&review.created).to_string(),
        })
        .collect();

    let ctx = PageContext::load(&session).await?;
    let is_owner = ctx
        .user
        .as_ref()
        .is_some_and(|u| store.is_owned_by(&u.id));

    Ok(StoreTemplate {
        ctx,
        title: store.name.clone(),
        photo_url: store.photo_url(),
        store,
        author_name,
        is_owner,
        reviews,
    }
    .into_response())
}

// =============================================================================
// Map, hearts and top
// =============================================================================

/// GET /map - Map page; markers come from the near API.
pub async fn map_page(ctx: PageContext) -> impl IntoResponse {
    MapTemplate {
        ctx,
        title: "Map".to_string(),
    }
}

/// GET /hearts - Stores the user hearted.
pub async fn hearted_stores(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    ctx: PageContext,
) -> Result<Response, AppError> {
    let ids = state.repo.heart_ids(&user.id).await?;
    let stores = state.repo.get_stores(&ids).await?;
    let cards = StoreCard::from_stores(&stores, Some(&user.id), &ids);

    Ok(StoresTemplate {
        ctx,
        title: "Hearted Stores".to_string(),
        count: cards.len() as i64,
        stores: cards,
        page: 1,
        pages: 1,
        paginate: false,
    }
    .into_response())
}

/// GET /top - Best rated stores with at least two reviews.
pub async fn top_stores(State(state): State<AppState>, ctx: PageContext) -> Result<Response, AppError> {
    let stores = state
        .repo
        .top_stores(TOP_STORES_LIMIT)
        .await?
        .into_iter()
        .enumerate()
        .map(|(i, store)| TopRow {
            position: i + 1,
            photo_url: store.photo.as_ref().map(|p| format!("/uploads/{}", p)),
            name: store.name,
            slug: store.slug,
            review_count: store.review_count,
            average_rating: format!("{:.1}", store.average_rating),
        })
        .collect();

    Ok(TopTemplate {
        ctx,
        title: "⭐ Top Stores!".to_string(),
        stores,
    }
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page() {
        assert_eq!(parse_page("3"), 3);
        assert_eq!(parse_page("0"), 1);
        assert_eq!(parse_page("-4"), 1);
        assert_eq!(parse_page("abc"), 1);
    }

    #[test]
    fn test_tag_options_mark_selected() {
        let options = tag_options(&["Wifi".to_string(), "Licensed".to_string()]);
        assert_eq!(options.len(), TAG_CHOICES.len());
        let checked: Vec<&str> = options
            .iter()
            .filter(|o| o.checked)
            .map(|o| o.name.as_str())
            .collect();
        assert_eq!(checked, vec!["Wifi", "Licensed"]);
    }
}
