//! Store API endpoints: map lookup and hearts.

use axum::extract::{Path, Query, State};
use serde::Deserialize;

use super::{success, ApiResult};
use crate::auth::RequireUser;
use crate::errors::AppError;
use crate::models::{NearbyStore, UserHearts};
use crate::AppState;

/// Search radius of the map query in meters.
pub const NEAR_MAX_DISTANCE_METERS: f64 = 10_000.0;

/// Maximum number of stores on the map.
pub const NEAR_LIMIT: usize = 10;

/// Raw coordinates; parsed by hand so bad input gets the JSON envelope.
#[derive(Debug, Deserialize)]
pub struct NearQuery {
    pub lat: Option<String>,
    pub lng: Option<String>,
}

fn parse_coordinate(raw: Option<&str>, name: &str, max: f64) -> Result<f64, AppError> {
    let value = raw
        .map(str::trim)
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .ok_or_else(|| AppError::BadRequest(format!("{} must be a number", name)))?;

    if value.abs() > max {
        return Err(AppError::BadRequest(format!("{} is out of range", name)));
    }
    Ok(value)
}

/// GET /api/stores/near - Stores within 10 km of a point, nearest first.
pub async fn stores_near(
    State(state): State<AppState>,
    Query(params): Query<NearQuery>,
) -> ApiResult<Vec<NearbyStore>> {
    let lng = parse_coordinate(params.lng.as_deref(), "lng", 180.0)?;
    let lat = parse_coordinate(params.lat.as_deref(), "lat", 90.0)?;

    let stores = state
        .repo
        .stores_near(lng, lat, NEAR_MAX_DISTANCE_METERS, NEAR_LIMIT)
        .await?;
    success(stores)
}

/// POST /api/stores/{id}/heart - Toggle a store in the user's hearts.
pub async fn heart_store(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<String>,
) -> ApiResult<UserHearts> {
    let hearts = state.repo.toggle_heart(&user.id, &id).await?;
    tracing::debug!("User {} now hearts {} stores", user.id, hearts.hearts.len());
    success(hearts)
}
