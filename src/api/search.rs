//! Search API endpoint.

use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use super::{success, ApiResult};
use crate::models::Store;
use crate::AppState;

/// Maximum number of stores a search returns.
pub const SEARCH_LIMIT: usize = 5;

/// Search query parameters.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// Single search hit.
#[derive(Debug, Serialize)]
pub struct SearchResultItem {
    #[serde(flatten)]
    pub store: Store,
    pub score: f32,
}

/// GET /api/search - Full-text search over store names and descriptions.
pub async fn search_stores(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> ApiResult<Vec<SearchResultItem>> {
    let hits = state.search.search(&params.q, SEARCH_LIMIT)?;

    let mut results = Vec::with_capacity(hits.len());
    for hit in hits {
        // Index entries can outlive their row; skip those.
        if let Some(store) = state.repo.get_store(&hit.store_id).await? {
            results.push(SearchResultItem {
                store,
                score: hit.score,
            });
        }
    }

    success(results)
}
