//! Review model: a rated comment a user leaves on a store.

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// A review with its author's display name resolved.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: String,
    pub store_id: String,
    pub author_id: String,
    pub author_name: String,
    pub text: String,
    pub rating: i64,
    pub created: String,
}

impl Review {
    /// Filled and empty stars for display, e.g. `★★★☆☆`.
    pub fn stars(&self) -> String {
        let filled = self.rating.clamp(0, 5) as usize;
        format!("{}{}", "★".repeat(filled), "☆".repeat(5 - filled))
    }
}

/// Review form as posted from a store page.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateReviewRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub rating: Option<String>,
}

impl CreateReviewRequest {
    /// Returns the trimmed text and a rating between 1 and 5.
    pub fn validate(&self) -> Result<(String, i64), AppError> {
        let mut errors = Vec::new();

        let text = self.text.trim();
        if text.is_empty() {
            errors.push("Your review must have text!".to_string());
        }

        let rating = self
            .rating
            .as_deref()
            .and_then(|r| r.trim().parse::<i64>().ok())
            .filter(|r| (1..=5).contains(r));
        if rating.is_none() {
            errors.push("Please give a rating between 1 and 5!".to_string());
        }

        match rating {
            Some(rating) if errors.is_empty() => Ok((text.to_string(), rating)),
            _ => Err(AppError::Validation(errors)),
        }
    }
}
