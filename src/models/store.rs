//! Store model: a geolocated, taggable listing owned by a user.

use deunicode::deunicode;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Tags offered by the store form.
pub const TAG_CHOICES: [&str; 5] = [
    "Wifi",
    "Open Late",
    "Family Friendly",
    "Vegatarian",
    "Licensed",
];

/// GeoJSON-style point with a street address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    /// Always `Point`.
    #[serde(rename = "type")]
    pub kind: String,
    /// `[lng, lat]`
    pub coordinates: [f64; 2],
    pub address: String,
}

impl Location {
    pub fn point(lng: f64, lat: f64, address: impl Into<String>) -> Self {
        Self {
            kind: "Point".to_string(),
            coordinates: [lng, lat],
            address: address.into(),
        }
    }

    pub fn lng(&self) -> f64 {
        self.coordinates[0]
    }

    pub fn lat(&self) -> f64 {
        self.coordinates[1]
    }
}

/// A store listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    pub id: String,
    pub name: String,
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub created: String,
    pub location: Location,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    /// Id of the owning user
    pub author: String,
}

impl Store {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.author == user_id
    }

    /// Public URL of the photo, if the store has one.
    pub fn photo_url(&self) -> Option<String> {
        self.photo.as_ref().map(|p| format!("/uploads/{}", p))
    }
}

/// Projection returned by the map API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyStore {
    pub slug: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub location: Location,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    /// Great-circle distance from the query point
    pub distance_meters: f64,
}

/// A tag with the number of stores carrying it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TagCount {
    pub tag: String,
    pub count: i64,
}

/// A store ranked by its reviews.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopStore {
    pub id: String,
    pub name: String,
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    pub review_count: i64,
    pub average_rating: f64,
}

/// Raw store form fields as submitted by the browser.
#[derive(Debug, Clone, Default)]
pub struct StoreForm {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub address: String,
    pub lng: String,
    pub lat: String,
}

/// Validated store fields ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreInput {
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub location: Location,
}

impl StoreForm {
    /// Trim, validate and convert the form, reporting every problem at once.
    pub fn validate(&self) -> Result<StoreInput, AppError> {
        let mut errors = Vec::new();

        let name = self.name.trim();
        if name.is_empty() {
            errors.push("Please enter a store name!".to_string());
        }

        let address = self.address.trim();
        if address.is_empty() {
            errors.push("You must supply an address!".to_string());
        }

        let coordinates = match (self.lng.trim(), self.lat.trim()) {
            ("", _) | (_, "") => {
                errors.push("You must supply coordinates!".to_string());
                None
            }
            (lng, lat) => match (lng.parse::<f64>(), lat.parse::<f64>()) {
                (Ok(lng), Ok(lat)) if valid_coordinates(lng, lat) => Some((lng, lat)),
                (Ok(_), Ok(_)) => {
                    errors.push("Coordinates are out of range!".to_string());
                    None
                }
                _ => {
                    errors.push("Coordinates must be numbers!".to_string());
                    None
                }
            },
        };

        let mut tags: Vec<String> = Vec::new();
        for tag in &self.tags {
            let tag = tag.trim();
            if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }

        match coordinates {
            Some((lng, lat)) if errors.is_empty() => {
                let description = self.description.trim();
                Ok(StoreInput {
                    name: name.to_string(),
                    description: (!description.is_empty()).then(|| description.to_string()),
                    tags,
                    location: Location::point(lng, lat, address),
                })
            }
            _ => Err(AppError::Validation(errors)),
        }
    }
}

fn valid_coordinates(lng: f64, lat: f64) -> bool {
    (-180.0..=180.0).contains(&lng) && (-90.0..=90.0).contains(&lat)
}

/// Turn a store name into a URL-safe slug.
///
/// Transliterates to ASCII, lower-cases, keeps alphanumerics and collapses
/// everything else into single dashes. Falls back to `store` when nothing
/// usable remains.
pub fn slugify(name: &str) -> String {
    let ascii = deunicode(name);
    let mut slug = String::with_capacity(ascii.len());
    let mut pending_dash = false;

    for c in ascii.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        "store".to_string()
    } else {
        slug
    }
}

/// Whether `candidate` is `base` or `base-<digits>`.
pub fn is_slug_variant(base: &str, candidate: &str) -> bool {
    if candidate.eq_ignore_ascii_case(base) {
        return true;
    }
    candidate
        .get(..base.len())
        .filter(|prefix| prefix.eq_ignore_ascii_case(base))
        .and_then(|_| candidate[base.len()..].strip_prefix('-'))
        .is_some_and(|suffix| suffix.chars().all(|c| c.is_ascii_digit()))
}

/// Pick the slug for `base` given the slugs already taken in the database.
///
/// With N colliding slugs the result is `base-(N+1)`, bumped further if a
/// rename already claimed that exact suffix.
pub fn dedupe_slug(base: &str, taken: &[String]) -> String {
    let collisions = taken.iter().filter(|s| is_slug_variant(base, s)).count();
    if collisions == 0 {
        return base.to_string();
    }

    let mut n = collisions + 1;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !taken.iter().any(|s| s.eq_ignore_ascii_case(&candidate)) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(name: &str, address: &str, lng: &str, lat: &str) -> StoreForm {
        StoreForm {
            name: name.to_string(),
            description: "  Great coffee  ".to_string(),
            tags: vec!["Wifi".to_string(), "Wifi".to_string(), " ".to_string()],
            address: address.to_string(),
            lng: lng.to_string(),
            lat: lat.to_string(),
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Wes's Coffee Shop"), "wes-s-coffee-shop");
        assert_eq!(slugify("  Hello,   World!  "), "hello-world");
        assert_eq!(slugify("Café Déjà Vu"), "cafe-deja-vu");
        assert_eq!(slugify("Straße 5"), "strasse-5");
        assert_eq!(slugify("!!!"), "store");
    }

    #[test]
    fn test_slug_variants() {
        assert!(is_slug_variant("coffee", "coffee"));
        assert!(is_slug_variant("coffee", "coffee-2"));
        assert!(is_slug_variant("coffee", "coffee-17"));
        assert!(!is_slug_variant("coffee", "coffee-shop"));
        assert!(!is_slug_variant("coffee", "coffee-shop-2"));
        assert!(!is_slug_variant("coffee", "coffe"));
    }

    #[test]
    fn test_dedupe_slug_counts_collision_group() {
        assert_eq!(dedupe_slug("coffee", &[]), "coffee");

        let taken = vec!["coffee".to_string(), "coffee-shop".to_string()];
        assert_eq!(dedupe_slug("coffee", &taken), "coffee-2");

        let taken = vec![
            "coffee".to_string(),
            "coffee-2".to_string(),
            "coffee-shop".to_string(),
        ];
        assert_eq!(dedupe_slug("coffee", &taken), "coffee-3");

        let taken = vec!["coffee".to_string(), "coffee-3".to_string()];
        assert_eq!(dedupe_slug("coffee", &taken), "coffee-4");
    }

    #[test]
    fn test_store_form_validates() {
        let input = form(" Bean There ", "1 Main St", "-79.38", "43.65")
            .validate()
            .unwrap();

        assert_eq!(input.name, "Bean There");
        assert_eq!(input.description.as_deref(), Some("Great coffee"));
        assert_eq!(input.tags, vec!["Wifi".to_string()]);
        assert_eq!(input.location.kind, "Point");
        assert_eq!(input.location.lng(), -79.38);
        assert_eq!(input.location.lat(), 43.65);
    }

    #[test]
    fn test_store_form_reports_every_error() {
        let err = form("  ", "", "", "").validate().unwrap_err();
        let messages = err.flash_messages();

        assert_eq!(
            messages,
            vec![
                "Please enter a store name!".to_string(),
                "You must supply an address!".to_string(),
                "You must supply coordinates!".to_string(),
            ]
        );
    }

    #[test]
    fn test_store_form_rejects_bad_coordinates() {
        let err = form("A", "B", "abc", "1").validate().unwrap_err();
        assert_eq!(err.flash_messages(), vec!["Coordinates must be numbers!"]);

        let err = form("A", "B", "200", "1").validate().unwrap_err();
        assert_eq!(err.flash_messages(), vec!["Coordinates are out of range!"]);
    }
}
