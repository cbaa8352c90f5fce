//! Database repository for CRUD operations.
//!
//! Uses prepared statements and transactions for data integrity.

use chrono::{SecondsFormat, Utc};
use sqlx::{Row, SqlitePool};

use crate::errors::AppError;
use crate::geo::{self, BoundingBox};
use crate::models::{
    dedupe_slug, slugify, Location, NearbyStore, NewUser, Review, Store, StoreInput, TagCount,
    TopStore, User, UserHearts,
};

const STORE_COLUMNS: &str = "id, name, slug, description, tags, created, location_lng, \
     location_lat, location_address, photo, author_id";

const USER_COLUMNS: &str = "id, name, email, password_hash, created_at";

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ==================== STORE OPERATIONS ====================

    /// Count all stores.
    pub async fn count_stores(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM stores")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("count"))
    }

    /// List one page of stores, newest first.
    pub async fn list_stores(&self, limit: i64, offset: i64) -> Result<Vec<Store>, AppError> {
        let sql = format!(
            "SELECT {} FROM stores ORDER BY created DESC, rowid DESC LIMIT ? OFFSET ?",
            STORE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(store_from_row).collect())
    }

    /// List every store (used to rebuild the search index).
    pub async fn list_all_stores(&self) -> Result<Vec<Store>, AppError> {
        let sql = format!(
            "SELECT {} FROM stores ORDER BY created DESC, rowid DESC",
            STORE_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        Ok(rows.iter().map(store_from_row).collect())
    }

    /// Get a store by ID.
    pub async fn get_store(&self, id: &str) -> Result<Option<Store>, AppError> {
        let sql = format!("SELECT {} FROM stores WHERE id = ?", STORE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(store_from_row))
    }

    /// Get a store by slug.
    pub async fn get_store_by_slug(&self, slug: &str) -> Result<Option<Store>, AppError> {
        let sql = format!("SELECT {} FROM stores WHERE slug = ?", STORE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(store_from_row))
    }

    /// Get several stores by ID, in the order given. Unknown IDs are skipped.
    pub async fn get_stores(&self, ids: &[String]) -> Result<Vec<Store>, AppError> {
        let mut stores = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(store) = self.get_store(id).await? {
                stores.push(store);
            }
        }
        Ok(stores)
    }

    /// Create a new store owned by `author_id`.
    pub async fn create_store(
        &self,
        input: &StoreInput,
        photo: Option<&str>,
        author_id: &str,
    ) -> Result<Store, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let created = now();
        let slug = self.unique_slug(&input.name, None).await?;
        let tags_json = serde_json::to_string(&input.tags)?;

        let sql = format!(
            "INSERT INTO stores ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            STORE_COLUMNS
        );
        sqlx::query(&sql)
            .bind(&id)
            .bind(&input.name)
            .bind(&slug)
            .bind(&input.description)
            .bind(&tags_json)
            .bind(&created)
            .bind(input.location.lng())
            .bind(input.location.lat())
            .bind(&input.location.address)
            .bind(photo)
            .bind(author_id)
            .execute(&self.pool)
            .await?;

        tracing::info!("Created store {} ({})", slug, id);

        Ok(Store {
            id,
            name: input.name.clone(),
            slug,
            description: input.description.clone(),
            tags: input.tags.clone(),
            created,
            location: input.location.clone(),
            photo: photo.map(str::to_string),
            author: author_id.to_string(),
        })
    }

    /// Update a store's fields. The photo is only replaced when a new one is
    /// given and the slug is only recomputed when the name changed.
    pub async fn update_store(
        &self,
        id: &str,
        input: &StoreInput,
        photo: Option<&str>,
    ) -> Result<Store, AppError> {
        let existing = self
            .get_store(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Store {} not found", id)))?;

        let slug = if existing.name == input.name {
            existing.slug.clone()
        } else {
            self.unique_slug(&input.name, Some(id)).await?
        };
        let photo = photo.map(str::to_string).or(existing.photo);
        let tags_json = serde_json::to_string(&input.tags)?;

        sqlx::query(
            r#"UPDATE stores SET
                name = ?, slug = ?, description = ?, tags = ?,
                location_lng = ?, location_lat = ?, location_address = ?, photo = ?
            WHERE id = ?"#,
        )
        .bind(&input.name)
        .bind(&slug)
        .bind(&input.description)
        .bind(&tags_json)
        .bind(input.location.lng())
        .bind(input.location.lat())
        .bind(&input.location.address)
        .bind(&photo)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(Store {
            id: id.to_string(),
            name: input.name.clone(),
            slug,
            description: input.description.clone(),
            tags: input.tags.clone(),
            created: existing.created,
            location: input.location.clone(),
            photo,
            author: existing.author,
        })
    }

    /// Compute a free slug for `name`, ignoring the store being renamed.
    async fn unique_slug(&self, name: &str, exclude_id: Option<&str>) -> Result<String, AppError> {
        let base = slugify(name);
        let rows = sqlx::query(
            "SELECT slug FROM stores WHERE (slug = ? OR slug LIKE ?) AND (? IS NULL OR id != ?)",
        )
        .bind(&base)
        .bind(format!("{}-%", base))
        .bind(exclude_id)
        .bind(exclude_id)
        .fetch_all(&self.pool)
        .await?;

        let taken: Vec<String> = rows.iter().map(|row| row.get("slug")).collect();
        Ok(dedupe_slug(&base, &taken))
    }

    // ==================== TAG OPERATIONS ====================

    /// Every tag with its store count, most used first.
    pub async fn list_tags(&self) -> Result<Vec<TagCount>, AppError> {
        let rows = sqlx::query(
            r#"SELECT tag.value AS tag, COUNT(*) AS count
               FROM stores, json_each(stores.tags) AS tag
               GROUP BY tag.value
               ORDER BY count DESC, tag ASC"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| TagCount {
                tag: row.get("tag"),
                count: row.get("count"),
            })
            .collect())
    }

    /// Stores carrying `tag`, or every store when no tag is given.
    pub async fn list_stores_by_tag(&self, tag: Option<&str>) -> Result<Vec<Store>, AppError> {
        let rows = match tag {
            Some(tag) => {
                let sql = format!(
                    r#"SELECT {} FROM stores
                       WHERE EXISTS (SELECT 1 FROM json_each(stores.tags) WHERE json_each.value = ?)
                       ORDER BY created DESC, rowid DESC"#,
                    STORE_COLUMNS
                );
                sqlx::query(&sql).bind(tag).fetch_all(&self.pool).await?
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM stores ORDER BY created DESC, rowid DESC",
                    STORE_COLUMNS
                );
                sqlx::query(&sql).fetch_all(&self.pool).await?
            }
        };

        Ok(rows.iter().map(store_from_row).collect())
    }

    // ==================== GEO OPERATIONS ====================

    /// Stores within `max_meters` of `(lng, lat)`, nearest first.
    pub async fn stores_near(
        &self,
        lng: f64,
        lat: f64,
        max_meters: f64,
        limit: usize,
    ) -> Result<Vec<NearbyStore>, AppError> {
        let bbox = BoundingBox::around(lng, lat, max_meters);
        let rows = sqlx::query(
            r#"SELECT slug, name, description, location_lng, location_lat, location_address, photo
               FROM stores
               WHERE location_lat BETWEEN ? AND ? AND location_lng BETWEEN ? AND ?"#,
        )
        .bind(bbox.min_lat)
        .bind(bbox.max_lat)
        .bind(bbox.min_lng)
        .bind(bbox.max_lng)
        .fetch_all(&self.pool)
        .await?;

        let mut nearby: Vec<NearbyStore> = rows
            .iter()
            .filter_map(|row| {
                let store_lng: f64 = row.get("location_lng");
                let store_lat: f64 = row.get("location_lat");
                let distance = geo::distance_meters((lng, lat), (store_lng, store_lat));
                (distance <= max_meters).then(|| NearbyStore {
                    slug: row.get("slug"),
                    name: row.get("name"),
                    description: row.get("description"),
                    location: Location::point(
                        store_lng,
                        store_lat,
                        row.get::<String, _>("location_address"),
                    ),
                    photo: row.get("photo"),
                    distance_meters: distance,
                })
            })
            .collect();

        nearby.sort_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters));
        nearby.truncate(limit);
        Ok(nearby)
    }

    // ==================== REVIEW OPERATIONS ====================

    /// Add a review to a store.
    pub async fn create_review(
        &self,
        store_id: &str,
        author_id: &str,
        text: &str,
        rating: i64,
    ) -> Result<Review, AppError> {
        if self.get_store(store_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Store {} not found", store_id)));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let created = now();

        sqlx::query(
            "INSERT INTO reviews (id, store_id, author_id, text, rating, created) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(store_id)
        .bind(author_id)
        .bind(text)
        .bind(rating)
        .bind(&created)
        .execute(&self.pool)
        .await?;

        let author_name: String = sqlx::query("SELECT name FROM users WHERE id = ?")
            .bind(author_id)
            .fetch_one(&self.pool)
            .await?
            .get("name");

        Ok(Review {
            id,
            store_id: store_id.to_string(),
            author_id: author_id.to_string(),
            author_name,
            text: text.to_string(),
            rating,
            created,
        })
    }

    /// Reviews of a store with their authors, newest first.
    pub async fn list_reviews(&self, store_id: &str) -> Result<Vec<Review>, AppError> {
        let rows = sqlx::query(
            r#"SELECT r.id, r.store_id, r.author_id, u.name AS author_name, r.text, r.rating, r.created
               FROM reviews r JOIN users u ON u.id = r.author_id
               WHERE r.store_id = ?
               ORDER BY r.created DESC, r.rowid DESC"#,
        )
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Review {
                id: row.get("id"),
                store_id: row.get("store_id"),
                author_id: row.get("author_id"),
                author_name: row.get("author_name"),
                text: row.get("text"),
                rating: row.get("rating"),
                created: row.get("created"),
            })
            .collect())
    }

    /// Stores with at least two reviews, best average rating first.
    pub async fn top_stores(&self, limit: i64) -> Result<Vec<TopStore>, AppError> {
        let rows = sqlx::query(
            r#"SELECT s.id, s.name, s.slug, s.photo,
                      COUNT(r.id) AS review_count,
                      AVG(r.rating) AS average_rating
               FROM stores s JOIN reviews r ON r.store_id = s.id
               GROUP BY s.id
               HAVING COUNT(r.id) >= 2
               ORDER BY average_rating DESC, review_count DESC, s.name ASC
               LIMIT ?"#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| TopStore {
                id: row.get("id"),
                name: row.get("name"),
                slug: row.get("slug"),
                photo: row.get("photo"),
                review_count: row.get("review_count"),
                average_rating: row.get("average_rating"),
            })
            .collect())
    }

    // ==================== HEART OPERATIONS ====================

    /// IDs of the stores a user hearted, most recent first.
    pub async fn heart_ids(&self, user_id: &str) -> Result<Vec<String>, AppError> {
        let rows = sqlx::query(
            "SELECT store_id FROM hearts WHERE user_id = ? ORDER BY created_at DESC, rowid DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("store_id")).collect())
    }

    /// Add the store to the user's hearts, or remove it if already there.
    pub async fn toggle_heart(&self, user_id: &str, store_id: &str) -> Result<UserHearts, AppError> {
        if self.get_store(store_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Store {} not found", store_id)));
        }

        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM hearts WHERE user_id = ? AND store_id = ?")
            .bind(user_id)
            .bind(store_id)
            .execute(&mut *tx)
            .await?;

        if removed.rows_affected() == 0 {
            sqlx::query("INSERT INTO hearts (user_id, store_id, created_at) VALUES (?, ?, ?)")
                .bind(user_id)
                .bind(store_id)
                .bind(now())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        let user = self
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

        Ok(UserHearts {
            id: user.id,
            name: user.name,
            email: user.email,
            hearts: self.heart_ids(user_id).await?,
        })
    }

    // ==================== USER OPERATIONS ====================

    /// Register a user with an already hashed password.
    pub async fn create_user(&self, new_user: &NewUser, password_hash: &str) -> Result<User, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = now();

        sqlx::query(
            "INSERT INTO users (id, name, email, password_hash, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&new_user.name)
        .bind(&new_user.email)
        .bind(password_hash)
        .bind(&created_at)
        .execute(&self.pool)
        .await
        .map_err(email_conflict)?;

        Ok(User {
            id,
            name: new_user.name.clone(),
            email: new_user.email.clone(),
            password_hash: password_hash.to_string(),
            created_at,
        })
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    /// Find a user by (normalized) email.
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    /// Change a user's name and email.
    pub async fn update_account(&self, id: &str, name: &str, email: &str) -> Result<User, AppError> {
        let result = sqlx::query("UPDATE users SET name = ?, email = ? WHERE id = ?")
            .bind(name)
            .bind(email)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(email_conflict)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", id)));
        }

        self.get_user(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
    }

    /// Store a password reset token for the user.
    pub async fn set_reset_token(
        &self,
        user_id: &str,
        token: &str,
        expires: &str,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET reset_token = ?, reset_expires = ? WHERE id = ?")
            .bind(token)
            .bind(expires)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Find the user owning a reset token that has not expired yet.
    pub async fn find_user_by_reset_token(&self, token: &str) -> Result<Option<User>, AppError> {
        let sql = format!(
            "SELECT {} FROM users WHERE reset_token = ? AND reset_expires > ?",
            USER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(token)
            .bind(now())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    /// Replace the password hash and clear any reset token.
    pub async fn reset_password(&self, user_id: &str, password_hash: &str) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE users SET password_hash = ?, reset_token = NULL, reset_expires = NULL WHERE id = ?",
        )
        .bind(password_hash)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Current time in the fixed-width format stored in the database.
pub fn now() -> String {
    timestamp(Utc::now())
}

pub fn timestamp(at: chrono::DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn email_conflict(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            AppError::validation("A user with the given email is already registered")
        }
        _ => err.into(),
    }
}

// Helper functions for row conversion

fn store_from_row(row: &sqlx::sqlite::SqliteRow) -> Store {
    let tags_str: String = row.get("tags");
    let address: String = row.get("location_address");
    Store {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        description: row.get("description"),
        tags: parse_json_array(&tags_str),
        created: row.get("created"),
        location: Location::point(row.get("location_lng"), row.get("location_lat"), address),
        photo: row.get("photo"),
        author: row.get("author_id"),
    }
}

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> User {
    User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        created_at: row.get("created_at"),
    }
}

fn parse_json_array(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}
