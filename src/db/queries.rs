use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::photo::PhotoRecord;

/// Durable catalog of ingested photos and collection aggregates.
///
/// Postgres in production; the in-memory variant backs the test suite.
#[async_trait]
pub trait PhotoCatalog: Send + Sync {
    async fn insert_photo(&self, photo: &PhotoRecord) -> anyhow::Result<()>;
    /// Bump a collection's aggregate photo count by `delta`.
    async fn add_to_collection_count(&self, collection_id: Uuid, delta: i64) -> anyhow::Result<()>;
    async fn get_photo(&self, id: Uuid) -> anyhow::Result<Option<PhotoRecord>>;
}

/// Postgres-backed photo catalog.
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PhotoCatalog for PgCatalog {
    async fn insert_photo(&self, photo: &PhotoRecord) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO photos (id, collection_id, submitter_id, storage_key,
                                thumbnail_key, content_type, size_bytes, uploaded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(photo.id)
        .bind(photo.collection_id)
        .bind(&photo.submitter_id)
        .bind(&photo.storage_key)
        .bind(&photo.thumbnail_key)
        .bind(&photo.content_type)
        .bind(photo.size_bytes)
        .bind(photo.uploaded_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn add_to_collection_count(
        &self,
        collection_id: Uuid,
        delta: i64,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO collections (id, photo_count)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET photo_count = collections.photo_count + $2
            "#,
        )
        .bind(collection_id)
        .bind(delta)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_photo(&self, id: Uuid) -> anyhow::Result<Option<PhotoRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, collection_id, submitter_id, storage_key, thumbnail_key,
                   content_type, size_bytes, uploaded_at
            FROM photos
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(r) => Some(PhotoRecord {
                id: r.try_get("id")?,
                collection_id: r.try_get("collection_id")?,
                submitter_id: r.try_get("submitter_id")?,
                storage_key: r.try_get("storage_key")?,
                thumbnail_key: r.try_get("thumbnail_key")?,
                content_type: r.try_get("content_type")?,
                size_bytes: r.try_get("size_bytes")?,
                uploaded_at: r.try_get("uploaded_at")?,
            }),
            None => None,
        })
    }
}

/// In-memory photo catalog used by the test suite.
#[derive(Default)]
pub struct MemoryCatalog {
    photos: Mutex<HashMap<Uuid, PhotoRecord>>,
    collection_counts: Mutex<HashMap<Uuid, i64>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn photos(&self) -> MutexGuard<'_, HashMap<Uuid, PhotoRecord>> {
        self.photos.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn photo_count(&self) -> usize {
        self.photos().len()
    }

    pub fn photos_in_collection(&self, collection_id: Uuid) -> Vec<PhotoRecord> {
        self.photos()
            .values()
            .filter(|p| p.collection_id == collection_id)
            .cloned()
            .collect()
    }

    pub fn collection_count(&self, collection_id: Uuid) -> i64 {
        self.collection_counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&collection_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl PhotoCatalog for MemoryCatalog {
    async fn insert_photo(&self, photo: &PhotoRecord) -> anyhow::Result<()> {
        self.photos().insert(photo.id, photo.clone());
        Ok(())
    }

    async fn add_to_collection_count(
        &self,
        collection_id: Uuid,
        delta: i64,
    ) -> anyhow::Result<()> {
        *self
            .collection_counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(collection_id)
            .or_insert(0) += delta;
        Ok(())
    }

    async fn get_photo(&self, id: Uuid) -> anyhow::Result<Option<PhotoRecord>> {
        Ok(self.photos().get(&id).cloned())
    }
}
