use sqlx::PgPool;
use std::sync::Arc;

use crate::services::{jobs::UploadJobManager, queue::RecognitionQueue};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub manager: Arc<UploadJobManager>,
    pub queue: Arc<RecognitionQueue>,
}

impl AppState {
    pub fn new(db: PgPool, manager: Arc<UploadJobManager>, queue: Arc<RecognitionQueue>) -> Self {
        Self { db, manager, queue }
    }
}
