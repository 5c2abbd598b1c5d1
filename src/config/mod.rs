use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Face recognition service base URL
    pub face_api_url: String,

    /// R2 bucket name
    pub r2_bucket: String,

    /// R2 access key ID (S3-compatible)
    pub r2_access_key: String,

    /// R2 secret access key (S3-compatible)
    pub r2_secret_key: String,

    /// R2 endpoint URL
    pub r2_endpoint: String,

    /// Global cap on concurrently processing recognition items
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Per-submitter cap on concurrently processing recognition items
    #[serde(default = "default_user_concurrency_limit")]
    pub user_concurrency_limit: usize,

    /// Files ingested concurrently within one upload sub-batch
    #[serde(default = "default_chunk_size")]
    pub upload_chunk_size: usize,

    /// Seconds a terminal upload job is kept before the sweep removes it
    #[serde(default = "default_job_retention_secs")]
    pub job_retention_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_max_concurrent() -> usize {
    16
}

fn default_user_concurrency_limit() -> usize {
    4
}

fn default_chunk_size() -> usize {
    20
}

fn default_job_retention_secs() -> u64 {
    3600
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
