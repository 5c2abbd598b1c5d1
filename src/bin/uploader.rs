use std::path::PathBuf;

use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use photo_ingest::uploader::{BatchUploader, HttpTransport, LocalFile};

/// CLI batch uploader: sends every image in a directory to the ingestion
/// endpoint using the adaptive scheduler, printing live progress.
///
/// Usage: uploader <directory> <collection_id>
/// Environment: INGEST_URL (default http://localhost:3000), SUBMITTER_ID
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(dir), Some(collection_arg)) = (args.next(), args.next()) else {
        eprintln!("Usage: uploader <directory> <collection_id>");
        std::process::exit(2);
    };

    let collection_id: Uuid = collection_arg
        .parse()
        .expect("collection_id must be a UUID");
    let base_url =
        std::env::var("INGEST_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let submitter_id = std::env::var("SUBMITTER_ID").unwrap_or_else(|_| "cli".to_string());

    let files = read_images(&PathBuf::from(&dir)).expect("Failed to read upload directory");
    if files.is_empty() {
        eprintln!("No images found in {dir}");
        std::process::exit(1);
    }

    tracing::info!(count = files.len(), dir = %dir, "Uploading batch");

    let uploader = BatchUploader::new(std::sync::Arc::new(HttpTransport::new(
        base_url,
        submitter_id,
    )));

    let summary = uploader
        .upload_batch(files, collection_id, |progress| {
            println!(
                "{}/{} completed, {} uploading, {} pending, {} errors ({:.1}/s)",
                progress.completed,
                progress.total,
                progress.uploading,
                progress.pending,
                progress.errors,
                progress.throughput_per_sec
            );
        })
        .await;

    println!(
        "Done: {}/{} files in {:.1}s, {} job(s) created",
        summary.completed,
        summary.total,
        summary.elapsed_secs,
        summary.job_ids.len()
    );
    for error in &summary.errors {
        eprintln!("error: {error}");
    }

    if summary.completed < summary.total {
        std::process::exit(1);
    }
}

fn read_images(dir: &PathBuf) -> std::io::Result<Vec<LocalFile>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        let content_type = match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "webp" => "image/webp",
            _ => continue,
        };
        files.push(LocalFile {
            filename: path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("photo")
                .to_string(),
            content_type: content_type.to_string(),
            bytes: std::fs::read(&path)?,
        });
    }
    Ok(files)
}
