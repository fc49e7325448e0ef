//! Bulk upload endpoint.
//!
//! `POST /upload?filename=...` with the raw file bytes as the body. The
//! body is streamed straight into the download directory; a failed write
//! deletes the partial file and answers with an error status.

use std::convert::Infallible;
use std::path::{Path, PathBuf};

use bytes::Buf;
use chrono::Utc;
use futures::{Stream, TryStreamExt};
use log::{error, info};
use serde::Deserialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

#[derive(Debug, Deserialize)]
struct UploadQuery {
    filename: Option<String>,
}

/// Upload route bound to a download directory.
pub fn route(
    download_dir: PathBuf,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path("upload")
        .and(warp::post())
        .and(warp::query::<UploadQuery>())
        .and(with_download_dir(download_dir))
        .and(warp::body::stream())
        .and_then(handle_upload)
}

fn with_download_dir(
    download_dir: PathBuf,
) -> impl Filter<Extract = (PathBuf,), Error = Infallible> + Clone {
    warp::any().map(move || download_dir.clone())
}

async fn handle_upload<S, B>(
    query: UploadQuery,
    download_dir: PathBuf,
    body: S,
) -> Result<impl Reply, Rejection>
where
    S: Stream<Item = Result<B, warp::Error>> + Unpin,
    B: Buf,
{
    let file_name = sanitize_file_name(query.filename.as_deref());
    let target = download_dir.join(&file_name);

    match receive_file(&download_dir, &target, body).await {
        Ok(bytes) => {
            info!("Upload completed: {} ({} bytes)", target.display(), bytes);
            Ok(warp::reply::with_status("Upload complete", StatusCode::OK))
        }
        Err(e) => {
            error!("Error writing upload {}: {}", target.display(), e);
            // Never leave a truncated file behind
            let _ = fs::remove_file(&target).await;
            Ok(warp::reply::with_status(
                "Error writing file",
                StatusCode::INTERNAL_SERVER_ERROR,
            ))
        }
    }
}

async fn receive_file<S, B>(download_dir: &Path, target: &Path, mut body: S) -> std::io::Result<u64>
where
    S: Stream<Item = Result<B, warp::Error>> + Unpin,
    B: Buf,
{
    fs::create_dir_all(download_dir).await?;
    let mut file = fs::File::create(target).await?;
    let mut written: u64 = 0;

    while let Some(mut buf) = body
        .try_next()
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::ConnectionAborted, e))?
    {
        while buf.has_remaining() {
            let chunk = buf.chunk();
            file.write_all(chunk).await?;
            written += chunk.len() as u64;
            let advance = chunk.len();
            buf.advance(advance);
        }
    }

    file.flush().await?;
    Ok(written)
}

/// Client-supplied names are reduced to their final path component so an
/// upload can never escape the download directory.
fn sanitize_file_name(requested: Option<&str>) -> String {
    requested
        .and_then(|name| Path::new(name).file_name())
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(str::to_string)
        .unwrap_or_else(|| format!("received_file_{}", Utc::now().timestamp_millis()))
}
