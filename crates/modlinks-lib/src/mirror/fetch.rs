use anyhow::{Context, Result};
use futures::StreamExt;
use reqwest::Client;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use super::config::REQUEST_TIMEOUT_SECS;
use super::types::CancelToken;

const FETCH_ATTEMPTS: u32 = 3;

/// Shared client for every request a run makes. Individual fetches carry
/// their own retry loop on top of this timeout.
pub fn build_client() -> Result<Client> {
    Client::builder()
        .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .context("Failed to build HTTP client")
}

/// Fetch a URL into memory with retry and linear backoff.
pub async fn fetch_bytes(client: &Client, url: &str, cancel: &CancelToken) -> Result<Vec<u8>> {
    let mut attempts = 0;
    loop {
        match fetch_bytes_once(client, url, cancel).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) => {
                attempts += 1;
                if attempts >= FETCH_ATTEMPTS || cancel.is_cancelled() {
                    return Err(e)
                        .context(format!("Failed to fetch {} after {} attempts", url, attempts));
                }
                log::warn!(
                    "Fetch failed (attempt {}/{}): {}. Retrying...",
                    attempts,
                    FETCH_ATTEMPTS,
                    e
                );
                tokio::time::sleep(tokio::time::Duration::from_millis(1000 * attempts as u64))
                    .await;
            }
        }
    }
}

async fn fetch_bytes_once(client: &Client, url: &str, cancel: &CancelToken) -> Result<Vec<u8>> {
    log::debug!("Fetching: {}", url);

    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        anyhow::bail!("HTTP error {}: {}", response.status(), url);
    }

    let total_size = response.content_length();
    let mut bytes = Vec::with_capacity(total_size.unwrap_or(0) as usize);

    let mut stream = response.bytes_stream();
    while let Some(chunk_result) = stream.next().await {
        if cancel.is_cancelled() {
            anyhow::bail!("Fetch cancelled");
        }
        let chunk = chunk_result?;
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

/// Fetch a URL as UTF-8 text. Used for the upstream manifests and the
/// rebase source files.
pub async fn fetch_text(client: &Client, url: &str, cancel: &CancelToken) -> Result<String> {
    let bytes = fetch_bytes(client, url, cancel).await?;
    String::from_utf8(bytes).with_context(|| format!("Response from {} is not UTF-8", url))
}

/// Stream a URL straight to `path`, returning the byte count. The body is
/// written to a `.part` sibling first and renamed into place once complete,
/// so a failed download never leaves a partial file at the destination.
pub async fn download_to_path(
    client: &Client,
    url: &str,
    path: &Path,
    cancel: &CancelToken,
) -> Result<u64> {
    let mut attempts = 0;
    loop {
        match download_to_path_once(client, url, path, cancel).await {
            Ok(size) => return Ok(size),
            Err(e) => {
                attempts += 1;
                if attempts >= FETCH_ATTEMPTS || cancel.is_cancelled() {
                    return Err(e)
                        .context(format!("Failed to fetch {} after {} attempts", url, attempts));
                }
                log::warn!(
                    "Download failed (attempt {}/{}): {}. Retrying...",
                    attempts,
                    FETCH_ATTEMPTS,
                    e
                );
                tokio::time::sleep(tokio::time::Duration::from_millis(1000 * attempts as u64))
                    .await;
            }
        }
    }
}

async fn download_to_path_once(
    client: &Client,
    url: &str,
    path: &Path,
    cancel: &CancelToken,
) -> Result<u64> {
    log::debug!("Downloading: {} -> {:?}", url, path);

    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        anyhow::bail!("HTTP error {}: {}", response.status(), url);
    }

    let tmp_name = format!(
        "{}.part",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("download")
    );
    let tmp_path = path.with_file_name(tmp_name);
    let mut file = File::create(&tmp_path).await?;
    let mut downloaded: u64 = 0;

    let mut stream = response.bytes_stream();
    while let Some(chunk_result) = stream.next().await {
        if cancel.is_cancelled() {
            drop(file);
            let _ = tokio::fs::remove_file(&tmp_path).await;
            anyhow::bail!("Download cancelled");
        }
        let chunk = match chunk_result {
            Ok(chunk) => chunk,
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(&tmp_path).await;
                return Err(e.into());
            }
        };
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
    }
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, path).await?;

    Ok(downloaded)
}
