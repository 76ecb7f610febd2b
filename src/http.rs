// Shared HTTP client utilities

use crate::ui;
use anyhow::Result;
use log::debug;
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// User-Agent string for all HTTP requests
const USER_AGENT: &str = concat!("setup-vim/", env!("CARGO_PKG_VERSION"));

lazy_static::lazy_static! {
    /// Shared HTTP client with proper User-Agent
    static ref CLIENT: Client = Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .expect("Failed to create HTTP client");
}

fn authorized(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) if !token.is_empty() => request.bearer_auth(token),
        _ => request,
    }
}

/// Fetch JSON from the GitHub API and deserialize it
pub async fn fetch_json<T: DeserializeOwned>(url: &str, token: Option<&str>) -> Result<T> {
    debug!("GET {}", url);
    let request = CLIENT
        .get(url)
        .header(ACCEPT, "application/vnd.github+json");
    let response: Response = authorized(request, token).send().await?;

    if response.status() == StatusCode::NOT_FOUND {
        anyhow::bail!("Resource not found: {}", url);
    }

    if !response.status().is_success() {
        anyhow::bail!("HTTP request failed: {} ({})", url, response.status());
    }

    let result = response.json().await?;
    Ok(result)
}

/// Stream a file to `dest`, creating parent directories, with a progress bar
pub async fn download_to_file(url: &str, dest: &Path) -> Result<PathBuf> {
    debug!("Downloading {} to {}", url, dest.display());
    let mut response: Response = CLIENT.get(url).send().await?;

    if !response.status().is_success() {
        anyhow::bail!("Download failed: {} ({})", url, response.status());
    }

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| url.to_string());
    let bar = match response.content_length() {
        Some(total) => ui::download_bar(total),
        None => ui::download_bar_indeterminate(),
    };
    bar.set_message(name.clone());

    let mut file = tokio::fs::File::create(dest).await?;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        bar.inc(chunk.len() as u64);
    }
    file.flush().await?;

    ui::finish_download_success(&bar, &name);
    Ok(dest.to_path_buf())
}
