use anyhow::{Result, anyhow};
use reqwest::Client;
use tracing::debug;
use url::Url;

/// Never buffer more than the largest per-message upload any guild can have.
const MAX_DOWNLOAD_SIZE: u64 = 100 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub data: Vec<u8>,
    pub content_type: String,
    pub filename: String,
    pub size: usize,
}

#[derive(Debug, Clone)]
pub struct MediaHandler {
    client: Client,
    max_size: u64,
}

impl Default for MediaHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaHandler {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            max_size: MAX_DOWNLOAD_SIZE,
        }
    }

    pub async fn download_from_url(&self, url: &str) -> Result<MediaInfo> {
        let parsed = parse_download_url(url)?;
        debug!("downloading attachment url={}", parsed);

        let mut response = self
            .client
            .get(parsed.clone())
            .send()
            .await
            .map_err(|e| anyhow!("failed to download from {}: {}", url, e))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "failed to download from {}: status {}",
                url,
                response.status()
            ));
        }

        if let Some(length) = response.content_length() {
            if length > self.max_size {
                return Err(anyhow!(
                    "attachment too large: {} bytes (max {})",
                    length,
                    self.max_size
                ));
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let mut data = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| anyhow!("failed to read response body: {}", e))?
        {
            append_within_limit(&mut data, &chunk, self.max_size)?;
        }

        let size = data.len();

        Ok(MediaInfo {
            data,
            content_type,
            filename: filename_from_url(&parsed),
            size,
        })
    }
}

/// Servers may omit or understate `Content-Length`, so the cap is enforced on the body too.
fn append_within_limit(data: &mut Vec<u8>, chunk: &[u8], max_size: u64) -> Result<()> {
    let total = (data.len() + chunk.len()) as u64;
    if total > max_size {
        return Err(anyhow!(
            "attachment too large: over {} bytes (max {})",
            data.len(),
            max_size
        ));
    }
    data.extend_from_slice(chunk);
    Ok(())
}

fn parse_download_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|e| anyhow!("invalid attachment url {}: {}", url, e))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(anyhow!("unsupported attachment url scheme: {}", other)),
    }
}

pub fn filename_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .unwrap_or("attachment")
        .to_string()
}
