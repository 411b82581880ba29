use crate::html::{parse_preview, LinkPreview};
use url::Url;

/// Only the head of a page is needed for its title and icon.
pub const MAX_PREVIEW_BODY_BYTES: usize = 512 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("invalid preview url {0}")]
    InvalidUrl(String),
    #[error("preview request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("preview request returned status {0}")]
    Status(u16),
}

/// Read at most `limit_bytes` of the body. Anything past the limit is dropped
/// rather than treated as an error.
async fn read_body_prefix(
    response: &mut reqwest::Response,
    limit_bytes: usize,
) -> Result<Vec<u8>, reqwest::Error> {
    let mut out: Vec<u8> = Vec::new();

    while let Some(chunk) = response.chunk().await? {
        let remaining = limit_bytes.saturating_sub(out.len());
        if chunk.len() >= remaining {
            out.extend_from_slice(&chunk[..remaining]);
            break;
        }
        out.extend_from_slice(&chunk);
    }

    Ok(out)
}

/// Fetch `url` and extract its preview metadata.
pub async fn fetch_preview(
    client: &reqwest::Client,
    url: &str,
) -> Result<LinkPreview, PreviewError> {
    let parsed = Url::parse(url).map_err(|_| PreviewError::InvalidUrl(url.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(PreviewError::InvalidUrl(url.to_string()));
    }

    let mut response = client.get(parsed.clone()).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(PreviewError::Status(status.as_u16()));
    }

    let body = read_body_prefix(&mut response, MAX_PREVIEW_BODY_BYTES).await?;
    let html = String::from_utf8_lossy(&body);
    log::debug!("fetched {} preview bytes from {url}", body.len());
    Ok(parse_preview(&parsed, &html))
}
