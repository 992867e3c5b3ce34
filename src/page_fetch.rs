use anyhow::{anyhow, Result};
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Bodies beyond this are cut off before feature scanning
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// A fetched page together with how it was reached.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub final_url: Url,
    pub redirects: usize,
    pub status: u16,
    pub body: String,
}

pub struct PageFetcher {
    client: Client,
    max_redirects: u8,
}

impl PageFetcher {
    pub fn new(
        timeout: Duration,
        max_redirects: u8,
        user_agent: &str,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            max_redirects,
        })
    }

    /// GET the page, following redirects by hand so the hop count is known
    pub async fn fetch(&self, url: &Url) -> Result<PageSnapshot> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!("Unsupported scheme for page fetch: {}", url.scheme()));
        }

        let mut current = url.clone();
        let mut redirects = 0usize;

        loop {
            let mut response = self.client.get(current.clone()).send().await?;
            let status = response.status();

            if status.is_redirection() {
                let Some(location) = response.headers().get(reqwest::header::LOCATION) else {
                    return Err(anyhow!("Redirect from {current} without Location header"));
                };
                if redirects >= self.max_redirects as usize {
                    return Err(anyhow!("Too many redirects starting at {url}"));
                }
                let next = current.join(location.to_str()?)?;
                log::debug!("Redirect {} -> {}", current, next);
                current = next;
                redirects += 1;
                continue;
            }

            if let Some(declared) = response.content_length() {
                if declared > MAX_BODY_BYTES as u64 {
                    return Err(anyhow!(
                        "Body of {current} is {declared} bytes, over the byte limit"
                    ));
                }
            }

            let mut bytes = Vec::new();
            while let Some(chunk) = response.chunk().await? {
                bytes.extend_from_slice(&chunk);
                if bytes.len() >= MAX_BODY_BYTES {
                    bytes.truncate(MAX_BODY_BYTES);
                    break;
                }
            }
            let body = String::from_utf8_lossy(&bytes).into_owned();

            log::debug!(
                "Fetched {} ({} bytes, status {}, {} redirects)",
                current,
                bytes.len(),
                status.as_u16(),
                redirects
            );

            return Ok(PageSnapshot {
                final_url: current,
                redirects,
                status: status.as_u16(),
                body,
            });
        }
    }
}
