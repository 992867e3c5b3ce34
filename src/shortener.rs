use crate::config::ShortenerConfig;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Turns a long URL into a short display link.
#[async_trait]
pub trait LinkShortener: Send + Sync {
    async fn shorten(&self, url: &str) -> Result<String>;
}

/// Client for TinyURL-style endpoints that answer `GET ?url=<long>` with the
/// short link as a plain text body.
pub struct TinyUrlShortener {
    client: reqwest::Client,
    endpoint: String,
}

impl TinyUrlShortener {
    pub fn new(config: &ShortenerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl LinkShortener for TinyUrlShortener {
    async fn shorten(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("url", url)])
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        parse_short_link(&body)
    }
}

fn parse_short_link(body: &str) -> Result<String> {
    let link = body.trim();
    if link.starts_with("http://") || link.starts_with("https://") {
        Ok(link.to_string())
    } else {
        anyhow::bail!("Unexpected shortener response: {:.80}", link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\
                 Connection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
        });
        format!("http://{addr}/api-create.php")
    }

    fn config(endpoint: String) -> ShortenerConfig {
        ShortenerConfig {
            enabled: true,
            endpoint,
            timeout_seconds: 5,
        }
    }

    #[test]
    fn test_parse_short_link() {
        assert_eq!(
            parse_short_link("https://tinyurl.com/abc123\n").unwrap(),
            "https://tinyurl.com/abc123"
        );
        assert!(parse_short_link("Error").is_err());
        assert!(parse_short_link("").is_err());
    }

    #[tokio::test]
    async fn test_shorten_against_local_endpoint() {
        let endpoint = serve_once("https://tinyurl.com/2p8hx3yz").await;
        let shortener = TinyUrlShortener::new(&config(endpoint)).unwrap();

        let short = shortener.shorten("https://www.example.com/a/very/long/path").await.unwrap();
        assert_eq!(short, "https://tinyurl.com/2p8hx3yz");
    }

    #[tokio::test]
    async fn test_shorten_rejects_garbage_body() {
        let endpoint = serve_once("<html>rate limited</html>").await;
        let shortener = TinyUrlShortener::new(&config(endpoint)).unwrap();

        assert!(shortener.shorten("https://www.example.com/").await.is_err());
    }
}
