//! Third-party reputation lookups: traffic rank, page rank and search-index
//! presence. Every lookup is optional and individually time-limited.

use crate::config::ReputationConfig;
use anyhow::{anyhow, Result};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

pub struct ReputationClient {
    client: Client,
    config: ReputationConfig,
}

impl ReputationClient {
    pub fn new(config: ReputationConfig, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Popularity rank of `domain`; `None` when the list does not rank it
    pub async fn traffic_rank(&self, domain: &str) -> Result<Option<u64>> {
        self.ensure_enabled()?;
        let url = format!("{}{}", self.config.rank_api_url, domain);
        let body: Value = self.client.get(&url).send().await?.error_for_status()?.json().await?;
        Ok(parse_rank(&body))
    }

    /// Open PageRank style decimal rank of `domain`
    pub async fn page_rank(&self, domain: &str) -> Result<f64> {
        self.ensure_enabled()?;
        let key = self
            .config
            .page_rank_api_key
            .as_deref()
            .ok_or_else(|| anyhow!("No page rank API key configured"))?;

        let body: Value = self
            .client
            .get(&self.config.page_rank_api_url)
            .query(&[("domains[]", domain)])
            .header("API-OPR", key)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        parse_page_rank(&body).ok_or_else(|| anyhow!("No page rank for {domain}"))
    }

    /// Whether the configured search endpoint lists pages of `domain`
    pub async fn is_indexed(&self, domain: &str) -> Result<bool> {
        self.ensure_enabled()?;
        let template = self
            .config
            .index_check_url
            .as_deref()
            .ok_or_else(|| anyhow!("No index check URL configured"))?;

        let url = template.replace("{domain}", domain);
        let body = self.client.get(&url).send().await?.error_for_status()?.text().await?;
        Ok(body.to_lowercase().contains(&domain.to_lowercase()))
    }

    fn ensure_enabled(&self) -> Result<()> {
        if self.config.enabled {
            Ok(())
        } else {
            Err(anyhow!("Reputation lookups are disabled"))
        }
    }
}

fn parse_rank(body: &Value) -> Option<u64> {
    body.get("ranks")?
        .as_array()?
        .iter()
        .filter_map(|entry| entry.get("rank").and_then(Value::as_u64))
        .next()
}

fn parse_page_rank(body: &Value) -> Option<f64> {
    let entry = body.get("response")?.as_array()?.first()?;
    match entry.get("page_rank_decimal")? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_rank() {
        let body = json!({"domain": "google.com", "ranks": [{"date": "2024-01-01", "rank": 1}]});
        assert_eq!(parse_rank(&body), Some(1));

        let unranked = json!({"domain": "lilagoraj.pl", "ranks": []});
        assert_eq!(parse_rank(&unranked), None);
        assert_eq!(parse_rank(&json!({})), None);
    }

    #[test]
    fn test_parse_page_rank() {
        let body = json!({"status_code": 200, "response": [{"page_rank_decimal": 7.5}]});
        assert_eq!(parse_page_rank(&body), Some(7.5));

        let as_string = json!({"response": [{"page_rank_decimal": "2.31"}]});
        assert_eq!(parse_page_rank(&as_string), Some(2.31));

        let missing = json!({"response": [{"page_rank_decimal": ""}]});
        assert_eq!(parse_page_rank(&missing), None);
    }

    #[tokio::test]
    async fn test_disabled_client_never_queries() {
        let client = ReputationClient::new(ReputationConfig::default(), "test").unwrap();
        assert!(!client.enabled());
        assert!(client.traffic_rank("example.com").await.is_err());
        assert!(client.page_rank("example.com").await.is_err());
        assert!(client.is_indexed("example.com").await.is_err());
    }
}
