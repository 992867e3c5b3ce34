use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub lookups: LookupConfig,
    #[serde(default)]
    pub reputation: ReputationConfig,
    #[serde(default)]
    pub shortener: ShortenerConfig,
    /// Host fragments and addresses reported by phishing statistics feeds
    #[serde(default = "default_suspicious_hosts")]
    pub suspicious_hosts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen: String,
    pub model_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub batch_concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// Skip all network lookups; every network-backed feature becomes the sentinel
    pub offline: bool,
    pub whois_timeout_seconds: u64,
    pub dns_timeout_seconds: u64,
    pub page_timeout_seconds: u64,
    pub max_redirects: u8,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReputationConfig {
    pub enabled: bool,
    pub timeout_seconds: u64,
    pub rank_api_url: String,
    pub page_rank_api_url: String,
    pub page_rank_api_key: Option<String>,
    /// Search URL template, `{domain}` is substituted
    pub index_check_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortenerConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub timeout_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                listen: "127.0.0.1:5000".to_string(),
                model_path: "model/forest.json".to_string(),
            },
            service: ServiceConfig::default(),
            lookups: LookupConfig::default(),
            reputation: ReputationConfig::default(),
            shortener: ShortenerConfig::default(),
            suspicious_hosts: default_suspicious_hosts(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            batch_concurrency: 8,
        }
    }
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            offline: false,
            whois_timeout_seconds: 10,
            dns_timeout_seconds: 5,
            page_timeout_seconds: 10,
            max_redirects: 10,
            user_agent: format!("phish-detect/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_seconds: 5,
            rank_api_url: "https://tranco-list.eu/api/ranks/domain/".to_string(),
            page_rank_api_url: "https://openpagerank.com/api/v1.0/getPageRank".to_string(),
            page_rank_api_key: None,
            index_check_url: None,
        }
    }
}

impl Default for ShortenerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://tinyurl.com/api-create.php".to_string(),
            timeout_seconds: 5,
        }
    }
}

impl LookupConfig {
    /// Configuration that never touches the network
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    pub fn whois_timeout(&self) -> Duration {
        Duration::from_secs(self.whois_timeout_seconds)
    }

    pub fn dns_timeout(&self) -> Duration {
        Duration::from_secs(self.dns_timeout_seconds)
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_seconds)
    }
}

fn default_suspicious_hosts() -> Vec<String> {
    [
        "at.ua",
        "usa.cc",
        "baltazarpresentes.com.br",
        "pe.hu",
        "esy.es",
        "hol.es",
        "sweddy.com",
        "myjino.ru",
        "96.lt",
        "ow.ly",
        "146.112.61.108",
        "213.174.157.151",
        "121.50.168.88",
        "192.185.217.116",
        "78.46.211.158",
        "181.174.165.13",
        "46.242.145.103",
        "121.50.168.40",
        "83.125.22.219",
        "46.242.145.98",
        "107.151.148.44",
        "107.151.148.107",
        "64.70.19.203",
        "199.184.144.27",
        "107.151.148.108",
        "107.151.148.109",
        "119.28.52.61",
        "54.83.43.69",
        "52.69.166.231",
        "216.58.192.225",
        "118.184.25.86",
        "67.208.74.71",
        "23.253.126.58",
        "104.239.157.210",
        "175.126.123.219",
        "141.8.224.221",
        "10.10.10.10",
        "43.229.108.32",
        "103.232.215.140",
        "69.172.201.153",
        "216.218.185.162",
        "54.225.104.146",
        "103.243.24.98",
        "199.59.243.120",
        "31.170.160.61",
        "213.19.128.77",
        "62.113.226.131",
        "208.100.26.234",
        "195.16.127.102",
        "195.16.127.157",
        "34.196.13.28",
        "103.224.212.222",
        "172.217.4.225",
        "54.72.9.51",
        "192.64.147.141",
        "198.200.56.183",
        "23.253.164.103",
        "52.48.191.26",
        "52.214.197.72",
        "87.98.255.18",
        "209.99.17.27",
        "216.38.62.18",
        "104.130.124.96",
        "47.89.58.141",
        "54.86.225.156",
        "54.82.156.19",
        "37.157.192.102",
        "204.11.56.48",
        "110.34.231.42",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.service.batch_concurrency == 0 {
            anyhow::bail!("service.batch_concurrency must be at least 1");
        }
        if self.server.listen.parse::<std::net::SocketAddr>().is_err() {
            anyhow::bail!("server.listen is not a socket address: {}", self.server.listen);
        }
        if let Some(template) = &self.reputation.index_check_url {
            if !template.contains("{domain}") {
                anyhow::bail!("reputation.index_check_url must contain {{domain}}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.listen, "127.0.0.1:5000");
        assert!(!config.lookups.offline);
        assert!(!config.suspicious_hosts.is_empty());
    }

    #[test]
    fn test_minimal_yaml_fills_defaults() {
        let yaml = r#"
server:
  listen: "0.0.0.0:8080"
  model_path: "/srv/forest.json"
lookups:
  offline: true
  page_timeout_seconds: 4
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.model_path, "/srv/forest.json");
        assert!(config.lookups.offline);
        assert_eq!(config.lookups.page_timeout(), Duration::from_secs(4));
        assert_eq!(config.lookups.whois_timeout(), Duration::from_secs(10));
        assert_eq!(config.service.batch_concurrency, 8);
        assert!(config.shortener.enabled);
        assert!(config.suspicious_hosts.contains(&"at.ua".to_string()));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.service.batch_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.listen = "not an address".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.reputation.index_check_url = Some("https://search.example/?q=site".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_round_trip_through_file() {
        let path = std::env::temp_dir().join(format!(
            "phish-detect-config-{}.yaml",
            std::process::id()
        ));
        let path = path.to_string_lossy().to_string();

        let mut config = Config::default();
        config.shortener.enabled = false;
        config.to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert!(!loaded.shortener.enabled);
        assert_eq!(loaded.server.listen, config.server.listen);

        let _ = std::fs::remove_file(&path);
    }
}
