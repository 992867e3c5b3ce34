pub mod domain;
pub mod lexical;
pub mod page;

use crate::config::{LookupConfig, ReputationConfig};
use crate::domain_age::{registrable_domain, DomainLookup, WhoisRecord};
use crate::page_fetch::{PageFetcher, PageSnapshot};
use crate::reputation::ReputationClient;
use serde::Serialize;
use std::net::IpAddr;
use url::Url;

pub use page::PageView;

pub const FEATURE_COUNT: usize = 30;

/// Encoded value of a feature that could not be determined
pub const SENTINEL: f64 = -1.0;

/// Slot order of the feature vector. The classifier was trained on exactly
/// this order; never reorder or remove entries.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "using_ip",
    "long_url",
    "short_url",
    "symbol_at",
    "redirecting",
    "prefix_suffix",
    "sub_domains",
    "https",
    "domain_reg_len",
    "favicon",
    "non_std_port",
    "https_domain_url",
    "request_url",
    "anchor_url",
    "links_in_script_tags",
    "server_form_handler",
    "info_email",
    "abnormal_url",
    "website_forwarding",
    "status_bar_cust",
    "disable_right_click",
    "using_popup_window",
    "iframe_redirection",
    "age_of_domain",
    "dns_recording",
    "website_traffic",
    "page_rank",
    "google_index",
    "links_pointing_to_page",
    "stats_report",
];

/// Outcome of computing one feature.
///
/// Measured values follow the training data convention: `1` looks
/// legitimate, `0` is suspicious and `-1` looks like phishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureValue {
    Measured(i8),
    Unavailable,
}

impl FeatureValue {
    pub const LEGITIMATE: Self = FeatureValue::Measured(1);
    pub const SUSPICIOUS: Self = FeatureValue::Measured(0);
    pub const PHISHING: Self = FeatureValue::Measured(-1);

    /// `-1` when the indicator fired, `1` otherwise
    pub fn flag(phishing: bool) -> Self {
        if phishing {
            Self::PHISHING
        } else {
            Self::LEGITIMATE
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            FeatureValue::Measured(v) => f64::from(v),
            FeatureValue::Unavailable => SENTINEL,
        }
    }

    pub fn is_available(self) -> bool {
        matches!(self, FeatureValue::Measured(_))
    }
}

/// Fixed-length, fixed-order input of the classifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    values: [f64; FEATURE_COUNT],
    #[serde(skip)]
    available: [bool; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn from_features(features: [FeatureValue; FEATURE_COUNT]) -> Self {
        Self {
            values: features.map(FeatureValue::as_f64),
            available: features.map(FeatureValue::is_available),
        }
    }

    /// Vector built from raw encoded values, all treated as measured
    pub fn from_values(values: [f64; FEATURE_COUNT]) -> Self {
        Self {
            values,
            available: [true; FEATURE_COUNT],
        }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.values[i])
    }

    pub fn is_available(&self, name: &str) -> bool {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.available[i])
            .unwrap_or(false)
    }

    /// Names of the slots that fell back to the sentinel
    pub fn unavailable(&self) -> Vec<&'static str> {
        FEATURE_NAMES
            .iter()
            .zip(self.available.iter())
            .filter(|(_, available)| !**available)
            .map(|(name, _)| *name)
            .collect()
    }

    pub fn named(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_NAMES.iter().copied().zip(self.values.iter().copied())
    }
}

/// A URL string split into the pieces the lexical features look at. Parsing
/// never fails; unparsable input keeps `url == None` and a best-effort host.
#[derive(Debug, Clone)]
pub struct UrlParts {
    pub raw: String,
    pub url: Option<Url>,
    pub host: String,
}

impl UrlParts {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let url = Url::parse(trimmed)
            .ok()
            .filter(|u| u.host_str().is_some_and(|h| !h.is_empty()))
            .or_else(|| {
                if trimmed.contains("://") {
                    None
                } else {
                    Url::parse(&format!("http://{trimmed}"))
                        .ok()
                        .filter(|u| u.host_str().is_some_and(|h| !h.is_empty()))
                }
            });

        let host = match &url {
            Some(u) => u.host_str().unwrap_or_default().to_lowercase(),
            None => fallback_host(trimmed),
        };

        Self {
            raw: raw.to_string(),
            url,
            host,
        }
    }
}

fn fallback_host(raw: &str) -> String {
    let without_scheme = raw.split_once("://").map(|(_, rest)| rest).unwrap_or(raw);
    let authority = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host_port = authority.rsplit('@').next().unwrap_or(authority);
    let host = if host_port.starts_with('[') {
        host_port
            .split_once(']')
            .map(|(h, _)| format!("{h}]"))
            .unwrap_or_else(|| host_port.to_string())
    } else {
        host_port.split(':').next().unwrap_or_default().to_string()
    };
    host.to_lowercase()
}

/// Everything fetched from the network for one URL. `None` means the lookup
/// failed, timed out or was skipped.
#[derive(Debug, Default)]
struct NetworkFacts {
    whois: Option<WhoisRecord>,
    addresses: Option<Vec<IpAddr>>,
    page: Option<PageSnapshot>,
    traffic_rank: Option<Option<u64>>,
    page_rank: Option<f64>,
    indexed: Option<bool>,
}

struct NetworkLookups {
    domains: DomainLookup,
    pages: PageFetcher,
    reputation: ReputationClient,
}

impl NetworkLookups {
    async fn gather(&self, parts: &UrlParts) -> NetworkFacts {
        if parts.host.is_empty() {
            return NetworkFacts::default();
        }
        let site = registrable_domain(&parts.host);

        let (whois, addresses, page, (traffic_rank, page_rank, indexed)) = tokio::join!(
            self.whois(&parts.host),
            self.resolve(&parts.host),
            self.fetch(parts.url.as_ref()),
            self.reputation(&site),
        );

        NetworkFacts {
            whois,
            addresses,
            page,
            traffic_rank,
            page_rank,
            indexed,
        }
    }

    async fn whois(&self, host: &str) -> Option<WhoisRecord> {
        match self.domains.whois(host).await {
            Ok(record) => Some(record),
            Err(e) => {
                log::debug!("WHOIS unavailable for {host}: {e}");
                None
            }
        }
    }

    async fn resolve(&self, host: &str) -> Option<Vec<IpAddr>> {
        match self.domains.resolve(host).await {
            Ok(addresses) => Some(addresses),
            Err(e) => {
                log::debug!("DNS unavailable for {host}: {e}");
                None
            }
        }
    }

    async fn fetch(&self, url: Option<&Url>) -> Option<PageSnapshot> {
        let url = url?;
        match self.pages.fetch(url).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                log::debug!("Page fetch failed for {url}: {e}");
                None
            }
        }
    }

    async fn reputation(&self, site: &str) -> (Option<Option<u64>>, Option<f64>, Option<bool>) {
        if !self.reputation.enabled() {
            return (None, None, None);
        }
        let (rank, page_rank, indexed) = tokio::join!(
            self.reputation.traffic_rank(site),
            self.reputation.page_rank(site),
            self.reputation.is_indexed(site),
        );
        (
            rank.map_err(|e| log::debug!("Traffic rank unavailable for {site}: {e}")).ok(),
            page_rank.map_err(|e| log::debug!("Page rank unavailable for {site}: {e}")).ok(),
            indexed.map_err(|e| log::debug!("Index check unavailable for {site}: {e}")).ok(),
        )
    }
}

/// Turns a URL into the classifier's feature vector.
pub struct FeatureExtraction {
    lookups: Option<NetworkLookups>,
    suspicious_hosts: Vec<String>,
}

impl FeatureExtraction {
    pub fn new(
        lookups: &LookupConfig,
        reputation: &ReputationConfig,
        suspicious_hosts: Vec<String>,
    ) -> anyhow::Result<Self> {
        if lookups.offline {
            return Ok(Self::offline(suspicious_hosts));
        }

        let network = NetworkLookups {
            domains: DomainLookup::new(lookups.whois_timeout(), lookups.dns_timeout()),
            pages: PageFetcher::new(
                lookups.page_timeout(),
                lookups.max_redirects,
                &lookups.user_agent,
            )?,
            reputation: ReputationClient::new(reputation.clone(), &lookups.user_agent)?,
        };

        Ok(Self {
            lookups: Some(network),
            suspicious_hosts,
        })
    }

    /// Extractor that computes lexical features only
    pub fn offline(suspicious_hosts: Vec<String>) -> Self {
        Self {
            lookups: None,
            suspicious_hosts,
        }
    }

    /// Always yields exactly `FEATURE_COUNT` values; lookups that fail leave
    /// their slots at the sentinel without affecting the others.
    pub async fn extract(&self, url: &str) -> FeatureVector {
        let parts = UrlParts::parse(url);
        let facts = match &self.lookups {
            Some(network) => network.gather(&parts).await,
            None => NetworkFacts::default(),
        };

        let vector = self.assemble(&parts, &facts);
        let missing = vector.unavailable();
        if !missing.is_empty() {
            log::debug!("{} features unavailable for {}: {:?}", missing.len(), url, missing);
        }
        vector
    }

    fn assemble(&self, parts: &UrlParts, facts: &NetworkFacts) -> FeatureVector {
        let site = registrable_domain(&parts.host);
        let view = facts.page.as_ref().map(|p| PageView::new(p, &site));
        let on_page = |f: fn(&PageView) -> FeatureValue| {
            view.as_ref().map_or(FeatureValue::Unavailable, f)
        };
        let whois = facts.whois.as_ref();
        let addresses = facts.addresses.as_deref();

        FeatureVector::from_features([
            lexical::using_ip(parts),
            lexical::long_url(parts),
            lexical::short_url(parts),
            lexical::symbol_at(parts),
            lexical::redirecting(parts),
            lexical::prefix_suffix(parts),
            lexical::sub_domains(parts),
            lexical::https(parts),
            domain::domain_reg_len(whois),
            on_page(page::favicon),
            lexical::non_std_port(parts),
            lexical::https_domain_url(parts),
            on_page(page::request_url),
            on_page(page::anchor_url),
            on_page(page::links_in_script_tags),
            on_page(page::server_form_handler),
            on_page(page::info_email),
            domain::abnormal_url(whois),
            on_page(page::website_forwarding),
            on_page(page::status_bar_cust),
            on_page(page::disable_right_click),
            on_page(page::using_popup_window),
            on_page(page::iframe_redirection),
            domain::age_of_domain(whois),
            domain::dns_recording(addresses),
            domain::website_traffic(facts.traffic_rank),
            domain::page_rank(facts.page_rank),
            domain::google_index(facts.indexed),
            on_page(page::links_pointing_to_page),
            lexical::stats_report(parts, addresses, &self.suspicious_hosts),
        ])
    }
}
