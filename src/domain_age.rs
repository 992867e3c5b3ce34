use anyhow::{anyhow, Result};
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::system_conf::read_system_conf;
use hickory_resolver::TokioAsyncResolver;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::timeout;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

static CREATION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_all(&[
        r"(?im)^\s*creation\s*date[:\s]+([^\r\n]+)",
        r"(?im)^\s*created(?:\s*on)?[:\s]+([^\r\n]+)",
        r"(?im)^\s*registered(?:\s*on)?[:\s]+([^\r\n]+)",
        r"(?im)^\s*domain\s*(?:name\s*)?(?:record\s*)?created[:\s]+([^\r\n]+)",
        r"(?im)^\s*registration\s*(?:date|time)[:\s]+([^\r\n]+)",
        r"(?im)^\s*domain_date_created[:\s]+([^\r\n]+)",
        r"(?im)^\s*create(?:d)?_date[:\s]+([^\r\n]+)",
        r"(?im)^\s*fecha\s*de\s*creaci[oó]n[:\s]+([^\r\n]+)",
        r"(?im)^\s*date\s*de\s*cr[eé]ation[:\s]+([^\r\n]+)",
        r"(?im)^\s*erstellt\s*am[:\s]+([^\r\n]+)",
    ])
});

static EXPIRATION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_all(&[
        r"(?im)^\s*registry\s*expiry\s*date[:\s]+([^\r\n]+)",
        r"(?im)^\s*registrar\s*registration\s*expiration\s*date[:\s]+([^\r\n]+)",
        r"(?im)^\s*expir(?:ation|y)\s*date[:\s]+([^\r\n]+)",
        r"(?im)^\s*expires(?:\s*on)?[:\s]+([^\r\n]+)",
        r"(?im)^\s*paid-till[:\s]+([^\r\n]+)",
        r"(?im)^\s*renewal\s*date[:\s]+([^\r\n]+)",
        r"(?im)^\s*domain_datebilleduntil[:\s]+([^\r\n]+)",
    ])
});

static REFERRAL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*(?:refer|whois|registrar\s*whois\s*server)\s*:\s*([a-z0-9.\-]+)\s*$")
        .unwrap()
});

static NUMERIC_YMD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})[-./](\d{1,2})[-./](\d{1,2})").unwrap()
});

static NUMERIC_DMY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2})([-./])(\d{1,2})[-./](\d{4})").unwrap()
});

static NAMED_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d{1,2})[-\s./]([a-z]{3})[a-z]*[-\s./,]+(\d{4})").unwrap()
});

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|p| Regex::new(p).unwrap()).collect()
}

/// Parsed answer of a WHOIS server for one registrable domain.
#[derive(Debug, Clone)]
pub struct WhoisRecord {
    pub domain: String,
    pub creation_date: Option<SystemTime>,
    pub expiration_date: Option<SystemTime>,
    pub raw: String,
}

impl WhoisRecord {
    pub fn parse(domain: &str, text: &str) -> Self {
        Self {
            domain: domain.to_lowercase(),
            creation_date: first_date(&CREATION_PATTERNS, text),
            expiration_date: first_date(&EXPIRATION_PATTERNS, text),
            raw: text.to_string(),
        }
    }

    /// Days since the domain was created
    pub fn age_days(&self) -> Option<u64> {
        let created = self.creation_date?;
        let age = SystemTime::now()
            .duration_since(created)
            .unwrap_or(Duration::from_secs(0));
        Some(age.as_secs() / SECS_PER_DAY)
    }

    /// Days between creation and expiry
    pub fn registration_days(&self) -> Option<u64> {
        let created = self.creation_date?;
        let expires = self.expiration_date?;
        let span = expires
            .duration_since(created)
            .unwrap_or(Duration::from_secs(0));
        Some(span.as_secs() / SECS_PER_DAY)
    }

    /// Whether the record actually describes the queried domain
    pub fn mentions_domain(&self) -> bool {
        !self.domain.is_empty() && self.raw.to_lowercase().contains(&self.domain)
    }

    fn referral(&self) -> Option<String> {
        REFERRAL_PATTERN
            .captures(&self.raw)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim_end_matches('.').to_lowercase())
            .filter(|server| server.contains('.'))
    }
}

fn first_date(patterns: &[Regex], text: &str) -> Option<SystemTime> {
    for regex in patterns {
        for captures in regex.captures_iter(text) {
            if let Some(m) = captures.get(1) {
                if let Some(date) = parse_whois_date(m.as_str()) {
                    return Some(date);
                }
                log::debug!("Could not parse WHOIS date: '{}'", m.as_str().trim());
            }
        }
    }
    None
}

/// Parse the date formats registries put in WHOIS answers.
pub fn parse_whois_date(date_str: &str) -> Option<SystemTime> {
    let date_str = date_str.trim();

    if let Some(c) = NUMERIC_YMD.captures(date_str) {
        return to_system_time(c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?);
    }

    if let Some(c) = NAMED_MONTH.captures(date_str) {
        let month = month_from_name(&c[2])?;
        return to_system_time(c[3].parse().ok()?, month, c[1].parse().ok()?);
    }

    if let Some(c) = NUMERIC_DMY.captures(date_str) {
        let first: u32 = c[1].parse().ok()?;
        let second: u32 = c[3].parse().ok()?;
        let year: i64 = c[4].parse().ok()?;
        // slash dates are US month/day unless that is impossible
        let (month, day) = if (&c[2] == "/" && first <= 12) || second > 12 {
            (first, second)
        } else {
            (second, first)
        };
        return to_system_time(year, month, day);
    }

    None
}

fn month_from_name(name: &str) -> Option<u32> {
    let months = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let name = name.to_lowercase();
    months
        .iter()
        .position(|m| *m == name)
        .map(|i| i as u32 + 1)
}

fn to_system_time(year: i64, month: u32, day: u32) -> Option<SystemTime> {
    if !(1970..=9999).contains(&year) || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    let days = days_from_civil(year, month, day);
    u64::try_from(days)
        .ok()
        .map(|d| UNIX_EPOCH + Duration::from_secs(d * SECS_PER_DAY))
}

/// Days since 1970-01-01 for a proleptic Gregorian date
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = (if y >= 0 { y } else { y - 399 }) / 400;
    let yoe = y - era * 400;
    let m = month as i64;
    let doy = (153 * (if m > 2 { m - 3 } else { m + 9 }) + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Registrable part of a host name, e.g. "mail.example.co.uk" -> "example.co.uk"
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_lowercase();
    if host.parse::<IpAddr>().is_ok() || host.starts_with('[') {
        return host;
    }

    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() < 2 {
        return host;
    }

    if parts.len() >= 3 {
        let potential_tld = format!("{}.{}", parts[parts.len() - 2], parts[parts.len() - 1]);
        let common_two_part_tlds = [
            "co.uk", "com.au", "co.jp", "co.kr", "com.br", "co.za", "com.mx", "co.in", "com.sg",
            "co.nz", "com.ar", "co.il", "org.uk", "net.au", "gov.uk", "ac.uk", "edu.au",
            "com.cn", "com.tr", "com.pl", "org.br", "net.br",
        ];

        if common_two_part_tlds.contains(&potential_tld.as_str()) {
            return format!("{}.{}", parts[parts.len() - 3], potential_tld);
        }
    }

    format!("{}.{}", parts[parts.len() - 2], parts[parts.len() - 1])
}

/// Registry that knows the WHOIS server of every TLD
const IANA_WHOIS: &str = "whois.iana.org";

/// WHOIS and DNS lookups backing the domain features.
#[derive(Clone)]
pub struct DomainLookup {
    whois_timeout: Duration,
    dns_timeout: Duration,
    resolver: TokioAsyncResolver,
}

impl DomainLookup {
    /// `whois_timeout` bounds a whole WHOIS lookup, referrals included
    pub fn new(whois_timeout: Duration, dns_timeout: Duration) -> Self {
        let (config, mut opts) = match read_system_conf() {
            Ok(conf) => conf,
            Err(e) => {
                log::warn!("Cannot read system resolver configuration, using defaults: {e}");
                (ResolverConfig::default(), ResolverOpts::default())
            }
        };
        opts.timeout = dns_timeout;
        opts.cache_size = 0;

        Self {
            whois_timeout,
            dns_timeout,
            resolver: TokioAsyncResolver::tokio(config, opts),
        }
    }

    /// Fetch and parse the WHOIS record for the registrable part of `host`
    pub async fn whois(&self, host: &str) -> Result<WhoisRecord> {
        let domain = registrable_domain(host);
        log::debug!("Looking up WHOIS for {host} (registrable: {domain})");

        if domain.is_empty()
            || !domain.contains('.')
            || domain.parse::<IpAddr>().is_ok()
            || domain
                .chars()
                .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '-'))
        {
            return Err(anyhow!("Not a WHOIS-able domain: {domain}"));
        }

        self.whois_from(whois_server(&domain), &domain).await
    }

    async fn whois_from(&self, server: &str, domain: &str) -> Result<WhoisRecord> {
        match timeout(self.whois_timeout, self.query_with_referrals(server, domain)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "WHOIS lookup for {domain} timed out after {:?}",
                self.whois_timeout
            )),
        }
    }

    async fn query_with_referrals(&self, server: &str, domain: &str) -> Result<WhoisRecord> {
        log::debug!("Using WHOIS server: {server} for domain: {domain}");

        let text = match self.query_whois_server(server, domain).await {
            Ok(text) => text,
            Err(e) => {
                log::debug!("WHOIS query to {server} failed: {e}");
                return self.query_via_iana(server, domain).await;
            }
        };

        let record = WhoisRecord::parse(domain, &text);
        if record.creation_date.is_some() {
            return Ok(record);
        }
        if let Some(referral) = record.referral().filter(|r| r != server) {
            log::debug!("Following WHOIS referral to {referral}");
            if let Ok(text) = self.query_whois_server(&referral, domain).await {
                let referred = WhoisRecord::parse(domain, &text);
                if referred.creation_date.is_some() {
                    return Ok(referred);
                }
            }
        }
        Ok(record)
    }

    /// Ask IANA which server is authoritative for the TLD and query that one
    async fn query_via_iana(&self, failed: &str, domain: &str) -> Result<WhoisRecord> {
        if failed == IANA_WHOIS {
            return Err(anyhow!("WHOIS lookup for {domain} failed"));
        }

        let text = self.query_whois_server(IANA_WHOIS, domain).await?;
        let referral = WhoisRecord::parse(domain, &text)
            .referral()
            .filter(|r| r != failed && r != IANA_WHOIS)
            .ok_or_else(|| anyhow!("No alternative WHOIS server for {domain}"))?;

        log::debug!("IANA refers {domain} to {referral}");
        let text = self.query_whois_server(&referral, domain).await?;
        Ok(WhoisRecord::parse(domain, &text))
    }

    /// Resolve `host` to its addresses. An empty list means the name has no records.
    pub async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>> {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        match timeout(self.dns_timeout, self.resolver.lookup_ip(host)).await? {
            Ok(lookup) => Ok(lookup.iter().collect()),
            Err(e) if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) => {
                log::debug!("No DNS records for {host}");
                Ok(Vec::new())
            }
            Err(e) => Err(anyhow!("DNS lookup for {host} failed: {e}")),
        }
    }

    /// Query a WHOIS server directly. Port 43 unless `server` names one.
    async fn query_whois_server(&self, server: &str, domain: &str) -> Result<String> {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpStream;

        let address = if server.contains(':') {
            server.to_string()
        } else {
            format!("{server}:43")
        };
        let mut stream = TcpStream::connect(address).await?;
        stream.write_all(format!("{domain}\r\n").as_bytes()).await?;

        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await?;
        let response = String::from_utf8_lossy(&buf).into_owned();

        if response.trim().is_empty() {
            return Err(anyhow!("Empty WHOIS response from {server}"));
        }

        Ok(response)
    }
}

/// WHOIS server for the TLD of `domain`
pub fn whois_server(domain: &str) -> &'static str {
    static SERVERS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
        HashMap::from([
            ("com", "whois.verisign-grs.com"),
            ("net", "whois.verisign-grs.com"),
            ("org", "whois.pir.org"),
            ("info", "whois.afilias.net"),
            ("biz", "whois.nic.biz"),
            ("io", "whois.nic.io"),
            ("co", "whois.nic.co"),
            ("me", "whois.nic.me"),
            ("xyz", "whois.nic.xyz"),
            ("top", "whois.nic.top"),
            ("online", "whois.nic.online"),
            ("site", "whois.nic.site"),
            ("us", "whois.nic.us"),
            ("uk", "whois.nic.uk"),
            ("de", "whois.denic.de"),
            ("fr", "whois.afnic.fr"),
            ("it", "whois.nic.it"),
            ("nl", "whois.domain-registry.nl"),
            ("pl", "whois.dns.pl"),
            ("au", "whois.auda.org.au"),
            ("ca", "whois.cira.ca"),
            ("jp", "whois.jprs.jp"),
            ("cn", "whois.cnnic.cn"),
            ("in", "whois.registry.in"),
            ("ru", "whois.tcinet.ru"),
            ("br", "whois.registro.br"),
            ("mx", "whois.mx"),
            ("tk", "whois.dot.tk"),
            ("ml", "whois.dot.ml"),
            ("ga", "whois.dot.ga"),
            ("cf", "whois.dot.cf"),
        ])
    });

    let tld = domain.rsplit('.').next().unwrap_or(domain);
    SERVERS.get(tld).copied().unwrap_or(IANA_WHOIS)
}
