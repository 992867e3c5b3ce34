//! Features computed from the URL text alone. None of these can fail.

use super::{FeatureValue, UrlParts};
use crate::domain_utils::DomainUtils;
use std::net::IpAddr;
use url::Host;

const SHORTENING_SERVICES: &[&str] = &[
    "bit.ly", "goo.gl", "shorte.st", "go2l.ink", "x.co", "ow.ly", "t.co", "tinyurl.com",
    "tr.im", "is.gd", "cli.gs", "yfrog.com", "migre.me", "ff.im", "tiny.cc", "url4.eu",
    "twit.ac", "su.pr", "twurl.nl", "snipurl.com", "short.to", "budurl.com", "ping.fm",
    "post.ly", "just.as", "bkite.com", "snipr.com", "fic.kr", "loopt.us", "doiop.com",
    "short.ie", "kl.am", "wp.me", "rubyurl.com", "om.ly", "to.ly", "bit.do", "lnkd.in",
    "db.tt", "qr.ae", "adf.ly", "bitly.com", "cur.lv", "ity.im", "q.gs", "po.st", "bc.vc",
    "twitthis.com", "u.to", "j.mp", "buzurl.com", "cutt.us", "u.bb", "yourls.org",
    "prettylinkpro.com", "scrnch.me", "filoops.info", "vzturl.com", "qr.net", "1url.com",
    "tweez.me", "v.gd", "link.zip.net", "rb.gy", "cutt.ly", "shorturl.at", "short.link",
];

/// Host is an IP literal (including hex or decimal encoded IPv4)
pub fn using_ip(parts: &UrlParts) -> FeatureValue {
    let is_ip = match parts.url.as_ref().and_then(|u| u.host()) {
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => true,
        Some(Host::Domain(_)) => false,
        None => parts
            .host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .is_ok(),
    };
    FeatureValue::flag(is_ip)
}

pub fn long_url(parts: &UrlParts) -> FeatureValue {
    match parts.raw.chars().count() {
        0..=53 => FeatureValue::LEGITIMATE,
        54..=75 => FeatureValue::SUSPICIOUS,
        _ => FeatureValue::PHISHING,
    }
}

pub fn short_url(parts: &UrlParts) -> FeatureValue {
    FeatureValue::flag(DomainUtils::matches_domain_list(&parts.host, SHORTENING_SERVICES))
}

pub fn symbol_at(parts: &UrlParts) -> FeatureValue {
    FeatureValue::flag(parts.raw.contains('@'))
}

/// A `//` past the scheme separator redirects the reader elsewhere
pub fn redirecting(parts: &UrlParts) -> FeatureValue {
    FeatureValue::flag(parts.raw.rfind("//").is_some_and(|pos| pos > 6))
}

pub fn prefix_suffix(parts: &UrlParts) -> FeatureValue {
    FeatureValue::flag(parts.host.contains('-'))
}

pub fn sub_domains(parts: &UrlParts) -> FeatureValue {
    let host = DomainUtils::canonicalize_domain(&parts.host);
    match host.matches('.').count() {
        0 | 1 => FeatureValue::LEGITIMATE,
        2 => FeatureValue::SUSPICIOUS,
        _ => FeatureValue::PHISHING,
    }
}

pub fn https(parts: &UrlParts) -> FeatureValue {
    let secure = parts.url.as_ref().is_some_and(|u| u.scheme() == "https");
    FeatureValue::flag(!secure)
}

/// Explicit port other than the web defaults
pub fn non_std_port(parts: &UrlParts) -> FeatureValue {
    let odd_port = parts
        .url
        .as_ref()
        .and_then(|u| u.port())
        .is_some_and(|port| port != 80 && port != 443);
    FeatureValue::flag(odd_port)
}

/// "https" used as a word inside the host name
pub fn https_domain_url(parts: &UrlParts) -> FeatureValue {
    FeatureValue::flag(parts.host.contains("https"))
}

/// Host, or any address it resolved to, is on the phishing statistics list
pub fn stats_report(
    parts: &UrlParts,
    addresses: Option<&[IpAddr]>,
    suspicious_hosts: &[String],
) -> FeatureValue {
    let host_listed = DomainUtils::matches_domain_list(&parts.host, suspicious_hosts);
    let address_listed = addresses.is_some_and(|addrs| {
        addrs
            .iter()
            .any(|ip| suspicious_hosts.iter().any(|h| *h == ip.to_string()))
    });
    FeatureValue::flag(host_listed || address_listed)
}
