//! Features backed by WHOIS, DNS and reputation lookups. Each takes the
//! outcome of its own lookup; `None` means the lookup failed.

use super::FeatureValue;
use crate::domain_age::WhoisRecord;
use std::net::IpAddr;

const MIN_REGISTRATION_DAYS: u64 = 365;
const MIN_DOMAIN_AGE_DAYS: u64 = 180;
const TOP_TRAFFIC_RANK: u64 = 100_000;
const MIN_PAGE_RANK: f64 = 2.0;

pub fn domain_reg_len(whois: Option<&WhoisRecord>) -> FeatureValue {
    match whois.and_then(WhoisRecord::registration_days) {
        Some(days) => FeatureValue::flag(days < MIN_REGISTRATION_DAYS),
        None => FeatureValue::Unavailable,
    }
}

/// The WHOIS record does not describe the host's domain
pub fn abnormal_url(whois: Option<&WhoisRecord>) -> FeatureValue {
    match whois {
        Some(record) => FeatureValue::flag(!record.mentions_domain()),
        None => FeatureValue::Unavailable,
    }
}

pub fn age_of_domain(whois: Option<&WhoisRecord>) -> FeatureValue {
    match whois.and_then(WhoisRecord::age_days) {
        Some(days) => FeatureValue::flag(days < MIN_DOMAIN_AGE_DAYS),
        None => FeatureValue::Unavailable,
    }
}

pub fn dns_recording(addresses: Option<&[IpAddr]>) -> FeatureValue {
    match addresses {
        Some(addrs) => FeatureValue::flag(addrs.is_empty()),
        None => FeatureValue::Unavailable,
    }
}

pub fn website_traffic(rank: Option<Option<u64>>) -> FeatureValue {
    match rank {
        Some(Some(rank)) if rank < TOP_TRAFFIC_RANK => FeatureValue::LEGITIMATE,
        Some(Some(_)) => FeatureValue::SUSPICIOUS,
        Some(None) => FeatureValue::PHISHING,
        None => FeatureValue::Unavailable,
    }
}

pub fn page_rank(rank: Option<f64>) -> FeatureValue {
    match rank {
        Some(rank) => FeatureValue::flag(rank < MIN_PAGE_RANK),
        None => FeatureValue::Unavailable,
    }
}

pub fn google_index(indexed: Option<bool>) -> FeatureValue {
    match indexed {
        Some(indexed) => FeatureValue::flag(!indexed),
        None => FeatureValue::Unavailable,
    }
}
