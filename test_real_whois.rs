#![allow(clippy::uninlined_format_args)]

use phish_detect::domain_age::{registrable_domain, whois_server, DomainLookup};
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    println!("Testing REAL WHOIS and DNS lookups...");

    let lookup = DomainLookup::new(Duration::from_secs(10), Duration::from_secs(5));

    let test_hosts = vec![
        "www.google.com",
        "example.com",
        "github.com",
        "8csdg3iejj.lilagoraj.pl",
        "does-not-exist-7f3a9c.com",
    ];

    for host in test_hosts {
        let domain = registrable_domain(host);
        println!(
            "\n=== Testing host: {} (domain: {}, server: {}) ===",
            host,
            domain,
            whois_server(&domain)
        );

        match lookup.whois(host).await {
            Ok(record) => {
                println!("✅ WHOIS answered");
                println!("  Mentions domain: {}", record.mentions_domain());
                match record.age_days() {
                    Some(days) => println!("  Age: {} days", days),
                    None => println!("  Age: unknown (no creation date)"),
                }
                match record.registration_days() {
                    Some(days) => println!("  Registration length: {} days", days),
                    None => println!("  Registration length: unknown"),
                }
            }
            Err(e) => {
                println!("❌ WHOIS failed: {}", e);
                println!("  This could be due to:");
                println!("    - WHOIS rate limits");
                println!("    - Network connectivity issues");
                println!("    - Domain doesn't exist");
            }
        }

        match lookup.resolve(host).await {
            Ok(addresses) if addresses.is_empty() => println!("🚨 No DNS records"),
            Ok(addresses) => println!("✅ Resolves to {:?}", addresses),
            Err(e) => println!("❌ DNS failed: {}", e),
        }
    }

    Ok(())
}
