/// Minimal domain hierarchy utilities
pub struct DomainUtils;

impl DomainUtils {
    /// Check if domain matches any in list (with hierarchy support)
    pub fn matches_domain_list<S: AsRef<str>>(domain: &str, domain_list: &[S]) -> bool {
        let domain_lower = domain.trim_end_matches('.').to_lowercase();
        if domain_lower.is_empty() {
            return false;
        }

        domain_list.iter().any(|pattern| {
            let pattern_lower = pattern.as_ref().to_lowercase();
            domain_lower == pattern_lower || domain_lower.ends_with(&format!(".{pattern_lower}"))
        })
    }

    /// Canonicalize domain (remove www prefix)
    pub fn canonicalize_domain(domain: &str) -> String {
        let domain_lower = domain.to_lowercase();
        if let Some(stripped) = domain_lower.strip_prefix("www.") {
            stripped.to_string()
        } else {
            domain_lower
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_domain_list() {
        let domains = vec!["example.com".to_string(), "at.ua".to_string()];

        assert!(DomainUtils::matches_domain_list("example.com", &domains));
        assert!(DomainUtils::matches_domain_list("mail.example.com", &domains));
        assert!(DomainUtils::matches_domain_list("Evil.AT.UA.", &domains));
        assert!(!DomainUtils::matches_domain_list("notexample.com", &domains));
        assert!(!DomainUtils::matches_domain_list("other.com", &domains));
        assert!(!DomainUtils::matches_domain_list("", &domains));

        assert!(DomainUtils::matches_domain_list("bit.ly", &["bit.ly", "t.co"]));
    }

    #[test]
    fn test_canonicalize_domain() {
        assert_eq!(
            DomainUtils::canonicalize_domain("www.example.com"),
            "example.com"
        );
        assert_eq!(
            DomainUtils::canonicalize_domain("Example.com"),
            "example.com"
        );
    }
}
