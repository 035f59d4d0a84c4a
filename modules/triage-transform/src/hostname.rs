//! Hostname → registrable domain.
//!
//! Reports are grouped by the public-suffix-aware "root" of their URL's host
//! (`www.example.co.uk` → `example.co.uk`). Lookups are memoized in a
//! [`HostnameNormalizer`] that lives for one pipeline run only, so a
//! long-lived worker never accumulates state across requests.

use std::collections::HashMap;
use std::net::IpAddr;

use triage_common::UNKNOWN_DOMAIN;
use url::Url;

/// Per-run memo of hostname → registrable domain.
#[derive(Debug, Default)]
pub struct HostnameNormalizer {
    cache: HashMap<String, String>,
    lookups: usize,
}

impl HostnameNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registrable domain for `hostname`, computing it at most once per run.
    pub fn normalize(&mut self, hostname: &str) -> String {
        if let Some(domain) = self.cache.get(hostname) {
            return domain.clone();
        }
        let domain = registrable_domain(hostname);
        self.lookups += 1;
        self.cache.insert(hostname.to_string(), domain.clone());
        domain
    }

    /// Root domain of a full URL; unparseable URLs and host-less URLs land
    /// in the `[unknown]` bucket.
    pub fn root_domain_of(&mut self, url: &str) -> String {
        match Url::parse(url) {
            Ok(parsed) => match parsed.host_str() {
                Some(host) if !host.is_empty() => self.normalize(host),
                _ => UNKNOWN_DOMAIN.to_string(),
            },
            Err(_) => UNKNOWN_DOMAIN.to_string(),
        }
    }

    /// Number of suffix-list lookups actually performed.
    pub fn lookups(&self) -> usize {
        self.lookups
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// Unmemoized lookup. IP literals are returned unchanged.
pub fn registrable_domain(hostname: &str) -> String {
    if is_ip_literal(hostname) {
        return hostname.to_string();
    }
    psl::domain_str(hostname)
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN_DOMAIN.to_string())
}

/// IPv4 or IPv6 literal, with or without the URL brackets around IPv6.
fn is_ip_literal(hostname: &str) -> bool {
    let bare = hostname
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(hostname);
    bare.parse::<IpAddr>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_subdomains_to_registrable_domain() {
        assert_eq!(registrable_domain("www.example.com"), "example.com");
        assert_eq!(registrable_domain("a.b.example.com"), "example.com");
        assert_eq!(registrable_domain("www.example.co.uk"), "example.co.uk");
        assert_eq!(registrable_domain("example.com"), "example.com");
    }

    #[test]
    fn ip_literals_pass_through() {
        assert_eq!(registrable_domain("192.168.1.20"), "192.168.1.20");
        assert_eq!(registrable_domain("::1"), "::1");
        assert_eq!(registrable_domain("[2001:db8::1]"), "[2001:db8::1]");
    }

    #[test]
    fn bare_suffixes_have_no_registrable_domain() {
        assert_eq!(registrable_domain("co.uk"), UNKNOWN_DOMAIN);
        assert_eq!(registrable_domain("localhost"), UNKNOWN_DOMAIN);
        assert_eq!(registrable_domain(""), UNKNOWN_DOMAIN);
    }

    #[test]
    fn repeated_hosts_are_looked_up_once() {
        let mut normalizer = HostnameNormalizer::new();
        for _ in 0..50 {
            assert_eq!(normalizer.normalize("www.example.com"), "example.com");
        }
        assert_eq!(normalizer.normalize("m.example.com"), "example.com");
        assert_eq!(normalizer.lookups(), 2);
        assert_eq!(normalizer.len(), 2);
    }

    #[test]
    fn root_domain_of_urls() {
        let mut normalizer = HostnameNormalizer::new();
        assert_eq!(
            normalizer.root_domain_of("https://shop.example.co.uk/cart?id=1"),
            "example.co.uk"
        );
        assert_eq!(normalizer.root_domain_of("http://10.0.0.1:8080/"), "10.0.0.1");
        assert_eq!(normalizer.root_domain_of("http://[::1]/admin"), "[::1]");
        assert_eq!(normalizer.root_domain_of("not a url"), UNKNOWN_DOMAIN);
        assert_eq!(normalizer.root_domain_of("about:blank"), UNKNOWN_DOMAIN);
    }

    #[test]
    fn fresh_normalizer_has_no_state() {
        let mut first = HostnameNormalizer::new();
        first.normalize("www.example.com");
        let second = HostnameNormalizer::new();
        assert!(second.is_empty());
        assert_eq!(second.lookups(), 0);
    }
}
