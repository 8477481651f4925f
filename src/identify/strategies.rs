//! Identification strategies: pure mappings from a request view to a
//! candidate tenant key. Absence of a signal is None, never an error;
//! turning a key into a tenant record is the context's job.

use crate::config::{IdentificationConfig, StrategyKind};
use crate::identify::RequestView;
use std::fmt;

/// Candidate tenant key, tagged with how it must be resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TenantKey {
    /// Looked up against the `subdomain` column.
    Subdomain(String),
    /// Looked up verbatim against the `domain` column.
    Domain(String),
    /// Composite: domain lookup first, then an unconditional fallback to the
    /// subdomain lookup when one could be derived from the host.
    DomainOrSubdomain {
        domain: String,
        subdomain: Option<String>,
    },
    /// Opaque value from a path segment, header, or query param. Numeric
    /// values resolve by id, anything else as a subdomain slug.
    Value(String),
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TenantKey::Subdomain(s) | TenantKey::Value(s) => f.write_str(s),
            TenantKey::Domain(d) | TenantKey::DomainOrSubdomain { domain: d, .. } => f.write_str(d),
        }
    }
}

pub trait IdentificationStrategy: Send + Sync {
    fn identify(&self, request: &RequestView) -> Option<TenantKey>;
}

/// Strip a trailing `:port` (and IPv6 brackets) from a host, lowercased.
fn normalize_host(host: &str) -> String {
    let host = host.trim();
    if let Some(rest) = host.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return rest[..end].to_ascii_lowercase();
        }
    }
    match host.rsplit_once(':') {
        // a second colon means a bare IPv6 literal, not a port suffix
        Some((name, port))
            if !name.contains(':') && !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) =>
        {
            name.to_ascii_lowercase()
        }
        _ => host.to_ascii_lowercase(),
    }
}

/// Local/dev hosts never resolve a tenant: exact loopback/any addresses,
/// private IPv4 ranges, and the reserved dev suffixes.
fn is_dev_host(host: &str) -> bool {
    if matches!(host, "localhost" | "127.0.0.1" | "::1" | "0.0.0.0") {
        return true;
    }
    for suffix in [".test", ".local", ".example"] {
        if host.ends_with(suffix) {
            return true;
        }
    }
    let octets: Vec<u8> = host.split('.').filter_map(|o| o.parse().ok()).collect();
    if octets.len() == 4 && host.split('.').count() == 4 {
        return match (octets[0], octets[1]) {
            (10, _) => true,
            (192, 168) => true,
            (172, b) => (16..=31).contains(&b),
            _ => false,
        };
    }
    false
}

/// Derive a subdomain key from a host against a base domain. None for dev
/// hosts, hosts outside the base domain, and the bare base domain itself —
/// never a guessed first label.
fn subdomain_of(host: &str, base_domain: &str) -> Option<String> {
    let host = normalize_host(host);
    if is_dev_host(&host) {
        return None;
    }
    let rest = host.strip_suffix(base_domain)?;
    let rest = rest.strip_suffix('.').unwrap_or(rest);
    if rest.is_empty() {
        return None;
    }
    Some(rest.to_string())
}

pub struct SubdomainStrategy {
    base_domain: String,
}

impl SubdomainStrategy {
    pub fn new(base_domain: impl Into<String>) -> Self {
        SubdomainStrategy {
            base_domain: base_domain.into().to_ascii_lowercase(),
        }
    }
}

impl IdentificationStrategy for SubdomainStrategy {
    fn identify(&self, request: &RequestView) -> Option<TenantKey> {
        let host = request.host.as_deref()?;
        subdomain_of(host, &self.base_domain).map(TenantKey::Subdomain)
    }
}

/// Full host (port stripped) matched verbatim against stored domains. No
/// base-domain logic.
#[derive(Default)]
pub struct DomainStrategy;

impl IdentificationStrategy for DomainStrategy {
    fn identify(&self, request: &RequestView) -> Option<TenantKey> {
        let host = request.host.as_deref()?;
        let host = normalize_host(host);
        if host.is_empty() {
            return None;
        }
        Some(TenantKey::Domain(host))
    }
}

/// Composite: the resolved key carries both candidates; the context tries
/// the domain column first and falls back to the subdomain unconditionally.
pub struct DomainOrSubdomainStrategy {
    base_domain: String,
}

impl DomainOrSubdomainStrategy {
    pub fn new(base_domain: impl Into<String>) -> Self {
        DomainOrSubdomainStrategy {
            base_domain: base_domain.into().to_ascii_lowercase(),
        }
    }
}

impl IdentificationStrategy for DomainOrSubdomainStrategy {
    fn identify(&self, request: &RequestView) -> Option<TenantKey> {
        let host = request.host.as_deref()?;
        let domain = normalize_host(host);
        if domain.is_empty() {
            return None;
        }
        Some(TenantKey::DomainOrSubdomain {
            subdomain: subdomain_of(host, &self.base_domain),
            domain,
        })
    }
}

/// Tenant key from a path segment at a 1-indexed position.
pub struct PathStrategy {
    segment_index: usize,
}

impl PathStrategy {
    pub fn new(segment_index: usize) -> Self {
        PathStrategy {
            segment_index: segment_index.max(1),
        }
    }
}

impl IdentificationStrategy for PathStrategy {
    fn identify(&self, request: &RequestView) -> Option<TenantKey> {
        request
            .path_segments()
            .nth(self.segment_index - 1)
            .map(|s| TenantKey::Value(s.to_string()))
    }
}

/// Configured header first, then query param; either side may be disabled.
/// First non-empty trimmed value wins.
pub struct HeaderOrQueryStrategy {
    header_name: Option<String>,
    query_param: Option<String>,
}

impl HeaderOrQueryStrategy {
    pub fn new(header_name: Option<String>, query_param: Option<String>) -> Self {
        HeaderOrQueryStrategy {
            header_name,
            query_param,
        }
    }
}

impl IdentificationStrategy for HeaderOrQueryStrategy {
    fn identify(&self, request: &RequestView) -> Option<TenantKey> {
        if let Some(name) = &self.header_name {
            if let Some(v) = request.header(name).map(str::trim).filter(|v| !v.is_empty()) {
                return Some(TenantKey::Value(v.to_string()));
            }
        }
        if let Some(name) = &self.query_param {
            if let Some(v) = request.query(name).map(str::trim).filter(|v| !v.is_empty()) {
                return Some(TenantKey::Value(v.to_string()));
            }
        }
        None
    }
}

/// Priority chain: first strategy yielding a key wins.
pub struct StrategyChain {
    strategies: Vec<Box<dyn IdentificationStrategy>>,
}

impl StrategyChain {
    pub fn new(strategies: Vec<Box<dyn IdentificationStrategy>>) -> Self {
        StrategyChain { strategies }
    }
}

impl IdentificationStrategy for StrategyChain {
    fn identify(&self, request: &RequestView) -> Option<TenantKey> {
        self.strategies.iter().find_map(|s| s.identify(request))
    }
}

/// Build the configured strategy chain. A single-entry chain skips the
/// chain wrapper.
pub fn strategy_from_config(
    identification: &IdentificationConfig,
    base_domain: &str,
) -> Box<dyn IdentificationStrategy> {
    let mut strategies: Vec<Box<dyn IdentificationStrategy>> = identification
        .chain
        .iter()
        .map(|kind| -> Box<dyn IdentificationStrategy> {
            match kind {
                StrategyKind::Subdomain => Box::new(SubdomainStrategy::new(base_domain)),
                StrategyKind::Domain => Box::new(DomainStrategy),
                StrategyKind::DomainOrSubdomain => {
                    Box::new(DomainOrSubdomainStrategy::new(base_domain))
                }
                StrategyKind::Path => Box::new(PathStrategy::new(identification.path_segment_index)),
                StrategyKind::HeaderOrQuery => Box::new(HeaderOrQueryStrategy::new(
                    identification.header_name.clone(),
                    identification.query_param.clone(),
                )),
            }
        })
        .collect();
    if strategies.len() == 1 {
        strategies.pop().expect("chain checked non-empty")
    } else {
        Box::new(StrategyChain::new(strategies))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_req(host: &str) -> RequestView {
        RequestView::new(Some(host), "/")
    }

    #[test]
    fn subdomain_from_matching_host() {
        let s = SubdomainStrategy::new("example.com");
        assert_eq!(
            s.identify(&host_req("school-alpha.example.com")),
            Some(TenantKey::Subdomain("school-alpha".into()))
        );
    }

    #[test]
    fn subdomain_strips_port_and_case() {
        let s = SubdomainStrategy::new("example.com");
        assert_eq!(
            s.identify(&host_req("School-Alpha.Example.COM:8443")),
            Some(TenantKey::Subdomain("school-alpha".into()))
        );
    }

    #[test]
    fn nested_subdomain_kept_whole() {
        let s = SubdomainStrategy::new("example.com");
        assert_eq!(
            s.identify(&host_req("a.b.example.com")),
            Some(TenantKey::Subdomain("a.b".into()))
        );
    }

    #[test]
    fn bare_base_domain_is_none() {
        let s = SubdomainStrategy::new("example.com");
        assert_eq!(s.identify(&host_req("example.com")), None);
    }

    #[test]
    fn foreign_host_is_none_never_guessed() {
        let s = SubdomainStrategy::new("example.com");
        assert_eq!(s.identify(&host_req("school-alpha.other.io")), None);
    }

    #[test]
    fn dev_hosts_short_circuit() {
        let s = SubdomainStrategy::new("example.com");
        for host in [
            "localhost",
            "localhost:8080",
            "127.0.0.1",
            "::1",
            "[::1]:3000",
            "0.0.0.0",
            "10.1.2.3",
            "192.168.0.10",
            "172.16.9.1",
            "172.31.255.1",
            "myapp.test",
            "myapp.local",
            "sub.myapp.example",
        ] {
            assert_eq!(s.identify(&host_req(host)), None, "host {}", host);
        }
    }

    #[test]
    fn near_private_ranges_are_not_dev() {
        assert!(!super::is_dev_host("172.15.0.1"));
        assert!(!super::is_dev_host("172.32.0.1"));
        assert!(!super::is_dev_host("11.0.0.1"));
    }

    #[test]
    fn missing_host_is_none() {
        let s = SubdomainStrategy::new("example.com");
        assert_eq!(s.identify(&RequestView::new(None::<&str>, "/")), None);
    }

    #[test]
    fn domain_matches_verbatim_host() {
        let s = DomainStrategy;
        assert_eq!(
            s.identify(&host_req("app.customer.io:443")),
            Some(TenantKey::Domain("app.customer.io".into()))
        );
    }

    #[test]
    fn composite_carries_both_candidates() {
        let s = DomainOrSubdomainStrategy::new("example.com");
        assert_eq!(
            s.identify(&host_req("school-alpha.example.com")),
            Some(TenantKey::DomainOrSubdomain {
                domain: "school-alpha.example.com".into(),
                subdomain: Some("school-alpha".into()),
            })
        );
        assert_eq!(
            s.identify(&host_req("app.customer.io")),
            Some(TenantKey::DomainOrSubdomain {
                domain: "app.customer.io".into(),
                subdomain: None,
            })
        );
    }

    #[test]
    fn path_segment_at_index() {
        let s = PathStrategy::new(1);
        let req = RequestView::new(None::<&str>, "/school-alpha/dashboard");
        assert_eq!(s.identify(&req), Some(TenantKey::Value("school-alpha".into())));

        let s2 = PathStrategy::new(2);
        assert_eq!(s2.identify(&req), Some(TenantKey::Value("dashboard".into())));
    }

    #[test]
    fn path_missing_segment_is_none() {
        let s = PathStrategy::new(2);
        let req = RequestView::new(None::<&str>, "/dashboard");
        assert_eq!(s.identify(&req), None);
    }

    #[test]
    fn path_ignores_empty_segments() {
        let s = PathStrategy::new(1);
        let req = RequestView::new(None::<&str>, "//school-alpha//x");
        assert_eq!(s.identify(&req), Some(TenantKey::Value("school-alpha".into())));
    }

    #[test]
    fn header_wins_over_query() {
        let s = HeaderOrQueryStrategy::new(Some("X-Tenant".into()), Some("tenant".into()));
        let req = RequestView::new(None::<&str>, "/")
            .with_header("x-tenant", " 42 ")
            .with_query("tenant", "7");
        assert_eq!(s.identify(&req), Some(TenantKey::Value("42".into())));
    }

    #[test]
    fn query_used_when_header_empty_or_disabled() {
        let s = HeaderOrQueryStrategy::new(Some("X-Tenant".into()), Some("tenant".into()));
        let req = RequestView::new(None::<&str>, "/")
            .with_header("x-tenant", "   ")
            .with_query("tenant", "school-alpha");
        assert_eq!(s.identify(&req), Some(TenantKey::Value("school-alpha".into())));

        let disabled = HeaderOrQueryStrategy::new(None, Some("tenant".into()));
        let req = RequestView::new(None::<&str>, "/")
            .with_header("x-tenant", "42")
            .with_query("tenant", "7");
        assert_eq!(disabled.identify(&req), Some(TenantKey::Value("7".into())));
    }

    #[test]
    fn chain_takes_first_hit() {
        let chain = StrategyChain::new(vec![
            Box::new(HeaderOrQueryStrategy::new(Some("X-Tenant".into()), None)),
            Box::new(SubdomainStrategy::new("example.com")),
        ]);
        let req = RequestView::new(Some("beta.example.com"), "/");
        assert_eq!(chain.identify(&req), Some(TenantKey::Subdomain("beta".into())));

        let req = req.with_header("x-tenant", "7");
        assert_eq!(chain.identify(&req), Some(TenantKey::Value("7".into())));
    }
}
