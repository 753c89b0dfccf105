//! Virtual-host classification.
//!
//! Every inbound connection is routed by its declared host: exact match
//! only, case-insensitive, port-stripped. A pure decision with no state.

/// Which surface a connection is destined for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostClass {
    /// Administrative REST surface.
    Admin,
    /// Sandbox-bound proxy surface.
    Proxy,
    /// Neither configured hostname matched.
    Unknown,
}

/// Classifies requests by virtual host against the two configured
/// hostnames.
#[derive(Debug, Clone)]
pub struct HostRouter {
    admin_host: String,
    proxy_host: String,
}

impl HostRouter {
    /// Hostnames are normalized once at construction.
    pub fn new(admin_host: &str, proxy_host: &str) -> Self {
        Self {
            admin_host: normalize(admin_host),
            proxy_host: normalize(proxy_host),
        }
    }

    /// Classify a request's declared host (`Host` header or URI
    /// authority). `None` or unmatched hosts are `Unknown`.
    pub fn classify(&self, host: Option<&str>) -> HostClass {
        let Some(host) = host else {
            return HostClass::Unknown;
        };
        let normalized = normalize(host);
        if normalized == self.admin_host {
            HostClass::Admin
        } else if normalized == self.proxy_host {
            HostClass::Proxy
        } else {
            HostClass::Unknown
        }
    }
}

/// Lowercase and strip any `:port` suffix. Bracketed IPv6 literals keep
/// their colons; the brackets themselves are dropped so `::1` and
/// `[::1]:8080` compare equal.
fn normalize(host: &str) -> String {
    let host = host.trim();
    let stripped = if let Some(rest) = host.strip_prefix('[') {
        match rest.find(']') {
            Some(end) => &rest[..end],
            None => rest,
        }
    } else {
        host.split(':').next().unwrap_or_default()
    };
    stripped.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> HostRouter {
        HostRouter::new("api.example.com", "proxy.example.com")
    }

    #[test]
    fn exact_hosts_classify() {
        let r = router();
        assert_eq!(r.classify(Some("api.example.com")), HostClass::Admin);
        assert_eq!(r.classify(Some("proxy.example.com")), HostClass::Proxy);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let r = router();
        assert_eq!(r.classify(Some("API.Example.COM")), HostClass::Admin);
        assert_eq!(r.classify(Some("Proxy.Example.Com")), HostClass::Proxy);
    }

    #[test]
    fn ports_are_stripped() {
        let r = router();
        assert_eq!(r.classify(Some("api.example.com:8080")), HostClass::Admin);
        assert_eq!(r.classify(Some("proxy.example.com:443")), HostClass::Proxy);
    }

    #[test]
    fn configured_hosts_may_carry_ports_too() {
        let r = HostRouter::new("localhost:3000", "proxy.localhost:3000");
        assert_eq!(r.classify(Some("localhost")), HostClass::Admin);
        assert_eq!(r.classify(Some("proxy.localhost:9999")), HostClass::Proxy);
    }

    #[test]
    fn bracketed_ipv6_literals_keep_their_colons() {
        let r = HostRouter::new("::1", "proxy.example.com");
        assert_eq!(r.classify(Some("[::1]")), HostClass::Admin);
        assert_eq!(r.classify(Some("[::1]:8080")), HostClass::Admin);

        let r = HostRouter::new("[2001:db8::1]:443", "proxy.example.com");
        assert_eq!(r.classify(Some("[2001:DB8::1]")), HostClass::Admin);
        assert_eq!(r.classify(Some("[2001:db8::2]")), HostClass::Unknown);
    }

    #[test]
    fn unmatched_and_missing_hosts_are_unknown() {
        let r = router();
        assert_eq!(r.classify(Some("other.example.com")), HostClass::Unknown);
        assert_eq!(r.classify(Some("api.example.com.evil.com")), HostClass::Unknown);
        assert_eq!(r.classify(None), HostClass::Unknown);
    }
}
