//! Host string helpers shared by dispatch and domain ownership checks.
//!
//! All functions are pure and operate on borrowed strings. Hosts are
//! treated literally: nothing here lower-cases or validates labels.

/// Returned by [`split_host_port`] when the port segment is not a TCP port
/// number. The domain part is still available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidPort<'a> {
    pub domain: &'a str,
}

/// Split `host` on its last colon into domain and port.
///
/// Without a colon the whole string is the domain and `default_port` is
/// used. The port must fit in `0..=65535`; `host:70000` is rejected like
/// any other non-numeric port.
pub fn split_host_port(host: &str, default_port: u16) -> Result<(&str, u16), InvalidPort<'_>> {
    match host.rsplit_once(':') {
        Some((domain, port)) => port
            .parse::<u16>()
            .map(|port| (domain, port))
            .map_err(|_| InvalidPort { domain }),
        None => Ok((host, default_port)),
    }
}

/// Everything before the first colon. `None` only for an empty host.
#[must_use]
pub fn drop_port(host: &str) -> Option<&str> {
    if host.is_empty() {
        return None;
    }
    Some(host.split_once(':').map_or(host, |(domain, _)| domain))
}

/// Drop the leftmost label: `a.b.com` becomes `b.com`. A single label is
/// returned unchanged.
#[must_use]
pub fn base_domain(domain: &str) -> &str {
    domain.split_once('.').map_or(domain, |(_, rest)| rest)
}

/// Single-level wildcard form: `a.b.com` becomes `*.b.com`.
#[must_use]
pub fn wildcard_form(domain: &str) -> String {
    format!("*.{}", base_domain(domain))
}

/// Last two labels, approximating the registrable domain.
#[must_use]
pub fn top_fqdn(domain: &str) -> &str {
    match domain.rmatch_indices('.').nth(1) {
        Some((idx, _)) => &domain[idx + 1..],
        None => domain,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_with_port() {
        assert_eq!(split_host_port("example.com:8443", 443), Ok(("example.com", 8443)));
    }

    #[test]
    fn split_without_port_uses_default() {
        assert_eq!(split_host_port("example.com", 443), Ok(("example.com", 443)));
    }

    #[test]
    fn split_uses_last_colon() {
        assert_eq!(split_host_port("a:b:80", 443), Ok(("a:b", 80)));
    }

    #[test]
    fn split_invalid_port_keeps_domain() {
        assert_eq!(
            split_host_port("example.com:http", 443),
            Err(InvalidPort {
                domain: "example.com"
            })
        );
        assert!(split_host_port("example.com:-1", 443).is_err());
    }

    #[test]
    fn split_rejects_ports_beyond_u16() {
        assert_eq!(split_host_port("host:65535", 80), Ok(("host", 65535)));
        assert_eq!(
            split_host_port("host:70000", 80),
            Err(InvalidPort { domain: "host" })
        );
    }

    #[test]
    fn drop_port_variants() {
        assert_eq!(drop_port("example.com:8080"), Some("example.com"));
        assert_eq!(drop_port("example.com"), Some("example.com"));
        assert_eq!(drop_port(""), None);
    }

    #[test]
    fn base_domain_drops_first_label() {
        assert_eq!(base_domain("a.b.com"), "b.com");
        assert_eq!(base_domain("b.com"), "com");
        assert_eq!(base_domain("com"), "com");
    }

    #[test]
    fn wildcard_forms() {
        assert_eq!(wildcard_form("a.b.com"), "*.b.com");
        assert_eq!(wildcard_form("b.com"), "*.com");
        assert_eq!(wildcard_form("com"), "*.com");
    }

    #[test]
    fn top_fqdn_keeps_last_two_labels() {
        assert_eq!(top_fqdn("a.b.example.com"), "example.com");
        assert_eq!(top_fqdn("example.com"), "example.com");
        assert_eq!(top_fqdn("localhost"), "localhost");
    }
}
