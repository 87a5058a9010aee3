//! URL validation for remote-fetch inputs.
//!
//! Only `http`/`https` are accepted, and hosts that resolve syntactically to
//! loopback, private, link-local or otherwise reserved address space are
//! refused. Hostnames are not resolved; only `localhost` is blocked by name.

use crate::validate::ValidationResult;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Longest accepted URL, in characters.
pub const MAX_URL_LEN: usize = 2048;

const ALLOWED_SCHEMES: [&str; 2] = ["http", "https"];

/// Literal addresses refused as "localhost" rather than as private space.
const LOCAL_HOSTS: [IpAddr; 3] = [
    IpAddr::V4(Ipv4Addr::LOCALHOST),
    IpAddr::V4(Ipv4Addr::UNSPECIFIED),
    IpAddr::V6(Ipv6Addr::LOCALHOST),
];

/// Validate a user-supplied URL before anything is fetched from it.
pub fn validate_url(raw: &str) -> ValidationResult {
    if raw.is_empty() {
        return ValidationResult::rejected("URL cannot be empty");
    }
    if raw.chars().count() > MAX_URL_LEN {
        return ValidationResult::rejected(format!(
            "URL too long (max {MAX_URL_LEN} characters)"
        ));
    }

    let url = match Url::parse(raw) {
        Ok(u) => u,
        Err(e) => return ValidationResult::rejected(format!("Invalid URL: {e}")),
    };

    if !ALLOWED_SCHEMES.contains(&url.scheme()) {
        return ValidationResult::rejected(format!(
            "URL scheme '{}' not allowed (use http/https)",
            url.scheme()
        ));
    }

    match url.host() {
        None => ValidationResult::rejected("Invalid URL: missing host"),
        Some(Host::Domain(domain)) => {
            if domain.eq_ignore_ascii_case("localhost") {
                ValidationResult::rejected("Cannot access localhost")
            } else {
                ValidationResult::ok()
            }
        }
        Some(Host::Ipv4(ip)) => check_ip(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => check_ip(IpAddr::V6(ip)),
    }
}

fn check_ip(ip: IpAddr) -> ValidationResult {
    if LOCAL_HOSTS.contains(&ip) {
        return ValidationResult::rejected("Cannot access localhost");
    }
    if is_blocked(ip) {
        return ValidationResult::rejected("Cannot access private network addresses");
    }
    ValidationResult::ok()
}

/// Private, loopback, link-local, documentation and reserved ranges.
pub fn is_blocked(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_v4(v4),
        IpAddr::V6(v6) => is_blocked_v6(v6),
    }
}

fn is_blocked_v4(ip: Ipv4Addr) -> bool {
    let [a, b, c, _] = ip.octets();
    ip.is_unspecified()
        || a == 0
        || ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_broadcast()
        // 192.0.0.0/24 protocol assignments
        || (a == 192 && b == 0 && c == 0)
        || ip.is_documentation()
        // 198.18.0.0/15 benchmarking
        || (a == 198 && (b & 0xfe) == 18)
        // 240.0.0.0/4 reserved
        || a >= 240
}

fn is_blocked_v6(ip: Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_blocked_v4(mapped);
    }
    let s = ip.segments();
    let global_unicast = (s[0] & 0xe000) == 0x2000;
    let multicast = (s[0] & 0xff00) == 0xff00;
    // Everything outside 2000::/3 and ff00::/8 is unspecified, loopback,
    // unique local (fc00::/7), link/site-local (fe80::/10, fec0::/10) or
    // IETF-reserved space (::/8, 100::/8, 200::/7 ... fe00::/9).
    (!global_unicast && !multicast)
        // 2001::/23 IETF protocol assignments
        || (s[0] == 0x2001 && s[1] < 0x0200)
        // 2001:db8::/32 documentation
        || (s[0] == 0x2001 && s[1] == 0x0db8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_public_urls() {
        for url in [
            "https://example.com/doc.md",
            "http://example.com:8080/a?b=c",
            "https://8.8.8.8/file.pdf",
            "https://[2606:4700::1111]/x",
            "https://[2a00:1450::1]/",
            "https://[ff02::1]/",
            "https://100.64.0.1/",
            "https://224.0.0.1/",
        ] {
            assert!(validate_url(url).is_valid(), "{url} should be accepted");
        }
    }

    #[test]
    fn test_rejects_localhost() {
        for url in [
            "http://localhost/",
            "http://LOCALHOST:3000/",
            "http://127.0.0.1/",
            "http://0.0.0.0/",
            "http://[::1]/",
        ] {
            assert_eq!(
                validate_url(url).error(),
                Some("Cannot access localhost"),
                "{url}"
            );
        }
    }

    #[test]
    fn test_rejects_private_ranges() {
        for url in [
            "http://10.0.0.1/",
            "http://172.16.5.4/",
            "http://172.31.255.255/",
            "http://192.168.1.1/",
            "http://169.254.169.254/latest/meta-data",
            "http://127.8.9.1/",
            "http://192.0.2.10/",
            "http://198.18.0.1/",
            "http://240.1.2.3/",
            "http://255.255.255.255/",
            "http://[fd00::1]/",
            "http://[fe80::1]/",
            "http://[::ffff:10.0.0.1]/",
            "http://[2001:db8::1]/",
            "http://[::]/",
            "http://[100:1::1]/",
            "http://[200::1]/",
            "http://[1000::1]/",
            "http://[4000::1]/",
            "http://[8000::1]/",
            "http://[e000::1]/",
            "http://[f800::1]/",
            "http://[fe00::1]/",
        ] {
            assert_eq!(
                validate_url(url).error(),
                Some("Cannot access private network addresses"),
                "{url}"
            );
        }
    }

    #[test]
    fn test_public_edges_of_private_ranges() {
        assert!(validate_url("http://172.15.255.255/").is_valid());
        assert!(validate_url("http://172.32.0.1/").is_valid());
        assert!(validate_url("http://11.0.0.1/").is_valid());
    }

    #[test]
    fn test_rejects_bad_schemes() {
        let v = validate_url("ftp://example.com/file");
        assert_eq!(
            v.error(),
            Some("URL scheme 'ftp' not allowed (use http/https)")
        );
        assert!(!validate_url("javascript:alert(1)").is_valid());
        assert!(!validate_url("file:///etc/passwd").is_valid());
    }

    #[test]
    fn test_rejects_empty_long_and_malformed() {
        assert_eq!(validate_url("").error(), Some("URL cannot be empty"));

        let long = format!("https://example.com/{}", "a".repeat(MAX_URL_LEN));
        assert!(validate_url(&long).error().unwrap().contains("too long"));

        let at_limit = format!("https://e.com/{}", "a".repeat(MAX_URL_LEN - 14));
        assert_eq!(at_limit.len(), MAX_URL_LEN);
        assert!(validate_url(&at_limit).is_valid());

        assert!(validate_url("not a url")
            .error()
            .unwrap()
            .starts_with("Invalid URL"));
    }
}
