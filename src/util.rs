// Helpers for host/port handling and name resolution.

use std::io;
use std::net::SocketAddr;

/// Split an authority of the form `host:port` or `[v6]:port`.
///
/// The split happens on the last colon; brackets around an IPv6 literal are
/// removed from the returned host. Returns `None` when there is no colon.
pub fn split_host_port(authority: &str) -> Option<(&str, &str)> {
    if let Some(rest) = authority.strip_prefix('[') {
        let close = rest.find(']')?;
        let port = rest[close + 1..].strip_prefix(':')?;
        return Some((&rest[..close], port));
    }
    authority.rsplit_once(':')
}

pub async fn resolve_host(host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
    // Literal addresses skip the resolver entirely
    if let Ok(ip) = host.parse::<std::net::IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, port)]);
    }

    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port)).await?.collect();
    if addrs.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Could not resolve hostname: {}", host),
        ));
    }
    Ok(addrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_last_colon() {
        assert_eq!(split_host_port("example.com:443"), Some(("example.com", "443")));
        assert_eq!(split_host_port("a:b:8388"), Some(("a:b", "8388")));
        assert_eq!(split_host_port("example.com"), None);
        assert_eq!(split_host_port(":443"), Some(("", "443")));
    }

    #[test]
    fn strips_ipv6_brackets() {
        assert_eq!(split_host_port("[::1]:8443"), Some(("::1", "8443")));
        assert_eq!(split_host_port("[2001:db8::1]"), None);
        assert_eq!(split_host_port("[::1"), None);
    }

    #[tokio::test]
    async fn literal_ip_resolves_without_lookup() {
        let addrs = resolve_host("127.0.0.1", 9000).await.unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:9000".parse::<SocketAddr>().unwrap()]);

        let addrs = resolve_host("::1", 9000).await.unwrap();
        assert_eq!(addrs, vec!["[::1]:9000".parse::<SocketAddr>().unwrap()]);
    }
}
