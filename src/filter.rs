use std::net::IpAddr;

/// Whether a foreign address can be placed on a map.
///
/// Excludes loopback (`127.*`), this-network (`0.*`), `10.*`, the `*`
/// wildcard and the IPv6 unspecified address. The 172.16/12 and
/// 192.168/16 private ranges are deliberately left in.
pub fn is_routable(address: &str) -> bool {
    if address.contains('*') {
        return false;
    }

    let bare = address.trim_start_matches('[').trim_end_matches(']');

    match bare.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => !matches!(ip.octets()[0], 0 | 10 | 127),
        Ok(IpAddr::V6(ip)) => !ip.is_unspecified(),
        Err(_)             => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excluded_destinations() {
        let cases = [
            ("127.0.0.1", false),
            ("10.0.0.5",  false),
            ("0.0.0.0",   false),
            ("::",        false),
            ("8.8.8.8",   true),
        ];

        for (address, routable) in cases.iter() {
            assert_eq!(is_routable(address), *routable, "{}", address);
        }
    }

    #[test]
    fn literal_forms() {
        assert!(!is_routable("[::]"));
        assert!(!is_routable("*"));
        assert!(!is_routable("127.53.0.1"));
        assert!(is_routable("[2606:4700::6810:84e5]"));
        assert!(is_routable("192.168.1.1"));
        assert!(is_routable("172.16.0.1"));
        assert!(is_routable("100.10.0.1"));
    }
}
