// Address and address-block validation helpers

use std::net::{Ipv4Addr, Ipv6Addr};

/// Returns true if `s` is a dotted-quad IPv4 address without leading zeros.
pub fn is_valid_ipv4(s: &str) -> bool {
    s.parse::<Ipv4Addr>().is_ok()
}

/// Returns true if `s` is an IPv6 address (compressed forms allowed).
pub fn is_valid_ipv6(s: &str) -> bool {
    s.parse::<Ipv6Addr>().is_ok()
}

/// Returns true if `s` is either an IPv4 or IPv6 address.
pub fn is_valid_ip(s: &str) -> bool {
    is_valid_ipv4(s) || is_valid_ipv6(s)
}

/// Returns true if `s` is an address block such as `10.0.0.0/8` or `2001:db8::/32`.
pub fn is_valid_cidr(s: &str) -> bool {
    let Some((addr, prefix)) = s.split_once('/') else {
        return false;
    };

    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let Ok(prefix) = prefix.parse::<u8>() else {
        return false;
    };

    if is_valid_ipv4(addr) {
        prefix <= 32
    } else if is_valid_ipv6(addr) {
        prefix <= 128
    } else {
        false
    }
}

/// Returns true if `s` is a valid address or address block.
pub fn is_valid_ip_or_cidr(s: &str) -> bool {
    is_valid_ip(s) || is_valid_cidr(s)
}
