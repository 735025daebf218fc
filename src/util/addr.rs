// (c) 2025 peerlink developers

//! Local address discovery and classification
//!
//! [`private_ipv4`] answers "which RFC1918 address should this peer
//! advertise on the local network?". The probe opens a UDP socket and
//! `connect`s it towards each private range in turn; no packets are sent,
//! but the kernel picks the source address it would route from, which is
//! exactly the answer we want.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

/// Returns this host's private (RFC1918) IPv4 address, if it has one.
#[must_use]
pub fn private_ipv4() -> Option<Ipv4Addr> {
    // Ordered probes: one per RFC1918 range, then a public target in case
    // the default route interface carries a private address anyway.
    const PROBE_TARGETS: [Ipv4Addr; 4] = [
        Ipv4Addr::new(10, 254, 254, 254),
        Ipv4Addr::new(192, 168, 254, 254),
        Ipv4Addr::new(172, 31, 254, 254),
        Ipv4Addr::new(192, 0, 2, 1),
    ];
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    for target in PROBE_TARGETS {
        if socket.connect((target, 9)).is_err() {
            continue;
        }
        if let Ok(SocketAddr::V4(local)) = socket.local_addr() {
            if is_private(IpAddr::V4(*local.ip())) {
                return Some(*local.ip());
            }
        }
    }
    None
}

/// Whether `address` is in private (site-local) space: RFC1918 for v4,
/// unique-local (`fc00::/7`) for v6.
#[must_use]
pub fn is_private(address: IpAddr) -> bool {
    match address {
        IpAddr::V4(v4) => v4.is_private(),
        IpAddr::V6(v6) => (v6.octets()[0] & 0xfe) == 0xfc,
    }
}

/// Whether `address` is globally routable: not private, loopback,
/// link-local, carrier-grade NAT, documentation, multicast, reserved,
/// broadcast or unspecified.
#[must_use]
pub fn is_public(address: IpAddr) -> bool {
    match address {
        IpAddr::V4(v4) => {
            let [b1, b2, b3, _] = v4.octets();
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || (b1 == 100 && (64..=127).contains(&b2)) // CGNAT, RFC6598
                || (b1 == 192 && b2 == 0 && b3 == 2)       // TEST-NET-1
                || (b1 == 198 && b2 == 51 && b3 == 100)    // TEST-NET-2
                || (b1 == 203 && b2 == 0 && b3 == 113)     // TEST-NET-3
                || v4.is_multicast()
                || b1 >= 240                               // reserved + broadcast
                || v4.is_unspecified())
        }
        // 2000::/3 is the currently-allocated global unicast block.
        IpAddr::V6(v6) => (v6.octets()[0] & 0xe0) == 0x20,
    }
}

#[cfg(test)]
mod tests {
    use super::{is_private, is_public, private_ipv4};
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    fn v4(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(a, b, c, d))
    }

    #[test]
    fn private_ranges() {
        assert!(is_private(v4(10, 0, 0, 1)));
        assert!(is_private(v4(172, 16, 0, 1)));
        assert!(is_private(v4(172, 31, 255, 255)));
        assert!(is_private(v4(192, 168, 1, 1)));
        assert!(!is_private(v4(172, 32, 0, 1)));
        assert!(!is_private(v4(8, 8, 8, 8)));
    }

    #[test]
    fn public_exclusions() {
        assert!(is_public(v4(8, 8, 8, 8)));
        assert!(!is_public(v4(127, 0, 0, 1)));
        assert!(!is_public(v4(169, 254, 1, 1)));
        assert!(!is_public(v4(100, 64, 0, 1)));
        assert!(!is_public(v4(100, 127, 255, 255)));
        assert!(is_public(v4(100, 128, 0, 1)));
        assert!(!is_public(v4(192, 0, 2, 55)));
        assert!(!is_public(v4(198, 51, 100, 1)));
        assert!(!is_public(v4(203, 0, 113, 1)));
        assert!(!is_public(v4(224, 0, 0, 1)));
        assert!(!is_public(v4(255, 255, 255, 255)));
        assert!(!is_public(v4(0, 0, 0, 0)));
        assert!(!is_public(v4(10, 1, 2, 3)));
    }

    #[test]
    fn v6_classification() {
        let ula: IpAddr = Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 1).into();
        let global: IpAddr = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1).into();
        assert!(is_private(ula));
        assert!(!is_private(global));
        assert!(is_public(global));
        assert!(!is_public(ula));
    }

    #[test]
    fn probe_result_is_private_if_any() {
        // Hosts without a private address legitimately return None.
        if let Some(found) = private_ipv4() {
            assert!(is_private(IpAddr::V4(found)));
        }
    }
}
