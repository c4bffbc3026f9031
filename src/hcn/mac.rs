//! Deterministic MAC derivation: the same backend IP always yields the
//! same MAC (e.g. `1.1.1.1` → `02-11-01-01-01-01`).

use std::net::IpAddr;

use crate::consts::MAC_OUI_PREFIX;

/// Derives a MAC address for `addr` by prefixing the OUI onto the address's
/// low-order bytes. IPv4 contributes all four octets; IPv6 is out of scope
/// but a stable derivation (low four bytes of a hash) is kept here so the
/// type signature doesn't need to change when it lands.
#[must_use]
pub fn derive_mac(addr: IpAddr) -> String {
    let tail = match addr {
        IpAddr::V4(v4) => v4.octets(),
        IpAddr::V6(v6) => {
            let segments = v6.segments();
            let mut hash: u32 = 0;
            for segment in segments {
                hash = hash.wrapping_mul(31).wrapping_add(u32::from(segment));
            }
            hash.to_be_bytes()
        }
    };

    format!(
        "{:02X}-{:02X}-{:02X}-{:02X}-{:02X}-{:02X}",
        MAC_OUI_PREFIX[0], MAC_OUI_PREFIX[1], tail[0], tail[1], tail[2], tail[3]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_deterministic_mac_for_ipv4() {
        let mac = derive_mac("1.1.1.1".parse().unwrap());
        assert_eq!(mac, "02-11-01-01-01-01");
    }

    #[test]
    fn same_ip_always_yields_same_mac() {
        let a = derive_mac("10.0.5.9".parse().unwrap());
        let b = derive_mac("10.0.5.9".parse().unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_ips_yield_distinct_macs() {
        let a = derive_mac("10.0.5.9".parse().unwrap());
        let b = derive_mac("10.0.5.10".parse().unwrap());
        assert_ne!(a, b);
    }
}
