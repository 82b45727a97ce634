#![forbid(unsafe_code)]

//! CIDR containment properties (`spec.md` §8: "0.0.0.0/0 contains every IPv4
//! address; a.b.c.d/32 contains only itself").

use proptest::prelude::*;

use osiris_relay::core::socket_address::{CidrBlock, SocketAddress};

fn v4(a: u8, b: u8, c: u8, d: u8, port: u16) -> SocketAddress {
    format!("{a}.{b}.{c}.{d}:{port}").parse().unwrap()
}

proptest! {
    #[test]
    fn default_route_contains_every_v4_address(
        a in any::<u8>(), b in any::<u8>(), c in any::<u8>(), d in any::<u8>(), port in any::<u16>(),
    ) {
        let block: CidrBlock = "0.0.0.0/0".parse().unwrap();
        prop_assert!(block.does_contain_address(&v4(a, b, c, d, port)));
    }

    #[test]
    fn slash_32_contains_only_itself(
        a in any::<u8>(), b in any::<u8>(), c in any::<u8>(), d in any::<u8>(),
        other_d in any::<u8>(),
    ) {
        let block: CidrBlock = format!("{a}.{b}.{c}.{d}/32").parse().unwrap();
        prop_assert!(block.does_contain_address(&v4(a, b, c, d, 1)));
        if other_d != d {
            prop_assert!(!block.does_contain_address(&v4(a, b, c, other_d, 1)));
        }
    }

    /// Containment at prefix length N is exactly agreement on the leading N
    /// bits of the address, regardless of where a byte boundary falls.
    #[test]
    fn containment_matches_leading_bits(
        prefix_addr in any::<u32>(), test_addr in any::<u32>(), prefix_len in 0u16..=32,
    ) {
        let p = std::net::Ipv4Addr::from(prefix_addr);
        let t = std::net::Ipv4Addr::from(test_addr);
        let block: CidrBlock = format!("{p}/{prefix_len}").parse().unwrap();
        let contained = block.does_contain_address(&v4(
            t.octets()[0], t.octets()[1], t.octets()[2], t.octets()[3], 1,
        ));

        let shift = if prefix_len == 0 { 32 } else { 32 - prefix_len as u32 };
        let mask: u32 = if prefix_len == 0 { 0 } else { u32::MAX << shift };
        let expected = (prefix_addr & mask) == (test_addr & mask);

        prop_assert_eq!(contained, expected);
    }
}
