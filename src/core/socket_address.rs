// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Socket addresses and CIDR containment checks.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;
use thiserror::Error;

/// A v4 or v6 socket address, ordered and hashed over its big-endian byte
/// representation so it can key the transport manager deterministically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SocketAddress {
    /// IPv4 address and port.
    V4(Ipv4Addr, u16),
    /// IPv6 address and port.
    V6(Ipv6Addr, u16),
}

/// Errors parsing a socket address or CIDR block.
#[derive(Debug, Error)]
pub enum AddressParseError {
    /// Malformed socket address string.
    #[error("invalid socket address")]
    InvalidAddress,
    /// Malformed CIDR block string (expected `addr/prefix_len`).
    #[error("invalid cidr block")]
    InvalidCidr,
}

impl SocketAddress {
    /// Port component.
    pub fn port(&self) -> u16 {
        match self {
            SocketAddress::V4(_, p) => *p,
            SocketAddress::V6(_, p) => *p,
        }
    }
}

impl From<SocketAddr> for SocketAddress {
    fn from(a: SocketAddr) -> Self {
        match a {
            SocketAddr::V4(a) => SocketAddress::V4(*a.ip(), a.port()),
            SocketAddr::V6(a) => SocketAddress::V6(*a.ip(), a.port()),
        }
    }
}

impl From<SocketAddress> for SocketAddr {
    fn from(a: SocketAddress) -> Self {
        match a {
            SocketAddress::V4(ip, port) => SocketAddr::new(ip.into(), port),
            SocketAddress::V6(ip, port) => SocketAddr::new(ip.into(), port),
        }
    }
}

impl fmt::Display for SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a: SocketAddr = (*self).into();
        write!(f, "{}", a)
    }
}

impl FromStr for SocketAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<SocketAddr>()
            .map(SocketAddress::from)
            .map_err(|_| AddressParseError::InvalidAddress)
    }
}

/// A CIDR block: an IPv4/IPv6 address whose port field is reinterpreted as a
/// prefix length, matching the layout of the address it is tested against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CidrBlock {
    prefix: SocketAddress,
}

impl CidrBlock {
    /// Prefix length in bits.
    pub fn prefix_len(&self) -> u16 {
        self.prefix.port()
    }

    /// Byte-by-byte, bit-masked containment check: `addr` is contained if its
    /// leading `prefix_len()` bits match this block's prefix address.
    /// Addresses of mismatched family are never contained.
    pub fn does_contain_address(&self, addr: &SocketAddress) -> bool {
        match (&self.prefix, addr) {
            (SocketAddress::V4(p, plen), SocketAddress::V4(a, _)) => {
                contains_bytes(&p.octets(), &a.octets(), *plen)
            }
            (SocketAddress::V6(p, plen), SocketAddress::V6(a, _)) => {
                contains_bytes(&p.octets(), &a.octets(), *plen)
            }
            _ => false,
        }
    }
}

fn contains_bytes(prefix: &[u8], addr: &[u8], prefix_len: u16) -> bool {
    let mut remaining = prefix_len as i32;
    for i in 0..prefix.len() {
        if remaining <= 0 {
            break;
        }
        if remaining >= 8 {
            if addr[i] != prefix[i] {
                return false;
            }
        } else {
            let shift = 8 - remaining;
            if (addr[i] >> shift) != (prefix[i] >> shift) {
                return false;
            }
        }
        remaining -= 8;
    }
    true
}

impl fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.prefix {
            SocketAddress::V4(ip, plen) => write!(f, "{}/{}", ip, plen),
            SocketAddress::V6(ip, plen) => write!(f, "{}/{}", ip, plen),
        }
    }
}

impl FromStr for CidrBlock {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, plen) = s.split_once('/').ok_or(AddressParseError::InvalidCidr)?;
        let plen: u16 = plen.parse().map_err(|_| AddressParseError::InvalidCidr)?;
        let prefix = if let Ok(ip) = addr.parse::<Ipv4Addr>() {
            SocketAddress::V4(ip, plen)
        } else if let Ok(ip) = addr.parse::<Ipv6Addr>() {
            SocketAddress::V6(ip, plen)
        } else {
            return Err(AddressParseError::InvalidCidr);
        };
        Ok(Self { prefix })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v4_containment_byte_aligned() {
        let block: CidrBlock = "10.0.0.0/24".parse().unwrap();
        assert!(block.does_contain_address(&"10.0.0.42:1".parse::<SocketAddress>().unwrap()));
        assert!(!block.does_contain_address(&"10.0.1.42:1".parse::<SocketAddress>().unwrap()));
    }

    #[test]
    fn v4_containment_bit_boundary() {
        let block: CidrBlock = "10.0.0.0/25".parse().unwrap();
        assert!(block.does_contain_address(&"10.0.0.127:1".parse::<SocketAddress>().unwrap()));
        assert!(!block.does_contain_address(&"10.0.0.128:1".parse::<SocketAddress>().unwrap()));
    }

    #[test]
    fn round_trip_display() {
        let s = "192.168.1.0/16";
        let block: CidrBlock = s.parse().unwrap();
        assert_eq!(block.to_string(), s);
    }

    #[test]
    fn mismatched_family_never_contained() {
        let block: CidrBlock = "10.0.0.0/8".parse().unwrap();
        let v6: SocketAddress = "[::1]:1".parse().unwrap();
        assert!(!block.does_contain_address(&v6));
    }
}
