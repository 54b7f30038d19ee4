//! Parsers for `/proc/net/tcp{,6}` and `/proc/<pid>/fd` socket links.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use super::TcpState;

/// One row of `/proc/net/tcp`, before owner correlation
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct SocketRow {
    pub local_addr: IpAddr,
    pub local_port: u16,
    pub state: TcpState,
    pub inode: u64,
}

/// Parse the contents of `/proc/net/tcp` or `/proc/net/tcp6`
///
/// Malformed rows are skipped.
pub(super) fn parse_socket_table(content: &str, ipv6: bool) -> Vec<SocketRow> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 10 {
                return None;
            }

            let (local_addr, local_port) = parse_addr_port(parts[1], ipv6)?;
            let state = match parts[3] {
                "0A" => TcpState::Listen,
                "01" => TcpState::Established,
                _ => TcpState::Other,
            };
            let inode = parts[9].parse().ok()?;

            Some(SocketRow {
                local_addr,
                local_port,
                state,
                inode,
            })
        })
        .collect()
}

/// Extract the inode from a `socket:[12345]` fd link target
pub(super) fn parse_socket_inode(link: &str) -> Option<u64> {
    link.strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

fn parse_addr_port(field: &str, ipv6: bool) -> Option<(IpAddr, u16)> {
    let (addr_hex, port_hex) = field.split_once(':')?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;
    let addr = if ipv6 {
        IpAddr::V6(parse_ipv6(addr_hex)?)
    } else {
        IpAddr::V4(parse_ipv4(addr_hex)?)
    };
    Some((addr, port))
}

// Addresses are printed as host-order 32-bit words.
fn parse_ipv4(hex: &str) -> Option<Ipv4Addr> {
    if hex.len() != 8 {
        return None;
    }
    let raw = u32::from_str_radix(hex, 16).ok()?;
    let b = raw.to_ne_bytes();
    Some(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
}

fn parse_ipv6(hex: &str) -> Option<Ipv6Addr> {
    if hex.len() != 32 {
        return None;
    }
    let mut bytes = [0u8; 16];
    for i in 0..4 {
        let word = u32::from_str_radix(&hex[i * 8..(i + 1) * 8], 16).ok()?;
        bytes[i * 4..i * 4 + 4].copy_from_slice(&word.to_ne_bytes());
    }
    Some(Ipv6Addr::from(bytes))
}
