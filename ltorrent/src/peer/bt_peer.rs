use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use bencoder::bencode::Bencode;

/// Number of bytes one peer occupies in a compact tracker response.
pub const COMPACT_PEER_LEN: usize = 6;

/// A peer address handed out by the tracker: IPv4 plus TCP port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BtPeer {
    pub ip: Ipv4Addr,
    pub port: u16,
}

/// Posible `BtPeer` errors.
#[derive(Debug, PartialEq)]
pub enum BtPeerError {
    InvalidIp,
    InvalidPort,
    NotADict,
    InvalidCompactLength(usize),
}

impl BtPeer {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Builds a new `BtPeer` from a bencoded peer dictionary of the tracker
    /// response peer list (keys `ip` and `port`).
    ///
    /// It returns a `BtPeerError` if:
    /// - The peer IP is missing or not an IPv4 literal.
    /// - The peer port is missing or out of range.
    /// - The bencoded peer is not a dict.
    pub fn from(bencode: &Bencode) -> Result<BtPeer, BtPeerError> {
        let mut ip = None;
        let mut port = None;

        let d = match bencode {
            Bencode::BDict(d) => d,
            _ => return Err(BtPeerError::NotADict),
        };

        for (k, v) in d.iter() {
            if k == b"ip" {
                ip = Some(Self::create_ip(v)?);
            } else if k == b"port" {
                port = Some(Self::create_port(v)?);
            }
        }

        Ok(BtPeer {
            ip: ip.ok_or(BtPeerError::InvalidIp)?,
            port: port.ok_or(BtPeerError::InvalidPort)?,
        })
    }

    /// Parses a compact peer list: 6 bytes per peer, 4-byte IPv4 followed by
    /// a big-endian port. Lengths that are not a multiple of 6 are rejected.
    pub fn from_compact_list(bytes: &[u8]) -> Result<Vec<BtPeer>, BtPeerError> {
        if bytes.len() % COMPACT_PEER_LEN != 0 {
            return Err(BtPeerError::InvalidCompactLength(bytes.len()));
        }

        Ok(bytes
            .chunks_exact(COMPACT_PEER_LEN)
            .map(|chunk| {
                let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
                let port = u16::from_be_bytes([chunk[4], chunk[5]]);
                BtPeer::new(ip, port)
            })
            .collect())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }

    fn create_ip(bencode: &Bencode) -> Result<Ipv4Addr, BtPeerError> {
        let ip = match bencode {
            Bencode::BString(s) => s,
            _ => return Err(BtPeerError::InvalidIp),
        };

        let ip = String::from_utf8(ip.to_vec()).map_err(|_| BtPeerError::InvalidIp)?;
        ip.parse().map_err(|_| BtPeerError::InvalidIp)
    }

    fn create_port(bencode: &Bencode) -> Result<u16, BtPeerError> {
        let port = match bencode {
            Bencode::BNumber(n) => *n,
            _ => return Err(BtPeerError::InvalidPort),
        };

        u16::try_from(port).map_err(|_| BtPeerError::InvalidPort)
    }
}

impl std::fmt::Display for BtPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_from_bencoded_dict() {
        let mut dict = BTreeMap::new();
        dict.insert(b"ip".to_vec(), Bencode::BString(b"127.0.0.1".to_vec()));
        dict.insert(b"port".to_vec(), Bencode::BNumber(6868));

        let bt_peer = BtPeer::from(&Bencode::BDict(dict)).unwrap();

        assert_eq!(bt_peer.ip, Ipv4Addr::new(127, 0, 0, 1));
        assert_eq!(bt_peer.port, 6868);
    }

    #[test]
    fn test_from_dict_with_bad_port() {
        let mut dict = BTreeMap::new();
        dict.insert(b"ip".to_vec(), Bencode::BString(b"127.0.0.1".to_vec()));
        dict.insert(b"port".to_vec(), Bencode::BNumber(70000));

        assert_eq!(
            BtPeer::from(&Bencode::BDict(dict)).unwrap_err(),
            BtPeerError::InvalidPort
        );
    }

    #[test]
    fn test_from_dict_with_hostname_ip() {
        let mut dict = BTreeMap::new();
        dict.insert(b"ip".to_vec(), Bencode::BString(b"peer.example".to_vec()));
        dict.insert(b"port".to_vec(), Bencode::BNumber(6881));

        assert_eq!(
            BtPeer::from(&Bencode::BDict(dict)).unwrap_err(),
            BtPeerError::InvalidIp
        );
    }

    #[test]
    fn test_from_not_a_dict() {
        assert_eq!(
            BtPeer::from(&Bencode::BNumber(1)).unwrap_err(),
            BtPeerError::NotADict
        );
    }

    #[test]
    fn test_from_compact_list() {
        let bytes = [1, 2, 3, 4, 0x1a, 0xe1, 192, 168, 0, 1, 0x00, 0x50];

        let peers = BtPeer::from_compact_list(&bytes).unwrap();

        assert_eq!(
            peers,
            vec![
                BtPeer::new(Ipv4Addr::new(1, 2, 3, 4), 6881),
                BtPeer::new(Ipv4Addr::new(192, 168, 0, 1), 80),
            ]
        );
    }

    #[test]
    fn test_from_compact_list_rejects_bad_length() {
        let bytes = [1, 2, 3, 4, 0x1a];

        assert_eq!(
            BtPeer::from_compact_list(&bytes).unwrap_err(),
            BtPeerError::InvalidCompactLength(5)
        );
    }

    #[test]
    fn test_from_compact_list_empty() {
        assert_eq!(BtPeer::from_compact_list(&[]).unwrap(), vec![]);
    }
}
