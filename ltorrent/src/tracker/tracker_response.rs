use bencoder::bencode::{Bencode, BencodeError};

use crate::peer::bt_peer::{BtPeer, BtPeerError};

/// `TrackerResponse` struct containing a tracker response.
///
/// HTTP responses are built with `from()`, UDP announce responses with
/// `from_udp_announce()`.
#[derive(Debug)]
pub struct TrackerResponse {
    pub interval: i64,
    pub complete: i64,
    pub incomplete: i64,
    pub peers: Vec<BtPeer>,
}

/// Posible `TrackerResponse` errors.
#[derive(Debug)]
pub enum FromTrackerResponseError {
    DecodeResponseError(BencodeError),
    FailureReason(String),
    InvalidInterval,
    InvalidComplete,
    InvalidIncomplete,
    InvalidPeers(BtPeerError),
    InvalidPeerList,
    NotADict,
    ResponseTooShort(usize),
}

impl TrackerResponse {
    /// Builds a new `TrackerResponse` decoding a bencoded response body.
    ///
    /// The `peers` value is polymorphic: either a byte string in compact
    /// form (6 bytes per peer) or a list of dictionaries with `ip` and
    /// `port` keys. Anything else is invalid.
    ///
    /// It returns a `FromTrackerResponseError` if:
    /// - The response is not valid bencode or not a dict.
    /// - The tracker reported a failure reason.
    /// - Any of the fields has the wrong type.
    pub fn from(response: Vec<u8>) -> Result<TrackerResponse, FromTrackerResponseError> {
        let mut interval = 0;
        let mut complete = 0;
        let mut incomplete = 0;
        let mut peers = Vec::new();

        let decoded_res = match Bencode::decode(&response) {
            Ok(decoded_res) => decoded_res,
            Err(err) => return Err(FromTrackerResponseError::DecodeResponseError(err)),
        };

        let d = match decoded_res {
            Bencode::BDict(d) => d,
            _ => return Err(FromTrackerResponseError::NotADict),
        };

        for (k, v) in d.iter() {
            if k == b"failure reason" {
                return Err(Self::create_failure_reason(v));
            } else if k == b"interval" {
                interval = Self::create_interval(v)?;
            } else if k == b"complete" {
                complete = Self::create_complete(v)?;
            } else if k == b"incomplete" {
                incomplete = Self::create_incomplete(v)?;
            } else if k == b"peers" {
                peers = Self::create_peers(v)?;
            }
        }

        Ok(TrackerResponse {
            interval,
            complete,
            incomplete,
            peers,
        })
    }

    /// Builds a `TrackerResponse` from the body of a UDP announce response,
    /// starting at the interval field (the action/transaction header is
    /// checked by the transport): interval, leechers and seeders as 4-byte
    /// big-endian integers, then compact peers until the end.
    pub fn from_udp_announce(body: &[u8]) -> Result<TrackerResponse, FromTrackerResponseError> {
        if body.len() < 12 {
            return Err(FromTrackerResponseError::ResponseTooShort(body.len()));
        }

        let mut field = [0; 4];
        field.copy_from_slice(&body[0..4]);
        let interval = u32::from_be_bytes(field) as i64;
        field.copy_from_slice(&body[4..8]);
        let leechers = u32::from_be_bytes(field) as i64;
        field.copy_from_slice(&body[8..12]);
        let seeders = u32::from_be_bytes(field) as i64;

        let peers =
            BtPeer::from_compact_list(&body[12..]).map_err(FromTrackerResponseError::InvalidPeers)?;

        Ok(TrackerResponse {
            interval,
            complete: seeders,
            incomplete: leechers,
            peers,
        })
    }

    fn create_failure_reason(bencode: &Bencode) -> FromTrackerResponseError {
        let reason = match bencode {
            Bencode::BString(s) => String::from_utf8_lossy(s).to_string(),
            _ => String::from("unknown"),
        };
        FromTrackerResponseError::FailureReason(reason)
    }

    fn create_interval(bencode: &Bencode) -> Result<i64, FromTrackerResponseError> {
        match bencode {
            Bencode::BNumber(n) => Ok(*n),
            _ => Err(FromTrackerResponseError::InvalidInterval),
        }
    }

    fn create_complete(bencode: &Bencode) -> Result<i64, FromTrackerResponseError> {
        match bencode {
            Bencode::BNumber(n) => Ok(*n),
            _ => Err(FromTrackerResponseError::InvalidComplete),
        }
    }

    fn create_incomplete(bencode: &Bencode) -> Result<i64, FromTrackerResponseError> {
        match bencode {
            Bencode::BNumber(n) => Ok(*n),
            _ => Err(FromTrackerResponseError::InvalidIncomplete),
        }
    }

    fn create_peers(bencode: &Bencode) -> Result<Vec<BtPeer>, FromTrackerResponseError> {
        match bencode {
            Bencode::BList(list) => Self::create_peers_from_dicts(list),
            Bencode::BString(compact) => {
                BtPeer::from_compact_list(compact).map_err(FromTrackerResponseError::InvalidPeers)
            }
            _ => Err(FromTrackerResponseError::InvalidPeerList),
        }
    }

    fn create_peers_from_dicts(
        list: &[Bencode],
    ) -> Result<Vec<BtPeer>, FromTrackerResponseError> {
        list.iter()
            .map(|p| BtPeer::from(p).map_err(FromTrackerResponseError::InvalidPeers))
            .collect()
    }
}
