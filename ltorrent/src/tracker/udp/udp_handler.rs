use std::io::Error as IOError;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::tracker::tracker_response::{FromTrackerResponseError, TrackerResponse};

// Magic constant opening every connect request (BEP 15).
const PROTOCOL_MAGIC: u64 = 0x41727101980;

const ACTION_CONNECT: u32 = 0;
const ACTION_ANNOUNCE: u32 = 1;
const EVENT_STARTED: u32 = 2;

const CONNECT_REQUEST_LEN: usize = 16;
const CONNECT_RESPONSE_LEN: usize = 16;
const ANNOUNCE_REQUEST_LEN: usize = 98;
const ANNOUNCE_RESPONSE_HEADER_LEN: usize = 20;

// 1472 is the largest datagram that fits an ethernet frame.
const MAX_DATAGRAM_LEN: usize = 1500;

/// First retransmission timeout; it doubles on every failed attempt.
pub const INITIAL_SECONDS_TIMEOUT: u64 = 15;
/// Attempts before the announce is given up.
pub const MAX_ATTEMPTS: u32 = 8;

/// `UdpHandler` struct to announce against a **UDP** tracker (BEP 15).
///
/// Every attempt runs the two-step connect/announce exchange with a fresh
/// transaction id; any failure doubles the timeout and starts over.
#[derive(Debug)]
pub struct UdpHandler {
    tracker_addr: SocketAddr,
    initial_timeout: Duration,
    max_attempts: u32,
}

/// Posible `UdpHandler` errors.
#[derive(Debug)]
pub enum UdpHandlerError {
    UnresolvableHost,
    SocketError(IOError),
    SendError(IOError),
    RecvError(IOError),
    ShortResponse(usize),
    ActionMismatch { expected: u32, got: u32 },
    TransactionIdMismatch,
    RetriesExhausted,
    InvalidResponse(FromTrackerResponseError),
}

impl UdpHandler {
    /// Builds a new `UdpHandler`, resolving the tracker host to its first
    /// IPv4 address.
    pub fn new(host: &str, port: u16) -> Result<Self, UdpHandlerError> {
        let tracker_addr = (host, port)
            .to_socket_addrs()
            .map_err(|_| UdpHandlerError::UnresolvableHost)?
            .find(SocketAddr::is_ipv4)
            .ok_or(UdpHandlerError::UnresolvableHost)?;

        Ok(Self {
            tracker_addr,
            initial_timeout: Duration::from_secs(INITIAL_SECONDS_TIMEOUT),
            max_attempts: MAX_ATTEMPTS,
        })
    }

    /// Overrides the retransmission schedule.
    pub fn with_retransmission(mut self, initial_timeout: Duration, max_attempts: u32) -> Self {
        self.initial_timeout = initial_timeout;
        self.max_attempts = max_attempts;
        self
    }

    /// Runs the connect/announce exchange until it succeeds or the attempt
    /// cap is reached. Every retry starts back at connect with a doubled
    /// timeout and a new transaction id.
    pub fn announce(
        &self,
        info_hash: [u8; 20],
        peer_id: [u8; 20],
        client_port: u16,
        left: u64,
    ) -> Result<TrackerResponse, UdpHandlerError> {
        // Unconnected socket: the destination goes on every send and the
        // source of every datagram is checked, so strays are ignored.
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(UdpHandlerError::SocketError)?;

        let mut timeout = self.initial_timeout;
        for _ in 0..self.max_attempts {
            match self.try_announce(&socket, timeout, info_hash, peer_id, client_port, left) {
                Ok(response) => return Ok(response),
                Err(err) => {
                    warn!(
                        "UDP announce attempt against {} failed: {:?}",
                        self.tracker_addr, err
                    );
                    timeout *= 2;
                }
            }
        }
        Err(UdpHandlerError::RetriesExhausted)
    }

    fn try_announce(
        &self,
        socket: &UdpSocket,
        timeout: Duration,
        info_hash: [u8; 20],
        peer_id: [u8; 20],
        client_port: u16,
        left: u64,
    ) -> Result<TrackerResponse, UdpHandlerError> {
        socket
            .set_read_timeout(Some(timeout))
            .map_err(UdpHandlerError::SocketError)?;

        let connection_id = self.connect(socket)?;

        let transaction_id = rand::thread_rng().gen::<u32>();
        let request = Self::build_announce_request(
            connection_id,
            transaction_id,
            info_hash,
            peer_id,
            client_port,
            left,
        );
        socket
            .send_to(&request, self.tracker_addr)
            .map_err(UdpHandlerError::SendError)?;

        let (response, len) = self.recv_from_tracker(socket)?;
        if len < ANNOUNCE_RESPONSE_HEADER_LEN {
            return Err(UdpHandlerError::ShortResponse(len));
        }
        Self::check_header(&response, ACTION_ANNOUNCE, transaction_id)?;

        TrackerResponse::from_udp_announce(&response[8..len])
            .map_err(UdpHandlerError::InvalidResponse)
    }

    /// First exchange of BEP 15: trade the protocol magic for a connection id.
    fn connect(&self, socket: &UdpSocket) -> Result<u64, UdpHandlerError> {
        let transaction_id = rand::thread_rng().gen::<u32>();

        let mut request = Vec::with_capacity(CONNECT_REQUEST_LEN);
        request.extend(PROTOCOL_MAGIC.to_be_bytes());
        request.extend(ACTION_CONNECT.to_be_bytes());
        request.extend(transaction_id.to_be_bytes());

        socket
            .send_to(&request, self.tracker_addr)
            .map_err(UdpHandlerError::SendError)?;

        let (response, len) = self.recv_from_tracker(socket)?;
        if len < CONNECT_RESPONSE_LEN {
            return Err(UdpHandlerError::ShortResponse(len));
        }
        Self::check_header(&response, ACTION_CONNECT, transaction_id)?;

        let mut connection_id = [0; 8];
        connection_id.copy_from_slice(&response[8..16]);
        Ok(u64::from_be_bytes(connection_id))
    }

    fn build_announce_request(
        connection_id: u64,
        transaction_id: u32,
        info_hash: [u8; 20],
        peer_id: [u8; 20],
        client_port: u16,
        left: u64,
    ) -> Vec<u8> {
        let mut request = Vec::with_capacity(ANNOUNCE_REQUEST_LEN);
        request.extend(connection_id.to_be_bytes());
        request.extend(ACTION_ANNOUNCE.to_be_bytes());
        request.extend(transaction_id.to_be_bytes());
        request.extend(info_hash);
        request.extend(peer_id);
        request.extend(0u64.to_be_bytes()); // downloaded
        request.extend(left.to_be_bytes());
        request.extend(0u64.to_be_bytes()); // uploaded
        request.extend(EVENT_STARTED.to_be_bytes());
        request.extend(0u32.to_be_bytes()); // ip address
        request.extend(rand::thread_rng().gen::<u32>().to_be_bytes()); // key
        request.extend((-1i32).to_be_bytes()); // num_want
        request.extend(client_port.to_be_bytes());
        request
    }

    /// Receives one datagram from the tracker's resolved address, dropping
    /// datagrams arriving from anywhere else.
    fn recv_from_tracker(
        &self,
        socket: &UdpSocket,
    ) -> Result<([u8; MAX_DATAGRAM_LEN], usize), UdpHandlerError> {
        let mut buf = [0; MAX_DATAGRAM_LEN];
        loop {
            let (len, src) = socket
                .recv_from(&mut buf)
                .map_err(UdpHandlerError::RecvError)?;
            if src == self.tracker_addr {
                return Ok((buf, len));
            }
        }
    }

    fn check_header(
        response: &[u8],
        expected_action: u32,
        expected_transaction_id: u32,
    ) -> Result<(), UdpHandlerError> {
        let mut action = [0; 4];
        action.copy_from_slice(&response[0..4]);
        let action = u32::from_be_bytes(action);
        if action != expected_action {
            return Err(UdpHandlerError::ActionMismatch {
                expected: expected_action,
                got: action,
            });
        }

        let mut transaction_id = [0; 4];
        transaction_id.copy_from_slice(&response[4..8]);
        if u32::from_be_bytes(transaction_id) != expected_transaction_id {
            return Err(UdpHandlerError::TransactionIdMismatch);
        }
        Ok(())
    }
}
