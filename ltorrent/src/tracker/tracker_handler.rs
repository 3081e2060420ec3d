use std::sync::Arc;

use super::http::http_handler::{HttpHandler, HttpHandlerError};
use super::http::query_params::QueryParams;
use super::tracker_response::{FromTrackerResponseError, TrackerResponse};
use super::udp::udp_handler::{UdpHandler, UdpHandlerError};
use super::url_parser::{ConnectionProtocol, TrackerUrl, TrackerUrlError};
use crate::torrent_parser::torrent::Torrent;

/// `TrackerHandler` struct for communicating with the torrent's tracker.
///
/// The announce URL scheme picks the transport: `http`/`https` announce over
/// a TCP request, `udp` over the BEP 15 exchange.
///
/// To get the tracker's peer list use the method `get_peers_list()`.
#[derive(Debug)]
pub struct TrackerHandler {
    pub torrent: Arc<Torrent>,
    pub tracker_url: TrackerUrl,
    pub client_port: u16,
    client_peer_id: [u8; 20],
}

/// Posible `TrackerHandler` errors.
#[derive(Debug)]
pub enum TrackerHandlerError {
    HttpHandlerError(HttpHandlerError),
    UdpHandlerError(UdpHandlerError),
    FromTrackerResponseError(FromTrackerResponseError),
    UrlParseError(TrackerUrlError),
}

impl TrackerHandler {
    /// Builds a new `TrackerHandler` from a **Torrent** and the **client_port**
    /// we report to the tracker.
    ///
    /// It returns a `TrackerHandlerError` if:
    /// - There was an error parsing the torrent's announce_url.
    pub fn new(
        torrent: Arc<Torrent>,
        client_port: u16,
        client_peer_id: [u8; 20],
    ) -> Result<Self, TrackerHandlerError> {
        let tracker_url = TrackerUrl::parse(torrent.announce_url.as_str())
            .map_err(TrackerHandlerError::UrlParseError)?;

        Ok(Self {
            torrent,
            tracker_url,
            client_port,
            client_peer_id,
        })
    }

    /// Announces to the tracker and returns its peer list.
    ///
    /// It returns a `TrackerHandlerError` if:
    /// - There was a problem talking to the tracker.
    /// - There was a problem decoding the tracker response.
    pub fn get_peers_list(&self) -> Result<TrackerResponse, TrackerHandlerError> {
        match self.tracker_url.protocol {
            ConnectionProtocol::Http | ConnectionProtocol::Https => self.http_announce(),
            ConnectionProtocol::Udp => self.udp_announce(),
        }
    }

    fn http_announce(&self) -> Result<TrackerResponse, TrackerHandlerError> {
        let query_params = QueryParams::new(
            self.torrent.info_hash,
            self.client_peer_id,
            self.client_port,
            self.torrent.length(),
        );

        let http_handler = HttpHandler::new(self.tracker_url.clone(), query_params);

        let response = if self.tracker_url.protocol == ConnectionProtocol::Https {
            http_handler
                .https_request()
                .map_err(TrackerHandlerError::HttpHandlerError)?
        } else {
            http_handler
                .http_request()
                .map_err(TrackerHandlerError::HttpHandlerError)?
        };

        TrackerResponse::from(response).map_err(TrackerHandlerError::FromTrackerResponseError)
    }

    fn udp_announce(&self) -> Result<TrackerResponse, TrackerHandlerError> {
        let udp_handler = UdpHandler::new(self.tracker_url.host.as_str(), self.tracker_url.port)
            .map_err(TrackerHandlerError::UdpHandlerError)?;

        udp_handler
            .announce(
                self.torrent.info_hash,
                self.client_peer_id,
                self.client_port,
                self.torrent.length(),
            )
            .map_err(TrackerHandlerError::UdpHandlerError)
    }
}
