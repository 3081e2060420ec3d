use native_tls::Error;
use native_tls::HandshakeError;
use native_tls::TlsConnector;
use std::io::Error as IOError;
use std::io::{Read, Write};
use std::net::TcpStream;

use super::query_params::QueryParams;
use crate::tracker::url_parser::TrackerUrl;

/// `HttpHandler` struct to make **HTTP** requests.
///
/// To create a new `HttpHandler` use the method builder `new()`.
///
/// To make a **HTTPS** request use the method `https_request()`.
///
/// To make a **HTTP** request use the method `http_request()`.
#[derive(Debug)]
pub struct HttpHandler {
    tracker_url: TrackerUrl,
    query_params: QueryParams,
}

/// Posible `HttpHandler` errors
#[derive(Debug)]
pub enum HttpHandlerError {
    CreateTlsConnectorError(Error),
    TcpStreamConnectError(IOError),
    TlsStreamConnectError(TlsStreamConnectError),
    ErrorWritingStream(IOError),
    ErrorReadingStream(IOError),
}

/// Posible `TlsStreamConnect` errors.
///
/// `FatalError` is an error that should not continue the program.
///
/// `BlockError` is an error that can be caused because the stream is performing I/O,
/// it should be safe to call `handshake` at a later time.
#[derive(Debug)]
pub enum TlsStreamConnectError {
    FatalError,
    BlockError,
}

impl HttpHandler {
    /// Builds a new `HttpHandler` from a **TrackerUrl** and a **QueryParams** passed by paramaters.
    pub fn new(tracker_url: TrackerUrl, query_params: QueryParams) -> Self {
        Self {
            tracker_url,
            query_params,
        }
    }

    /// Makes a **HTTPS** request to the tracker url.
    ///
    /// On success it returns a `Vec<u8>` cointaining the tracker's response body.
    ///
    /// It returns an `HttpHandlerError` if:
    /// - There was a problem creating a TlsConnector.
    /// - There was a problem connecting to the tracker_url.
    /// - There was a problem writing to the tracker stream.
    /// - There was a problem reading the tracker stream.
    pub fn https_request(&self) -> Result<Vec<u8>, HttpHandlerError> {
        let connector = match TlsConnector::new() {
            Ok(connector) => connector,
            Err(err) => return Err(HttpHandlerError::CreateTlsConnectorError(err)),
        };
        let stream = self.connect_tcp_stream()?;
        let stream = match connector.connect(self.tracker_url.host.as_str(), stream) {
            Ok(stream) => stream,
            Err(err) => match err {
                HandshakeError::Failure(_) => {
                    return Err(HttpHandlerError::TlsStreamConnectError(
                        TlsStreamConnectError::FatalError,
                    ))
                }
                HandshakeError::WouldBlock(_) => {
                    return Err(HttpHandlerError::TlsStreamConnectError(
                        TlsStreamConnectError::BlockError,
                    ))
                }
            },
        };
        self.request_and_decode(stream)
    }

    /// Makes a **HTTP** request to the tracker url.
    ///
    /// On success it returns a `Vec<u8>` cointaining the tracker's response body.
    ///
    /// It returns an `HttpHandlerError` if:
    /// - There was a problem connecting to the tracker_url.
    /// - There was a problem writing to the tracker stream.
    /// - There was a problem reading the tracker stream.
    pub fn http_request(&self) -> Result<Vec<u8>, HttpHandlerError> {
        self.request_and_decode(self.connect_tcp_stream()?)
    }

    fn connect_tcp_stream(&self) -> Result<TcpStream, HttpHandlerError> {
        let connect_url = format!("{}:{}", self.tracker_url.host, self.tracker_url.port);
        match TcpStream::connect(connect_url) {
            Ok(stream) => Ok(stream),
            Err(err) => Err(HttpHandlerError::TcpStreamConnectError(err)),
        }
    }

    fn request_and_decode<A>(&self, mut stream: A) -> Result<Vec<u8>, HttpHandlerError>
    where
        A: Write + Read,
    {
        let query_params = self.query_params.build();
        let mut request = format!(
            "GET /{}{} HTTP/1.1",
            self.tracker_url.endpoint, query_params
        );
        request.push_str("\r\n");
        request.push_str("Host: ");
        request.push_str(self.tracker_url.host.as_str());
        request.push_str("\r\n");
        request.push_str("User-Agent: LTorrent/0.1");
        request.push_str("\r\n");
        request.push_str("Connection: close");
        request.push_str("\r\n");
        request.push_str("\r\n");

        match stream.write_all(request.as_bytes()) {
            Ok(_) => (),
            Err(err) => return Err(HttpHandlerError::ErrorWritingStream(err)),
        }
        let mut res = vec![];
        match stream.read_to_end(&mut res) {
            Ok(_) => (),
            Err(err) => return Err(HttpHandlerError::ErrorReadingStream(err)),
        };

        Ok(Self::parse_http_response(&res).to_vec())
    }

    /// Splits the response at the blank line and returns the body.
    fn parse_http_response(res: &[u8]) -> &[u8] {
        for (i, window) in res.windows(4).enumerate() {
            if window == b"\r\n\r\n" {
                return &res[(i + 4)..];
            }
        }
        res
    }
}
