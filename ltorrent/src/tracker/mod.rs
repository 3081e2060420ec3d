pub mod http;
pub mod tracker_handler;
pub mod tracker_response;
pub mod udp;
pub mod url_parser;
