pub mod udp_handler;
