pub mod http_handler;
pub mod query_params;
