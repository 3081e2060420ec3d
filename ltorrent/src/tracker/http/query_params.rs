use url_encoder::url_encoder::encode;

/// `QueryParams` struct containing the announce query parameters.
///
/// To build the query string use the method `build()`.
#[derive(Debug)]
pub struct QueryParams {
    info_hash: [u8; 20],
    peer_id: [u8; 20],
    client_port: u16,
    left: u64,
}

impl QueryParams {
    /// Creates a new `QueryParams` from the torrent's **info_hash**, our
    /// **peer_id**, the **client_port** we report and the number of bytes
    /// **left** to download.
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20], client_port: u16, left: u64) -> QueryParams {
        QueryParams {
            info_hash,
            peer_id,
            client_port,
            left,
        }
    }

    /// Builds the query string and returns it.
    pub fn build(&self) -> String {
        format!(
            "?info_hash={}&peer_id={}&port={}&uploaded=0&downloaded=0&left={}&compact=1&event=started",
            encode(&self.info_hash),
            encode(&self.peer_id),
            self.client_port,
            self.left
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_params_build() {
        let info_hash = [0xffu8; 20];
        let peer_id = *b"-LT0001-abcdefghijkl";
        let query_params = QueryParams::new(info_hash, peer_id, 6969, 2048);

        assert_eq!(
            query_params.build(),
            format!(
                "?info_hash={}&peer_id=-LT0001-abcdefghijkl&port=6969&uploaded=0&downloaded=0&left=2048&compact=1&event=started",
                "%ff".repeat(20)
            )
        );
    }
}
