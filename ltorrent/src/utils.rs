use rand::distributions::Alphanumeric;
use rand::Rng;

/// Hard coded peer ID prefix specific to this client.
const PEER_ID_PREFIX: &str = "-LT0001-";

/// Generates the 20-byte peer identity: the client prefix plus a random
/// alphanumeric suffix.
pub fn generate_peer_id() -> [u8; 20] {
    let mut peer_id = [0u8; 20];
    peer_id[..PEER_ID_PREFIX.len()].copy_from_slice(PEER_ID_PREFIX.as_bytes());

    let suffix: Vec<u8> = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(20 - PEER_ID_PREFIX.len())
        .collect();
    peer_id[PEER_ID_PREFIX.len()..].copy_from_slice(&suffix);

    peer_id
}
