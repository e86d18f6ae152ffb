use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::schemas::{PairId, UserId};

type HmacSha256 = Hmac<Sha256>;

/// Key of the keyed hash that turns a mixed pair of ids into a pair key.
pub const PAIR_NAMESPACE: Uuid = Uuid::NAMESPACE_X500;

/// Canonical key of the unordered pair `{a, b}`.
///
/// The raw id bytes are XOR-ed together, which makes the result independent of
/// argument order, and then run through HMAC-SHA256 keyed with
/// [`PAIR_NAMESPACE`] so the key reveals neither id. The key cannot be inverted:
/// callers must already know both users to look a pair up.
///
/// `pair_id(a, a)` is well defined; rejecting self-pairs is up to the caller.
pub fn pair_id(a: UserId, b: UserId) -> PairId {
    let mixed = xor(a.as_bytes(), b.as_bytes());

    let mut hmac_hasher = HmacSha256::new_from_slice(PAIR_NAMESPACE.as_bytes())
        .expect("HMAC accepts keys of any length");
    hmac_hasher.update(&mixed);
    let digest = hmac_hasher.finalize().into_bytes();

    let mut key = [0u8; 16];
    key.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(key)
}

/// Byte-wise XOR, truncated to the shorter input.
///
/// Both inputs must have the same length for the result to carry every bit of
/// both; ids of different widths lose the tail of the longer one.
pub fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter().zip(b).map(|(x, y)| x ^ y).collect()
}
