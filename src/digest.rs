//! C1: the digest primitive.
//!
//! The algorithm is a single build-time constant, not per-node metadata:
//! documents produced with a different algorithm are not interoperable, and
//! that's intentional.
use digest::Digest;
use std::io;

/// MD5 is faster than SHA-256 for this workload. The digest here is a
/// content fingerprint, not a cryptographic signature, so the
/// speed/collision-resistance tradeoff favors MD5.
type Algorithm = md5::Md5;

/// Width, in hex characters, of a digest produced by [`Algorithm`].
pub const DIGEST_WIDTH: usize = 32;

/// Consume `reader` to EOF and return its lowercase hex digest.
pub fn hash_bytes(mut reader: impl io::Read) -> io::Result<String> {
    let mut hasher = Algorithm::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Digest of a UTF-8 string's bytes.
pub fn hash_string(s: &str) -> String {
    let mut hasher = Algorithm::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}
