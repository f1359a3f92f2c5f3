//! Key digest — the durable store's primary index.
//!
//! Keys are indexed by a fixed-width 128-bit MD5 digest rather than by the
//! raw key bytes, so the index column is constant-size regardless of key
//! length.  The digest is stable across process restarts; collision
//! resistance in the key domain is all that is required of it.

use md5::{Digest as _, Md5};

/// A 128-bit digest of a key, as stored in the durable index.
pub type KeyDigest = [u8; 16];

/// Digests `key` for use as the durable store's primary index.
pub fn key_digest(key: &str) -> KeyDigest {
    Md5::digest(key.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable() {
        // Fixed vector: MD5("abc").
        assert_eq!(
            key_digest("abc"),
            [
                0x90, 0x01, 0x50, 0x98, 0x3c, 0xd2, 0x4f, 0xb0, 0xd6, 0x96, 0x3f, 0x7d, 0x28,
                0xe1, 0x7f, 0x72,
            ]
        );
    }

    #[test]
    fn distinct_keys_distinct_digests() {
        assert_ne!(key_digest("k1"), key_digest("k2"));
    }
}
