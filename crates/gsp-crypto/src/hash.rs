use sha2::{Digest, Sha256};

pub fn sha256(data: &[u8]) -> [u8; 32] {
    sha256_concat(&[data])
}

/// SHA-256 over the concatenation of `parts`, without allocating the joined buffer.
pub fn sha256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut h = Sha256::new();
    for part in parts {
        h.update(part);
    }
    let out = h.finalize();
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&out);
    arr
}

/// Hex fingerprint used to identify certificates in logs: sha256(der).
pub fn fingerprint(der: &[u8]) -> String {
    hex::encode(sha256(der))
}
