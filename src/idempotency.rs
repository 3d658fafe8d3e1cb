use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Hex SHA-256 of a file's contents, streamed
pub fn file_sha256(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Key identifying one import of one export for one gene into one database environment.
/// The same file imported again for the same gene, source and environment yields the same key.
pub fn compute_idempotency_key(source: &str, gene: &str, environment: &str, payload_sha256_hex: &str) -> String {
    let mut s = String::new();
    s.push_str(source);
    s.push('|');
    s.push_str(gene);
    s.push('|');
    s.push_str(environment);
    s.push('|');
    s.push_str(payload_sha256_hex);

    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}
