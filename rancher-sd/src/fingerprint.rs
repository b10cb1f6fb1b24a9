use std::path::Path;
use sha2::{Digest, Sha256};

/// SHA-256 of published file content, hex encoded. Logged on every publish
/// so a file revision can be matched to the cycle that wrote it.
pub fn compute(contents: &[u8]) -> String {
    hex::encode(Sha256::digest(contents))
}

/// Fingerprint of the file currently on disk, if readable
pub fn of_file(path: impl AsRef<Path>) -> Option<String> {
    std::fs::read(path).ok().map(|contents| compute(&contents))
}
