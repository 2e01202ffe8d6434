//! SHA-256 checksums for downloaded artifacts

use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Lowercase hex SHA-256 of `data`
#[must_use]
pub fn compute_sha256(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    hex::encode(digest.as_slice())
}

/// Check `data` against an expected hex digest (case-insensitive)
///
/// # Errors
///
/// Returns `Error::ChecksumMismatch` carrying both digests.
pub fn verify_sha256(data: &[u8], expected: &str) -> Result<()> {
    let actual = compute_sha256(data);
    let expected = expected.trim();
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(Error::ChecksumMismatch {
            expected: expected.to_ascii_lowercase(),
            actual,
        })
    }
}
