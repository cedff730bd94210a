//! Deterministic chunk ids.
//!
//! An id addresses a slot (the `ordinal`-th chunk of a file), not content:
//! re-ingesting a changed file overwrites its slots in place.

use sha2::{Digest, Sha256};

/// Number of hex characters kept from the digest.
const ID_LEN: usize = 16;

/// Stable id for the `ordinal`-th chunk of the file at `path`.
///
/// SHA-256 of `"{path}:{ordinal}"`, truncated to 16 lowercase hex characters.
///
/// # Examples
///
/// ```
/// use repolens_index::chunk_id;
///
/// let id = chunk_id("src/auth.py", 0);
/// assert_eq!(id.len(), 16);
/// assert_eq!(id, chunk_id("src/auth.py", 0));
/// assert_ne!(id, chunk_id("src/auth.py", 1));
/// ```
pub fn chunk_id(path: &str, ordinal: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{path}:{ordinal}").as_bytes());
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(ID_LEN);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_lowercase_hex_prefix_of_sha256() {
        // sha256("a.md:0")
        let mut hasher = Sha256::new();
        hasher.update(b"a.md:0");
        let full = format!("{:x}", hasher.finalize());

        let id = chunk_id("a.md", 0);
        assert_eq!(id, full[..16]);
        assert!(id
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn different_paths_give_different_ids() {
        assert_ne!(chunk_id("docs/a.md", 0), chunk_id("docs/b.md", 0));
    }

    #[test]
    fn ordinal_is_part_of_the_key() {
        let ids: std::collections::HashSet<String> =
            (0..100).map(|i| chunk_id("README.md", i)).collect();
        assert_eq!(ids.len(), 100);
    }
}
