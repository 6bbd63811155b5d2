//! One-way transforms and identifiers for conversion events

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Number of random bytes in a generated event ID
const EVENT_ID_BYTES: usize = 16;

/// Hashes a personal identifier (email, external ID) the way the Conversions API expects:
/// normalised to lower case without surrounding whitespace, then SHA-256 as lower-case hex
pub fn hash_identifier(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.trim().to_lowercase().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Generates a random event ID, shared by the browser pixel and the server for deduplication
pub fn generate_event_id() -> String {
    let mut bytes = [0u8; EVENT_ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
/// True if the string looks like something generate_event_id() would return
pub fn is_event_id(value: &str) -> bool {
    value.len() == EVENT_ID_BYTES * 2 && value.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn hash_ignores_case_and_surrounding_whitespace() {
        assert_eq!(hash_identifier(" A@B.com "), hash_identifier("a@b.com"));
        assert_eq!(hash_identifier("\tUser@Example.COM\n"), hash_identifier("user@example.com"));
    }

    #[test]
    fn hash_is_sha256_hex() {
        assert_eq!(
            hash_identifier("test@example.com"),
            "973dfe463ec85785f5f95af5ba3906eedb2d931c24e69824a89ea65dba4e813b"
        );
        assert_ne!(hash_identifier("a@b.com"), hash_identifier("b@a.com"));
    }

    #[test]
    fn event_ids_are_32_hex_chars() {
        let id = generate_event_id();
        assert_eq!(id.len(), 32);
        assert!(is_event_id(&id));
        assert!(!is_event_id("not-an-event-id"));
    }

    #[test]
    fn event_ids_do_not_collide() {
        let ids: HashSet<String> = (0..10_000).map(|_| generate_event_id()).collect();
        assert_eq!(ids.len(), 10_000);
    }
}
