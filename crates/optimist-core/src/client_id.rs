//! Client-side identities
//!
//! Records get a local handle as soon as they enter the store, independent of
//! the server-assigned primary key (which a freshly created record does not
//! have yet). Handles come from the OS CSPRNG so they are not guessable.

use std::fmt;

use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// Length of a generated client-side id, in characters
pub const CLIENTSIDE_ID_LEN: usize = 8;

/// Alphabet used for human-facing random labels
const LABEL_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ123456789~!@#$%^&*-_=+";

/// Stable local handle for a synced record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientsideId(String);

impl ClientsideId {
    /// Generate a fresh id: random bytes rendered as lowercase hex
    pub fn generate() -> Self {
        let mut bytes = [0u8; (CLIENTSIDE_ID_LEN + 1) / 2];
        OsRng.fill_bytes(&mut bytes);

        let mut encoded = hex::encode(bytes);
        encoded.truncate(CLIENTSIDE_ID_LEN);
        Self(encoded)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientsideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientsideId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Random label drawn from a wide alphabet (letters, digits, symbols)
pub fn random_label(len: usize) -> String {
    let mut rng = OsRng;
    (0..len)
        .map(|_| LABEL_ALPHABET[rng.gen_range(0..LABEL_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_id_shape() {
        let id = ClientsideId::generate();
        assert_eq!(id.as_str().len(), CLIENTSIDE_ID_LEN);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert!(id.as_str().chars().all(|c| !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_generated_id_decodes_as_hex() {
        let id = ClientsideId::generate();
        let bytes = hex::decode(id.as_str()).unwrap();
        assert_eq!(bytes.len(), CLIENTSIDE_ID_LEN / 2);
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        let ids: HashSet<ClientsideId> = (0..1_000).map(|_| ClientsideId::generate()).collect();
        assert_eq!(ids.len(), 1_000);
    }

    #[test]
    fn test_random_label() {
        let label = random_label(4);
        assert_eq!(label.chars().count(), 4);
        assert!(label.bytes().all(|b| LABEL_ALPHABET.contains(&b)));
        assert!(random_label(0).is_empty());
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = ClientsideId::from("deadbeef");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"deadbeef\"");
        assert_eq!(id.to_string(), "deadbeef");
    }
}
