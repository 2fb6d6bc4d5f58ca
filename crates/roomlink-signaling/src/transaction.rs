//! Correlation of outbound requests with their eventual replies.

use std::collections::HashMap;

use rand::Rng;

const TOKEN_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const TOKEN_LEN: usize = 12;

/// Generates a random correlation token: `TOKEN_LEN` lowercase letters.
/// Uniqueness is only required within the live-transaction window; the
/// registry re-rolls on collision.
pub fn random_token() -> String {
    let mut rng = rand::thread_rng();
    (0..TOKEN_LEN)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// Maps a transaction token to the pending request's continuation.
///
/// Purely a correlation table: it knows nothing about the protocol, which is
/// why the continuation type is generic. At most one live entry per token.
#[derive(Debug, Default)]
pub struct TransactionRegistry<T> {
    pending: HashMap<String, T>,
}

impl<T> TransactionRegistry<T> {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    /// Registers `continuation` under a fresh token and returns the token.
    pub fn register(&mut self, continuation: T) -> String {
        let mut token = random_token();
        while self.pending.contains_key(&token) {
            token = random_token();
        }
        self.pending.insert(token.clone(), continuation);
        token
    }

    /// Removes and returns the continuation for `token`. Idempotent: a token
    /// already consumed, or never issued, yields `None`.
    pub fn take(&mut self, token: &str) -> Option<T> {
        self.pending.remove(token)
    }

    /// Drops every pending continuation without invoking anything. Used on
    /// session teardown; callers must tolerate replies that never resolve.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
