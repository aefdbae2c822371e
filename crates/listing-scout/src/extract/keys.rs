use std::sync::atomic::{AtomicUsize, Ordering};

use secrecy::SecretString;

use super::error::ExtractError;

/// Fixed set of API keys handed out round-robin, one per generation call.
pub struct KeyPool {
    keys: Vec<SecretString>,
    next: AtomicUsize,
}

impl KeyPool {
    pub fn new(keys: Vec<SecretString>) -> Result<Self, ExtractError> {
        if keys.is_empty() {
            return Err(ExtractError::Setup("key pool needs at least one key".to_string()));
        }
        Ok(Self {
            keys,
            next: AtomicUsize::new(0),
        })
    }

    pub fn next_key(&self) -> &SecretString {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.keys.len();
        &self.keys[index]
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl std::fmt::Debug for KeyPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPool")
            .field("keys", &self.keys.len())
            .finish()
    }
}
