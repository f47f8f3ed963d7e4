use std::sync::atomic::{AtomicI64, Ordering};

use rand::Rng;

/// Alphabet for Excalidraw-style element ids.
pub const ELEMENT_ID_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-_";
pub const ELEMENT_ID_LEN: usize = 20;
/// Upper bound (inclusive) for `seed` and `versionNonce`.
pub const MAX_SEED: i64 = 2_147_483_647;

const ORDERING_INDEX_MODULUS: i64 = 1_000_000;

/// Source of identifiers, ordering hints and nonces for new elements.
///
/// Uniqueness is best-effort: nothing here checks for collisions.
pub trait IdentityGenerator: Send + Sync {
    /// Element id, `ELEMENT_ID_LEN` chars over `ELEMENT_ID_ALPHABET`.
    fn element_id(&self) -> String;
    /// Value in `1..=MAX_SEED`.
    fn seed(&self) -> i64;
    /// Value in `1..=MAX_SEED`.
    fn version_nonce(&self) -> i64;
    /// Wall clock in unix milliseconds.
    fn timestamp_ms(&self) -> i64;

    /// Z-order hint: `a` followed by the timestamp modulo one million.
    /// Two elements created in aliased milliseconds share the same hint.
    fn ordering_index(&self) -> String {
        format!("a{}", self.timestamp_ms().rem_euclid(ORDERING_INDEX_MODULUS))
    }
}

/// Thread-local RNG and the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdentity;

impl IdentityGenerator for RandomIdentity {
    fn element_id(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..ELEMENT_ID_LEN)
            .map(|_| ELEMENT_ID_ALPHABET[rng.gen_range(0..ELEMENT_ID_ALPHABET.len())] as char)
            .collect()
    }

    fn seed(&self) -> i64 {
        rand::thread_rng().gen_range(1..=MAX_SEED)
    }

    fn version_nonce(&self) -> i64 {
        rand::thread_rng().gen_range(1..=MAX_SEED)
    }

    fn timestamp_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Monotonic counter with a frozen clock. Ids look like `el000000000000000001`.
#[derive(Debug)]
pub struct SequentialIdentity {
    counter: AtomicI64,
    timestamp_ms: i64,
}

impl SequentialIdentity {
    pub fn new(timestamp_ms: i64) -> Self {
        Self {
            counter: AtomicI64::new(0),
            timestamp_ms,
        }
    }

    fn next(&self) -> i64 {
        (self.counter.fetch_add(1, Ordering::Relaxed) % MAX_SEED) + 1
    }
}

impl IdentityGenerator for SequentialIdentity {
    fn element_id(&self) -> String {
        format!("el{:018}", self.next())
    }

    fn seed(&self) -> i64 {
        self.next()
    }

    fn version_nonce(&self) -> i64 {
        self.next()
    }

    fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }
}
