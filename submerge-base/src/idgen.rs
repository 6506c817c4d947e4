// Companion to `Clock`: the process-wide RNG the transaction manager used to
// reach for implicitly is replaced with an injectable `IdGen`, built from
// the already-present `rapidhash` dependency rather than pulling in a
// dedicated RNG crate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Produces opaque transaction tokens (spec §4.E: "a fresh random token of
/// length >= 8 bytes").
pub trait IdGen: Send + Sync {
    fn fresh_token(&self) -> Vec<u8>;
}

/// Mixes a monotonic counter with a process-start seed through `rapidhash`
/// to produce tokens that don't repeat within a process lifetime. Not
/// cryptographically random -- the engine has no need for that, only for
/// tokens that are unpredictable enough not to collide (Non-goals: "real
/// cryptographic token verification").
pub struct RapidIdGen {
    seed: u64,
    counter: AtomicU64,
}

impl RapidIdGen {
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        RapidIdGen {
            seed,
            counter: AtomicU64::new(0),
        }
    }
}

impl Default for RapidIdGen {
    fn default() -> Self {
        RapidIdGen::new()
    }
}

impl IdGen for RapidIdGen {
    fn fresh_token(&self) -> Vec<u8> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let mut buf = [0u8; 16];
        buf[0..8].copy_from_slice(&self.seed.to_le_bytes());
        buf[8..16].copy_from_slice(&n.to_le_bytes());
        let lo = rapidhash::rapidhash(&buf[0..8]);
        let hi = rapidhash::rapidhash(&buf[8..16]);
        let mut token = Vec::with_capacity(16);
        token.extend_from_slice(&lo.to_le_bytes());
        token.extend_from_slice(&hi.to_le_bytes());
        token
    }
}

/// Deterministic generator for tests: returns sequential tokens so
/// assertions can name them exactly.
pub struct SequentialIdGen {
    counter: AtomicU64,
}

impl SequentialIdGen {
    pub fn new() -> Self {
        SequentialIdGen {
            counter: AtomicU64::new(0),
        }
    }
}

impl Default for SequentialIdGen {
    fn default() -> Self {
        SequentialIdGen::new()
    }
}

impl IdGen for SequentialIdGen {
    fn fresh_token(&self) -> Vec<u8> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        n.to_be_bytes().to_vec()
    }
}
