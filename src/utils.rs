use std::{
    hash::{BuildHasher, Hash, Hasher},
    sync::atomic::{AtomicU64, Ordering},
};

use twox_hash::XxHash64;

const LABEL_SEED: u64 = 0xdeadbeef;

/// Pass a u64 value straight through as the hash. This is only useful if you
/// are pre-hashing a `HashMap` key and don't want to do duplicate the work.
pub struct NoopHasher {
    inner: u64,
}

impl Hasher for NoopHasher {
    fn finish(&self) -> u64 {
        self.inner
    }

    fn write(&mut self, _bytes: &[u8]) {
        debug_assert!(
            false,
            "NoopHasher only supports u64s that were already hashed"
        )
    }

    fn write_u64(&mut self, i: u64) {
        self.inner = i;
    }
}

/// An implementation of [`BuildHasher`] that just passes a u64 key straight
/// through.
#[derive(Default, Debug, Clone, Copy)]
pub struct BuildNoopHasher;

impl BuildHasher for BuildNoopHasher {
    type Hasher = NoopHasher;

    fn build_hasher(&self) -> Self::Hasher {
        NoopHasher { inner: 0 }
    }
}

/// Hash an ordered list of label values into the key used for a metric's
/// child lookup. Order matters: values are always given in the order of the
/// metric's declared variable labels.
pub fn label_hash(values: &[&str]) -> u64 {
    let mut hasher = XxHash64::with_seed(LABEL_SEED);
    for value in values {
        value.hash(&mut hasher);
    }
    hasher.finish()
}

/// Atomically add `delta` to an f64 stored as raw bits.
pub fn atomic_add_f64(bits: &AtomicU64, delta: f64) {
    let mut current = bits.load(Ordering::Relaxed);
    loop {
        let next = (f64::from_bits(current) + delta).to_bits();
        match bits.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return,
            Err(actual) => current = actual,
        }
    }
}
