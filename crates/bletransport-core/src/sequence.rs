use std::sync::atomic::{AtomicU32, Ordering};

/// Monotonically increasing sequence counter tagging outgoing requests so
/// responses can be correlated. Owned by the transport instance; values
/// stay within `0..=i32::MAX` so they never collide with the -1 wildcard.
#[derive(Debug, Default)]
pub struct SeqCounter(AtomicU32);

impl SeqCounter {
    pub fn new() -> Self {
        SeqCounter(AtomicU32::new(0))
    }

    pub fn next(&self) -> i32 {
        (self.0.fetch_add(1, Ordering::Relaxed) & 0x7fff_ffff) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_monotonic() {
        let counter = SeqCounter::new();
        let a = counter.next();
        let b = counter.next();
        let c = counter.next();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_sequence_is_never_negative() {
        let counter = SeqCounter(AtomicU32::new(u32::MAX - 1));
        for _ in 0..4 {
            assert!(counter.next() >= 0);
        }
    }
}
