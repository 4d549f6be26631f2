use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of the transport.
///
/// Legal transitions: Stopped -> Starting -> Started -> Stopping -> Stopped,
/// plus Starting -> Stopping on startup failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransportState {
    Stopped = 0,
    Starting = 1,
    Started = 2,
    Stopping = 3,
}

impl TransportState {
    fn from_u8(value: u8) -> TransportState {
        match value {
            0 => TransportState::Stopped,
            1 => TransportState::Starting,
            2 => TransportState::Started,
            _ => TransportState::Stopping,
        }
    }
}

/// Atomically-guarded lifecycle state cell.
///
/// Only `load` and compare-and-swap `transition` are exposed; there is no
/// direct store. Concurrent shutdown triggers race on `transition` and only
/// the first caller to win proceeds with teardown.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new() -> Self {
        StateCell(AtomicU8::new(TransportState::Stopped as u8))
    }

    pub fn load(&self) -> TransportState {
        TransportState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Attempt the transition `from -> to`; returns false if the current
    /// state is not `from`, leaving the state unchanged.
    pub fn transition(&self, from: TransportState, to: TransportState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let cell = StateCell::new();
        assert_eq!(cell.load(), TransportState::Stopped);
    }

    #[test]
    fn test_transition_success() {
        let cell = StateCell::new();
        assert!(cell.transition(TransportState::Stopped, TransportState::Starting));
        assert_eq!(cell.load(), TransportState::Starting);
        assert!(cell.transition(TransportState::Starting, TransportState::Started));
        assert!(cell.transition(TransportState::Started, TransportState::Stopping));
        assert!(cell.transition(TransportState::Stopping, TransportState::Stopped));
        assert_eq!(cell.load(), TransportState::Stopped);
    }

    #[test]
    fn test_transition_mismatch_is_noop() {
        let cell = StateCell::new();
        assert!(!cell.transition(TransportState::Started, TransportState::Stopping));
        assert_eq!(cell.load(), TransportState::Stopped);
    }

    #[test]
    fn test_concurrent_transition_single_winner() {
        let cell = std::sync::Arc::new(StateCell::new());
        assert!(cell.transition(TransportState::Stopped, TransportState::Starting));
        assert!(cell.transition(TransportState::Starting, TransportState::Started));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cell = cell.clone();
            handles.push(std::thread::spawn(move || {
                cell.transition(TransportState::Started, TransportState::Stopping)
            }));
        }

        let winners: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(winners, 1);
        assert_eq!(cell.load(), TransportState::Stopping);
    }
}
