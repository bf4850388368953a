//! Process-wide engine lifecycle state.
//!
//! ```text
//! Uninitialized ─▶ Initializing ─▶ Ready ─▶ Draining ─▶ Stopped
//!                        └──────── (init failure) ─────────▲
//! ```
//!
//! Transitions are compare-and-swap on a single atomic, so concurrent callers
//! observe exactly one winner per edge.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecyclePhase {
    Uninitialized = 0,
    Initializing = 1,
    Ready = 2,
    Draining = 3,
    Stopped = 4,
}

impl LifecyclePhase {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LifecyclePhase::Uninitialized,
            1 => LifecyclePhase::Initializing,
            2 => LifecyclePhase::Ready,
            3 => LifecyclePhase::Draining,
            _ => LifecyclePhase::Stopped,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecyclePhase::Uninitialized => "uninitialized",
            LifecyclePhase::Initializing => "initializing",
            LifecyclePhase::Ready => "ready",
            LifecyclePhase::Draining => "draining",
            LifecyclePhase::Stopped => "stopped",
        }
    }

    /// Numeric code exported as a gauge.
    pub fn code(self) -> i64 {
        self as u8 as i64
    }

    /// Only `Ready` admits generation traffic.
    pub fn accepts_requests(self) -> bool {
        self == LifecyclePhase::Ready
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic holder of the current [`LifecyclePhase`].
#[derive(Debug)]
pub struct EngineLifecycle {
    phase: AtomicU8,
}

impl Default for EngineLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineLifecycle {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(LifecyclePhase::Uninitialized as u8),
        }
    }

    /// Plain read of the current phase; never blocks.
    pub fn current(&self) -> LifecyclePhase {
        LifecyclePhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Move `from -> to` atomically. On mismatch returns the phase actually observed.
    pub fn transition(&self, from: LifecyclePhase, to: LifecyclePhase) -> Result<(), LifecyclePhase> {
        self.phase
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(LifecyclePhase::from_u8)
    }

    /// Unconditionally set the phase.
    pub fn force(&self, to: LifecyclePhase) {
        self.phase.store(to as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_uninitialized() {
        let lc = EngineLifecycle::new();
        assert_eq!(lc.current(), LifecyclePhase::Uninitialized);
        assert!(!lc.current().accepts_requests());
    }

    #[test]
    fn test_transition_requires_expected_phase() {
        let lc = EngineLifecycle::new();
        assert_eq!(
            lc.transition(LifecyclePhase::Ready, LifecyclePhase::Draining),
            Err(LifecyclePhase::Uninitialized)
        );

        lc.transition(LifecyclePhase::Uninitialized, LifecyclePhase::Initializing)
            .unwrap();
        lc.transition(LifecyclePhase::Initializing, LifecyclePhase::Ready)
            .unwrap();
        assert!(lc.current().accepts_requests());
    }

    #[test]
    fn test_only_one_concurrent_winner() {
        let lc = std::sync::Arc::new(EngineLifecycle::new());
        let winners: usize = (0..8)
            .map(|_| {
                let lc = lc.clone();
                std::thread::spawn(move || {
                    lc.transition(LifecyclePhase::Uninitialized, LifecyclePhase::Initializing)
                        .is_ok()
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_phase_serializes_lowercase() {
        let json = serde_json::to_string(&LifecyclePhase::Draining).unwrap();
        assert_eq!(json, "\"draining\"");
        assert_eq!(LifecyclePhase::Stopped.to_string(), "stopped");
    }
}
