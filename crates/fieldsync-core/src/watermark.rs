//! The device watermark.

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// The instant before which the device has consumed every field-level change.
///
/// Only ever moves forward: candidates from batch groups that complete out of
/// order are folded in with `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Watermark(Timestamp);

impl Watermark {
    pub const fn new(at: Timestamp) -> Self {
        Self(at)
    }

    pub const fn get(&self) -> Timestamp {
        self.0
    }

    /// Fold in a candidate. Returns true iff the watermark moved.
    pub fn advance(&mut self, candidate: Timestamp) -> bool {
        if candidate > self.0 {
            self.0 = candidate;
            true
        } else {
            false
        }
    }
}

/// A watermark that holds candidates back while batch groups are open.
///
/// A completed candidate may be newer than members of another group that
/// has not fully arrived. Such candidates are held and released up to just
/// below the oldest open member; the rest is released once the open groups
/// complete.
#[derive(Debug, Clone, Default)]
pub struct WatermarkGate {
    watermark: Watermark,
    held: Option<Timestamp>,
}

impl WatermarkGate {
    pub fn new(watermark: Watermark) -> Self {
        Self {
            watermark,
            held: None,
        }
    }

    pub fn get(&self) -> Timestamp {
        self.watermark.get()
    }

    /// The newest candidate not yet applied, if any.
    pub fn held(&self) -> Option<Timestamp> {
        self.held
    }

    /// Record a completion candidate without applying it.
    pub fn offer(&mut self, candidate: Timestamp) {
        self.held = Some(self.held.map_or(candidate, |h| h.max(candidate)));
    }

    /// Move the watermark directly, e.g. to a value restored at startup.
    pub fn restore(&mut self, at: Timestamp) -> bool {
        self.watermark.advance(at)
    }

    /// Apply held candidates, staying strictly below `floor` when given.
    ///
    /// Returns true iff the watermark moved.
    pub fn release(&mut self, floor: Option<Timestamp>) -> bool {
        let Some(held) = self.held else {
            return false;
        };
        let admissible = match floor {
            Some(floor) if held >= floor => {
                Timestamp::from_millis(floor.as_millis().saturating_sub(1))
            }
            _ => {
                self.held = None;
                held
            }
        };
        self.watermark.advance(admissible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ts(ms: i64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    #[test]
    fn test_gate_holds_back_below_open_group() {
        let mut gate = WatermarkGate::default();
        gate.offer(ts(30));
        assert!(gate.release(Some(ts(10))));
        assert_eq!(gate.get(), ts(9));
        assert_eq!(gate.held(), Some(ts(30)));

        gate.offer(ts(20));
        assert!(gate.release(None));
        assert_eq!(gate.get(), ts(30));
        assert_eq!(gate.held(), None);
    }

    #[test]
    fn test_gate_releases_candidate_below_floor() {
        let mut gate = WatermarkGate::new(Watermark::new(ts(5)));
        gate.offer(ts(8));
        assert!(gate.release(Some(ts(50))));
        assert_eq!(gate.get(), ts(8));
        assert!(!gate.release(Some(ts(50))));
    }

    #[test]
    fn test_gate_never_regresses() {
        let mut gate = WatermarkGate::new(Watermark::new(ts(100)));
        gate.offer(ts(200));
        assert!(!gate.release(Some(ts(50))));
        assert_eq!(gate.get(), ts(100));
    }

    #[test]
    fn test_advance_ignores_older_candidates() {
        let mut wm = Watermark::new(Timestamp::from_millis(100));
        assert!(!wm.advance(Timestamp::from_millis(50)));
        assert!(!wm.advance(Timestamp::from_millis(100)));
        assert_eq!(wm.get(), Timestamp::from_millis(100));
        assert!(wm.advance(Timestamp::from_millis(101)));
        assert_eq!(wm.get(), Timestamp::from_millis(101));
    }

    proptest! {
        #[test]
        fn gate_stays_below_floor(
            candidates in prop::collection::vec(0i64..1_000, 1..20),
            floor in 1i64..1_000,
        ) {
            let mut gate = WatermarkGate::default();
            for c in candidates {
                gate.offer(ts(c));
                gate.release(Some(ts(floor)));
                prop_assert!(gate.get() < ts(floor));
            }
        }

        #[test]
        fn watermark_is_non_decreasing(candidates in prop::collection::vec(any::<i64>(), 0..50)) {
            let mut wm = Watermark::default();
            let mut previous = wm.get();
            for c in candidates {
                wm.advance(Timestamp::from_millis(c));
                prop_assert!(wm.get() >= previous);
                previous = wm.get();
            }
        }
    }
}
