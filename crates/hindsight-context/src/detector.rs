//! Change-gating for context mode.
//!
//! A frame is persisted only if it is visually distinct from the last
//! *accepted* frame and at least one second has passed since that
//! acceptance. The throttle runs before the hash so identical bursts cost
//! nothing; the stored hash is always the accepted frame's own.

use std::time::Duration;

use tokio::time::Instant;

use crate::phash::PerceptualHash;

/// Minimum spacing between two acceptances (1 FPS ceiling).
pub const MIN_ACCEPT_INTERVAL: Duration = Duration::from_secs(1);

/// Why a frame was not persisted, or the hash of one that was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted(PerceptualHash),
    /// Less than [`MIN_ACCEPT_INTERVAL`] since the previous acceptance.
    Throttled,
    /// Hamming distance to the previous accepted hash was not above the
    /// change threshold.
    Unchanged { distance: u32 },
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted(_))
    }
}

pub struct ChangeDetector {
    threshold: u32,
    last: Option<(PerceptualHash, Instant)>,
}

impl ChangeDetector {
    pub fn new(threshold: u32) -> Self {
        Self { threshold, last: None }
    }

    /// Decide whether the frame presented at `now` should be persisted.
    /// The first frame of a run is always accepted.
    pub fn evaluate(&mut self, bgra: &[u8], width: u32, height: u32, now: Instant) -> Verdict {
        if let Some((_, accepted_at)) = self.last {
            if now.duration_since(accepted_at) < MIN_ACCEPT_INTERVAL {
                return Verdict::Throttled;
            }
        }

        let hash = PerceptualHash::compute(bgra, width, height);
        match self.last {
            None => {
                self.last = Some((hash, now));
                Verdict::Accepted(hash)
            }
            Some((previous, _)) => {
                let distance = hash.hamming(&previous);
                if distance > self.threshold {
                    self.last = Some((hash, now));
                    Verdict::Accepted(hash)
                } else {
                    Verdict::Unchanged { distance }
                }
            }
        }
    }
}
