// VoteSmoother - majority-vote debouncing of per-frame class verdicts
//
// Keeps the last N verdicts in a ring and a histogram over the K class ids.
// The window starts filled with the seed class, so the histogram always sums
// to N and the current class starts as the seed.
//
// record(verdict):
//   None                -> ignored (not voted)
//   Some(id), id >= K   -> rejected and counted
//   Some(id)            -> evict oldest, insert id, then pick the class with
//                          the strictly largest count (ties to the lowest id);
//                          if it has at least (N+1)/2 votes and differs from
//                          the current class, report a transition.

use serde::Serialize;

use super::classifier::ClassId;
use crate::error::ConfigError;

/// Edge reported when the smoothed class changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassTransition {
    pub from: ClassId,
    pub to: ClassId,
}

pub struct VoteSmoother {
    window: Box<[ClassId]>,
    // Index of the oldest vote
    head: usize,
    counts: Box<[u16]>,
    majority: u16,
    current: ClassId,
    hold_until_primed: bool,
    voted: usize,
    rejected: u64,
}

impl VoteSmoother {
    /// # Errors
    /// - [`ConfigError::WindowSizeEven`] if `window_size` is even or zero
    /// - [`ConfigError::ClassTableInvalid`] if `num_classes < 2`, the seed is
    ///   out of range, or the window does not fit the vote counters
    pub fn new(window_size: usize, num_classes: usize, seed: ClassId) -> Result<Self, ConfigError> {
        if window_size % 2 == 0 {
            return Err(ConfigError::WindowSizeEven { window_size });
        }
        if window_size > u16::MAX as usize {
            return Err(ConfigError::ClassTableInvalid {
                reason: format!("window size {} too large", window_size),
            });
        }
        if !(2..=256).contains(&num_classes) {
            return Err(ConfigError::ClassTableInvalid {
                reason: format!("class count {} outside 2..=256", num_classes),
            });
        }
        if seed.index() >= num_classes {
            return Err(ConfigError::ClassTableInvalid {
                reason: format!("seed class {} outside 0..{}", seed, num_classes),
            });
        }

        let mut counts = vec![0u16; num_classes].into_boxed_slice();
        counts[seed.index()] = window_size as u16;

        Ok(Self {
            window: vec![seed; window_size].into_boxed_slice(),
            head: 0,
            counts,
            majority: ((window_size + 1) / 2) as u16,
            current: seed,
            hold_until_primed: false,
            voted: 0,
            rejected: 0,
        })
    }

    /// Suppress decisions until N real verdicts have been recorded.
    pub fn with_hold_until_primed(mut self, hold: bool) -> Self {
        self.hold_until_primed = hold;
        self
    }

    /// Record one verdict; returns the transition if the smoothed class changed.
    pub fn record(&mut self, verdict: Option<ClassId>) -> Option<ClassTransition> {
        let class = verdict?;
        if class.index() >= self.counts.len() {
            self.rejected += 1;
            return None;
        }

        let evicted = self.window[self.head];
        self.counts[evicted.index()] -= 1;
        self.window[self.head] = class;
        self.counts[class.index()] += 1;
        self.head = (self.head + 1) % self.window.len();
        self.voted = self.voted.saturating_add(1);

        if self.hold_until_primed && self.voted < self.window.len() {
            return None;
        }

        let (leader, votes) = self.leader();
        if votes >= self.majority && leader != self.current {
            let transition = ClassTransition {
                from: self.current,
                to: leader,
            };
            self.current = leader;
            return Some(transition);
        }
        None
    }

    // Strictly largest count; scanning upwards keeps ties on the lowest id.
    fn leader(&self) -> (ClassId, u16) {
        let mut best = (0usize, 0u16);
        for (id, &count) in self.counts.iter().enumerate() {
            if count > best.1 {
                best = (id, count);
            }
        }
        (ClassId(best.0 as u8), best.1)
    }

    pub fn current(&self) -> ClassId {
        self.current
    }

    pub fn counts(&self) -> &[u16] {
        &self.counts
    }

    /// Votes from oldest to newest.
    pub fn window(&self) -> impl Iterator<Item = ClassId> + '_ {
        let (newer, older) = self.window.split_at(self.head);
        older.iter().chain(newer.iter()).copied()
    }

    pub fn window_size(&self) -> usize {
        self.window.len()
    }

    pub fn majority(&self) -> u16 {
        self.majority
    }

    /// Verdicts dropped for carrying an id outside the class table.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

#[cfg(test)]
#[path = "vote_tests.rs"]
mod tests;
