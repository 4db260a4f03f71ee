// Indicator state machine - maps pipeline state onto the board LEDs
//
// States:
//   Uninitialized --enter_running(seed)--> PerClass(seed)
//   PerClass(x)   --on_class_change(y)--> PerClass(y)
//   any           --begin_overrun_alert--> OverrunAlert
//   OverrunAlert  --end_overrun_alert(c)--> PerClass(c)
//   any           --fatal_halt--> FatalHalt (terminal)
//
// Every state change first stops the blink divider and switches all
// indicators off, then applies the new pattern.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::analysis::ClassId;
use crate::board::{Indicator, IndicatorOutput};
use crate::timebase::TimeBase;

/// Blink period used for classes without an explicit pattern.
pub const DEFAULT_BLINK_MS: u32 = 500;

/// How the status indicator shows a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum IndicatorPattern {
    Steady,
    Blink { period_ms: u32 },
}

/// One row of the per-class pattern table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassPattern {
    pub class_id: u8,
    pub pattern: IndicatorPattern,
}

/// Pattern table from the fan-condition model.
pub fn default_patterns() -> Vec<ClassPattern> {
    use IndicatorPattern::*;
    [
        (0, Blink { period_ms: 50 }),
        (1, Steady),
        (2, Blink { period_ms: 100 }),
        (3, Blink { period_ms: 1000 }),
        (4, Blink { period_ms: 600 }),
        (5, Blink { period_ms: 300 }),
        (6, Blink { period_ms: 50 }),
    ]
    .into_iter()
    .map(|(class_id, pattern)| ClassPattern { class_id, pattern })
    .collect()
}

/// Lookup table from class id to pattern, resolved at bring-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternTable {
    by_class: Vec<Option<IndicatorPattern>>,
    fallback: IndicatorPattern,
}

impl PatternTable {
    /// Build a table for `num_classes` ids. Rows with ids outside the range
    /// are ignored; config validation rejects them earlier.
    pub fn new(num_classes: usize, rows: &[ClassPattern], fallback_blink_ms: u32) -> Self {
        let mut by_class = vec![None; num_classes];
        for row in rows {
            if let Some(slot) = by_class.get_mut(row.class_id as usize) {
                *slot = Some(row.pattern);
            }
        }
        Self {
            by_class,
            fallback: IndicatorPattern::Blink {
                period_ms: fallback_blink_ms,
            },
        }
    }

    pub fn pattern_for(&self, class: ClassId) -> IndicatorPattern {
        self.by_class
            .get(class.index())
            .copied()
            .flatten()
            .unwrap_or(self.fallback)
    }
}

impl Default for PatternTable {
    fn default() -> Self {
        Self::new(7, &default_patterns(), DEFAULT_BLINK_MS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "class_id", rename_all = "snake_case")]
pub enum IndicatorState {
    Uninitialized,
    PerClass(ClassId),
    OverrunAlert,
    FatalHalt,
}

pub struct IndicatorStateMachine {
    output: Arc<dyn IndicatorOutput>,
    time: Arc<TimeBase>,
    patterns: PatternTable,
    state: IndicatorState,
}

impl IndicatorStateMachine {
    pub fn new(output: Arc<dyn IndicatorOutput>, time: Arc<TimeBase>, patterns: PatternTable) -> Self {
        Self {
            output,
            time,
            patterns,
            state: IndicatorState::Uninitialized,
        }
    }

    pub fn state(&self) -> IndicatorState {
        self.state
    }

    pub fn patterns(&self) -> &PatternTable {
        &self.patterns
    }

    /// Leave `Uninitialized` after a successful bring-up.
    pub fn enter_running(&mut self, seed: ClassId) -> bool {
        if self.state != IndicatorState::Uninitialized {
            log::warn!("[Indicator] enter_running ignored in state {:?}", self.state);
            return false;
        }
        self.show_class(seed);
        true
    }

    /// Apply a smoother transition. Only honoured while showing a class.
    pub fn on_class_change(&mut self, class: ClassId) -> bool {
        match self.state {
            IndicatorState::PerClass(current) if current == class => false,
            IndicatorState::PerClass(_) => {
                self.show_class(class);
                true
            }
            _ => false,
        }
    }

    /// Status and red on, steady. No-op once halted.
    pub fn begin_overrun_alert(&mut self) {
        if self.state == IndicatorState::FatalHalt {
            return;
        }
        self.clear();
        self.output.set(Indicator::Status, true);
        self.output.set(Indicator::Red, true);
        self.state = IndicatorState::OverrunAlert;
    }

    /// Return from the alert to the pattern of `current`.
    pub fn end_overrun_alert(&mut self, current: ClassId) {
        if self.state != IndicatorState::OverrunAlert {
            return;
        }
        self.show_class(current);
    }

    /// All off, red on, no blinking. Terminal.
    pub fn fatal_halt(&mut self) {
        if self.state == IndicatorState::FatalHalt {
            return;
        }
        self.clear();
        self.output.set(Indicator::Red, true);
        self.state = IndicatorState::FatalHalt;
    }

    fn show_class(&mut self, class: ClassId) {
        self.clear();
        match self.patterns.pattern_for(class) {
            IndicatorPattern::Steady => self.output.set(Indicator::Status, true),
            IndicatorPattern::Blink { period_ms } => self.time.set_blink_period(period_ms),
        }
        self.state = IndicatorState::PerClass(class);
    }

    fn clear(&self) {
        self.time.set_blink_period(0);
        self.output.all_off();
    }
}
