//! Millisecond time base driven by the periodic tick interrupt.
//!
//! The tick context calls [`TimeBase::on_tick`] once per millisecond. Besides
//! advancing the tick count it runs the status-indicator blink divider, so the
//! loop only has to publish a blink period and never toggles pins on a timer
//! itself.
//!
//! Field ownership:
//! - `ticks`, `divider`, `seen_generation`: tick context only
//! - `blink_period`, `blink_generation`: loop only

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::board::{Indicator, IndicatorOutput, SubTickCounter};

/// Microseconds per tick.
pub const US_PER_TICK: u64 = 1000;

pub struct TimeBase {
    ticks: AtomicU64,
    blink_period: AtomicU32,
    blink_generation: AtomicU32,
    seen_generation: AtomicU32,
    divider: AtomicU32,
    sub_tick: Box<dyn SubTickCounter>,
}

impl TimeBase {
    pub fn new(sub_tick: Box<dyn SubTickCounter>) -> Self {
        Self {
            ticks: AtomicU64::new(0),
            blink_period: AtomicU32::new(0),
            blink_generation: AtomicU32::new(0),
            seen_generation: AtomicU32::new(0),
            divider: AtomicU32::new(0),
            sub_tick,
        }
    }

    /// Advance one millisecond and run the blink divider.
    ///
    /// Returns `true` when the status indicator was toggled on this tick.
    pub fn on_tick(&self, output: &dyn IndicatorOutput) -> bool {
        self.ticks.fetch_add(1, Ordering::Release);

        let generation = self.blink_generation.load(Ordering::Acquire);
        let period = self.blink_period.load(Ordering::Acquire);

        if generation != self.seen_generation.load(Ordering::Relaxed) {
            self.seen_generation.store(generation, Ordering::Relaxed);
            self.divider.store(0, Ordering::Relaxed);
        }

        if period == 0 {
            self.divider.store(0, Ordering::Relaxed);
            return false;
        }

        let count = self.divider.load(Ordering::Relaxed) + 1;
        if count >= period {
            self.divider.store(0, Ordering::Relaxed);
            output.toggle(Indicator::Status);
            true
        } else {
            self.divider.store(count, Ordering::Relaxed);
            false
        }
    }

    /// Publish a new blink period in ticks (0 stops blinking).
    ///
    /// A changed period restarts the divider on the next tick; setting the
    /// same period again leaves the running cycle alone.
    pub fn set_blink_period(&self, period_ms: u32) {
        let previous = self.blink_period.swap(period_ms, Ordering::AcqRel);
        if previous != period_ms {
            self.blink_generation.fetch_add(1, Ordering::Release);
        }
    }

    pub fn blink_period(&self) -> u32 {
        self.blink_period.load(Ordering::Acquire)
    }

    pub fn now_ms(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Microsecond timestamp.
    ///
    /// Not atomic across the tick boundary: a read racing the tick increment
    /// can come out up to one tick early.
    pub fn now_us(&self) -> u64 {
        let ms = self.now_ms();
        let sub = u64::from(self.sub_tick.elapsed_us()).min(US_PER_TICK - 1);
        ms * US_PER_TICK + sub
    }

    pub fn elapsed_ms(&self, since_ms: u64) -> u64 {
        self.now_ms().saturating_sub(since_ms)
    }

    /// Busy-wait for at least `duration_ms` ticks.
    ///
    /// Requires the tick source to be running.
    pub fn sleep_ms(&self, duration_ms: u64) {
        let start = self.now_ms();
        while self.elapsed_ms(start) < duration_ms {
            std::hint::spin_loop();
        }
    }

    /// Busy-wait for at least `duration_us` microseconds.
    pub fn sleep_us(&self, duration_us: u64) {
        let start = self.now_us();
        while self.now_us().saturating_sub(start) < duration_us {
            std::hint::spin_loop();
        }
    }
}

impl std::fmt::Debug for TimeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeBase")
            .field("ticks", &self.now_ms())
            .field("blink_period", &self.blink_period())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::sim::{SimIndicators, SimSubTick};

    fn make_timebase() -> (TimeBase, SimSubTick) {
        let sub_tick = SimSubTick::new();
        (TimeBase::new(Box::new(sub_tick.clone())), sub_tick)
    }

    #[test]
    fn test_tick_advances_ms() {
        let (time, _) = make_timebase();
        let leds = SimIndicators::new();
        assert_eq!(time.now_ms(), 0);
        for _ in 0..25 {
            time.on_tick(&leds);
        }
        assert_eq!(time.now_ms(), 25);
        assert_eq!(time.elapsed_ms(20), 5);
        assert_eq!(time.elapsed_ms(100), 0);
    }

    #[test]
    fn test_now_us_combines_ticks_and_sub_tick() {
        let (time, sub_tick) = make_timebase();
        let leds = SimIndicators::new();
        for _ in 0..3 {
            time.on_tick(&leds);
        }
        sub_tick.set(250);
        assert_eq!(time.now_us(), 3_250);

        // Out-of-range counter values are clamped into the current tick
        sub_tick.set(5_000);
        assert_eq!(time.now_us(), 3_999);
    }

    #[test]
    fn test_blink_divider_toggles_every_period() {
        let (time, _) = make_timebase();
        let leds = SimIndicators::new();
        time.set_blink_period(50);

        let toggled_at: Vec<u32> = (1..=200u32).filter(|_| time.on_tick(&leds)).collect();
        assert_eq!(toggled_at, vec![50, 100, 150, 200]);
        assert_eq!(leds.toggle_count(Indicator::Status), 4);
    }

    #[test]
    fn test_zero_period_never_toggles() {
        let (time, _) = make_timebase();
        let leds = SimIndicators::new();
        time.set_blink_period(0);
        for _ in 0..1000 {
            assert!(!time.on_tick(&leds));
        }
        assert_eq!(leds.toggle_count(Indicator::Status), 0);
    }

    #[test]
    fn test_period_change_restarts_cycle() {
        let (time, _) = make_timebase();
        let leds = SimIndicators::new();
        time.set_blink_period(100);
        for _ in 0..90 {
            time.on_tick(&leds);
        }
        assert_eq!(leds.toggle_count(Indicator::Status), 0);

        // Shorter period: the 90 ticks already counted must not carry over
        time.set_blink_period(50);
        for _ in 0..49 {
            time.on_tick(&leds);
        }
        assert_eq!(leds.toggle_count(Indicator::Status), 0);
        assert!(time.on_tick(&leds));
    }

    #[test]
    fn test_same_period_does_not_restart_cycle() {
        let (time, _) = make_timebase();
        let leds = SimIndicators::new();
        time.set_blink_period(10);
        for _ in 0..9 {
            time.on_tick(&leds);
        }
        time.set_blink_period(10);
        assert!(time.on_tick(&leds), "cycle should complete on the 10th tick");
    }

    #[test]
    fn test_sleep_ms_waits_for_ticks() {
        use std::sync::Arc;
        use std::thread;

        let (time, _) = make_timebase();
        let time = Arc::new(time);
        let ticker_time = Arc::clone(&time);

        let ticker = thread::spawn(move || {
            let leds = SimIndicators::new();
            for _ in 0..20 {
                ticker_time.on_tick(&leds);
                thread::sleep(std::time::Duration::from_micros(200));
            }
        });

        time.sleep_ms(10);
        assert!(time.now_ms() >= 10);
        ticker.join().unwrap();
    }
}
