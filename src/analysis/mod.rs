// Analysis module - cooperative acquisition loop
//
// The loop is the only consumer of the sample ring buffer. Each iteration
// checks, in priority order:
//   1. Sensor fault recorded by the capture interrupt -> halt (terminal)
//   2. Overrun flag raised -> recovery: alert, then disable the interrupt,
//      reset the buffer, clear the flag, re-enable (in that order)
//   3. Otherwise drain every frame currently available (both runs around
//      the wrap point) through Classifier -> VoteSmoother -> indicators
//
// An empty buffer is not an error; the iteration just returns Idle.
//
// Architecture:
// - CaptureIsr (interrupt) -> SampleRingBuffer -> AcquisitionLoop
// - Per frame: Classifier -> VoteSmoother -> IndicatorStateMachine
// - Per verdict: RecognitionReport into the report queue (optional)

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::board::InterruptControl;
use crate::capture::{CaptureShared, CaptureStats, ProducerQuiesced, SampleConsumer};
use crate::error::{log_sensor_error, ErrorCode, SensorError};
use crate::indicator::{IndicatorState, IndicatorStateMachine};
use crate::report::{RecognitionReport, ReportSink};
use crate::timebase::TimeBase;

pub mod classifier;
pub mod pme;
pub mod vote;

pub use classifier::{ClassId, Classifier, ModelInfo};
pub use pme::{PmeClassifier, PmeSettings, Prototype};
pub use vote::{ClassTransition, VoteSmoother};

/// Why the loop stopped for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// The capture interrupt recorded a transport error.
    SensorFault(SensorError),
    /// Stop was requested through the stop handle.
    Stopped,
}

impl HaltReason {
    pub fn is_fatal(&self) -> bool {
        matches!(self, HaltReason::SensorFault(_))
    }
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltReason::SensorFault(err) => {
                write!(f, "sensor fault (code {}): {}", err.code(), err.message())
            }
            HaltReason::Stopped => write!(f, "stopped"),
        }
    }
}

/// Work done by one drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainSummary {
    pub frames: usize,
    pub verdicts: usize,
    pub transitions: usize,
    pub last_transition: Option<ClassTransition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Buffer was empty.
    Idle,
    Drained(DrainSummary),
    /// An overrun was recovered; capture has resumed.
    Recovered,
    Halted(HaltReason),
}

/// Running totals for the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LoopStats {
    pub iterations: u64,
    pub frames_processed: u64,
    pub verdicts: u64,
    pub transitions: u64,
    pub recoveries: u64,
}

/// Everything the loop owns, assembled during bring-up.
pub struct LoopParts {
    pub consumer: SampleConsumer,
    pub shared: Arc<CaptureShared>,
    pub irq: Arc<dyn InterruptControl>,
    pub classifier: Box<dyn Classifier>,
    pub smoother: VoteSmoother,
    pub indicators: IndicatorStateMachine,
    pub time: Arc<TimeBase>,
    pub reports: Option<ReportSink>,
    pub alert_duration_ms: u64,
}

pub struct AcquisitionLoop {
    consumer: SampleConsumer,
    shared: Arc<CaptureShared>,
    irq: Arc<dyn InterruptControl>,
    classifier: Box<dyn Classifier>,
    smoother: VoteSmoother,
    indicators: IndicatorStateMachine,
    time: Arc<TimeBase>,
    reports: Option<ReportSink>,
    alert_duration_ms: u64,
    stop: Arc<AtomicBool>,
    stats: LoopStats,
    halted: Option<HaltReason>,
}

impl AcquisitionLoop {
    pub fn new(parts: LoopParts) -> Self {
        Self {
            consumer: parts.consumer,
            shared: parts.shared,
            irq: parts.irq,
            classifier: parts.classifier,
            smoother: parts.smoother,
            indicators: parts.indicators,
            time: parts.time,
            reports: parts.reports,
            alert_duration_ms: parts.alert_duration_ms,
            stop: Arc::new(AtomicBool::new(false)),
            stats: LoopStats::default(),
            halted: None,
        }
    }

    /// Flag that makes [`run_until_halt`](Self::run_until_halt) return
    /// [`HaltReason::Stopped`] at the next iteration.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Run one iteration.
    pub fn run_once(&mut self) -> IterationOutcome {
        if let Some(reason) = self.halted {
            return IterationOutcome::Halted(reason);
        }
        self.stats.iterations += 1;

        if let Some(err) = self.shared.sensor_fault() {
            self.halt_on_sensor_fault(err);
            return IterationOutcome::Halted(HaltReason::SensorFault(err));
        }

        if self.shared.overrun_pending() {
            self.recover_overrun();
            return IterationOutcome::Recovered;
        }

        let summary = self.drain();
        if summary.frames == 0 {
            IterationOutcome::Idle
        } else {
            IterationOutcome::Drained(summary)
        }
    }

    /// Iterate until a fatal condition or a stop request.
    pub fn run_until_halt(&mut self) -> HaltReason {
        loop {
            if self.stop.load(Ordering::Acquire) {
                tracing::info!("[AcquisitionLoop] Stop requested");
                self.halted = Some(HaltReason::Stopped);
                return HaltReason::Stopped;
            }
            if let IterationOutcome::Halted(reason) = self.run_once() {
                return reason;
            }
            std::hint::spin_loop();
        }
    }

    fn halt_on_sensor_fault(&mut self, err: SensorError) {
        log_sensor_error(&err, "AcquisitionLoop::run_once");
        self.irq.disable();
        self.indicators.fatal_halt();
        self.halted = Some(HaltReason::SensorFault(err));
    }

    fn recover_overrun(&mut self) {
        tracing::warn!(
            "[AcquisitionLoop] Sample buffer overrun, pausing capture for {} ms",
            self.alert_duration_ms
        );
        self.indicators.begin_overrun_alert();
        self.time.sleep_ms(self.alert_duration_ms);

        let quiesced = ProducerQuiesced::disable(self.irq.as_ref());
        self.consumer.reset(&quiesced);
        self.shared.clear_overrun(&quiesced);
        quiesced.resume();

        self.indicators.end_overrun_alert(self.smoother.current());
        self.stats.recoveries += 1;
        tracing::info!(
            "[AcquisitionLoop] Capture resumed (recovery #{}, showing class {})",
            self.stats.recoveries,
            self.smoother.current()
        );
    }

    // Frames per call are bounded by the capacity so a fast producer cannot
    // keep the loop from checking the flags.
    fn drain(&mut self) -> DrainSummary {
        let Self {
            consumer,
            classifier,
            smoother,
            indicators,
            reports,
            stats,
            ..
        } = self;

        let limit = consumer.capacity();
        let mut summary = DrainSummary::default();

        while summary.frames < limit {
            let batch = consumer.get_read_batch();
            if batch.is_empty() {
                break;
            }
            let n = batch.len().min(limit - summary.frames);

            for frame in &batch[..n] {
                let verdict = classifier.classify(frame);

                if let Some(class) = verdict {
                    summary.verdicts += 1;
                    if let Some(sink) = reports.as_mut() {
                        let report = RecognitionReport::new(
                            classifier.model().index,
                            class,
                            classifier.feature_vector(),
                        );
                        sink.push(report);
                    }
                }

                if let Some(transition) = smoother.record(verdict) {
                    summary.transitions += 1;
                    summary.last_transition = Some(transition);
                    tracing::info!(
                        "[AcquisitionLoop] Class {} -> {} ({})",
                        transition.from,
                        transition.to,
                        classifier.model().label(transition.to).unwrap_or("?")
                    );
                    indicators.on_class_change(transition.to);
                }
            }

            consumer.advance_read(n);
            summary.frames += n;
        }

        stats.frames_processed += summary.frames as u64;
        stats.verdicts += summary.verdicts as u64;
        stats.transitions += summary.transitions as u64;
        summary
    }

    pub fn current_class(&self) -> ClassId {
        self.smoother.current()
    }

    pub fn indicator_state(&self) -> IndicatorState {
        self.indicators.state()
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn capture_stats(&self) -> CaptureStats {
        self.shared.stats()
    }

    pub fn halt_reason(&self) -> Option<HaltReason> {
        self.halted
    }

    pub fn model(&self) -> &ModelInfo {
        self.classifier.model()
    }

    pub fn smoother(&self) -> &VoteSmoother {
        &self.smoother
    }

    pub fn reports_dropped(&self) -> u64 {
        self.reports.as_ref().map_or(0, ReportSink::dropped)
    }

    pub fn buffered_frames(&self) -> usize {
        self.consumer.len()
    }
}
