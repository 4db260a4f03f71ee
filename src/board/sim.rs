//! Host implementations of the board seams.
//!
//! Used by the unit tests, the integration tests and the `fanwatch-sim`
//! binary. Everything here is deterministic for a given seed except
//! [`SimTicker`], which runs on a real thread.

use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{
    CaptureInterrupt, Indicator, IndicatorOutput, InterruptControl, SensorRanges, SensorTransport,
    SubTickCounter,
};
use crate::analysis::{ClassId, Classifier, ModelInfo, PmeClassifier, PmeSettings};
use crate::capture::{CaptureIsr, CaptureOutcome, SampleFrame, SampleValue};
use crate::error::{ClassifierError, SensorError};
use crate::timebase::TimeBase;

/// LSB per g at the ±2 g range.
const ONE_G_AT_2G: i32 = 16384;

/// Signal shape generated on the primary axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "profile", rename_all = "snake_case")]
pub enum SignalProfile {
    /// Fan off: noise only.
    Still,
    /// Running fan: sine at `frequency_hz`.
    Vibration { frequency_hz: f32, amplitude: SampleValue },
    /// Slow, large swings.
    Shaking,
    /// Short spikes twice a second.
    Tapping,
    /// Primary axis counts up by one per frame, no noise.
    Ramp,
}

impl SignalProfile {
    pub const SPEED_1: SignalProfile = SignalProfile::Vibration {
        frequency_hz: 4.0,
        amplitude: 3000,
    };
    pub const SPEED_2: SignalProfile = SignalProfile::Vibration {
        frequency_hz: 8.0,
        amplitude: 3000,
    };
    pub const SPEED_3: SignalProfile = SignalProfile::Vibration {
        frequency_hz: 16.0,
        amplitude: 3000,
    };
}

/// Simulated IMU.
pub struct SimSensor {
    rng: StdRng,
    profile: SignalProfile,
    axes: usize,
    accel_enabled: bool,
    sample_rate_hz: u32,
    noise: SampleValue,
    phase: f32,
    sample_index: u64,
    reads: u64,
    initialized: bool,
    fail_init: Option<SensorError>,
    fail_configure: Option<SensorError>,
    fail_reads: Option<(u64, SensorError)>,
}

impl SimSensor {
    pub fn new(axes: usize, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            profile: SignalProfile::Still,
            axes,
            accel_enabled: true,
            sample_rate_hz: 100,
            noise: 20,
            phase: 0.0,
            sample_index: 0,
            reads: 0,
            initialized: false,
            fail_init: None,
            fail_configure: None,
            fail_reads: None,
        }
    }

    pub fn with_profile(mut self, profile: SignalProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn set_profile(&mut self, profile: SignalProfile) {
        self.profile = profile;
    }

    pub fn profile(&self) -> SignalProfile {
        self.profile
    }

    /// `init` will fail with `err`.
    pub fn fail_init_with(mut self, err: SensorError) -> Self {
        self.fail_init = Some(err);
        self
    }

    /// `configure` will fail with `err`.
    pub fn fail_configure_with(mut self, err: SensorError) -> Self {
        self.fail_configure = Some(err);
        self
    }

    /// Every read attempt after the first `reads` fails with `err`.
    pub fn fail_reads_after(&mut self, reads: u64, err: SensorError) {
        self.fail_reads = Some((reads, err));
    }

    /// Read attempts so far, failed ones included.
    pub fn reads(&self) -> u64 {
        self.reads
    }

    pub fn axes(&self) -> usize {
        self.axes
    }

    /// Next primary-axis value without building a frame.
    pub fn next_primary(&mut self) -> SampleValue {
        let rate = self.sample_rate_hz.max(1) as f32;
        let index = self.sample_index;
        self.sample_index += 1;

        let clean: i32 = match self.profile {
            SignalProfile::Still => 0,
            SignalProfile::Ramp => return index as SampleValue,
            SignalProfile::Vibration {
                frequency_hz,
                amplitude,
            } => self.advance_sine(frequency_hz, rate, amplitude),
            SignalProfile::Shaking => self.advance_sine(2.0, rate, 12000),
            SignalProfile::Tapping => {
                let interval = (self.sample_rate_hz / 2).max(1) as u64;
                if index % interval == 0 {
                    20000
                } else {
                    0
                }
            }
        };
        clamp_sample(clean + self.jitter())
    }

    fn advance_sine(&mut self, frequency_hz: f32, rate: f32, amplitude: SampleValue) -> i32 {
        let value = (2.0 * PI * self.phase).sin() * amplitude as f32;
        self.phase += frequency_hz / rate;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        value as i32
    }

    fn jitter(&mut self) -> i32 {
        let noise = self.noise as i32;
        self.rng.gen_range(-noise..=noise)
    }

    /// Generate `count` primary-axis samples of `profile`, for training.
    pub fn record(profile: SignalProfile, count: usize, seed: u64) -> Vec<SampleValue> {
        let mut sensor = SimSensor::new(1, seed).with_profile(profile);
        (0..count).map(|_| sensor.next_primary()).collect()
    }
}

fn clamp_sample(value: i32) -> SampleValue {
    value.clamp(SampleValue::MIN as i32, SampleValue::MAX as i32) as SampleValue
}

impl SensorTransport for SimSensor {
    fn init(&mut self) -> Result<(), SensorError> {
        if let Some(err) = self.fail_init {
            return Err(err);
        }
        self.initialized = true;
        Ok(())
    }

    fn configure(&mut self, sample_rate_hz: u32, ranges: SensorRanges) -> Result<(), SensorError> {
        if !self.initialized {
            return Err(SensorError::NotInitialized);
        }
        if let Some(err) = self.fail_configure {
            return Err(err);
        }
        self.sample_rate_hz = sample_rate_hz;
        self.axes = ranges.axis_count();
        self.accel_enabled = ranges.accel_g.is_some();
        Ok(())
    }

    fn read_frame(&mut self) -> Result<SampleFrame, SensorError> {
        if !self.initialized {
            return Err(SensorError::NotInitialized);
        }
        let attempt = self.reads;
        self.reads += 1;
        if let Some((after, err)) = self.fail_reads {
            if attempt >= after {
                return Err(err);
            }
        }

        let mut frame = SampleFrame::zeroed(self.axes);
        let primary = self.next_primary();
        let ramp = self.profile == SignalProfile::Ramp;
        let accel = self.accel_enabled;
        for (axis, value) in frame.values_mut().iter_mut().enumerate() {
            *value = match axis {
                0 => primary,
                _ if ramp => 0,
                2 if accel => clamp_sample(ONE_G_AT_2G + self.jitter()),
                _ => clamp_sample(self.jitter()),
            };
        }
        Ok(frame)
    }
}

/// Indicator outputs backed by atomics, with per-indicator toggle counts.
#[derive(Debug, Default)]
pub struct SimIndicators {
    levels: [AtomicBool; 4],
    toggles: [AtomicU64; 4],
}

impl SimIndicators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on(&self, indicator: Indicator) -> bool {
        self.levels[indicator.index()].load(Ordering::Acquire)
    }

    pub fn toggle_count(&self, indicator: Indicator) -> u64 {
        self.toggles[indicator.index()].load(Ordering::Acquire)
    }

    /// Indicators currently on, in [`Indicator::ALL`] order.
    pub fn lit(&self) -> Vec<Indicator> {
        Indicator::ALL
            .into_iter()
            .filter(|&indicator| self.is_on(indicator))
            .collect()
    }
}

impl IndicatorOutput for SimIndicators {
    fn set(&self, indicator: Indicator, on: bool) {
        self.levels[indicator.index()].store(on, Ordering::Release);
    }

    fn toggle(&self, indicator: Indicator) {
        self.levels[indicator.index()].fetch_xor(true, Ordering::AcqRel);
        self.toggles[indicator.index()].fetch_add(1, Ordering::AcqRel);
    }
}

/// Interrupt line that calls the attached handler on [`fire`](Self::fire).
///
/// Starts disabled. The mutex stands in for the CPU running one handler at
/// a time; it is never taken by the loop.
pub struct SimInterruptLine<S: SensorTransport> {
    enabled: AtomicBool,
    handler: Mutex<Option<CaptureIsr<S>>>,
    fired: AtomicU64,
    masked: AtomicU64,
}

impl<S: SensorTransport> SimInterruptLine<S> {
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            handler: Mutex::new(None),
            fired: AtomicU64::new(0),
            masked: AtomicU64::new(0),
        }
    }

    /// Raise the interrupt. `None` when masked or no handler is attached.
    pub fn fire(&self) -> Option<CaptureOutcome> {
        if !self.enabled.load(Ordering::Acquire) {
            self.masked.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        let mut handler = self.lock_handler();
        // Lost a race with disable()
        if !self.enabled.load(Ordering::Acquire) {
            self.masked.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        self.fired.fetch_add(1, Ordering::Relaxed);
        handler.as_mut().map(CaptureIsr::on_interrupt)
    }

    /// Interrupts dispatched to the handler.
    pub fn fired(&self) -> u64 {
        self.fired.load(Ordering::Relaxed)
    }

    /// Interrupts dropped because the line was disabled.
    pub fn masked(&self) -> u64 {
        self.masked.load(Ordering::Relaxed)
    }

    pub fn is_attached(&self) -> bool {
        self.lock_handler().is_some()
    }

    /// Run `f` on the attached handler's sensor.
    pub fn with_sensor<R>(&self, f: impl FnOnce(&mut S) -> R) -> Option<R> {
        self.lock_handler().as_mut().map(|isr| f(isr.sensor_mut()))
    }

    fn lock_handler(&self) -> MutexGuard<'_, Option<CaptureIsr<S>>> {
        match self.handler.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("[SimInterruptLine] Handler lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl<S: SensorTransport> Default for SimInterruptLine<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: SensorTransport> InterruptControl for SimInterruptLine<S> {
    fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
        // Wait out a handler already running on another thread
        drop(self.lock_handler());
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

impl<S: SensorTransport> CaptureInterrupt<S> for SimInterruptLine<S> {
    fn attach(&self, isr: CaptureIsr<S>) {
        *self.lock_handler() = Some(isr);
    }
}

/// Settable sub-millisecond counter.
#[derive(Debug, Clone, Default)]
pub struct SimSubTick {
    us: Arc<AtomicU32>,
}

impl SimSubTick {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, us: u32) {
        self.us.store(us, Ordering::Release);
    }
}

impl SubTickCounter for SimSubTick {
    fn elapsed_us(&self) -> u32 {
        self.us.load(Ordering::Acquire)
    }
}

/// Background thread standing in for the 1 kHz tick interrupt.
///
/// `interval` is the wall-clock time per simulated millisecond, so tests can
/// run the time base faster than real time. Stops on drop.
pub struct SimTicker {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SimTicker {
    pub fn start(time: Arc<TimeBase>, output: Arc<dyn IndicatorOutput>, interval: Duration) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);

        let handle = thread::spawn(move || {
            while thread_running.load(Ordering::Acquire) {
                time.on_tick(output.as_ref());
                thread::sleep(interval);
            }
        });

        Self {
            running,
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("[SimTicker] Tick thread panicked");
            }
        }
    }
}

impl Drop for SimTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Classifier that replays a fixed verdict script, one entry per frame.
///
/// Frames past the end of the script repeat the last entry.
pub struct ScriptedClassifier {
    model: ModelInfo,
    script: Vec<Option<ClassId>>,
    position: usize,
    features: [u8; 1],
    fail_init: Option<ClassifierError>,
    frames_seen: u64,
}

impl ScriptedClassifier {
    pub fn new(model: ModelInfo, script: Vec<Option<ClassId>>) -> Self {
        Self {
            model,
            script,
            position: 0,
            features: [0],
            fail_init: None,
            frames_seen: 0,
        }
    }

    /// Every frame yields `class`.
    pub fn constant(model: ModelInfo, class: ClassId) -> Self {
        Self::new(model, vec![Some(class)])
    }

    pub fn fail_init_with(mut self, err: ClassifierError) -> Self {
        self.fail_init = Some(err);
        self
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

impl Classifier for ScriptedClassifier {
    fn init(&mut self) -> Result<(), ClassifierError> {
        match &self.fail_init {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn classify(&mut self, frame: &SampleFrame) -> Option<ClassId> {
        self.frames_seen += 1;
        let verdict = match self.script.get(self.position) {
            Some(&verdict) => {
                self.position += 1;
                verdict
            }
            None => self.script.last().copied().flatten(),
        };
        // Report the low byte of the primary axis as the "feature"
        self.features[0] = frame.axis(0) as u8;
        verdict
    }

    fn model(&self) -> &ModelInfo {
        &self.model
    }

    fn feature_vector(&self) -> &[u8] {
        &self.features
    }
}

/// Profiles the reference pack is trained on, with their class ids.
pub fn training_profiles() -> [(SignalProfile, ClassId); 6] {
    [
        (SignalProfile::Still, ClassId(1)),
        (SignalProfile::Shaking, ClassId(2)),
        (SignalProfile::SPEED_1, ClassId(3)),
        (SignalProfile::SPEED_2, ClassId(4)),
        (SignalProfile::SPEED_3, ClassId(5)),
        (SignalProfile::Tapping, ClassId(6)),
    ]
}

/// PME pack trained on simulated recordings of every profile.
pub fn reference_classifier(model: ModelInfo, settings: PmeSettings, seed: u64) -> PmeClassifier {
    let mut classifier = PmeClassifier::new(model, settings);
    let recording_len = settings.window_len * 8;
    for (i, (profile, class)) in training_profiles().into_iter().enumerate() {
        let signal = SimSensor::record(profile, recording_len, seed.wrapping_add(i as u64));
        classifier.learn_signal(class, &signal);
    }
    classifier
}

/// One stretch of a simulated run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSegment {
    #[serde(flatten)]
    pub profile: SignalProfile,
    /// Sensor interrupts in this segment
    pub frames: u64,
    /// Loop does not run during this segment
    #[serde(default)]
    pub stall: bool,
}

/// Scripted simulation input for `fanwatch-sim run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub segments: Vec<ScenarioSegment>,
    /// Successful sensor reads before every further read fails
    #[serde(default)]
    pub sensor_fault_after: Option<u64>,
}

impl Default for Scenario {
    fn default() -> Self {
        let segment = |profile, frames| ScenarioSegment {
            profile,
            frames,
            stall: false,
        };
        Self {
            segments: vec![
                segment(SignalProfile::Still, 300),
                segment(SignalProfile::SPEED_1, 400),
                segment(SignalProfile::SPEED_3, 400),
                segment(SignalProfile::Shaking, 300),
                segment(SignalProfile::Tapping, 300),
            ],
            sensor_fault_after: None,
        }
    }
}

impl Scenario {
    pub fn total_frames(&self) -> u64 {
        self.segments.iter().map(|s| s.frames).sum()
    }
}
