//! Bring-up: wires the board parts into a running acquisition pipeline.
//!
//! Order matters and mirrors the board's startup:
//! 1. validate the configuration
//! 2. allocate the sample buffer, vote window and report queue
//! 3. initialize and configure the sensor, log the sampling banner
//! 4. initialize the classifier, log the model uuid
//! 5. attach the capture handler to the (disabled) interrupt line
//! 6. indicators leave `Uninitialized` for the seed class
//! 7. enable the interrupt
//!
//! A failure from step 3 on drives the indicators to `FatalHalt`; the
//! interrupt is never enabled.

use std::sync::Arc;

use crate::analysis::{AcquisitionLoop, ClassId, Classifier, LoopParts, VoteSmoother};
use crate::board::{CaptureInterrupt, IndicatorOutput, InterruptControl, SensorTransport};
use crate::capture::{CaptureIsr, CaptureShared, SampleChannels, SampleRingBuffer};
use crate::config::AppConfig;
use crate::error::{
    log_classifier_error, log_config_error, log_sensor_error, ConfigError, PipelineError,
};
use crate::indicator::{IndicatorStateMachine, PatternTable};
use crate::report::{ReportChannels, ReportDrain, ReportQueue};
use crate::timebase::TimeBase;

/// Board collaborators handed to [`bring_up`].
pub struct BoardParts<S, L>
where
    S: SensorTransport,
    L: CaptureInterrupt<S>,
{
    pub sensor: S,
    pub line: Arc<L>,
    pub indicators: Arc<dyn IndicatorOutput>,
    pub time: Arc<TimeBase>,
    pub classifier: Box<dyn Classifier>,
}

/// A running pipeline: the loop plus the writer end of the report queue.
pub struct Pipeline {
    pub acquisition: AcquisitionLoop,
    pub reports: Option<ReportDrain>,
}

/// Start the pipeline. See the module docs for the sequence.
///
/// # Errors
/// The first configuration, sensor or classifier error encountered.
pub fn bring_up<S, L>(config: &AppConfig, parts: BoardParts<S, L>) -> Result<Pipeline, PipelineError>
where
    S: SensorTransport,
    L: CaptureInterrupt<S> + 'static,
{
    if let Err(err) = config.validate() {
        log_config_error(&err, "bring_up");
        return Err(err.into());
    }

    let BoardParts {
        mut sensor,
        line,
        indicators,
        time,
        mut classifier,
    } = parts;
    line.disable();

    let num_classes = config.voting.num_classes;
    let patterns = PatternTable::new(
        num_classes,
        &config.indicator.patterns,
        config.indicator.default_blink_ms,
    );
    let mut state = IndicatorStateMachine::new(indicators, Arc::clone(&time), patterns);

    let axes = config.sensor.axis_count();
    let SampleChannels { producer, consumer } =
        match SampleRingBuffer::new(config.buffer.capacity, axes) {
            Ok(channels) => channels,
            Err(err) => {
                log_config_error(&err, "bring_up: sample buffer");
                return fail(&mut state, err.into());
            }
        };

    let seed = ClassId(config.voting.seed_class);
    let smoother = match VoteSmoother::new(config.voting.window_size, num_classes, seed) {
        Ok(smoother) => smoother.with_hold_until_primed(config.voting.hold_until_primed),
        Err(err) => {
            log_config_error(&err, "bring_up: vote window");
            return fail(&mut state, err.into());
        }
    };

    let (report_sink, report_drain) = if config.report.enabled {
        let ReportChannels { sink, drain } =
            ReportQueue::new(config.report.queue_capacity, config.report.include_features);
        (Some(sink), Some(drain))
    } else {
        (None, None)
    };

    if let Err(err) = sensor.init() {
        log_sensor_error(&err, "bring_up: sensor init");
        return fail(&mut state, err.into());
    }
    let ranges = config.sensor.ranges();
    if let Err(err) = sensor.configure(config.sensor.sample_rate_hz, ranges) {
        log_sensor_error(&err, "bring_up: sensor configure");
        return fail(&mut state, err.into());
    }

    log::info!(
        "[Bringup] {} sampling at {} Hz, accel {}, gyro {}",
        config.sensor.model.name(),
        config.sensor.sample_rate_hz,
        ranges
            .accel_g
            .map_or_else(|| "off".to_string(), |g| format!("±{} g", g)),
        ranges
            .gyro_dps
            .map_or_else(|| "off".to_string(), |dps| format!("±{} dps", dps)),
    );

    if let Err(err) = classifier.init() {
        log_classifier_error(&err, "bring_up: classifier init");
        return fail(&mut state, err.into());
    }
    let model_classes = classifier.model().num_classes();
    if model_classes != num_classes {
        let err = ConfigError::ClassTableInvalid {
            reason: format!(
                "model has {} classes, configuration expects {}",
                model_classes, num_classes
            ),
        };
        log_config_error(&err, "bring_up: class table");
        return fail(&mut state, err.into());
    }
    log::info!(
        "[Bringup] Running knowledge pack {} uuid {}",
        classifier.model().name,
        classifier.model().uuid_string()
    );

    let shared = Arc::new(CaptureShared::new());
    line.attach(
        CaptureIsr::new(producer, sensor, Arc::clone(&shared))
            .with_packet_size(config.buffer.samples_per_packet),
    );

    state.enter_running(seed);
    line.enable();
    log::info!(
        "[Bringup] Capture armed ({} slots, {} frames per interrupt, {} axes, vote window {})",
        config.buffer.capacity,
        config.buffer.samples_per_packet,
        axes,
        config.voting.window_size
    );

    let irq: Arc<dyn InterruptControl> = line;
    let acquisition = AcquisitionLoop::new(LoopParts {
        consumer,
        shared,
        irq,
        classifier,
        smoother,
        indicators: state,
        time,
        reports: report_sink,
        alert_duration_ms: config.indicator.alert_duration_ms,
    });

    Ok(Pipeline {
        acquisition,
        reports: report_drain,
    })
}

fn fail(state: &mut IndicatorStateMachine, err: PipelineError) -> Result<Pipeline, PipelineError> {
    state.fatal_halt();
    Err(err)
}
