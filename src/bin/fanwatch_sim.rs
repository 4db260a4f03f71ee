use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use fanwatch::analysis::{AcquisitionLoop, ClassId, IterationOutcome, PmeSettings};
use fanwatch::board::sim::{
    reference_classifier, Scenario, SimIndicators, SimInterruptLine, SimSensor, SimSubTick,
    SimTicker,
};
use fanwatch::board::IndicatorOutput;
use fanwatch::error::{ErrorCode, SensorError};
use fanwatch::indicator::IndicatorState;
use fanwatch::report::ReportDrain;
use fanwatch::{bring_up, AppConfig, BoardParts, HaltReason, ModelInfo, Pipeline, TimeBase};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Exit code for a run that ended in a fatal halt or failed bring-up.
const EXIT_FATAL: u8 = 3;
/// Exit code for a configuration that fails validation.
const EXIT_INVALID_CONFIG: u8 = 2;

/// Wall-clock time per simulated millisecond tick.
const SIM_TICK: Duration = Duration::from_micros(50);

#[derive(Parser, Debug)]
#[command(
    name = "fanwatch-sim",
    about = "Host simulator for the fan-condition acquisition pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a scenario through the pipeline and print a JSON summary.
    Run(RunArgs),
    /// Validate a configuration file.
    CheckConfig(CheckConfigArgs),
    /// Print the embedded model description.
    Model,
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Configuration file (defaults are used when missing or unreadable).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Scenario file; the built-in demo scenario when omitted.
    #[arg(long)]
    scenario: Option<PathBuf>,
    /// Seed for the simulated sensor and reference pack training.
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Run one loop iteration every N sensor interrupts.
    #[arg(long, default_value_t = 1)]
    drain_every: u64,
    /// Override the overrun alert duration (milliseconds).
    #[arg(long)]
    alert_ms: Option<u64>,
    /// Print every recognition report as a JSON line.
    #[arg(long, default_value_t = false)]
    reports: bool,
}

#[derive(Args, Debug, Clone)]
struct CheckConfigArgs {
    #[arg(long)]
    config: PathBuf,
}

fn main() -> ExitCode {
    init_tracing();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("fanwatch-sim error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run_command(args),
        Command::CheckConfig(args) => check_config_command(&args.config),
        Command::Model => model_command(),
    }
}

#[derive(Serialize)]
struct RunSummary {
    model: String,
    uuid: String,
    interrupts: u64,
    frames_captured: u64,
    overruns: u32,
    frames_processed: u64,
    verdicts: u64,
    transitions: u64,
    recoveries: u64,
    reports_dropped: u64,
    final_class: u8,
    final_label: Option<String>,
    indicator_state: IndicatorState,
    halt: Option<String>,
}

fn run_command(args: RunArgs) -> Result<ExitCode> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::default(),
    };
    if let Some(alert_ms) = args.alert_ms {
        config.indicator.alert_duration_ms = alert_ms;
    }
    config.report.enabled = args.reports;
    if let Err(err) = config.validate() {
        let check = ConfigCheck {
            valid: false,
            code: Some(err.code()),
            message: Some(err.message()),
        };
        eprintln!("{}", serde_json::to_string(&check)?);
        return Ok(ExitCode::from(EXIT_INVALID_CONFIG));
    }

    let scenario = match &args.scenario {
        Some(path) => load_scenario(path)?,
        None => Scenario::default(),
    };
    let drain_every = args.drain_every.max(1);

    let model = ModelInfo::embedded().context("loading embedded model")?;
    let classifier = reference_classifier(model, PmeSettings::default(), args.seed)
        .with_unknown_class(ClassId(config.voting.unknown_class));

    let mut sensor = SimSensor::new(config.sensor.axis_count(), args.seed);
    if let Some(reads) = scenario.sensor_fault_after {
        sensor.fail_reads_after(reads, SensorError::BusTimeout);
    }

    let line = Arc::new(SimInterruptLine::<SimSensor>::new());
    let leds = Arc::new(SimIndicators::new());
    let time = Arc::new(TimeBase::new(Box::new(SimSubTick::new())));
    let leds_out: Arc<dyn IndicatorOutput> = leds;
    let mut ticker = SimTicker::start(Arc::clone(&time), Arc::clone(&leds_out), SIM_TICK);

    let brought_up = bring_up(
        &config,
        BoardParts {
            sensor,
            line: Arc::clone(&line),
            indicators: leds_out,
            time,
            classifier: Box::new(classifier),
        },
    );
    let Pipeline {
        mut acquisition,
        mut reports,
    } = match brought_up {
        Ok(pipeline) => pipeline,
        Err(err) => {
            ticker.stop();
            let failure = BringUpFailure {
                halt: "bring-up",
                code: err.code(),
                message: err.message(),
            };
            eprintln!("{}", serde_json::to_string(&failure)?);
            return Ok(ExitCode::from(EXIT_FATAL));
        }
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut interrupts = 0u64;
    let mut since_drain = 0u64;
    let mut halt = None;

    'segments: for segment in &scenario.segments {
        line.with_sensor(|sensor| sensor.set_profile(segment.profile));
        for _ in 0..segment.frames {
            line.fire();
            interrupts += 1;
            if segment.stall {
                continue;
            }
            since_drain += 1;
            if since_drain < drain_every {
                continue;
            }
            since_drain = 0;
            halt = step(&mut acquisition);
            flush_reports(reports.as_mut(), &mut out)?;
            if halt.is_some() {
                break 'segments;
            }
        }
    }

    // Drain what is left
    while halt.is_none() {
        match acquisition.run_once() {
            IterationOutcome::Idle => break,
            IterationOutcome::Halted(reason) => halt = Some(reason),
            IterationOutcome::Drained(_) | IterationOutcome::Recovered => {}
        }
    }
    flush_reports(reports.as_mut(), &mut out)?;
    ticker.stop();

    let summary = summarize(&acquisition, interrupts, halt);
    writeln!(out, "{}", serde_json::to_string(&summary)?)?;
    out.flush()?;

    if halt.map_or(false, |reason| reason.is_fatal()) {
        Ok(ExitCode::from(EXIT_FATAL))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

#[derive(Serialize)]
struct BringUpFailure {
    halt: &'static str,
    code: i32,
    message: String,
}

fn step(acquisition: &mut AcquisitionLoop) -> Option<HaltReason> {
    match acquisition.run_once() {
        IterationOutcome::Halted(reason) => Some(reason),
        _ => None,
    }
}

fn flush_reports<W: Write>(reports: Option<&mut ReportDrain>, out: &mut W) -> Result<()> {
    if let Some(drain) = reports {
        drain.write_to(out).context("writing reports")?;
    }
    Ok(())
}

fn summarize(acquisition: &AcquisitionLoop, interrupts: u64, halt: Option<HaltReason>) -> RunSummary {
    let stats = acquisition.stats();
    let capture = acquisition.capture_stats();
    let model = acquisition.model();
    let final_class = acquisition.current_class();
    RunSummary {
        model: model.name.clone(),
        uuid: model.uuid_string(),
        interrupts,
        frames_captured: capture.frames_captured,
        overruns: capture.overruns,
        frames_processed: stats.frames_processed,
        verdicts: stats.verdicts,
        transitions: stats.transitions,
        recoveries: stats.recoveries,
        reports_dropped: acquisition.reports_dropped(),
        final_class: final_class.0,
        final_label: model.label(final_class).map(str::to_string),
        indicator_state: acquisition.indicator_state(),
        halt: halt.map(|reason| reason.to_string()),
    }
}

fn load_scenario(path: &Path) -> Result<Scenario> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
}

#[derive(Serialize)]
struct ConfigCheck {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

fn check_config_command(path: &Path) -> Result<ExitCode> {
    match AppConfig::from_json_file(path) {
        Ok(_) => {
            let check = ConfigCheck {
                valid: true,
                code: None,
                message: None,
            };
            println!("{}", serde_json::to_string(&check)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            let check = ConfigCheck {
                valid: false,
                code: Some(err.code()),
                message: Some(err.message()),
            };
            eprintln!("{}", serde_json::to_string(&check)?);
            Ok(ExitCode::from(EXIT_INVALID_CONFIG))
        }
    }
}

#[derive(Serialize)]
struct ModelPayload<'a> {
    index: u16,
    name: &'a str,
    model_type: &'a str,
    uuid: String,
    classes: Vec<ClassEntry<'a>>,
    feature_functions: &'a [String],
}

#[derive(Serialize)]
struct ClassEntry<'a> {
    id: usize,
    label: &'a str,
}

fn model_command() -> Result<ExitCode> {
    let model = ModelInfo::embedded().context("loading embedded model")?;
    let payload = ModelPayload {
        index: model.index,
        name: &model.name,
        model_type: &model.model_type,
        uuid: model.uuid_string(),
        classes: model
            .labels
            .iter()
            .enumerate()
            .map(|(id, label)| ClassEntry { id, label })
            .collect(),
        feature_functions: &model.feature_functions,
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(ExitCode::SUCCESS)
}
