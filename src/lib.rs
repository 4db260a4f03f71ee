// Fanwatch Core - sensor acquisition and recognition pipeline
// Interrupt-driven capture into a lock-free ring, cooperative classification
// loop, majority-vote smoothing and indicator output

// Module declarations
pub mod analysis;
pub mod board;
pub mod capture;
pub mod config;
pub mod engine;
pub mod error;
pub mod indicator;
pub mod report;
pub mod timebase;

// Re-exports for convenience
pub use analysis::{
    AcquisitionLoop, ClassId, Classifier, HaltReason, IterationOutcome, ModelInfo, VoteSmoother,
};
pub use config::AppConfig;
pub use engine::{bring_up, BoardParts, Pipeline};
pub use error::{ErrorCode, PipelineError};
pub use indicator::{IndicatorState, IndicatorStateMachine};
pub use timebase::TimeBase;
