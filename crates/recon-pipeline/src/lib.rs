#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Reconstruction pipeline
//!
//! Drives a set of overlapping photographs through the two-view geometry stages:
//!
//! ```text
//! Idle -> Calibrating -> Matching -> EstimatingGeometry -> RecoveringPose -> Triangulating -> Done
//! ```
//!
//! Calibrating is skipped without a calibration source and RecoveringPose is skipped
//! for uncalibrated, projective reconstructions. Any stage may end in `Failed`.

/// Intrinsic calibration seam.
pub mod calibration;

/// Pipeline configuration.
pub mod config;

/// Error types for the pipeline.
pub mod error;

/// The reconstruction pipeline.
pub mod pipeline;

/// Pipeline stages and state tracking.
pub mod state;

pub use calibration::{Calibration, CalibrationError, FixedIntrinsics, IntrinsicCalibrator};
pub use config::PipelineConfig;
pub use error::{PipelineError, ReconError};
pub use pipeline::{
    AbortHandle, ImageFeatures, PairFailure, PairReconstruction, Pipeline, Reconstruction,
    ReconstructionMode,
};
pub use state::{PipelineStage, PipelineState};
