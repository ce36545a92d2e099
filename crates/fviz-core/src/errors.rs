//! Error taxonomy for the pipeline.
//!
//! Per-car errors (`IngestionError::TooFewSamples`, `TrajectoryGapError`)
//! exclude the affected car and are collected in the session report.
//! Session-level errors (`GeometryError`, unreachable source) abort the run.

use crate::models::CarId;
use thiserror::Error;

/// Upstream data is missing or unusable.
#[derive(Debug, Clone, Error)]
pub enum IngestionError {
    #[error("car {car_id}: {count} usable samples, need at least {min}")]
    TooFewSamples {
        car_id: CarId,
        count: usize,
        min: usize,
    },
    #[error("session source unreachable: {0}")]
    Unreachable(String),
    #[error("malformed session payload: {0}")]
    Malformed(String),
}

/// Track reconstruction could not produce a valid closed loop.
#[derive(Debug, Clone, Error)]
pub enum GeometryError {
    #[error("not enough position data to reconstruct the track: {covered} of {buckets} arc-length buckets covered")]
    InsufficientData { covered: usize, buckets: usize },
    #[error("reconstructed centerline self-intersects near ({x:.1}, {y:.1}) (segments {a} and {b})")]
    SelfIntersecting { a: usize, b: usize, x: f64, y: f64 },
    #[error("centerline does not close: gap of {gap_m:.1}m at the loop seam")]
    OpenLoop { gap_m: f64 },
}

/// A car's motion cannot be plausibly interpolated across a data gap.
#[derive(Debug, Clone, Error)]
#[error(
    "car {car_id}: {gap_s:.2}s telemetry gap between t={start_s:.2}s and t={end_s:.2}s (max {max_gap_s:.2}s)"
)]
pub struct TrajectoryGapError {
    pub car_id: CarId,
    pub start_s: f64,
    pub end_s: f64,
    pub gap_s: f64,
    pub max_gap_s: f64,
}

/// A time query outside the session's valid span.
#[derive(Debug, Clone, Copy, Error)]
#[error("t={time_s:.3}s is outside the session span [{start_s:.3}s, {end_s:.3}s]")]
pub struct OutOfRangeError {
    pub time_s: f64,
    pub start_s: f64,
    pub end_s: f64,
}

/// Any pipeline failure.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Ingestion(#[from] IngestionError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    TrajectoryGap(#[from] TrajectoryGapError),
    #[error(transparent)]
    OutOfRange(#[from] OutOfRangeError),
}
