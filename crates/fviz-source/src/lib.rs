//! Telemetry ingestion for Formula Viz.
//!
//! Fetches raw qualifying sessions (local archive or HTTP feed), selects
//! each car's fastest run, and normalizes feed quirks into the core model.

pub mod normalize;
pub mod provider;
pub mod raw;

pub use normalize::{normalize, NormalizedSession, TelemetrySource};
pub use provider::{ArchiveProvider, HttpProvider, SessionProvider};
pub use raw::{RawCar, RawRun, RawSample, RawSession};
