//! Formula Viz core - telemetry-to-motion pipeline for qualifying sessions.
//!
//! Turns discrete, noisy per-car telemetry into a deterministic, replayable
//! scene description: track reconstruction, fixed-rate trajectory
//! resampling, a merged session timeline, and per-frame scene emission for
//! the rendering backend.

pub mod config;
pub mod errors;
pub mod geometry;
pub mod models;
pub mod scene;
pub mod sim;
pub mod timeline;
pub mod track;
pub mod trajectory;

pub use config::{FocusCarPolicy, PipelineConfig};
pub use errors::{
    GeometryError, IngestionError, OutOfRangeError, PipelineError, TrajectoryGapError,
};
pub use models::{
    CameraCue, CarChannels, CarId, CarTransform, CenterlinePoint, EventKind, Frame,
    LeaderboardEntry, LeaderboardState, Sample, SectorTimes, SessionReport, TimelineEvent,
    TrackGeometry, Trajectory, TrajectoryPoint,
};
pub use scene::SceneEmitter;
pub use timeline::SessionTimeline;
pub use track::TrackModel;
pub use trajectory::TrajectoryResampler;
