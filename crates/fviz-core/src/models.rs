//! Core data models for the telemetry-to-motion pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier for a car in the session (driver abbreviation, e.g. "VER").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CarId(pub String);

impl CarId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CarId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One normalized telemetry sample. Immutable once ingested.
///
/// Timestamps are session-relative seconds, monotonic per car but not
/// aligned across cars. Coordinates are meters in the track-local plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub car_id: CarId,
    pub time_s: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub speed_mps: f64,
    pub lap_number: u32,
    /// Sector the car is in (1..=3).
    pub sector: u8,
    /// Distance covered along the current lap, meters.
    pub distance_m: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<CarChannels>,
}

/// Supplemental car channels carried through to the overlay data.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CarChannels {
    /// Throttle application, 0.0..=1.0.
    pub throttle: f64,
    pub brake: bool,
    pub gear: i8,
    pub rpm: f64,
    pub drs: bool,
}

/// One point on the reconstructed track centerline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CenterlinePoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Estimated track width at this point, meters.
    pub width_m: f64,
    /// Cumulative distance from the start/finish point, meters.
    pub arc_length_m: f64,
}

/// Canonical closed track geometry reconstructed from all cars' samples.
///
/// Invariants: `points` form a single closed loop, `arc_length_m` is
/// strictly increasing around the loop and the start/finish point has
/// arc-length 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackGeometry {
    pub points: Vec<CenterlinePoint>,
    pub lap_length_m: f64,
    /// Arc-lengths of the sector 1 -> 2 and 2 -> 3 splits. Sector 3 ends at
    /// the start/finish point.
    pub sector_boundaries_m: [f64; 2],
}

/// Where a point projects onto the centerline.
#[derive(Debug, Clone, Copy)]
pub struct TrackPosition {
    pub arc_length_m: f64,
    pub segment_index: usize,
    /// Signed lateral offset from the centerline, meters.
    pub lateral_m: f64,
}

impl TrackGeometry {
    /// Sector (1..=3) for an arc-length position.
    pub fn sector_at(&self, arc_length_m: f64) -> u8 {
        let arc = arc_length_m.rem_euclid(self.lap_length_m.max(f64::MIN_POSITIVE));
        if arc < self.sector_boundaries_m[0] {
            1
        } else if arc < self.sector_boundaries_m[1] {
            2
        } else {
            3
        }
    }

    /// Project a point onto the centerline, searching segments near `seed`.
    ///
    /// The seed is the segment index returned for the previous (nearby)
    /// query; the search widens to the whole loop only when seeded cold.
    pub fn project(&self, x: f64, y: f64, seed: Option<usize>) -> TrackPosition {
        let n = self.points.len();
        let radius = if seed.is_some() { (n / 10).max(2) } else { n };
        let start = seed.unwrap_or(0);

        let mut best_idx = start % n;
        let mut best_t = 0.0;
        let mut best_d2 = f64::INFINITY;

        for step in 0..(2 * radius).min(n) {
            // Alternate outward from the seed so the nearest segment is
            // found early on warm queries.
            let offset = (step as isize + 1) / 2 * if step % 2 == 0 { 1 } else { -1 };
            let idx = (start as isize + offset).rem_euclid(n as isize) as usize;
            let a = &self.points[idx];
            let b = &self.points[(idx + 1) % n];
            let (t, cx, cy) = crate::geometry::project_onto_segment((x, y), (a.x, a.y), (b.x, b.y));
            let d2 = crate::geometry::dist2((x, y), (cx, cy));
            if d2 < best_d2 {
                best_d2 = d2;
                best_idx = idx;
                best_t = t;
            }
        }

        let a = &self.points[best_idx];
        let b = &self.points[(best_idx + 1) % n];
        let seg_len = crate::geometry::distance((a.x, a.y), (b.x, b.y));
        let arc = if best_idx + 1 == n {
            // Closing segment wraps back to arc-length 0.
            a.arc_length_m + best_t * (self.lap_length_m - a.arc_length_m)
        } else {
            a.arc_length_m + best_t * (b.arc_length_m - a.arc_length_m)
        };
        let side = crate::geometry::cross2(
            (b.x - a.x, b.y - a.y),
            (x - a.x, y - a.y),
        );
        let lateral = if seg_len > 0.0 {
            best_d2.sqrt() * side.signum()
        } else {
            0.0
        };

        TrackPosition {
            arc_length_m: arc.rem_euclid(self.lap_length_m.max(f64::MIN_POSITIVE)),
            segment_index: best_idx,
            lateral_m: lateral,
        }
    }
}

/// One fixed-rate point of a resampled trajectory.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub heading_rad: f64,
    pub speed_mps: f64,
    /// Arc-length position on the centerline, meters.
    pub arc_length_m: f64,
    pub lap_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<CarChannels>,
}

/// A car's continuous motion on the shared animation clock.
///
/// Points are spaced exactly `1 / sample_rate_hz` apart starting at
/// `start_time_s`. Queries outside the valid interval return `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trajectory {
    pub car_id: CarId,
    pub start_time_s: f64,
    pub sample_rate_hz: f64,
    pub points: Vec<TrajectoryPoint>,
}

impl Trajectory {
    /// Time of the last trajectory point.
    pub fn end_time_s(&self) -> f64 {
        self.start_time_s + (self.points.len().saturating_sub(1)) as f64 / self.sample_rate_hz
    }

    pub fn is_valid_at(&self, time_s: f64) -> bool {
        !self.points.is_empty() && time_s >= self.start_time_s && time_s <= self.end_time_s()
    }

    /// Interpolated state at `time_s`, or `None` outside the valid interval.
    pub fn at(&self, time_s: f64) -> Option<TrajectoryPoint> {
        if !self.is_valid_at(time_s) {
            return None;
        }
        let pos = (time_s - self.start_time_s) * self.sample_rate_hz;
        let idx = (pos.floor() as usize).min(self.points.len() - 1);
        let frac = pos - idx as f64;
        if frac <= f64::EPSILON || idx + 1 >= self.points.len() {
            return Some(self.points[idx]);
        }

        let a = &self.points[idx];
        let b = &self.points[idx + 1];
        Some(TrajectoryPoint {
            x: a.x + (b.x - a.x) * frac,
            y: a.y + (b.y - a.y) * frac,
            z: a.z + (b.z - a.z) * frac,
            heading_rad: crate::geometry::lerp_angle(a.heading_rad, b.heading_rad, frac),
            speed_mps: a.speed_mps + (b.speed_mps - a.speed_mps) * frac,
            arc_length_m: a.arc_length_m, // step, avoids wrap artifacts mid-segment
            lap_number: a.lap_number,
            channels: a.channels,
        })
    }

    /// Total distance covered at `time_s`: completed laps plus arc position.
    pub fn total_distance_at(&self, time_s: f64, lap_length_m: f64) -> Option<f64> {
        let point = self.at(time_s)?;
        let laps_done = point.lap_number.saturating_sub(self.points[0].lap_number);
        Some(laps_done as f64 * lap_length_m + point.arc_length_m)
    }
}

/// Per-car sector times for its selected lap, seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SectorTimes {
    pub sector1_s: f64,
    pub sector2_s: f64,
    pub sector3_s: f64,
}

impl SectorTimes {
    pub fn lap_time_s(&self) -> f64 {
        self.sector1_s + self.sector2_s + self.sector3_s
    }

    pub fn sector_s(&self, sector: u8) -> Option<f64> {
        match sector {
            1 => Some(self.sector1_s),
            2 => Some(self.sector2_s),
            3 => Some(self.sector3_s),
            _ => None,
        }
    }
}

/// Kind of a timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    LapStart,
    SectorCross { sector: u8 },
    PersonalBest { lap_time_s: f64 },
    SessionEnd,
}

/// One event on the merged session timeline.
///
/// Events are totally ordered by `(time_s, car_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub time_s: f64,
    pub car_id: CarId,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// One row of a leaderboard snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// 1-based position.
    pub rank: u32,
    pub car_id: CarId,
    pub total_distance_m: f64,
    pub gap_to_leader_s: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sector_time_s: Option<f64>,
}

/// Ranked ordering of cars at one instant. Derived, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardState {
    pub time_s: f64,
    pub entries: Vec<LeaderboardEntry>,
}

/// Renderable transform of one car in one frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarTransform {
    pub car_id: CarId,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub heading_rad: f64,
    pub speed_mps: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<CarChannels>,
}

/// Camera instruction for the renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraCue {
    pub focus_car: CarId,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// The unit handed to the renderer. Self-contained and reproducible from
/// session state for any frame index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub frame_index: u64,
    pub time_s: f64,
    pub car_transforms: Vec<CarTransform>,
    pub leaderboard: LeaderboardState,
    pub camera: CameraCue,
}

/// A car dropped from the session and why.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcludedCar {
    pub car_id: CarId,
    pub reason: String,
}

/// Session-level report of excluded cars. Nothing is silently swallowed:
/// every per-car failure lands here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionReport {
    pub excluded: Vec<ExcludedCar>,
    /// Samples dropped during normalization (missing fields, out-of-order
    /// timestamps), keyed by count only; details go to the log.
    pub dropped_samples: u64,
}

impl SessionReport {
    pub fn exclude(&mut self, car_id: CarId, reason: impl fmt::Display) {
        tracing::warn!(car = %car_id, %reason, "excluding car from session");
        self.excluded.push(ExcludedCar {
            car_id,
            reason: reason.to_string(),
        });
    }

    pub fn is_excluded(&self, car_id: &CarId) -> bool {
        self.excluded.iter().any(|e| &e.car_id == car_id)
    }
}
