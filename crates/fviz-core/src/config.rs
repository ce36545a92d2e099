//! Pipeline configuration.

use crate::models::CarId;
use serde::{Deserialize, Serialize};

/// Which car the camera follows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum FocusCarPolicy {
    /// Follow the current leaderboard leader.
    Leader,
    /// Follow a fixed car for the whole session.
    Fixed { car_id: CarId },
}

/// Configuration for the whole telemetry-to-motion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Animation clock rate, frames per second.
    pub target_fps: u32,
    /// Largest positional delta allowed between consecutive frames, meters.
    pub max_position_jump_m: f64,
    /// Largest telemetry gap interpolated across, seconds.
    pub max_trajectory_gap_s: f64,
    /// Cars with fewer usable samples are excluded.
    pub min_samples_per_car: usize,
    /// Clamp bounds for the estimated track width, meters.
    pub track_width_min_m: f64,
    pub track_width_max_m: f64,
    /// Hard ceiling for plausible car speed, m/s.
    pub max_plausible_speed_mps: f64,
    /// Allowed fractional deviation of interpolated motion from sampled speed.
    pub speed_tolerance_frac: f64,
    /// Arc-length buckets used for centerline fitting.
    pub centerline_buckets: usize,
    /// Low-pass factor for heading smoothing, 0 = frozen, 1 = raw tangent.
    pub heading_smoothing: f64,
    /// Below this speed the heading is held to avoid jitter, m/s.
    pub min_heading_speed_mps: f64,
    pub focus_car_policy: FocusCarPolicy,
    /// Camera path scale toward the track centroid.
    pub camera_scale: f64,
    pub camera_height_m: f64,
    /// Distance the camera keeps from the focus car, meters.
    pub camera_range_m: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_fps: 60,
            max_position_jump_m: 15.0,
            max_trajectory_gap_s: 2.5,
            min_samples_per_car: 10,
            track_width_min_m: 8.0,
            track_width_max_m: 22.0,
            max_plausible_speed_mps: 110.0,
            speed_tolerance_frac: 0.25,
            centerline_buckets: 600,
            heading_smoothing: 0.35,
            min_heading_speed_mps: 1.0,
            focus_car_policy: FocusCarPolicy::Leader,
            camera_scale: 0.8,
            camera_height_m: 50.0,
            camera_range_m: 80.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_round_trips_through_json() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.target_fps, config.target_fps);
        assert_eq!(back.focus_car_policy, FocusCarPolicy::Leader);
    }

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"target_fps": 30, "focus_car_policy": {"policy": "fixed", "car_id": "VER"}}"#)
                .unwrap();
        assert_eq!(config.target_fps, 30);
        assert_eq!(config.min_samples_per_car, 10);
        assert_eq!(
            config.focus_car_policy,
            FocusCarPolicy::Fixed { car_id: CarId::new("VER") }
        );
    }
}
