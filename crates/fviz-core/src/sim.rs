//! Synthetic telemetry generation.
//!
//! Produces plausible per-car sample streams on parametric lap shapes,
//! used by the test suites and the demo mode of the CLI.

use crate::models::{CarChannels, CarId, Sample};
use std::f64::consts::PI;

/// A parametric lap shape the generator can sample.
pub trait LapPath {
    /// Position (x, y, z) in meters at `distance_m` along the lap.
    fn position_at(&self, distance_m: f64) -> (f64, f64, f64);

    /// Total lap length in meters.
    fn lap_length_m(&self) -> f64;
}

/// Circular lap of a fixed radius, centered at the origin.
pub struct CircularLapPath {
    pub radius_m: f64,
}

impl LapPath for CircularLapPath {
    fn position_at(&self, distance_m: f64) -> (f64, f64, f64) {
        let angle = distance_m / self.radius_m;
        (
            self.radius_m * angle.cos(),
            self.radius_m * angle.sin(),
            0.0,
        )
    }

    fn lap_length_m(&self) -> f64 {
        2.0 * PI * self.radius_m
    }
}

/// Figure-eight lap (lemniscate of Gerono), centered at the origin.
/// The two lobes cross there, so no closed track can be fitted to it.
pub struct FigureEightPath {
    pub half_span_m: f64,
}

impl LapPath for FigureEightPath {
    fn position_at(&self, distance_m: f64) -> (f64, f64, f64) {
        let theta = distance_m / self.lap_length_m() * 2.0 * PI;
        (
            self.half_span_m * theta.sin(),
            self.half_span_m * theta.sin() * theta.cos(),
            0.0,
        )
    }

    fn lap_length_m(&self) -> f64 {
        // Nominal; the generator only needs a consistent distance scale.
        6.0 * self.half_span_m
    }
}

/// Generate a car's sample stream along `path` at a constant speed.
///
/// `sample_dt_s` is the spacing between samples and `lateral_phase` shifts
/// the car sideways off the centerline so multi-car sessions have lateral
/// spread for the width estimator to see.
pub fn path_samples(
    car_id: CarId,
    path: &dyn LapPath,
    speed_mps: f64,
    duration_s: f64,
    sample_dt_s: f64,
    lateral_phase: f64,
) -> Vec<Sample> {
    let lap_length = path.lap_length_m();
    let count = (duration_s / sample_dt_s).floor() as usize + 1;
    let mut samples = Vec::with_capacity(count);

    for k in 0..count {
        let time_s = k as f64 * sample_dt_s;
        let total_d = speed_mps * time_s;
        let lap_number = 1 + (total_d / lap_length) as u32;
        let distance_m = total_d % lap_length;
        let (x, y, z) = path.position_at(distance_m);

        // Sideways wobble within a realistic track width.
        let wobble = 3.0 * (distance_m / lap_length * 2.0 * PI * 3.0 + lateral_phase).sin();
        let angle = (distance_m / lap_length) * 2.0 * PI;
        let (nx, ny) = (angle.cos(), angle.sin());

        let frac = distance_m / lap_length;
        samples.push(Sample {
            car_id: car_id.clone(),
            time_s,
            x: x + nx * wobble,
            y: y + ny * wobble,
            z,
            speed_mps,
            lap_number,
            sector: if frac < 1.0 / 3.0 {
                1
            } else if frac < 2.0 / 3.0 {
                2
            } else {
                3
            },
            distance_m,
            channels: Some(CarChannels {
                throttle: 0.8,
                brake: false,
                gear: 6,
                rpm: 10_500.0,
                drs: false,
            }),
        });
    }
    samples
}

/// Convenience wrapper: constant-speed laps on a circular track.
pub fn circular_samples(
    car_id: CarId,
    radius_m: f64,
    speed_mps: f64,
    duration_s: f64,
    sample_dt_s: f64,
    lateral_phase: f64,
) -> Vec<Sample> {
    let path = CircularLapPath { radius_m };
    path_samples(car_id, &path, speed_mps, duration_s, sample_dt_s, lateral_phase)
}
