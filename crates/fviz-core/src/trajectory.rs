//! Per-car trajectory resampling.
//!
//! Converts a car's irregular sample stream into fixed-rate motion on the
//! shared animation clock. Position uses monotone cubic Hermite
//! interpolation per axis, so the path never overshoots its samples; speed
//! rides the same interpolation and the resulting per-frame displacement is
//! clamped against the sampled speed, keeping motion physically plausible.
//! The whole pass is deterministic: identical samples and configuration
//! yield byte-identical trajectories.

use crate::config::PipelineConfig;
use crate::errors::{IngestionError, PipelineError, TrajectoryGapError};
use crate::geometry::{self, MonotoneCubic};
use crate::models::{Sample, TrackGeometry, Trajectory, TrajectoryPoint};

pub struct TrajectoryResampler;

impl TrajectoryResampler {
    /// Resample one car's stream onto the animation clock.
    ///
    /// The trajectory covers the frame instants `k / target_fps` falling in
    /// `[first_sample, last_sample)`; outside that interval the car simply
    /// does not exist for the renderer.
    pub fn resample(
        samples: &[Sample],
        track: &TrackGeometry,
        config: &PipelineConfig,
    ) -> Result<Trajectory, PipelineError> {
        let car_id = samples
            .first()
            .map(|s| s.car_id.clone())
            .ok_or_else(|| IngestionError::TooFewSamples {
                car_id: crate::models::CarId::new("?"),
                count: 0,
                min: config.min_samples_per_car,
            })?;

        scan_for_gaps(samples, config)?;

        let times: Vec<f64> = samples.iter().map(|s| s.time_s).collect();
        let spline_x = MonotoneCubic::new(times.clone(), samples.iter().map(|s| s.x).collect());
        let spline_y = MonotoneCubic::new(times.clone(), samples.iter().map(|s| s.y).collect());
        let spline_z = MonotoneCubic::new(times.clone(), samples.iter().map(|s| s.z).collect());
        let spline_v = MonotoneCubic::new(
            times.clone(),
            samples
                .iter()
                .map(|s| s.speed_mps.clamp(0.0, config.max_plausible_speed_mps))
                .collect(),
        );

        let fps = config.target_fps as f64;
        let t_first = times[0];
        let t_last = times[times.len() - 1];
        let k_first = (t_first * fps - 1e-9).ceil() as i64;
        let mut frame_times = Vec::new();
        let mut k = k_first;
        loop {
            let t = k as f64 / fps;
            if t >= t_last - 1e-9 {
                break;
            }
            frame_times.push(t);
            k += 1;
        }
        if frame_times.is_empty() {
            return Err(IngestionError::TooFewSamples {
                car_id,
                count: samples.len(),
                min: config.min_samples_per_car,
            }
            .into());
        }

        let (mut cx, mut cy, mut cz, mut cv) = (0usize, 0usize, 0usize, 0usize);
        let mut xs = Vec::with_capacity(frame_times.len());
        let mut ys = Vec::with_capacity(frame_times.len());
        let mut zs = Vec::with_capacity(frame_times.len());
        let mut speeds = Vec::with_capacity(frame_times.len());
        for &t in &frame_times {
            xs.push(spline_x.eval(t, &mut cx));
            ys.push(spline_y.eval(t, &mut cy));
            zs.push(spline_z.eval(t, &mut cz));
            speeds.push(spline_v.eval(t, &mut cv));
        }

        clamp_displacements(&mut xs, &mut ys, &mut zs, &speeds, fps, config);

        let headings = smoothed_headings(&xs, &ys, &speeds, config);
        let channels = step_channels(samples, &frame_times);
        let (arcs, laps) = track_progress(&xs, &ys, samples[0].lap_number, track);

        let points = (0..frame_times.len())
            .map(|i| TrajectoryPoint {
                x: xs[i],
                y: ys[i],
                z: zs[i],
                heading_rad: headings[i],
                speed_mps: speeds[i],
                arc_length_m: arcs[i],
                lap_number: laps[i],
                channels: channels[i],
            })
            .collect();

        Ok(Trajectory {
            car_id,
            start_time_s: k_first as f64 / fps,
            sample_rate_hz: fps,
            points,
        })
    }
}

fn scan_for_gaps(samples: &[Sample], config: &PipelineConfig) -> Result<(), TrajectoryGapError> {
    for pair in samples.windows(2) {
        let gap_s = pair[1].time_s - pair[0].time_s;
        if gap_s > config.max_trajectory_gap_s {
            return Err(TrajectoryGapError {
                car_id: pair[0].car_id.clone(),
                start_s: pair[0].time_s,
                end_s: pair[1].time_s,
                gap_s,
                max_gap_s: config.max_trajectory_gap_s,
            });
        }
    }
    Ok(())
}

/// Cap per-frame displacement at what the sampled speed allows (plus
/// tolerance), and at the configured hard jump limit. With monotone
/// interpolation this only fires on pathological input, but it is what
/// guarantees the continuity invariant.
fn clamp_displacements(
    xs: &mut [f64],
    ys: &mut [f64],
    zs: &mut [f64],
    speeds: &[f64],
    fps: f64,
    config: &PipelineConfig,
) {
    let dt = 1.0 / fps;
    for i in 1..xs.len() {
        let dx = xs[i] - xs[i - 1];
        let dy = ys[i] - ys[i - 1];
        let dz = zs[i] - zs[i - 1];
        let disp = (dx * dx + dy * dy + dz * dz).sqrt();
        let by_speed = speeds[i - 1].max(speeds[i]) * (1.0 + config.speed_tolerance_frac) * dt;
        let allowed = by_speed.min(config.max_position_jump_m).max(1e-6);
        if disp > allowed {
            let scale = allowed / disp;
            xs[i] = xs[i - 1] + dx * scale;
            ys[i] = ys[i - 1] + dy * scale;
            zs[i] = zs[i - 1] + dz * scale;
        }
    }
}

/// Heading from the path tangent, low-pass smoothed, held at near-zero
/// speed so a stationary car does not spin on numeric noise.
fn smoothed_headings(xs: &[f64], ys: &[f64], speeds: &[f64], config: &PipelineConfig) -> Vec<f64> {
    let n = xs.len();
    let mut raw = vec![0.0; n];
    for i in 0..n {
        let (a, b) = if n == 1 {
            (0, 0)
        } else if i == 0 {
            (0, 1)
        } else if i == n - 1 {
            (n - 2, n - 1)
        } else {
            (i - 1, i + 1)
        };
        let dx = xs[b] - xs[a];
        let dy = ys[b] - ys[a];
        raw[i] = if dx.abs() < 1e-12 && dy.abs() < 1e-12 {
            if i > 0 {
                raw[i - 1]
            } else {
                0.0
            }
        } else {
            dy.atan2(dx)
        };
    }

    let alpha = config.heading_smoothing.clamp(0.0, 1.0);
    let mut out = vec![0.0; n];
    if n > 0 {
        out[0] = raw[0];
    }
    for i in 1..n {
        if speeds[i] < config.min_heading_speed_mps {
            out[i] = out[i - 1];
        } else {
            out[i] =
                geometry::wrap_angle(out[i - 1] + geometry::wrap_angle(raw[i] - out[i - 1]) * alpha);
        }
    }
    out
}

/// Channels are stepped, not interpolated: each frame takes the latest
/// sample at or before it. Throttle is clamped into 0..=1.
fn step_channels(
    samples: &[Sample],
    frame_times: &[f64],
) -> Vec<Option<crate::models::CarChannels>> {
    let mut out = Vec::with_capacity(frame_times.len());
    let mut cursor = 0usize;
    for &t in frame_times {
        while cursor + 1 < samples.len() && samples[cursor + 1].time_s <= t {
            cursor += 1;
        }
        out.push(samples[cursor].channels.map(|mut ch| {
            ch.throttle = ch.throttle.clamp(0.0, 1.0);
            ch
        }));
    }
    out
}

/// Project every resampled point onto the centerline and accumulate lap
/// progress. The nearest-segment search is seeded with the previous frame's
/// segment so the scan stays local, and progress only ever moves forward:
/// a projection that lands slightly behind the previous one (bucket noise
/// near a segment boundary) holds position instead of regressing.
fn track_progress(
    xs: &[f64],
    ys: &[f64],
    start_lap: u32,
    track: &TrackGeometry,
) -> (Vec<f64>, Vec<u32>) {
    let n = xs.len();
    let lap_len = track.lap_length_m;
    let mut arcs = Vec::with_capacity(n);
    let mut laps = Vec::with_capacity(n);
    let mut seed = None;
    let mut progress = 0.0_f64;
    let mut arc0 = 0.0_f64;

    for i in 0..n {
        let pos = track.project(xs[i], ys[i], seed);
        seed = Some(pos.segment_index);
        if i == 0 {
            arc0 = pos.arc_length_m;
        } else {
            let current = (arc0 + progress).rem_euclid(lap_len);
            let mut delta = pos.arc_length_m - current;
            if delta < -lap_len / 2.0 {
                delta += lap_len;
            }
            progress += delta.clamp(0.0, lap_len / 2.0);
        }
        let advanced = arc0 + progress;
        arcs.push(advanced.rem_euclid(lap_len));
        laps.push(start_lap.max(1) + (advanced / lap_len) as u32);
    }
    (arcs, laps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CarId;
    use crate::sim::circular_samples;
    use crate::track::TrackModel;
    use std::collections::BTreeMap;

    fn config_30fps() -> PipelineConfig {
        PipelineConfig {
            target_fps: 30,
            ..PipelineConfig::default()
        }
    }

    fn build_track(samples: &[Sample]) -> TrackGeometry {
        let mut map = BTreeMap::new();
        map.insert(samples[0].car_id.clone(), samples.to_vec());
        TrackModel::build(&map, &PipelineConfig::default()).unwrap()
    }

    #[test]
    fn ninety_second_car_yields_2700_points_at_30fps() {
        let samples = circular_samples(CarId::new("AAA"), 400.0, 60.0, 90.0, 0.25, 0.0);
        let track = build_track(&samples);
        let traj = TrajectoryResampler::resample(&samples, &track, &config_30fps()).unwrap();
        assert_eq!(traj.points.len(), 2700);
        assert_eq!(traj.start_time_s, 0.0);
        assert!(traj.at(89.9).is_some());
        assert!(traj.at(90.0).is_none());
        assert!(traj.at(-0.1).is_none());
    }

    #[test]
    fn consecutive_points_respect_max_position_jump() {
        let samples = circular_samples(CarId::new("AAA"), 400.0, 60.0, 60.0, 0.25, 0.0);
        let track = build_track(&samples);
        let config = config_30fps();
        let traj = TrajectoryResampler::resample(&samples, &track, &config).unwrap();
        for pair in traj.points.windows(2) {
            let d = geometry::distance((pair[0].x, pair[0].y), (pair[1].x, pair[1].y));
            assert!(d <= config.max_position_jump_m, "jump of {d}m");
        }
    }

    #[test]
    fn speed_stays_near_sampled_speed() {
        let samples = circular_samples(CarId::new("AAA"), 400.0, 60.0, 60.0, 0.25, 0.0);
        let track = build_track(&samples);
        let traj = TrajectoryResampler::resample(&samples, &track, &config_30fps()).unwrap();
        for point in &traj.points {
            assert!((point.speed_mps - 60.0).abs() < 1.0);
            assert!(point.speed_mps >= 0.0);
        }
    }

    #[test]
    fn total_distance_is_monotone() {
        let samples = circular_samples(CarId::new("AAA"), 400.0, 60.0, 90.0, 0.25, 0.0);
        let track = build_track(&samples);
        let traj = TrajectoryResampler::resample(&samples, &track, &config_30fps()).unwrap();
        let mut prev = f64::NEG_INFINITY;
        for (i, _) in traj.points.iter().enumerate() {
            let t = traj.start_time_s + i as f64 / traj.sample_rate_hz;
            let d = traj.total_distance_at(t, track.lap_length_m).unwrap();
            assert!(d >= prev - 1e-6, "distance regressed at frame {i}");
            prev = d;
        }
    }

    #[test]
    fn gap_beyond_threshold_is_an_error() {
        let mut samples = circular_samples(CarId::new("AAA"), 400.0, 60.0, 60.0, 0.25, 0.0);
        let track = build_track(&samples);
        // Remove 5 seconds of samples in the middle.
        samples.retain(|s| !(20.0..25.0).contains(&s.time_s));
        let err = TrajectoryResampler::resample(&samples, &track, &config_30fps()).unwrap_err();
        match err {
            PipelineError::TrajectoryGap(gap) => {
                assert!(gap.gap_s > 4.9);
                assert_eq!(gap.car_id, CarId::new("AAA"));
                assert!((gap.start_s - 19.75).abs() < 1e-9);
                assert!((gap.end_s - 25.0).abs() < 1e-9);
            }
            other => panic!("expected gap error, got {other:?}"),
        }
    }

    #[test]
    fn resampling_is_deterministic() {
        let samples = circular_samples(CarId::new("AAA"), 400.0, 60.0, 45.0, 0.25, 0.0);
        let track = build_track(&samples);
        let config = config_30fps();
        let a = TrajectoryResampler::resample(&samples, &track, &config).unwrap();
        let b = TrajectoryResampler::resample(&samples, &track, &config).unwrap();
        assert_eq!(
            serde_json::to_vec(&a).unwrap(),
            serde_json::to_vec(&b).unwrap()
        );
    }

    #[test]
    fn heading_follows_the_tangent_on_a_circle() {
        let samples = circular_samples(CarId::new("AAA"), 400.0, 60.0, 60.0, 0.25, 0.0);
        let track = build_track(&samples);
        let traj = TrajectoryResampler::resample(&samples, &track, &config_30fps()).unwrap();
        // On a counter-clockwise circle the heading is the position angle
        // plus 90 degrees. Check mid-trajectory where smoothing has settled.
        let mid = &traj.points[traj.points.len() / 2];
        let expected = geometry::wrap_angle(mid.y.atan2(mid.x) + std::f64::consts::FRAC_PI_2);
        let diff = geometry::wrap_angle(mid.heading_rad - expected).abs();
        assert!(diff < 0.2, "heading off tangent by {diff} rad");
    }
}
