//! Track-layout reconstruction from the union of all cars' samples.
//!
//! The centerline is fitted by bucketing every position sample by its
//! normalized lap distance and taking the per-bucket median, which rejects
//! off-track outliers (cars running wide, pit excursions) without any
//! iterative fitting. A short moving-average pass smooths bucket noise.
//! The result is validated against the closed-loop invariants before it is
//! handed to the rest of the pipeline.

use crate::config::PipelineConfig;
use crate::errors::GeometryError;
use crate::geometry;
use crate::models::{CarId, CenterlinePoint, Sample, TrackGeometry};
use std::collections::BTreeMap;

/// Fraction of arc-length buckets that must receive at least one sample.
const MIN_BUCKET_COVERAGE: f64 = 0.6;
/// Smoothing window (buckets), applied circularly.
const SMOOTHING_WINDOW: usize = 5;
/// Minimum spacing between emitted centerline points, meters.
const MIN_POINT_SPACING_M: f64 = 1e-3;

pub struct TrackModel;

impl TrackModel {
    /// Reconstruct the canonical track geometry from all cars' samples.
    pub fn build(
        samples_by_car: &BTreeMap<CarId, Vec<Sample>>,
        config: &PipelineConfig,
    ) -> Result<TrackGeometry, GeometryError> {
        let buckets = config.centerline_buckets.max(16);

        let mut bucketed: Vec<Vec<(f64, f64, f64)>> = vec![Vec::new(); buckets];
        for samples in samples_by_car.values() {
            let d_max = samples
                .iter()
                .map(|s| s.distance_m)
                .fold(0.0_f64, f64::max);
            if d_max <= 0.0 {
                continue;
            }
            for sample in samples {
                let frac = (sample.distance_m / d_max).clamp(0.0, 1.0);
                let idx = ((frac * buckets as f64) as usize).min(buckets - 1);
                bucketed[idx].push((sample.x, sample.y, sample.z));
            }
        }

        let covered = bucketed.iter().filter(|b| !b.is_empty()).count();
        tracing::debug!(covered, buckets, "centerline bucket coverage");
        if (covered as f64) < buckets as f64 * MIN_BUCKET_COVERAGE {
            return Err(GeometryError::InsufficientData { covered, buckets });
        }

        let raw = fill_gaps(
            bucketed
                .iter()
                .map(|points| {
                    if points.is_empty() {
                        None
                    } else {
                        Some((
                            median(points.iter().map(|p| p.0)),
                            median(points.iter().map(|p| p.1)),
                            median(points.iter().map(|p| p.2)),
                        ))
                    }
                })
                .collect(),
        );
        // Closure must be checked before smoothing: the circular smoothing
        // pass blends the two ends of an open arc toward each other and
        // would hide the seam gap.
        check_closure(&raw)?;

        let centers = smooth_ring(&raw, SMOOTHING_WINDOW);
        let widths = estimate_widths(&centers, &bucketed, config);

        // Merge near-coincident buckets so arc-length stays strictly
        // increasing.
        let mut merged: Vec<(f64, f64, f64, f64)> = Vec::with_capacity(buckets);
        for (i, &(x, y, z)) in centers.iter().enumerate() {
            if let Some(&(px, py, _, _)) = merged.last() {
                if geometry::distance((x, y), (px, py)) < MIN_POINT_SPACING_M {
                    continue;
                }
            }
            merged.push((x, y, z, widths[i]));
        }
        if merged.len() >= 2 {
            let first = merged[0];
            let last = *merged.last().expect("non-empty");
            if geometry::distance((first.0, first.1), (last.0, last.1)) < MIN_POINT_SPACING_M {
                merged.pop();
            }
        }
        if merged.len() < 8 {
            return Err(GeometryError::InsufficientData { covered, buckets });
        }

        let origin = start_finish_origin(samples_by_car, &merged);
        merged.rotate_left(origin);

        validate_loop(&merged)?;

        let mut points = Vec::with_capacity(merged.len());
        let mut arc = 0.0;
        for (i, &(x, y, z, width_m)) in merged.iter().enumerate() {
            if i > 0 {
                let (px, py, _, _) = merged[i - 1];
                arc += geometry::distance((px, py), (x, y));
            }
            points.push(CenterlinePoint {
                x,
                y,
                z,
                width_m,
                arc_length_m: arc,
            });
        }
        let last = merged[merged.len() - 1];
        let lap_length_m = arc + geometry::distance((last.0, last.1), (merged[0].0, merged[0].1));

        let mut track = TrackGeometry {
            points,
            lap_length_m,
            sector_boundaries_m: [lap_length_m / 3.0, 2.0 * lap_length_m / 3.0],
        };
        track.sector_boundaries_m = sector_boundaries(samples_by_car, &track);

        tracing::info!(
            lap_length_m = format_args!("{:.0}", track.lap_length_m),
            points = track.points.len(),
            "track geometry reconstructed"
        );
        Ok(track)
    }
}

fn median(values: impl Iterator<Item = f64>) -> f64 {
    let mut values: Vec<f64> = values.collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (p * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Fill empty buckets by interpolating between circular neighbors.
fn fill_gaps(raw: Vec<Option<(f64, f64, f64)>>) -> Vec<(f64, f64, f64)> {
    let n = raw.len();
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        if let Some(point) = raw[i] {
            out.push(point);
            continue;
        }
        let mut before = i;
        let mut steps_back = 0;
        while raw[before].is_none() {
            before = (before + n - 1) % n;
            steps_back += 1;
        }
        let mut after = i;
        let mut steps_fwd = 0;
        while raw[after].is_none() {
            after = (after + 1) % n;
            steps_fwd += 1;
        }
        let a = raw[before].expect("found above");
        let b = raw[after].expect("found above");
        let t = steps_back as f64 / (steps_back + steps_fwd) as f64;
        out.push((
            a.0 + (b.0 - a.0) * t,
            a.1 + (b.1 - a.1) * t,
            a.2 + (b.2 - a.2) * t,
        ));
    }
    out
}

fn smooth_ring(points: &[(f64, f64, f64)], window: usize) -> Vec<(f64, f64, f64)> {
    let n = points.len();
    let half = window / 2;
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let mut acc = (0.0, 0.0, 0.0);
        for k in 0..window {
            let idx = (i + n + k - half) % n;
            acc.0 += points[idx].0;
            acc.1 += points[idx].1;
            acc.2 += points[idx].2;
        }
        out.push((acc.0 / window as f64, acc.1 / window as f64, acc.2 / window as f64));
    }
    out
}

/// Width per bucket from the lateral spread of its samples, clamped to the
/// configured bounds. Sparse buckets inherit the previous bucket's width.
fn estimate_widths(
    centers: &[(f64, f64, f64)],
    bucketed: &[Vec<(f64, f64, f64)>],
    config: &PipelineConfig,
) -> Vec<f64> {
    let n = centers.len();
    let fallback = (config.track_width_min_m + config.track_width_max_m) / 2.0;
    let mut widths = vec![f64::NAN; n];

    for i in 0..n {
        if bucketed[i].len() < 4 {
            continue;
        }
        let prev = centers[(i + n - 1) % n];
        let next = centers[(i + 1) % n];
        let tx = next.0 - prev.0;
        let ty = next.1 - prev.1;
        let len = (tx * tx + ty * ty).sqrt();
        if len <= f64::EPSILON {
            continue;
        }
        // Unit normal of the local tangent.
        let (nx, ny) = (-ty / len, tx / len);
        let mut laterals: Vec<f64> = bucketed[i]
            .iter()
            .map(|p| (p.0 - centers[i].0) * nx + (p.1 - centers[i].1) * ny)
            .collect();
        laterals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        widths[i] = percentile(&laterals, 0.9) - percentile(&laterals, 0.1);
    }

    let mut last_known = fallback;
    for width in widths.iter_mut() {
        if width.is_nan() {
            *width = last_known;
        } else {
            *width = width.clamp(config.track_width_min_m, config.track_width_max_m);
            last_known = *width;
        }
    }
    widths
}

/// Index of the centerline point nearest to the clustered lap-counter
/// increments, used as the arc-length origin.
fn start_finish_origin(
    samples_by_car: &BTreeMap<CarId, Vec<Sample>>,
    ring: &[(f64, f64, f64, f64)],
) -> usize {
    let mut crossings: Vec<(f64, f64)> = Vec::new();
    for samples in samples_by_car.values() {
        for pair in samples.windows(2) {
            if pair[1].lap_number > pair[0].lap_number {
                crossings.push((pair[1].x, pair[1].y));
            }
        }
        // A single-lap run starts on the line.
        if let Some(first) = samples.first() {
            crossings.push((first.x, first.y));
        }
    }
    if crossings.is_empty() {
        return 0;
    }
    let mean = (
        crossings.iter().map(|c| c.0).sum::<f64>() / crossings.len() as f64,
        crossings.iter().map(|c| c.1).sum::<f64>() / crossings.len() as f64,
    );
    ring.iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            geometry::dist2(mean, (a.0, a.1))
                .partial_cmp(&geometry::dist2(mean, (b.0, b.1)))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// The bucket ring must close on itself: a seam segment much longer than a
/// typical one means the cars never covered the full lap.
fn check_closure(ring: &[(f64, f64, f64)]) -> Result<(), GeometryError> {
    let n = ring.len();
    let mut seg_lengths: Vec<f64> = (0..n)
        .map(|i| {
            let a = ring[i];
            let b = ring[(i + 1) % n];
            geometry::distance((a.0, a.1), (b.0, b.1))
        })
        .collect();
    let closing = seg_lengths[n - 1];
    seg_lengths.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median_seg = seg_lengths[n / 2];
    if closing > median_seg * 10.0 && closing > 1.0 {
        return Err(GeometryError::OpenLoop { gap_m: closing });
    }
    Ok(())
}

fn validate_loop(ring: &[(f64, f64, f64, f64)]) -> Result<(), GeometryError> {
    let n = ring.len();
    for i in 0..n {
        let a1 = ring[i];
        let a2 = ring[(i + 1) % n];
        // Skip the two adjacent segments on each side; shared endpoints
        // always "touch".
        for j in i + 2..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            let b1 = ring[j];
            let b2 = ring[(j + 1) % n];
            if let Some((x, y)) = geometry::segment_intersection(
                (a1.0, a1.1),
                (a2.0, a2.1),
                (b1.0, b1.1),
                (b2.0, b2.1),
            ) {
                return Err(GeometryError::SelfIntersecting { a: i, b: j, x, y });
            }
        }
    }
    Ok(())
}

/// Mean arc-length of each sector-marker transition across cars.
fn sector_boundaries(
    samples_by_car: &BTreeMap<CarId, Vec<Sample>>,
    track: &TrackGeometry,
) -> [f64; 2] {
    let mut sums = [0.0_f64; 2];
    let mut counts = [0_u32; 2];
    for samples in samples_by_car.values() {
        let mut seed = None;
        for pair in samples.windows(2) {
            let boundary = match (pair[0].sector, pair[1].sector) {
                (1, 2) => 0,
                (2, 3) => 1,
                _ => continue,
            };
            let pos = track.project(pair[1].x, pair[1].y, seed);
            seed = Some(pos.segment_index);
            sums[boundary] += pos.arc_length_m;
            counts[boundary] += 1;
        }
    }

    let defaults = [track.lap_length_m / 3.0, 2.0 * track.lap_length_m / 3.0];
    let mut result = [0.0; 2];
    for i in 0..2 {
        result[i] = if counts[i] > 0 {
            sums[i] / counts[i] as f64
        } else {
            defaults[i]
        };
    }
    // Boundaries out of order would make sector_at nonsensical.
    if result[0] >= result[1] {
        result = defaults;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{circular_samples, path_samples, FigureEightPath};

    fn sample_map(cars: &[(&str, f64)]) -> BTreeMap<CarId, Vec<Sample>> {
        cars.iter()
            .map(|(id, phase)| {
                (
                    CarId::new(*id),
                    circular_samples(CarId::new(*id), 400.0, 60.0, 90.0, 0.25, *phase),
                )
            })
            .collect()
    }

    #[test]
    fn builds_closed_loop_with_increasing_arc_length() {
        let samples = sample_map(&[("AAA", 0.0), ("BBB", 0.4)]);
        let track = TrackModel::build(&samples, &PipelineConfig::default()).unwrap();

        for pair in track.points.windows(2) {
            assert!(
                pair[1].arc_length_m > pair[0].arc_length_m,
                "arc-length must strictly increase"
            );
        }
        assert_eq!(track.points[0].arc_length_m, 0.0);
        assert!(track.lap_length_m > track.points.last().unwrap().arc_length_m);

        // Circumference of a 400m-radius circle.
        let expected = 2.0 * std::f64::consts::PI * 400.0;
        assert!((track.lap_length_m - expected).abs() / expected < 0.05);
    }

    #[test]
    fn widths_are_clamped_to_bounds() {
        let samples = sample_map(&[("AAA", 0.0), ("BBB", 0.3), ("CCC", 0.7)]);
        let config = PipelineConfig::default();
        let track = TrackModel::build(&samples, &config).unwrap();
        for point in &track.points {
            assert!(point.width_m >= config.track_width_min_m);
            assert!(point.width_m <= config.track_width_max_m);
        }
    }

    #[test]
    fn sparse_session_fails_with_insufficient_data() {
        let mut samples = BTreeMap::new();
        for id in ["AAA", "BBB"] {
            let car = CarId::new(id);
            let mut car_samples = circular_samples(car.clone(), 400.0, 60.0, 90.0, 0.25, 0.0);
            car_samples.truncate(3);
            samples.insert(car, car_samples);
        }
        let err = TrackModel::build(&samples, &PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, GeometryError::InsufficientData { .. }));
    }

    #[test]
    fn figure_eight_telemetry_is_rejected_as_self_intersecting() {
        let config = PipelineConfig {
            centerline_buckets: 64,
            ..PipelineConfig::default()
        };
        let path = FigureEightPath { half_span_m: 300.0 };
        // One full lap: 6 * 300m at 50 m/s.
        let samples = path_samples(CarId::new("AAA"), &path, 50.0, 36.0, 0.1, 0.0);
        let mut map = BTreeMap::new();
        map.insert(CarId::new("AAA"), samples);

        let err = TrackModel::build(&map, &config).unwrap_err();
        match err {
            GeometryError::SelfIntersecting { x, y, .. } => {
                // The lobes cross at the origin.
                assert!(x.hypot(y) < 50.0, "crossing reported at ({x:.1}, {y:.1})");
            }
            other => panic!("expected self-intersection, got {other:?}"),
        }
    }

    #[test]
    fn partial_lap_coverage_fails_as_open_loop() {
        let config = PipelineConfig {
            centerline_buckets: 64,
            ..PipelineConfig::default()
        };
        // 70% of one lap: the fitted ring cannot close back to the start.
        let samples = circular_samples(CarId::new("AAA"), 400.0, 60.0, 29.0, 0.1, 0.0);
        let mut map = BTreeMap::new();
        map.insert(CarId::new("AAA"), samples);

        let err = TrackModel::build(&map, &config).unwrap_err();
        match err {
            GeometryError::OpenLoop { gap_m } => {
                assert!(gap_m > 100.0, "seam gap was only {gap_m:.1}m");
            }
            other => panic!("expected open loop, got {other:?}"),
        }
    }

    #[test]
    fn projection_round_trips_arc_length() {
        let samples = sample_map(&[("AAA", 0.0), ("BBB", 0.5)]);
        let track = TrackModel::build(&samples, &PipelineConfig::default()).unwrap();

        let probe = &track.points[track.points.len() / 2];
        let pos = track.project(probe.x, probe.y, None);
        assert!((pos.arc_length_m - probe.arc_length_m).abs() < 2.0);
    }

    #[test]
    fn sector_at_partitions_the_lap() {
        let samples = sample_map(&[("AAA", 0.0)]);
        let track = TrackModel::build(&samples, &PipelineConfig::default()).unwrap();
        assert_eq!(track.sector_at(0.0), 1);
        assert_eq!(track.sector_at(track.lap_length_m * 0.5), 2);
        assert_eq!(track.sector_at(track.lap_length_m * 0.95), 3);
    }
}
