//! Normalization from the raw feed schema into the core model.
//!
//! Unit conversions happen exactly once, here: positions arrive in
//! decimeters and leave in meters, speeds arrive in km/h and leave in m/s.
//! Per-car failures never abort the session; they land in the
//! `SessionReport` and the car is dropped.

use crate::provider::SessionProvider;
use crate::raw::{RawCar, RawRun, RawSample, RawSession};
use fviz_core::models::{CarChannels, CarId, Sample, SectorTimes, SessionReport};
use fviz_core::{IngestionError, PipelineConfig};
use std::collections::BTreeMap;

const DECIMETERS_PER_METER: f64 = 10.0;
const KMH_PER_MPS: f64 = 3.6;

/// A session after normalization, ready for track reconstruction.
#[derive(Debug, Clone)]
pub struct NormalizedSession {
    pub session_id: String,
    pub track_name: String,
    /// Per-car samples, sorted by time, units converted.
    pub samples: BTreeMap<CarId, Vec<Sample>>,
    /// Sector times for each car's selected run, when the feed had them.
    pub sector_times: BTreeMap<CarId, SectorTimes>,
    pub report: SessionReport,
}

/// Fetches a raw session from a provider and normalizes it.
pub struct TelemetrySource<P> {
    provider: P,
    config: PipelineConfig,
}

impl<P: SessionProvider> TelemetrySource<P> {
    pub fn new(provider: P, config: PipelineConfig) -> Self {
        Self { provider, config }
    }

    pub async fn load(&self, session_id: &str) -> Result<NormalizedSession, IngestionError> {
        let raw = self.provider.fetch(session_id).await?;
        tracing::info!(
            session = %raw.session_id,
            track = %raw.track,
            cars = raw.cars.len(),
            "normalizing session"
        );
        Ok(normalize(raw, &self.config))
    }
}

/// Normalize a raw session: pick each car's fastest usable run, convert
/// units, drop unusable samples, and enforce monotonic timestamps.
pub fn normalize(raw: RawSession, config: &PipelineConfig) -> NormalizedSession {
    let mut samples = BTreeMap::new();
    let mut sector_times = BTreeMap::new();
    let mut report = SessionReport::default();

    for car in raw.cars {
        let car_id = CarId::new(car.abbrev.clone());
        let Some(run) = select_run(&car) else {
            report.exclude(car_id, "no runs with samples");
            continue;
        };

        let (car_samples, dropped) = normalize_run(&car_id, run);
        report.dropped_samples += dropped;

        if car_samples.len() < config.min_samples_per_car {
            let err = IngestionError::TooFewSamples {
                car_id: car_id.clone(),
                count: car_samples.len(),
                min: config.min_samples_per_car,
            };
            report.exclude(car_id, err);
            continue;
        }

        if let Some([s1, s2, s3]) = run.sector_times_s {
            sector_times.insert(
                car_id.clone(),
                SectorTimes {
                    sector1_s: s1,
                    sector2_s: s2,
                    sector3_s: s3,
                },
            );
        }
        samples.insert(car_id, car_samples);
    }

    NormalizedSession {
        session_id: raw.session_id,
        track_name: raw.track,
        samples,
        sector_times,
        report,
    }
}

/// The car's fastest run: smallest lap time where sector times exist,
/// otherwise the run covering the shortest time span. Runs without samples
/// never qualify.
fn select_run(car: &RawCar) -> Option<&RawRun> {
    car.runs
        .iter()
        .filter(|r| !r.samples.is_empty())
        .min_by(|a, b| {
            run_duration(a)
                .partial_cmp(&run_duration(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}

fn run_duration(run: &RawRun) -> f64 {
    if let Some([s1, s2, s3]) = run.sector_times_s {
        return s1 + s2 + s3;
    }
    let first = run.samples.first().map(|s| s.t).unwrap_or(0.0);
    let last = run.samples.last().map(|s| s.t).unwrap_or(0.0);
    last - first
}

/// Convert one run's samples, returning the kept samples and the number
/// dropped (missing fields or non-monotonic timestamps).
fn normalize_run(car_id: &CarId, run: &RawRun) -> (Vec<Sample>, u64) {
    let mut out: Vec<Sample> = Vec::with_capacity(run.samples.len());
    let mut dropped = 0u64;
    let mut last_time = f64::NEG_INFINITY;
    let mut last_lap = run.lap_number.unwrap_or(1);
    let mut last_sector = 1u8;

    for raw in &run.samples {
        let Some(sample) = convert_sample(car_id, raw, &mut last_lap, &mut last_sector) else {
            dropped += 1;
            continue;
        };
        if sample.time_s <= last_time {
            tracing::debug!(
                car = %car_id,
                time_s = sample.time_s,
                "dropping out-of-order sample"
            );
            dropped += 1;
            continue;
        }
        last_time = sample.time_s;
        out.push(sample);
    }

    if dropped > 0 {
        tracing::warn!(car = %car_id, dropped, kept = out.len(), "dropped unusable samples");
    }
    (out, dropped)
}

fn convert_sample(
    car_id: &CarId,
    raw: &RawSample,
    last_lap: &mut u32,
    last_sector: &mut u8,
) -> Option<Sample> {
    let (x, y) = (raw.x?, raw.y?);
    let speed_kmh = raw.speed_kmh?;
    let distance = raw.distance?;

    if let Some(lap) = raw.lap {
        *last_lap = lap;
    }
    if let Some(sector) = raw.sector.filter(|s| (1..=3).contains(s)) {
        *last_sector = sector;
    }

    let channels = match (raw.throttle, raw.gear, raw.rpm) {
        (Some(throttle), Some(gear), Some(rpm)) => Some(CarChannels {
            throttle: throttle.clamp(0.0, 1.0),
            brake: raw.brake.unwrap_or(false),
            gear,
            rpm,
            drs: raw.drs.unwrap_or(false),
        }),
        _ => None,
    };

    Some(Sample {
        car_id: car_id.clone(),
        time_s: raw.t,
        x: x / DECIMETERS_PER_METER,
        y: y / DECIMETERS_PER_METER,
        z: raw.z.unwrap_or(0.0) / DECIMETERS_PER_METER,
        speed_mps: speed_kmh / KMH_PER_MPS,
        lap_number: *last_lap,
        sector: *last_sector,
        distance_m: distance,
        channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_sample(t: f64, x: f64, y: f64, speed_kmh: f64, distance: f64) -> RawSample {
        RawSample {
            t,
            x: Some(x),
            y: Some(y),
            z: Some(0.0),
            speed_kmh: Some(speed_kmh),
            lap: Some(1),
            sector: Some(1),
            distance: Some(distance),
            throttle: Some(0.9),
            brake: Some(false),
            gear: Some(6),
            rpm: Some(11_000.0),
            drs: Some(false),
        }
    }

    fn run(samples: Vec<RawSample>, sector_times_s: Option<[f64; 3]>) -> RawRun {
        RawRun {
            lap_number: Some(1),
            sector_times_s,
            samples,
        }
    }

    fn session(cars: Vec<RawCar>) -> RawSession {
        RawSession {
            session_id: "2025-monza-q".into(),
            track: "Monza".into(),
            year: 2025,
            session_kind: Some("Q".into()),
            date: None,
            cars,
        }
    }

    fn car(abbrev: &str, runs: Vec<RawRun>) -> RawCar {
        RawCar {
            abbrev: abbrev.into(),
            last_name: None,
            team: None,
            color: None,
            runs,
        }
    }

    fn long_run(base_speed_kmh: f64) -> RawRun {
        let samples = (0..40)
            .map(|i| {
                let t = i as f64 * 0.25;
                raw_sample(t, t * 100.0, 50.0, base_speed_kmh, t * base_speed_kmh / 3.6)
            })
            .collect();
        run(samples, None)
    }

    #[test]
    fn positions_and_speeds_are_converted_once() {
        let raw = session(vec![car(
            "VER",
            vec![run(
                (0..20)
                    .map(|i| raw_sample(i as f64 * 0.25, 1000.0, 2000.0, 324.0, i as f64 * 20.0))
                    .collect(),
                None,
            )],
        )]);
        let normalized = normalize(raw, &PipelineConfig::default());
        let samples = &normalized.samples[&CarId::new("VER")];
        assert!((samples[0].x - 100.0).abs() < 1e-9);
        assert!((samples[0].y - 200.0).abs() < 1e-9);
        assert!((samples[0].speed_mps - 90.0).abs() < 1e-9);
    }

    #[test]
    fn unusable_samples_are_dropped_and_counted() {
        let mut samples: Vec<RawSample> = (0..20)
            .map(|i| raw_sample(i as f64 * 0.25, 100.0, 100.0, 200.0, i as f64 * 15.0))
            .collect();
        samples[3].x = None; // missing position
        samples[7].speed_kmh = None; // missing speed
        samples[11].t = samples[10].t; // duplicate timestamp
        let raw = session(vec![car("HAM", vec![run(samples, None)])]);

        let normalized = normalize(raw, &PipelineConfig::default());
        assert_eq!(normalized.report.dropped_samples, 3);
        assert_eq!(normalized.samples[&CarId::new("HAM")].len(), 17);
    }

    #[test]
    fn fastest_run_wins() {
        let slow = run(
            (0..40)
                .map(|i| raw_sample(i as f64 * 0.25, 10.0, 10.0, 180.0, i as f64 * 12.5))
                .collect(),
            Some([30.0, 32.0, 31.0]),
        );
        let fast = run(
            (0..40)
                .map(|i| raw_sample(i as f64 * 0.25, 10.0, 10.0, 200.0, i as f64 * 13.9))
                .collect(),
            Some([28.0, 30.0, 29.0]),
        );
        let raw = session(vec![car("LEC", vec![slow, fast])]);

        let normalized = normalize(raw, &PipelineConfig::default());
        let st = normalized.sector_times[&CarId::new("LEC")];
        assert!((st.lap_time_s() - 87.0).abs() < 1e-9);
    }

    #[test]
    fn car_with_too_few_samples_is_excluded() {
        let raw = session(vec![
            car(
                "NOR",
                vec![run(vec![raw_sample(0.0, 1.0, 1.0, 100.0, 0.0)], None)],
            ),
            car("PIA", vec![long_run(250.0)]),
        ]);
        let normalized = normalize(raw, &PipelineConfig::default());
        assert!(normalized.report.is_excluded(&CarId::new("NOR")));
        assert!(normalized.samples.contains_key(&CarId::new("PIA")));
    }

    #[test]
    fn car_without_runs_is_excluded() {
        let raw = session(vec![car("SAI", vec![])]);
        let normalized = normalize(raw, &PipelineConfig::default());
        assert!(normalized.report.is_excluded(&CarId::new("SAI")));
        assert!(normalized.samples.is_empty());
    }

    #[test]
    fn channels_survive_when_complete() {
        let raw = session(vec![car("ALO", vec![long_run(220.0)])]);
        let normalized = normalize(raw, &PipelineConfig::default());
        let samples = &normalized.samples[&CarId::new("ALO")];
        let channels = samples[0].channels.unwrap();
        assert_eq!(channels.gear, 6);
        assert!((channels.throttle - 0.9).abs() < 1e-9);
    }
}
