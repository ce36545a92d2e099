//! Temporal merge of per-car trajectories into one event stream and an
//! on-demand leaderboard.

use crate::errors::OutOfRangeError;
use crate::models::{
    CarId, EventKind, LeaderboardEntry, LeaderboardState, SectorTimes, TimelineEvent,
    TrackGeometry, Trajectory,
};
use std::collections::BTreeMap;

/// Merged timing state for the whole session.
///
/// Owns the ordered event stream; the leaderboard is a pure function of
/// time over the stored trajectories and is recomputed per query.
pub struct SessionTimeline {
    trajectories: BTreeMap<CarId, Trajectory>,
    sector_times: BTreeMap<CarId, SectorTimes>,
    events: Vec<TimelineEvent>,
    lap_length_m: f64,
    span: (f64, f64),
}

impl SessionTimeline {
    pub fn build(
        trajectories: Vec<Trajectory>,
        sector_times: BTreeMap<CarId, SectorTimes>,
        track: &TrackGeometry,
    ) -> Self {
        let mut events = Vec::new();
        let mut span = (f64::INFINITY, f64::NEG_INFINITY);

        for traj in &trajectories {
            if traj.points.is_empty() {
                continue;
            }
            span.0 = span.0.min(traj.start_time_s);
            span.1 = span.1.max(traj.end_time_s());
            derive_car_events(traj, track, sector_times.get(&traj.car_id), &mut events);
        }
        if span.0 > span.1 {
            span = (0.0, 0.0);
        }

        if let Some(last) = trajectories
            .iter()
            .filter(|t| !t.points.is_empty())
            .max_by(|a, b| {
                a.end_time_s()
                    .partial_cmp(&b.end_time_s())
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.car_id.cmp(&a.car_id))
            })
        {
            events.push(TimelineEvent {
                time_s: span.1,
                car_id: last.car_id.clone(),
                kind: EventKind::SessionEnd,
            });
        }

        // Total order: (time, car_id). The sort is stable, so events of one
        // car at the same instant keep their derivation order.
        events.sort_by(|a, b| {
            a.time_s
                .partial_cmp(&b.time_s)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.car_id.cmp(&b.car_id))
        });

        Self {
            trajectories: trajectories
                .into_iter()
                .map(|t| (t.car_id.clone(), t))
                .collect(),
            sector_times,
            events,
            lap_length_m: track.lap_length_m,
            span,
        }
    }

    /// Overall valid time span across all cars.
    pub fn span(&self) -> (f64, f64) {
        self.span
    }

    pub fn trajectories(&self) -> &BTreeMap<CarId, Trajectory> {
        &self.trajectories
    }

    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    /// Events with `t0 <= time < t1`, in order. Lazy and restartable: the
    /// returned iterator borrows the sorted stream.
    pub fn events_between(&self, t0: f64, t1: f64) -> impl Iterator<Item = &TimelineEvent> {
        let start = self.events.partition_point(|e| e.time_s < t0);
        let end = self.events.partition_point(|e| e.time_s < t1);
        self.events[start..end.max(start)].iter()
    }

    /// Leaderboard snapshot at `t`. Pure: same inputs, same ordering, ties
    /// broken by car id.
    ///
    /// The span check carries a small tolerance for frame-clock rounding:
    /// the last frame instant may land within one ulp of the span end.
    pub fn leaderboard_at(&self, t: f64) -> Result<LeaderboardState, OutOfRangeError> {
        const T_EPS: f64 = 1e-9;
        if t < self.span.0 - T_EPS || t > self.span.1 + T_EPS {
            return Err(OutOfRangeError {
                time_s: t,
                start_s: self.span.0,
                end_s: self.span.1,
            });
        }

        let mut ranked: Vec<(CarId, f64, f64)> = self
            .trajectories
            .values()
            .filter_map(|traj| {
                let distance = traj.total_distance_at(t, self.lap_length_m)?;
                let speed = traj.at(t)?.speed_mps;
                Some((traj.car_id.clone(), distance, speed))
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let leader = ranked.first().cloned();
        let entries = ranked
            .into_iter()
            .enumerate()
            .map(|(i, (car_id, distance, _))| {
                let gap_to_leader_s = match &leader {
                    Some((_, lead_d, lead_v)) => (lead_d - distance) / lead_v.max(1.0),
                    None => 0.0,
                };
                let last_sector_time_s = self.last_sector_time(&car_id, t);
                LeaderboardEntry {
                    rank: (i + 1) as u32,
                    car_id,
                    total_distance_m: distance,
                    gap_to_leader_s,
                    last_sector_time_s,
                }
            })
            .collect();

        Ok(LeaderboardState { time_s: t, entries })
    }

    /// Duration of the most recent sector the car completed at or before `t`.
    fn last_sector_time(&self, car_id: &CarId, t: f64) -> Option<f64> {
        let times = self.sector_times.get(car_id)?;
        let upto = self.events.partition_point(|e| e.time_s <= t);
        self.events[..upto]
            .iter()
            .rev()
            .find_map(|event| match &event.kind {
                EventKind::SectorCross { sector } if &event.car_id == car_id => {
                    times.sector_s(*sector)
                }
                _ => None,
            })
    }
}

/// Scan one trajectory for lap starts and sector crossings, and close the
/// car out with a personal-best event when its lap time is known.
fn derive_car_events(
    traj: &Trajectory,
    track: &TrackGeometry,
    sector_times: Option<&SectorTimes>,
    events: &mut Vec<TimelineEvent>,
) {
    events.push(TimelineEvent {
        time_s: traj.start_time_s,
        car_id: traj.car_id.clone(),
        kind: EventKind::LapStart,
    });

    let dt = 1.0 / traj.sample_rate_hz;
    let mut prev_sector = track.sector_at(traj.points[0].arc_length_m);
    let mut prev_lap = traj.points[0].lap_number;
    for (i, point) in traj.points.iter().enumerate().skip(1) {
        let time_s = traj.start_time_s + i as f64 * dt;
        if point.lap_number > prev_lap {
            events.push(TimelineEvent {
                time_s,
                car_id: traj.car_id.clone(),
                kind: EventKind::LapStart,
            });
            prev_lap = point.lap_number;
        }
        let sector = track.sector_at(point.arc_length_m);
        if sector != prev_sector {
            // The event records the sector just completed.
            events.push(TimelineEvent {
                time_s,
                car_id: traj.car_id.clone(),
                kind: EventKind::SectorCross { sector: prev_sector },
            });
            prev_sector = sector;
        }
    }

    if let Some(times) = sector_times {
        events.push(TimelineEvent {
            time_s: traj.end_time_s(),
            car_id: traj.car_id.clone(),
            kind: EventKind::PersonalBest {
                lap_time_s: times.lap_time_s(),
            },
        });
    }
}
