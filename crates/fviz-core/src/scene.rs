//! Scene emission: the boundary to the external renderer.
//!
//! A `SceneEmitter` is a stateless projection of the session timeline and
//! trajectories onto renderable frames. `frame_at` is pure and may be
//! called out of order; consumers must commit frames in `frame_index`
//! order, which is what `frames()` yields.

use crate::config::{FocusCarPolicy, PipelineConfig};
use crate::errors::OutOfRangeError;
use crate::models::{CameraCue, CarId, CarTransform, Frame, TrackGeometry};
use crate::timeline::SessionTimeline;

pub struct SceneEmitter<'a> {
    timeline: &'a SessionTimeline,
    config: &'a PipelineConfig,
    /// Centroid of the track, the reference point for the camera path.
    centroid: (f64, f64),
}

impl<'a> SceneEmitter<'a> {
    pub fn new(
        timeline: &'a SessionTimeline,
        track: &TrackGeometry,
        config: &'a PipelineConfig,
    ) -> Self {
        let n = track.points.len().max(1) as f64;
        let centroid = (
            track.points.iter().map(|p| p.x).sum::<f64>() / n,
            track.points.iter().map(|p| p.y).sum::<f64>() / n,
        );
        Self {
            timeline,
            config,
            centroid,
        }
    }

    /// Index of the first frame inside the session span.
    pub fn first_frame(&self) -> u64 {
        let fps = self.config.target_fps as f64;
        (self.timeline.span().0 * fps - 1e-9).ceil().max(0.0) as u64
    }

    /// Index one past the last frame inside the session span.
    pub fn end_frame(&self) -> u64 {
        let fps = self.config.target_fps as f64;
        ((self.timeline.span().1 * fps + 1e-9).floor() as u64).saturating_add(1)
    }

    pub fn total_frames(&self) -> u64 {
        self.end_frame().saturating_sub(self.first_frame())
    }

    /// Cars present in the scene, in deterministic order.
    pub fn car_ids(&self) -> Vec<CarId> {
        self.timeline.trajectories().keys().cloned().collect()
    }

    /// The scene description for one frame.
    ///
    /// Cars outside their valid interval are omitted from the transforms;
    /// a time outside the whole session span is an error.
    pub fn frame_at(&self, frame_index: u64) -> Result<Frame, OutOfRangeError> {
        let time_s = frame_index as f64 / self.config.target_fps as f64;
        let leaderboard = self.timeline.leaderboard_at(time_s)?;

        let car_transforms: Vec<CarTransform> = self
            .timeline
            .trajectories()
            .values()
            .filter_map(|traj| {
                let point = traj.at(time_s)?;
                Some(CarTransform {
                    car_id: traj.car_id.clone(),
                    x: point.x,
                    y: point.y,
                    z: point.z,
                    heading_rad: point.heading_rad,
                    speed_mps: point.speed_mps,
                    channels: point.channels,
                })
            })
            .collect();

        let camera = self.camera_cue(&car_transforms, &leaderboard.entries);

        Ok(Frame {
            frame_index,
            time_s,
            car_transforms,
            leaderboard,
            camera,
        })
    }

    /// All frames of the session, in strictly increasing index order.
    /// Lazy, finite, restartable.
    ///
    /// Every index in `first_frame..end_frame` lies inside the session
    /// span; a failure here is a bug, not a condition to skip over.
    pub fn frames(&self) -> impl Iterator<Item = Frame> + '_ {
        (self.first_frame()..self.end_frame())
            .map(|i| self.frame_at(i).expect("frame index inside the session span"))
    }

    fn focus_car(&self, entries: &[crate::models::LeaderboardEntry]) -> Option<CarId> {
        match &self.config.focus_car_policy {
            FocusCarPolicy::Fixed { car_id } => Some(car_id.clone()),
            FocusCarPolicy::Leader => entries.first().map(|e| e.car_id.clone()),
        }
    }

    /// Camera follows a scaled copy of the focus car's position toward the
    /// track centroid, at a fixed height and a fixed range from the car.
    fn camera_cue(
        &self,
        transforms: &[CarTransform],
        entries: &[crate::models::LeaderboardEntry],
    ) -> CameraCue {
        let focus = self
            .focus_car(entries)
            .or_else(|| self.timeline.trajectories().keys().next().cloned())
            .unwrap_or_else(|| CarId::new("?"));

        let Some(car) = transforms.iter().find(|t| t.car_id == focus) else {
            // Focus car not on track at this instant: hold on the centroid.
            return CameraCue {
                focus_car: focus,
                x: self.centroid.0,
                y: self.centroid.1,
                z: self.config.camera_height_m,
            };
        };

        let scaled = (
            self.centroid.0 + (car.x - self.centroid.0) * self.config.camera_scale,
            self.centroid.1 + (car.y - self.centroid.1) * self.config.camera_scale,
        );
        let dx = scaled.0 - car.x;
        let dy = scaled.1 - car.y;
        let dist = (dx * dx + dy * dy).sqrt();
        let (ux, uy) = if dist > f64::EPSILON {
            (dx / dist, dy / dist)
        } else {
            // Car on the centroid: back off along its heading.
            (-car.heading_rad.cos(), -car.heading_rad.sin())
        };

        CameraCue {
            focus_car: focus,
            x: car.x + ux * self.config.camera_range_m,
            y: car.y + uy * self.config.camera_range_m,
            z: car.z + self.config.camera_height_m,
        }
    }
}
