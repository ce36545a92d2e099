//! Scene file writer for the Blender import script.
//!
//! The export is a directory: `scene.json` (manifest with track geometry,
//! cars, timeline events, frame-rate) plus `frames.ndjson` with one frame
//! per line in strictly increasing `frame_index` order. The import script
//! streams the frame file, so ordering is part of the contract.

use anyhow::{Context, Result};
use fviz_core::models::{CarId, Frame, TimelineEvent, TrackGeometry};
use fviz_core::{PipelineConfig, SceneEmitter, SessionReport};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Manifest written alongside the frame stream.
#[derive(Debug, Serialize)]
pub struct SceneManifest<'a> {
    pub session_id: &'a str,
    pub track_name: &'a str,
    pub target_fps: u32,
    pub first_frame: u64,
    pub total_frames: u64,
    pub track: &'a TrackGeometry,
    pub cars: Vec<CarId>,
    pub events: &'a [TimelineEvent],
    pub report: &'a SessionReport,
}

/// What an export produced, for the CLI to print.
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub scene_path: PathBuf,
    pub frames_path: PathBuf,
    pub frames_written: u64,
}

pub struct SceneWriter {
    out_dir: PathBuf,
}

impl SceneWriter {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    /// Write the full scene to the output directory.
    pub fn export(
        &self,
        session_id: &str,
        track_name: &str,
        emitter: &SceneEmitter<'_>,
        track: &TrackGeometry,
        events: &[TimelineEvent],
        report: &SessionReport,
        config: &PipelineConfig,
    ) -> Result<ExportSummary> {
        fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("creating {}", self.out_dir.display()))?;

        let frames_path = self.out_dir.join("frames.ndjson");
        let frames_written = self.write_frames(&frames_path, emitter.frames())?;

        let manifest = SceneManifest {
            session_id,
            track_name,
            target_fps: config.target_fps,
            first_frame: emitter.first_frame(),
            total_frames: frames_written,
            track,
            cars: emitter.car_ids(),
            events,
            report,
        };
        let scene_path = self.out_dir.join("scene.json");
        let file = File::create(&scene_path)
            .with_context(|| format!("creating {}", scene_path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &manifest)
            .with_context(|| format!("writing {}", scene_path.display()))?;

        tracing::info!(
            scene = %scene_path.display(),
            frames = frames_written,
            "scene exported"
        );

        Ok(ExportSummary {
            scene_path,
            frames_path,
            frames_written,
        })
    }

    fn write_frames(
        &self,
        path: &Path,
        frames: impl Iterator<Item = Frame>,
    ) -> Result<u64> {
        let file =
            File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let mut writer = BufWriter::new(file);

        let mut written = 0u64;
        let mut last_index: Option<u64> = None;
        for frame in frames {
            // The stream contract: indices strictly increase.
            if let Some(last) = last_index {
                debug_assert!(frame.frame_index > last);
            }
            last_index = Some(frame.frame_index);

            serde_json::to_writer(&mut writer, &frame)
                .with_context(|| format!("serializing frame {}", frame.frame_index))?;
            writer
                .write_all(b"\n")
                .with_context(|| format!("writing {}", path.display()))?;
            written += 1;
        }
        writer
            .flush()
            .with_context(|| format!("flushing {}", path.display()))?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fviz_core::models::CarId;
    use fviz_core::sim::circular_samples;
    use fviz_core::{SessionTimeline, TrackModel, TrajectoryResampler};
    use std::collections::BTreeMap;
    use std::io::BufRead;

    fn build() -> (SessionTimeline, TrackGeometry, PipelineConfig) {
        let config = PipelineConfig {
            target_fps: 30,
            ..PipelineConfig::default()
        };
        let mut samples = BTreeMap::new();
        for (id, speed) in [("AAA", 60.0), ("BBB", 58.0)] {
            let car = CarId::new(id);
            samples.insert(
                car.clone(),
                circular_samples(car, 400.0, speed, 30.0, 0.25, 0.0),
            );
        }
        let track = TrackModel::build(&samples, &config).unwrap();
        let trajectories = samples
            .values()
            .map(|s| TrajectoryResampler::resample(s, &track, &config).unwrap())
            .collect();
        let timeline = SessionTimeline::build(trajectories, BTreeMap::new(), &track);
        (timeline, track, config)
    }

    #[test]
    fn export_writes_manifest_and_ordered_frames() {
        let (timeline, track, config) = build();
        let emitter = SceneEmitter::new(&timeline, &track, &config);
        let dir = tempfile::tempdir().unwrap();

        let summary = SceneWriter::new(dir.path())
            .export(
                "2025-monza-q",
                "Monza",
                &emitter,
                &track,
                timeline.events(),
                &SessionReport::default(),
                &config,
            )
            .unwrap();

        assert_eq!(summary.frames_written, emitter.total_frames());

        let manifest: serde_json::Value =
            serde_json::from_reader(File::open(&summary.scene_path).unwrap()).unwrap();
        assert_eq!(manifest["session_id"], "2025-monza-q");
        assert_eq!(manifest["target_fps"], 30);
        assert_eq!(manifest["cars"].as_array().unwrap().len(), 2);
        assert!(manifest["track"]["lap_length_m"].as_f64().unwrap() > 0.0);

        let reader = std::io::BufReader::new(File::open(&summary.frames_path).unwrap());
        let mut last: Option<u64> = None;
        let mut count = 0u64;
        for line in reader.lines() {
            let frame: serde_json::Value = serde_json::from_str(&line.unwrap()).unwrap();
            let index = frame["frame_index"].as_u64().unwrap();
            if let Some(last) = last {
                assert!(index > last, "frame indices must strictly increase");
            }
            last = Some(index);
            count += 1;
        }
        assert_eq!(count, summary.frames_written);
    }
}
