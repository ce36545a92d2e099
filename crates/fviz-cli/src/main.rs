//! Formula Viz - qualifying telemetry to Blender scene files.

use anyhow::{bail, Context, Result};
use clap::Parser;
use fviz_core::models::{CarId, Sample, SectorTimes, SessionReport};
use fviz_core::{
    PipelineConfig, SceneEmitter, SessionTimeline, TrackGeometry, TrackModel, Trajectory,
    TrajectoryResampler,
};
use fviz_source::{ArchiveProvider, HttpProvider, NormalizedSession, TelemetrySource};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Turn a qualifying session's telemetry into a replayable Blender scene.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Session identifier, e.g. "2025-monza-q"
    #[arg(long)]
    session: Option<String>,

    /// Local archive directory with {session}.json files
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Fetch the session from this feed URL instead of the local archive
    #[arg(long)]
    source_url: Option<String>,

    /// Pipeline config file (JSON); missing fields take defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory for scene.json and frames.ndjson
    #[arg(long, default_value = "out")]
    out: PathBuf,

    /// Override the configured frame rate
    #[arg(long)]
    fps: Option<u32>,

    /// Run on a synthetic two-car session instead of real telemetry
    #[arg(long, default_value_t = false)]
    demo: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fviz_core=info".parse()?)
                .add_directive("fviz_source=info".parse()?)
                .add_directive("fviz_blender=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let session = if args.demo {
        demo_session(&config)
    } else {
        let Some(session_id) = args.session.as_deref() else {
            bail!("--session is required unless --demo is set");
        };
        load_session(&args, session_id, &config).await?
    };

    if session.samples.is_empty() {
        bail!(
            "no usable cars in session {} ({} excluded)",
            session.session_id,
            session.report.excluded.len()
        );
    }

    // Track reconstruction needs every car's samples; it is the one
    // barrier before the per-car work fans out.
    let track = TrackModel::build(&session.samples, &config)
        .with_context(|| format!("reconstructing track for {}", session.session_id))?;
    tracing::info!(
        lap_length_m = track.lap_length_m,
        points = track.points.len(),
        "track reconstructed"
    );

    let mut report = session.report;
    let trajectories = resample_all(&session.samples, &track, &config, &mut report).await?;
    if trajectories.is_empty() {
        bail!("every car was excluded; nothing to render");
    }

    let timeline = SessionTimeline::build(trajectories, session.sector_times, &track);
    let emitter = SceneEmitter::new(&timeline, &track, &config);

    let summary = fviz_blender::SceneWriter::new(&args.out).export(
        &session.session_id,
        &session.track_name,
        &emitter,
        &track,
        timeline.events(),
        &report,
        &config,
    )?;

    print_report(&report);
    println!(
        "wrote {} frames to {}",
        summary.frames_written,
        summary.frames_path.display()
    );
    Ok(())
}

fn load_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_slice(&bytes)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };
    if let Some(fps) = args.fps {
        config.target_fps = fps;
    }
    if config.target_fps == 0 {
        bail!("target_fps must be positive");
    }
    Ok(config)
}

async fn load_session(
    args: &Args,
    session_id: &str,
    config: &PipelineConfig,
) -> Result<NormalizedSession> {
    let session = match &args.source_url {
        Some(url) => {
            let provider = HttpProvider::new(url.clone())?;
            TelemetrySource::new(provider, config.clone())
                .load(session_id)
                .await?
        }
        None => {
            let provider = ArchiveProvider::new(&args.data_dir);
            TelemetrySource::new(provider, config.clone())
                .load(session_id)
                .await?
        }
    };
    Ok(session)
}

/// Resample every car on the shared clock. Per-car work is independent,
/// so it fans out on the blocking pool; failures exclude the car.
async fn resample_all(
    samples: &BTreeMap<CarId, Vec<Sample>>,
    track: &TrackGeometry,
    config: &PipelineConfig,
    report: &mut SessionReport,
) -> Result<Vec<Trajectory>> {
    let mut handles = Vec::with_capacity(samples.len());
    for (car_id, car_samples) in samples {
        let car_id = car_id.clone();
        let car_samples = car_samples.clone();
        let track = track.clone();
        let config = config.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let result = TrajectoryResampler::resample(&car_samples, &track, &config);
            (car_id, result)
        }));
    }

    let mut trajectories = Vec::with_capacity(handles.len());
    for handle in handles {
        let (car_id, result) = handle.await.context("resampling task panicked")?;
        match result {
            Ok(trajectory) => trajectories.push(trajectory),
            Err(err) => report.exclude(car_id, err),
        }
    }
    Ok(trajectories)
}

fn demo_session(config: &PipelineConfig) -> NormalizedSession {
    use fviz_core::sim::circular_samples;

    let mut samples = BTreeMap::new();
    let mut sector_times = BTreeMap::new();
    for (id, speed, sectors) in [
        ("AAA", 62.0, [27.0_f64, 28.5, 26.0]),
        ("BBB", 59.5, [27.8, 29.3, 26.9]),
    ] {
        let car = CarId::new(id);
        samples.insert(
            car.clone(),
            circular_samples(car.clone(), 400.0, speed, 90.0, 0.25, 0.0),
        );
        sector_times.insert(
            car,
            SectorTimes {
                sector1_s: sectors[0],
                sector2_s: sectors[1],
                sector3_s: sectors[2],
            },
        );
    }
    tracing::info!(fps = config.target_fps, "running demo session");
    NormalizedSession {
        session_id: "demo".into(),
        track_name: "Demo Ring".into(),
        samples,
        sector_times,
        report: SessionReport::default(),
    }
}

fn print_report(report: &SessionReport) {
    if report.dropped_samples > 0 {
        println!("dropped {} unusable samples", report.dropped_samples);
    }
    for excluded in &report.excluded {
        println!("excluded {}: {}", excluded.car_id, excluded.reason);
    }
}
