use std::path::{Path, PathBuf};

use clap::Parser;
use env_logger::Env;
use serde::Serialize;

use route_guide_rs::filters::heading::{HeadingConfig, HeadingSourceKind};
use route_guide_rs::route::{NavigationConfig, ProgressEvent, RouteSet};
use route_guide_rs::sensor_fusion::{FusionConfig, FusionEvent, FusionSnapshot, SensorFusion};
use route_guide_rs::session::{ReplayOptions, Session, TimedEvent};

#[derive(Parser, Debug)]
struct Args {
    /// Path to session_*.json[.gz]
    #[arg(long, conflicts_with = "session_dir")]
    session: Option<PathBuf>,

    /// Directory of recorded sessions to batch replay (session_*.json[.gz])
    #[arg(long)]
    session_dir: Option<PathBuf>,

    /// Route file; defaults to the one named in the session
    #[arg(long)]
    route: Option<PathBuf>,

    /// Spacing of predict ticks inserted between events (ms)
    #[arg(long, default_value = "50")]
    predict_interval_ms: u64,

    /// Only clear cue playback on recorded cue_finished events
    #[arg(long, default_value_t = false)]
    recorded_playback: bool,

    #[arg(long, default_value = "1e-8")]
    process_noise: f64,

    #[arg(long, value_enum, default_value = "absolute-compass")]
    heading_source: HeadingSourceKind,

    #[arg(long, default_value = "0.1")]
    smoothing: f64,

    #[arg(long, default_value = "20.0")]
    advance_radius: f64,

    #[arg(long, default_value = "10.0")]
    cue_min: f64,

    #[arg(long, default_value = "50.0")]
    cue_max: f64,

    /// Write the JSON report here instead of stdout
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Serialize, Default)]
struct Stats {
    events: usize,
    gps_fixes_rejected: u64,
    predict_skips: u64,
    degenerate_updates: u64,
    waypoints_passed: u64,
    cues_fired: u64,
    arrived: bool,
    final_target_index: Option<usize>,
    final_progress_percent: f64,
}

#[derive(Serialize)]
struct Report {
    session: String,
    route: String,
    stats: Stats,
    cues: Vec<TimedEvent>,
    progress: Vec<TimedEvent>,
    final_snapshot: FusionSnapshot,
}

fn build_fusion(args: &Args, routes: RouteSet) -> SensorFusion {
    let config = FusionConfig {
        predict_interval_ms: args.predict_interval_ms,
        process_noise: args.process_noise,
        heading: HeadingConfig { smoothing_factor: args.smoothing, ..HeadingConfig::default() },
        heading_source: args.heading_source,
        ..FusionConfig::default()
    };
    let nav = NavigationConfig {
        advance_radius_m: args.advance_radius,
        cue_min_distance_m: args.cue_min,
        cue_max_distance_m: args.cue_max,
        ..NavigationConfig::default()
    };
    SensorFusion::new(config, nav, routes)
}

fn run_once(path: &Path, args: &Args) -> anyhow::Result<Report> {
    let session = Session::load(path)?;
    let route_path = match (&args.route, &session.route_file) {
        (Some(route), _) => route.clone(),
        (None, Some(route)) => PathBuf::from(route),
        (None, None) => anyhow::bail!("{} names no route file; pass --route", path.display()),
    };
    let routes = RouteSet::load(&route_path)?;
    let mut fusion = build_fusion(args, routes);

    let options = ReplayOptions {
        predict_interval_ms: args.predict_interval_ms as f64,
        auto_finish_cues: !args.recorded_playback,
    };
    let events = session.replay(&mut fusion, &options);

    let mut stats = Stats { events: session.len(), ..Stats::default() };
    let mut cues = Vec::new();
    let mut progress = Vec::new();
    for timed in &events {
        match &timed.event {
            FusionEvent::GpsRejected { .. } => stats.gps_fixes_rejected += 1,
            FusionEvent::PredictSkipped { .. } => stats.predict_skips += 1,
            FusionEvent::NumericDegenerate { .. } => stats.degenerate_updates += 1,
            FusionEvent::Progress(ProgressEvent::Cue(cue)) => {
                stats.cues_fired += 1;
                println!("[CUE] t={:.1}s {} at {:.0} m: {}", timed.timestamp_ms / 1000.0, cue.waypoint_id, cue.distance_m, cue.cues.join(", "));
                cues.push(timed.clone());
            }
            FusionEvent::Progress(event) => {
                match event {
                    ProgressEvent::Advanced { .. } => stats.waypoints_passed += 1,
                    ProgressEvent::Arrived { .. } => stats.arrived = true,
                    _ => {}
                }
                progress.push(timed.clone());
            }
            _ => {}
        }
    }

    let final_snapshot = fusion.get_snapshot();
    if let Some(nav) = &final_snapshot.navigation {
        stats.final_target_index = Some(nav.target_index);
        stats.final_progress_percent = nav.progress_percent;
    }

    Ok(Report {
        session: path.display().to_string(),
        route: route_path.display().to_string(),
        stats,
        cues,
        progress,
        final_snapshot,
    })
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let mut results = Vec::new();

    if let Some(dir) = args.session_dir.as_ref() {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !(name.starts_with("session_") && (name.ends_with(".json") || name.ends_with(".json.gz"))) {
                continue;
            }
            match run_once(&path, &args) {
                Ok(report) => results.push(report),
                Err(e) => log::error!("Failed {}: {e}", path.display()),
            }
        }
    } else if let Some(session) = args.session.as_ref() {
        results.push(run_once(session, &args)?);
    } else {
        anyhow::bail!("Provide --session or --session-dir");
    }

    let json = serde_json::to_string_pretty(&results)?;
    match &args.report {
        Some(path) => {
            std::fs::write(path, json)?;
            println!("Wrote {} report(s) to {}", results.len(), path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
