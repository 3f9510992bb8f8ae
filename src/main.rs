use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use env_logger::Env;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep_until, Duration, Instant};

use route_guide_rs::filters::heading::{HeadingConfig, HeadingSourceKind};
use route_guide_rs::live_status::LiveStatus;
use route_guide_rs::route::{NavigationConfig, ProgressEvent, RouteDirection, RouteSet};
use route_guide_rs::sensor_fusion::{FusionConfig, FusionEvent, SensorFusion};
use route_guide_rs::sensors::{current_timestamp_ms, SensorEvent, SensorRates, SensorSubscriptions, SimulatedWalk};
use route_guide_rs::session::{Session, SessionEvent};

#[derive(Parser, Debug)]
#[command(name = "route_guide")]
#[command(about = "Pedestrian bus-route guide over a simulated walk", long_about = None)]
struct Args {
    /// Duration in seconds (0 = until arrival or Ctrl-C)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// Route file with outbound/inbound waypoint lists
    #[arg(long, default_value = "data/route.json")]
    route: PathBuf,

    /// Route the simulated walker follows
    #[arg(long, value_enum, default_value = "outbound")]
    walk: RouteDirection,

    /// Walking speed (m/s)
    #[arg(long, default_value = "1.4")]
    speed: f64,

    /// GPS jitter amplitude (m)
    #[arg(long, default_value = "3.0")]
    jitter: f64,

    /// Start this far behind the first waypoint (m)
    #[arg(long, default_value = "5.0")]
    lead_in: f64,

    #[arg(long, value_enum, default_value = "absolute-compass")]
    heading_source: HeadingSourceKind,

    /// Heading low-pass factor
    #[arg(long, default_value = "0.1")]
    smoothing: f64,

    /// Heading deadzone (deg)
    #[arg(long, default_value = "2.0")]
    deadzone: f64,

    /// Position filter process noise
    #[arg(long, default_value = "1e-8")]
    process_noise: f64,

    #[arg(long, default_value = "50")]
    predict_interval_ms: u64,

    #[arg(long, default_value = "1000")]
    gps_interval_ms: u64,

    #[arg(long, default_value = "20.0")]
    advance_radius: f64,

    #[arg(long, default_value = "10.0")]
    cue_min: f64,

    #[arg(long, default_value = "50.0")]
    cue_max: f64,

    #[arg(long, default_value = "45.0")]
    turn_radius: f64,

    #[arg(long, default_value = "15.0")]
    turn_lookahead: f64,

    /// Announcement played before each stop cue ("" to disable)
    #[arg(long, default_value = "getOff.mp3")]
    approach_cue: String,

    /// Simulated playback length of one cue sequence
    #[arg(long, default_value = "3000")]
    cue_duration_ms: u64,

    /// Align the compass with the route segment ahead once both a fix and a
    /// compass sample have arrived
    #[arg(long)]
    calibrate_on_start: bool,

    /// Save the input stream as a replayable session
    #[arg(long)]
    record: bool,

    /// Output directory
    #[arg(long, default_value = "route_guide_sessions")]
    output_dir: PathBuf,
}

impl Args {
    fn fusion_config(&self) -> FusionConfig {
        FusionConfig {
            predict_interval_ms: self.predict_interval_ms,
            process_noise: self.process_noise,
            heading: HeadingConfig {
                smoothing_factor: self.smoothing,
                deadzone_deg: self.deadzone,
                ..HeadingConfig::default()
            },
            heading_source: self.heading_source,
            ..FusionConfig::default()
        }
    }

    fn navigation_config(&self) -> NavigationConfig {
        NavigationConfig {
            advance_radius_m: self.advance_radius,
            cue_min_distance_m: self.cue_min,
            cue_max_distance_m: self.cue_max,
            turn_trigger_radius_m: self.turn_radius,
            turn_lookahead_m: self.turn_lookahead,
            approach_cue: (!self.approach_cue.is_empty()).then(|| self.approach_cue.clone()),
            ..NavigationConfig::default()
        }
    }
}

#[derive(Default)]
struct Counters {
    gps_fixes: u64,
    orientation_samples: u64,
    predict_ticks: u64,
    cues_fired: u64,
    waypoints_passed: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    println!("[{}] Route Guide Starting", ts_now());
    println!("  Duration: {} seconds (0=until arrival)", args.duration);
    println!("  Route: {}", args.route.display());
    println!("  Walking: {} at {:.1} m/s", args.walk, args.speed);
    println!("  Heading source: {:?}", args.heading_source);
    println!("  Output Dir: {}", args.output_dir.display());

    std::fs::create_dir_all(&args.output_dir)?;

    let routes = RouteSet::load(&args.route)?;
    let walk = SimulatedWalk::along_route(routes.route(args.walk), args.lead_in, args.speed, args.jitter);
    log::info!("simulated walk covers {:.0} m", walk.total_length_m());

    let mut fusion = SensorFusion::new(args.fusion_config(), args.navigation_config(), routes);
    let mut session = Session { route_file: Some(args.route.display().to_string()), events: Vec::new() };
    let mut counters = Counters::default();

    let rates = SensorRates {
        gps_interval_ms: args.gps_interval_ms,
        predict_interval_ms: args.predict_interval_ms,
        ..SensorRates::default()
    };
    let (tx, mut rx) = mpsc::channel::<SensorEvent>(256);
    let mut subscriptions = SensorSubscriptions::start(walk, &rates, tx);

    let start = Utc::now();
    let stop_at = Instant::now() + Duration::from_secs(args.duration);
    let mut status_timer = interval(Duration::from_secs(2));
    let mut cue_done_at: Option<Instant> = None;
    let mut calibrated = !args.calibrate_on_start;

    println!("[{}] Walking...", ts_now());

    loop {
        let cue_deadline = cue_done_at.unwrap_or_else(Instant::now);
        tokio::select! {
            maybe_event = rx.recv() => {
                let Some(event) = maybe_event else {
                    log::warn!("all sensor sources ended");
                    break;
                };
                if args.record {
                    if let Some(recorded) = event.to_session_event() {
                        session.record(recorded);
                    }
                }

                let events = match &event {
                    SensorEvent::Gps(fix) => {
                        counters.gps_fixes += 1;
                        fusion.feed_gps(fix)
                    }
                    SensorEvent::Orientation { sample, .. } => {
                        counters.orientation_samples += 1;
                        fusion.feed_orientation(sample);
                        Vec::new()
                    }
                    SensorEvent::LocationError { error, message } => fusion.feed_location_error(*error, message),
                    SensorEvent::OrientationError(message) => fusion.feed_orientation_error(message),
                    SensorEvent::Tick { now_ms } => {
                        counters.predict_ticks += 1;
                        fusion.tick(*now_ms)
                    }
                };

                if !calibrated && fusion.progress().target_index().is_some() {
                    if let Some(FusionEvent::HeadingCalibrated { road_bearing_deg, offset_deg }) =
                        fusion.calibrate_heading_to_route()
                    {
                        println!("[{}] Compass aligned to road {road_bearing_deg:.0}° (offset {offset_deg:+.1}°)", ts_now());
                        if args.record {
                            session.record(SessionEvent::CalibrateHeading {
                                timestamp_ms: current_timestamp_ms(),
                                road_bearing_deg: Some(road_bearing_deg),
                            });
                        }
                        calibrated = true;
                    }
                }

                let mut arrived = false;
                for fusion_event in events {
                    match fusion_event {
                        FusionEvent::Progress(ProgressEvent::Cue(cue)) => {
                            counters.cues_fired += 1;
                            println!("[{}] ▶ {} ({:.0} m to {})", ts_now(), cue.cues.join(" → "), cue.distance_m, cue.waypoint_id);
                            cue_done_at = Some(Instant::now() + Duration::from_millis(args.cue_duration_ms));
                        }
                        FusionEvent::Progress(ProgressEvent::Advanced { waypoint_id, to, .. }) => {
                            counters.waypoints_passed += 1;
                            println!("[{}] Passed {waypoint_id}, now heading for waypoint {to}", ts_now());
                        }
                        FusionEvent::Progress(ProgressEvent::Arrived { waypoint_id }) => {
                            println!("[{}] Arrived at {waypoint_id}", ts_now());
                            arrived = true;
                        }
                        FusionEvent::LocationLost { message, .. } => {
                            println!("[{}] Location lost: {message}", ts_now());
                        }
                        other => log::debug!("{other:?}"),
                    }
                }
                if arrived {
                    break;
                }
            }
            _ = sleep_until(cue_deadline), if cue_done_at.is_some() => {
                fusion.cue_finished();
                if args.record {
                    session.record(SessionEvent::CueFinished { timestamp_ms: current_timestamp_ms() });
                }
                cue_done_at = None;
            }
            _ = status_timer.tick() => {
                write_status(&fusion, &counters, start, &args.output_dir.join("live_status.json"));
            }
            _ = sleep_until(stop_at), if args.duration > 0 => {
                println!("[{}] Duration reached, stopping...", ts_now());
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                println!("[{}] Interrupted, stopping...", ts_now());
                break;
            }
        }
    }

    subscriptions.stop();

    write_status(&fusion, &counters, start, &args.output_dir.join("live_status_final.json"));
    if args.record {
        let path = args.output_dir.join(format!("session_{}.json.gz", ts_now_clean()));
        session.save(&path)?;
        println!("[{}] Saved {} session events to {}", ts_now(), session.len(), path.display());
    }

    println!("\n=== Final Stats ===");
    println!("GPS fixes: {}", counters.gps_fixes);
    println!("Orientation samples: {}", counters.orientation_samples);
    println!("Predict ticks: {}", counters.predict_ticks);
    println!("Waypoints passed: {}", counters.waypoints_passed);
    println!("Cues fired: {}", counters.cues_fired);
    if let Some(nav) = fusion.navigation_summary() {
        println!("Direction: {}", nav.direction);
        println!("Progress: {:.0}% (target {} of {})", nav.progress_percent, nav.target_index,
            fusion.progress().active_route().map(|r| r.last_index()).unwrap_or(0));
    }

    Ok(())
}

fn write_status(fusion: &SensorFusion, counters: &Counters, start: chrono::DateTime<Utc>, path: &Path) {
    let mut status = LiveStatus::from_snapshot(&fusion.get_snapshot());
    status.uptime_seconds = Utc::now().signed_duration_since(start).num_seconds().max(0) as u64;
    status.gps_fixes = counters.gps_fixes;
    status.orientation_samples = counters.orientation_samples;
    status.predict_ticks = counters.predict_ticks;
    status.cues_fired = counters.cues_fired;
    if let Err(e) = status.save(path) {
        log::warn!("could not write {}: {e}", path.display());
    }
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

fn ts_now_clean() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}
