use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::error::LocationErrorKind;
use crate::geodesy::{bearing, distance, project};
use crate::route::Route;
use crate::session::SessionEvent;
use crate::types::{Coordinate, GpsFix, OrientationSample};

/// Everything the single fusion consumer reacts to, in arrival order.
#[derive(Clone, Debug)]
pub enum SensorEvent {
    Gps(GpsFix),
    Orientation { timestamp_ms: f64, sample: OrientationSample },
    LocationError { error: LocationErrorKind, message: String },
    OrientationError(String),
    Tick { now_ms: f64 },
}

impl SensorEvent {
    /// Session form of this event; predict ticks are not recorded.
    pub fn to_session_event(&self) -> Option<SessionEvent> {
        match self {
            SensorEvent::Gps(fix) => Some(SessionEvent::Gps(fix.clone())),
            SensorEvent::Orientation { timestamp_ms, sample } => Some(SessionEvent::Orientation {
                timestamp_ms: *timestamp_ms,
                sample: sample.clone(),
            }),
            SensorEvent::LocationError { error, message } => Some(SessionEvent::LocationError {
                timestamp_ms: current_timestamp_ms(),
                error: *error,
                message: message.clone(),
            }),
            SensorEvent::OrientationError(message) => Some(SessionEvent::OrientationError {
                timestamp_ms: current_timestamp_ms(),
                message: message.clone(),
            }),
            SensorEvent::Tick { .. } => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SensorRates {
    pub gps_interval_ms: u64,
    pub orientation_interval_ms: u64,
    pub predict_interval_ms: u64,
}

impl Default for SensorRates {
    fn default() -> Self {
        Self { gps_interval_ms: 1000, orientation_interval_ms: 100, predict_interval_ms: 50 }
    }
}

// ─── Subscription handle ─────────────────────────────────────────────────────

/// Owns the GPS watcher, the orientation listener and the predict ticker.
///
/// `stop()` ends them explicitly; dropping the handle aborts whatever is
/// still running.
pub struct SensorSubscriptions {
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl SensorSubscriptions {
    pub fn start(walk: SimulatedWalk, rates: &SensorRates, tx: Sender<SensorEvent>) -> Self {
        let walk = Arc::new(walk);
        let started_ms = current_timestamp_ms();
        let handles = vec![
            ("gps", tokio::spawn(gps_loop(walk.clone(), started_ms, rates.gps_interval_ms, tx.clone()))),
            (
                "orientation",
                tokio::spawn(orientation_loop(walk, started_ms, rates.orientation_interval_ms, tx.clone())),
            ),
            ("predict", tokio::spawn(predict_ticker(rates.predict_interval_ms, tx))),
        ];
        log::info!("sensor subscriptions started");
        Self { handles }
    }

    pub fn is_running(&self) -> bool {
        self.handles.iter().any(|(_, h)| !h.is_finished())
    }

    pub fn stop(&mut self) {
        for (name, handle) in self.handles.drain(..) {
            if !handle.is_finished() {
                log::debug!("stopping {name} subscription");
                handle.abort();
            }
        }
    }
}

impl Drop for SensorSubscriptions {
    fn drop(&mut self) {
        self.stop();
    }
}

// ─── Source loops ────────────────────────────────────────────────────────────

/// Returns false once the consumer is gone.
fn forward(tx: &Sender<SensorEvent>, event: SensorEvent, source: &str, sent: &mut u64) -> bool {
    match tx.try_send(event) {
        Ok(_) => {
            *sent += 1;
            true
        }
        Err(TrySendError::Closed(_)) => {
            log::debug!("[{source}] channel closed after {sent} events");
            false
        }
        Err(TrySendError::Full(_)) => {
            // consumer is behind, drop this sample
            log::trace!("[{source}] channel full, sample dropped");
            true
        }
    }
}

pub async fn gps_loop(walk: Arc<SimulatedWalk>, started_ms: f64, interval_ms: u64, tx: Sender<SensorEvent>) {
    let mut ticker = interval(Duration::from_millis(interval_ms.max(1)));
    let mut seq = 0u64;
    let mut sent = 0u64;

    loop {
        ticker.tick().await;
        let now_ms = current_timestamp_ms();
        let fix = walk.fix_at(seq, (now_ms - started_ms) / 1000.0, now_ms);
        seq += 1;
        if !forward(&tx, SensorEvent::Gps(fix), "gps", &mut sent) {
            break;
        }
        if sent % 30 == 0 {
            log::debug!("[gps] {sent} fixes");
        }
    }
}

pub async fn orientation_loop(walk: Arc<SimulatedWalk>, started_ms: f64, interval_ms: u64, tx: Sender<SensorEvent>) {
    let mut ticker = interval(Duration::from_millis(interval_ms.max(1)));
    let mut seq = 0u64;
    let mut sent = 0u64;

    loop {
        ticker.tick().await;
        let now_ms = current_timestamp_ms();
        let sample = walk.orientation_at(seq, (now_ms - started_ms) / 1000.0);
        seq += 1;
        let event = SensorEvent::Orientation { timestamp_ms: now_ms, sample };
        if !forward(&tx, event, "orientation", &mut sent) {
            break;
        }
    }
}

pub async fn predict_ticker(interval_ms: u64, tx: Sender<SensorEvent>) {
    let mut ticker = interval(Duration::from_millis(interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sent = 0u64;

    loop {
        ticker.tick().await;
        let event = SensorEvent::Tick { now_ms: current_timestamp_ms() };
        if !forward(&tx, event, "predict", &mut sent) {
            break;
        }
    }
}

// ─── Simulated walk ──────────────────────────────────────────────────────────

/// Stand-in for the platform location and compass services: walks a polyline
/// at constant speed with deterministic GPS jitter and compass wobble.
#[derive(Clone, Debug)]
pub struct SimulatedWalk {
    path: Vec<Coordinate>,
    /// Cumulative distance at each path vertex (m)
    cumulative_m: Vec<f64>,
    pub speed_mps: f64,
    pub jitter_m: f64,
    pub accuracy_m: f64,
    pub compass_wobble_deg: f64,
}

impl SimulatedWalk {
    pub fn new(path: Vec<Coordinate>, speed_mps: f64, jitter_m: f64) -> Self {
        let mut cumulative_m = Vec::with_capacity(path.len());
        let mut total = 0.0;
        for (i, point) in path.iter().enumerate() {
            if i > 0 {
                total += distance(&path[i - 1], point);
            }
            cumulative_m.push(total);
        }
        Self {
            path,
            cumulative_m,
            speed_mps,
            jitter_m,
            accuracy_m: (jitter_m * 2.0).max(3.0),
            compass_wobble_deg: 4.0,
        }
    }

    /// Walk a route starting `lead_in_m` behind its first waypoint.
    pub fn along_route(route: &Route, lead_in_m: f64, speed_mps: f64, jitter_m: f64) -> Self {
        let waypoints = route.waypoints();
        let mut path: Vec<Coordinate> = waypoints.iter().map(|w| w.position.clone()).collect();
        if lead_in_m > 0.0 {
            if let [first, second, ..] = waypoints {
                let back = bearing(&second.position, &first.position);
                path.insert(0, project(&first.position, back, lead_in_m));
            }
        }
        Self::new(path, speed_mps, jitter_m)
    }

    pub fn total_length_m(&self) -> f64 {
        self.cumulative_m.last().copied().unwrap_or(0.0)
    }

    /// True position and direction of travel after `elapsed_secs`. The walker
    /// stays at the end of the path once it gets there.
    pub fn position_at(&self, elapsed_secs: f64) -> (Coordinate, f64) {
        let Some(first) = self.path.first() else {
            return (Coordinate::new(0.0, 0.0), 0.0);
        };
        if self.path.len() == 1 {
            return (first.clone(), 0.0);
        }

        let travelled = (elapsed_secs.max(0.0) * self.speed_mps).min(self.total_length_m());
        let segment = self
            .cumulative_m
            .windows(2)
            .position(|w| travelled <= w[1])
            .unwrap_or(self.path.len() - 2);

        let start = &self.path[segment];
        let end = &self.path[segment + 1];
        let heading = bearing(start, end);
        let into_segment = travelled - self.cumulative_m[segment];
        (project(start, heading, into_segment), heading)
    }

    pub fn fix_at(&self, seq: u64, elapsed_secs: f64, timestamp_ms: f64) -> GpsFix {
        let (truth, heading) = self.position_at(elapsed_secs);
        let s = seq as f64;
        // deterministic pseudo-noise: two incommensurate sinusoids
        let offset_m = self.jitter_m * (s * 1.7).sin();
        let offset_bearing = (s * 73.0) % 360.0;
        let noisy = project(&truth, offset_bearing, offset_m.abs());

        let moving = elapsed_secs * self.speed_mps < self.total_length_m();
        let mut fix = GpsFix::new(timestamp_ms, noisy.lat, noisy.lon, Some(self.accuracy_m + (s * 0.3).sin()));
        fix.speed = Some(if moving { self.speed_mps } else { 0.0 });
        fix.course = moving.then_some(heading);
        fix
    }

    pub fn orientation_at(&self, seq: u64, elapsed_secs: f64) -> OrientationSample {
        let (_, heading) = self.position_at(elapsed_secs);
        let wobble = self.compass_wobble_deg * (seq as f64 * 0.9).sin();
        OrientationSample {
            compass_heading_deg: Some((heading + wobble).rem_euclid(360.0)),
            alpha_deg: Some((360.0 - heading - wobble).rem_euclid(360.0)),
            pitch_deg: Some(80.0 + (seq as f64 * 0.2).sin()),
            screen_rotation_deg: 0.0,
        }
    }
}

pub fn current_timestamp_ms() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64
}
