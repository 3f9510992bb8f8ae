// sensor_fusion.rs: pure computation layer for the route guide
//
// Everything in this module is independent of:
//   - tokio / async runtime
//   - the platform location and orientation services
//   - file I/O and the live status writer
//
// It takes sensor samples in, produces position/heading estimates, navigation
// state and events out. That makes it unit-testable with synthetic walks and
// lets recorded .json.gz sessions replay through exactly the same code path.

use serde::Serialize;

use crate::error::LocationErrorKind;
use crate::filters::heading::{HeadingConfig, HeadingEstimator, HeadingSourceKind, HeadingState, HeadingUpdate};
use crate::filters::kalman_2d::{
    Kf2dState, KalmanFilter2d, PredictOutcome, UpdateOutcome, DEFAULT_GPS_ACCURACY_M,
    DEFAULT_MAX_PREDICT_GAP_SECS, DEFAULT_PROCESS_NOISE,
};
use crate::geodesy::bearing;
use crate::route::{NavigationConfig, NavigationSummary, ProgressEvent, RouteProgress, RouteSet};
use crate::types::{Coordinate, GpsFix, OrientationSample};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct FusionConfig {
    // ── Prediction ticker ──
    pub predict_interval_ms: u64,

    // ── Position filter ──
    pub process_noise: f64,
    pub default_gps_accuracy_m: f64,
    pub max_predict_gap_secs: f64,

    // ── Heading ──
    pub heading: HeadingConfig,
    pub heading_source: HeadingSourceKind,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            predict_interval_ms: 50,
            process_noise: DEFAULT_PROCESS_NOISE,
            default_gps_accuracy_m: DEFAULT_GPS_ACCURACY_M,
            max_predict_gap_secs: DEFAULT_MAX_PREDICT_GAP_SECS,
            heading: HeadingConfig::default(),
            heading_source: HeadingSourceKind::AbsoluteCompass,
        }
    }
}

// ─── Events ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GpsRejectReason {
    /// Non-finite or out-of-range coordinates
    InvalidCoordinate,
    /// Older than the last accepted fix
    Stale,
    /// A terminal location error was already reported
    LocationLost,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FusionEvent {
    FilterInitialized { lat: f64, lon: f64 },
    GpsRejected { reason: GpsRejectReason, timestamp_ms: f64 },
    PredictSkipped { dt: f64 },
    NumericDegenerate { det: f64 },
    HeadingCalibrated { road_bearing_deg: f64, offset_deg: f64 },
    LocationTimeout,
    LocationLost { error: LocationErrorKind, message: String },
    OrientationUnavailable { message: String },
    Progress(ProgressEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LocationStatus {
    Waiting,
    Tracking,
    Lost { error: LocationErrorKind, message: String },
}

// ─── Fusion output snapshot ──────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize)]
pub struct FusionSnapshot {
    pub timestamp_ms: Option<f64>,
    pub location_status: LocationStatus,
    pub position: Option<Coordinate>,
    pub filter_state: Option<Kf2dState>,
    pub heading_state: HeadingState,
    pub heading_deg: f64,
    pub composite_heading_deg: f64,
    pub pitch_deg: f64,
    pub gps_accuracy_m: Option<f64>,
    pub orientation_available: bool,
    pub cue_playing: bool,
    pub navigation: Option<NavigationSummary>,
}

// ─── The main fusion struct ──────────────────────────────────────────────────

pub struct SensorFusion {
    config: FusionConfig,

    position_filter: KalmanFilter2d,
    heading: HeadingEstimator,
    progress: RouteProgress,

    location_status: LocationStatus,
    last_fix: Option<GpsFix>,
    orientation_available: bool,
}

impl SensorFusion {
    pub fn new(config: FusionConfig, nav_config: NavigationConfig, routes: RouteSet) -> Self {
        let position_filter = KalmanFilter2d::new(config.process_noise, config.max_predict_gap_secs);
        let heading = HeadingEstimator::new(config.heading.clone(), config.heading_source.provider());
        Self {
            position_filter,
            heading,
            progress: RouteProgress::new(routes, nav_config),
            location_status: LocationStatus::Waiting,
            last_fix: None,
            orientation_available: true,
            config,
        }
    }

    // ── Sensor feeds ─────────────────────────────────────────────────────

    /// Feed a GPS fix (~1 Hz measurement update).
    ///
    /// Gating happens before any state changes, so a rejected fix leaves
    /// filter and navigation state untouched.
    pub fn feed_gps(&mut self, fix: &GpsFix) -> Vec<FusionEvent> {
        let mut events = Vec::new();

        if let Some(reason) = self.reject_reason(fix) {
            log::debug!("gps fix at {} rejected: {reason:?}", fix.timestamp_ms);
            events.push(FusionEvent::GpsRejected { reason, timestamp_ms: fix.timestamp_ms });
            return events;
        }

        let accuracy = fix
            .accuracy
            .filter(|a| a.is_finite() && *a >= 0.0)
            .unwrap_or(self.config.default_gps_accuracy_m);

        if !self.position_filter.is_initialized() {
            self.position_filter.init(fix.lat, fix.lon, fix.timestamp_ms);
            log::info!("first fix ({:.6}, {:.6}) ±{accuracy:.0} m", fix.lat, fix.lon);
            events.push(FusionEvent::FilterInitialized { lat: fix.lat, lon: fix.lon });
        } else {
            // predict-then-correct at the fix timestamp
            if let PredictOutcome::Skipped { dt } = self.position_filter.predict(fix.timestamp_ms) {
                log::debug!("prediction to fix time skipped (dt={dt:.3}s)");
                events.push(FusionEvent::PredictSkipped { dt });
            }
            if let UpdateOutcome::DegenerateFallback { det } =
                self.position_filter.update(fix.lat, fix.lon, Some(accuracy))
            {
                events.push(FusionEvent::NumericDegenerate { det });
            }
        }

        self.location_status = LocationStatus::Tracking;
        self.last_fix = Some(fix.clone());

        if let Some(position) = self.smoothed_position() {
            events.extend(self.progress.update_position(&position).into_iter().map(FusionEvent::Progress));
        }

        events
    }

    /// Feed an orientation sample. A sample with no usable heading field is a no-op.
    pub fn feed_orientation(&mut self, sample: &OrientationSample) -> HeadingUpdate {
        let update = self.heading.update(sample);
        if !matches!(update, HeadingUpdate::NoHeading) && !self.orientation_available {
            log::info!("orientation samples resumed");
            self.orientation_available = true;
        }
        update
    }

    /// The orientation source failed. Heading holds its last value.
    pub fn feed_orientation_error(&mut self, message: &str) -> Vec<FusionEvent> {
        log::warn!("orientation unavailable: {message}");
        self.orientation_available = false;
        vec![FusionEvent::OrientationUnavailable { message: message.to_string() }]
    }

    /// The location service reported a failure.
    ///
    /// Timeouts are transient: the filter keeps predicting from its last
    /// state. Anything else ends navigation and later fixes are ignored.
    pub fn feed_location_error(&mut self, error: LocationErrorKind, message: &str) -> Vec<FusionEvent> {
        if !error.is_terminal() {
            log::warn!("location request timed out, continuing on prediction");
            return vec![FusionEvent::LocationTimeout];
        }
        log::error!("{}", error.into_error(message));
        self.location_status = LocationStatus::Lost { error, message: message.to_string() };
        vec![FusionEvent::LocationLost { error, message: message.to_string() }]
    }

    // ── Per-tick (prediction timer, 20 Hz by default) ────────────────────

    pub fn tick(&mut self, now_ms: f64) -> Vec<FusionEvent> {
        let mut events = Vec::new();
        if let PredictOutcome::Skipped { dt } = self.position_filter.predict(now_ms) {
            log::debug!("prediction tick skipped (dt={dt:.3}s)");
            events.push(FusionEvent::PredictSkipped { dt });
        }
        events
    }

    // ── User actions ─────────────────────────────────────────────────────

    /// `None` until the first compass sample; the offset is left untouched.
    pub fn calibrate_heading(&mut self, road_bearing_deg: f64) -> Option<FusionEvent> {
        let offset_deg = self.heading.calibrate(road_bearing_deg)?;
        Some(FusionEvent::HeadingCalibrated { road_bearing_deg, offset_deg })
    }

    /// Calibrate against the bearing of the route segment leading to the
    /// current target. `None` while there is no such segment or no compass
    /// sample yet.
    pub fn calibrate_heading_to_route(&mut self) -> Option<FusionEvent> {
        let route = self.progress.active_route()?;
        let target_index = self.progress.target_index()?;
        let from = route.get(target_index.checked_sub(1)?)?;
        let to = route.get(target_index)?;
        let road_bearing = bearing(&from.position, &to.position);
        self.calibrate_heading(road_bearing)
    }

    /// Re-seeds the other route from the current (predicted) position.
    pub fn toggle_route_direction(&mut self) -> Vec<FusionEvent> {
        let Some(position) = self.smoothed_position() else {
            log::warn!("direction toggle ignored: no position yet");
            return Vec::new();
        };
        self.progress
            .toggle_direction(&position)
            .map(FusionEvent::Progress)
            .into_iter()
            .collect()
    }

    /// Audio playback of the last emitted cue ended (successfully or not).
    pub fn cue_finished(&mut self) {
        self.progress.cue_finished();
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// Filtered position with the last fix's accuracy and course passed through.
    pub fn smoothed_position(&self) -> Option<Coordinate> {
        let state = self.position_filter.get_state()?;
        let mut position = Coordinate::new(state.lat, state.lon);
        position.timestamp_ms = self.position_filter.last_timestamp_ms();
        if let Some(fix) = &self.last_fix {
            position.accuracy = fix.accuracy;
            position.altitude = fix.altitude;
            position.speed = fix.speed;
            position.course = fix.course;
        }
        Some(position)
    }

    pub fn heading(&self) -> f64 {
        self.heading.heading()
    }

    /// Compass heading blended with the last fix's course. A fix older than
    /// `max_predict_gap_secs` no longer contributes.
    pub fn composite_heading(&self) -> f64 {
        let now_ms = self.position_filter.last_timestamp_ms();
        let (speed, course) = match (&self.last_fix, now_ms) {
            (Some(fix), Some(now_ms))
                if (now_ms - fix.timestamp_ms) / 1000.0 <= self.config.max_predict_gap_secs =>
            {
                (fix.speed, fix.course)
            }
            _ => (None, None),
        };
        self.heading.composite_heading(speed, course)
    }

    pub fn navigation_summary(&self) -> Option<NavigationSummary> {
        let position = self.smoothed_position()?;
        self.progress.summary(&position, self.heading.heading())
    }

    pub fn get_snapshot(&self) -> FusionSnapshot {
        FusionSnapshot {
            timestamp_ms: self.position_filter.last_timestamp_ms(),
            location_status: self.location_status.clone(),
            position: self.smoothed_position(),
            filter_state: self.position_filter.get_state(),
            heading_state: self.heading.get_state(),
            heading_deg: self.heading.heading(),
            composite_heading_deg: self.composite_heading(),
            pitch_deg: self.heading.pitch(),
            gps_accuracy_m: self.last_fix.as_ref().and_then(|f| f.accuracy),
            orientation_available: self.orientation_available,
            cue_playing: self.progress.is_cue_playing(),
            navigation: self.navigation_summary(),
        }
    }

    pub fn location_status(&self) -> &LocationStatus {
        &self.location_status
    }

    pub fn progress(&self) -> &RouteProgress {
        &self.progress
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    fn reject_reason(&self, fix: &GpsFix) -> Option<GpsRejectReason> {
        if matches!(self.location_status, LocationStatus::Lost { .. }) {
            return Some(GpsRejectReason::LocationLost);
        }
        if !fix.timestamp_ms.is_finite() || !fix.coordinate().is_valid() {
            return Some(GpsRejectReason::InvalidCoordinate);
        }
        match &self.last_fix {
            Some(last) if fix.timestamp_ms < last.timestamp_ms => Some(GpsRejectReason::Stale),
            _ => None,
        }
    }
}
