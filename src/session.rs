//! Recorded sensor sessions and their deterministic replay.
//!
//! A session file is `{ "events": [...] }`, optionally gzip-compressed when
//! the path ends in `.gz`. Events are kept in arrival order; replay feeds them
//! through `SensorFusion` with predict ticks inserted in between.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::error::{LocationErrorKind, NavError, Result};
use crate::route::ProgressEvent;
use crate::sensor_fusion::{FusionEvent, SensorFusion};
use crate::types::{GpsFix, OrientationSample};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Gps(GpsFix),
    Orientation {
        timestamp_ms: f64,
        sample: OrientationSample,
    },
    LocationError {
        timestamp_ms: f64,
        error: LocationErrorKind,
        #[serde(default)]
        message: String,
    },
    OrientationError {
        timestamp_ms: f64,
        #[serde(default)]
        message: String,
    },
    /// `None` calibrates against the current route segment
    CalibrateHeading {
        timestamp_ms: f64,
        #[serde(default)]
        road_bearing_deg: Option<f64>,
    },
    ToggleDirection {
        timestamp_ms: f64,
    },
    CueFinished {
        timestamp_ms: f64,
    },
}

impl SessionEvent {
    pub fn timestamp_ms(&self) -> f64 {
        match self {
            SessionEvent::Gps(fix) => fix.timestamp_ms,
            SessionEvent::Orientation { timestamp_ms, .. }
            | SessionEvent::LocationError { timestamp_ms, .. }
            | SessionEvent::OrientationError { timestamp_ms, .. }
            | SessionEvent::CalibrateHeading { timestamp_ms, .. }
            | SessionEvent::ToggleDirection { timestamp_ms }
            | SessionEvent::CueFinished { timestamp_ms } => *timestamp_ms,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_file: Option<String>,
    pub events: Vec<SessionEvent>,
}

#[derive(Clone, Debug)]
pub struct ReplayOptions {
    /// Spacing of the predict ticks inserted between events (ms)
    pub predict_interval_ms: f64,
    /// Treat every emitted cue as played instantly
    pub auto_finish_cues: bool,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self { predict_interval_ms: 50.0, auto_finish_cues: true }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TimedEvent {
    pub timestamp_ms: f64,
    #[serde(flatten)]
    pub event: FusionEvent,
}

impl Session {
    pub fn record(&mut self, event: SessionEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        serde_json::from_reader(reader).map_err(NavError::SessionData)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let session = if is_gzip(path) {
            Self::from_reader(BufReader::new(GzDecoder::new(file)))?
        } else {
            Self::from_reader(BufReader::new(file))?
        };
        log::info!("loaded {} session events from {}", session.events.len(), path.display());
        Ok(session)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        if is_gzip(path) {
            let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
            serde_json::to_writer(&mut encoder, self).map_err(NavError::SessionData)?;
            encoder.finish()?.flush()?;
        } else {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, self).map_err(NavError::SessionData)?;
            writer.flush()?;
        }
        Ok(())
    }

    /// Feed every event through `fusion` in order, ticking the predictor at
    /// the configured interval between events.
    pub fn replay(&self, fusion: &mut SensorFusion, options: &ReplayOptions) -> Vec<TimedEvent> {
        let mut out = Vec::new();
        let mut clock: Option<f64> = None;

        for event in &self.events {
            let ts = event.timestamp_ms();
            if let Some(last) = clock {
                if options.predict_interval_ms > 0.0 {
                    let mut t = last + options.predict_interval_ms;
                    while t < ts {
                        out.extend(fusion.tick(t).into_iter().map(|e| TimedEvent { timestamp_ms: t, event: e }));
                        t += options.predict_interval_ms;
                    }
                }
            }
            clock = Some(clock.map_or(ts, |c| c.max(ts)));

            let events = apply_event(fusion, event);
            let cue_emitted = events
                .iter()
                .any(|e| matches!(e, FusionEvent::Progress(ProgressEvent::Cue(_))));
            out.extend(events.into_iter().map(|e| TimedEvent { timestamp_ms: ts, event: e }));
            if cue_emitted && options.auto_finish_cues {
                fusion.cue_finished();
            }
        }

        out
    }
}

fn apply_event(fusion: &mut SensorFusion, event: &SessionEvent) -> Vec<FusionEvent> {
    match event {
        SessionEvent::Gps(fix) => fusion.feed_gps(fix),
        SessionEvent::Orientation { sample, .. } => {
            fusion.feed_orientation(sample);
            Vec::new()
        }
        SessionEvent::LocationError { error, message, .. } => fusion.feed_location_error(*error, message),
        SessionEvent::OrientationError { message, .. } => fusion.feed_orientation_error(message),
        SessionEvent::CalibrateHeading { road_bearing_deg: Some(bearing), .. } => {
            fusion.calibrate_heading(*bearing).into_iter().collect()
        }
        SessionEvent::CalibrateHeading { road_bearing_deg: None, .. } => {
            fusion.calibrate_heading_to_route().into_iter().collect()
        }
        SessionEvent::ToggleDirection { .. } => fusion.toggle_route_direction(),
        SessionEvent::CueFinished { .. } => {
            fusion.cue_finished();
            Vec::new()
        }
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().map(|e| e == "gz").unwrap_or(false)
}
