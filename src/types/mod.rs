pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};

/// Geographic position in degrees plus optional fix metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    /// Horizontal accuracy (m)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    /// Ground speed (m/s)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Course over ground (deg, 0 = north, clockwise)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<f64>,
    /// Milliseconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<f64>,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            altitude: None,
            accuracy: None,
            speed: None,
            course: None,
            timestamp_ms: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// One sample from the location service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub timestamp_ms: f64,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub course: Option<f64>,
    #[serde(default)]
    pub altitude: Option<f64>,
}

impl GpsFix {
    pub fn new(timestamp_ms: f64, lat: f64, lon: f64, accuracy: Option<f64>) -> Self {
        Self {
            timestamp_ms,
            lat,
            lon,
            accuracy,
            speed: None,
            course: None,
            altitude: None,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate {
            lat: self.lat,
            lon: self.lon,
            altitude: self.altitude,
            accuracy: self.accuracy,
            speed: self.speed,
            course: self.course,
            timestamp_ms: Some(self.timestamp_ms),
        }
    }
}

/// One sample from the orientation sensors.
///
/// Which heading field is meaningful depends on the platform; the
/// `HeadingProvider` chosen at startup decides which one to read.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OrientationSample {
    /// Absolute compass heading, clockwise from north (iOS-style field)
    #[serde(default)]
    pub compass_heading_deg: Option<f64>,
    /// Rotation around the vertical axis, counter-clockwise (Android-style alpha)
    #[serde(default)]
    pub alpha_deg: Option<f64>,
    #[serde(default)]
    pub pitch_deg: Option<f64>,
    #[serde(default)]
    pub screen_rotation_deg: f64,
}
