//! Compass heading smoothing.
//!
//! Heading is periodic, so instead of a linearized Kalman filter the estimator
//! low-passes the unit vector `(cos θ, sin θ)` and recomposes it with `atan2`.
//! That keeps 359° → 1° a 2° step rather than a 358° swing.

use serde::{Deserialize, Serialize};

use crate::geodesy::{normalize_180, normalize_360, shortest_angle_delta, to_degrees, to_radians};
use crate::types::OrientationSample;

/// Platform capability that turns a raw orientation sample into an absolute
/// compass heading (deg, clockwise from north).
pub trait HeadingProvider: Send {
    fn raw_heading(&self, sample: &OrientationSample) -> Option<f64>;
    fn name(&self) -> &'static str;
}

/// Reads a platform-supplied absolute heading field as-is.
#[derive(Clone, Copy, Debug, Default)]
pub struct AbsoluteCompassProvider;

impl HeadingProvider for AbsoluteCompassProvider {
    fn raw_heading(&self, sample: &OrientationSample) -> Option<f64> {
        sample.compass_heading_deg.filter(|h| h.is_finite())
    }

    fn name(&self) -> &'static str {
        "absolute_compass"
    }
}

/// Converts a counter-clockwise rotation about the vertical axis into a
/// clockwise compass heading (`360 - alpha`).
#[derive(Clone, Copy, Debug, Default)]
pub struct VerticalRotationProvider;

impl HeadingProvider for VerticalRotationProvider {
    fn raw_heading(&self, sample: &OrientationSample) -> Option<f64> {
        sample
            .alpha_deg
            .filter(|a| a.is_finite())
            .map(|alpha| normalize_360(360.0 - alpha))
    }

    fn name(&self) -> &'static str {
        "vertical_rotation"
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum HeadingSourceKind {
    AbsoluteCompass,
    VerticalRotation,
}

impl HeadingSourceKind {
    pub fn provider(self) -> Box<dyn HeadingProvider> {
        match self {
            HeadingSourceKind::AbsoluteCompass => Box::new(AbsoluteCompassProvider),
            HeadingSourceKind::VerticalRotation => Box::new(VerticalRotationProvider),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HeadingConfig {
    /// Fraction of the way the smoothed vector moves toward each new sample
    pub smoothing_factor: f64,
    /// Reported heading holds still for changes below this (deg)
    pub deadzone_deg: f64,
    /// Course over ground is ignored below this ground speed (m/s)
    pub cog_min_speed: f64,
    pub cog_max_weight: f64,
    /// Speed at which course over ground would reach full weight (m/s)
    pub cog_speed_divisor: f64,
}

impl Default for HeadingConfig {
    fn default() -> Self {
        Self {
            smoothing_factor: 0.1,
            deadzone_deg: 2.0,
            cog_min_speed: 0.5,
            cog_max_weight: 0.8,
            cog_speed_divisor: 3.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HeadingUpdate {
    /// Reported heading moved to the new value
    Updated { heading: f64 },
    /// Smoothed value moved but stayed inside the deadzone
    Suppressed { delta: f64 },
    /// Sample carried no usable heading field
    NoHeading,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HeadingState {
    pub heading_deg: f64,
    pub smoothed_deg: f64,
    pub offset_deg: f64,
    pub pitch_deg: f64,
    pub samples: u64,
    pub source: String,
}

pub struct HeadingEstimator {
    config: HeadingConfig,
    provider: Box<dyn HeadingProvider>,
    /// Smoothed heading before the calibration offset
    smoothed: Option<f64>,
    offset: f64,
    reported: f64,
    last_raw: Option<f64>,
    pitch: f64,
    samples: u64,
}

impl HeadingEstimator {
    pub fn new(config: HeadingConfig, provider: Box<dyn HeadingProvider>) -> Self {
        Self {
            config,
            provider,
            smoothed: None,
            offset: 0.0,
            reported: 0.0,
            last_raw: None,
            pitch: 0.0,
            samples: 0,
        }
    }

    pub fn update(&mut self, sample: &OrientationSample) -> HeadingUpdate {
        if let Some(pitch) = sample.pitch_deg.filter(|p| p.is_finite()) {
            self.pitch = pitch;
        }

        let Some(raw) = self.provider.raw_heading(sample) else {
            return HeadingUpdate::NoHeading;
        };
        let screen = if sample.screen_rotation_deg.is_finite() {
            sample.screen_rotation_deg
        } else {
            0.0
        };
        let corrected = normalize_360(raw + screen);
        self.last_raw = Some(corrected);
        self.samples += 1;

        let smoothed = match self.smoothed {
            None => corrected,
            Some(current) => circular_lerp(current, corrected, self.config.smoothing_factor),
        };
        let first = self.smoothed.is_none();
        self.smoothed = Some(smoothed);

        let calibrated = normalize_360(smoothed + self.offset);
        let delta = shortest_angle_delta(self.reported, calibrated);
        if first || delta.abs() >= self.config.deadzone_deg {
            self.reported = calibrated;
            HeadingUpdate::Updated { heading: calibrated }
        } else {
            HeadingUpdate::Suppressed { delta }
        }
    }

    /// Align the reported heading with a known road bearing.
    ///
    /// Returns the stored offset, in (-180, 180], or `None` (offset
    /// unchanged) while no compass sample has been seen.
    pub fn calibrate(&mut self, road_bearing_deg: f64) -> Option<f64> {
        let Some(base) = self.smoothed else {
            log::warn!("heading calibration ignored: no compass sample yet");
            return None;
        };
        self.offset = normalize_180(road_bearing_deg - base);
        self.reported = normalize_360(base + self.offset);
        log::info!(
            "heading calibrated to road bearing {road_bearing_deg:.1}° (offset {:+.1}°)",
            self.offset
        );
        Some(self.offset)
    }

    /// Deadzoned heading shown to consumers, in [0, 360).
    pub fn heading(&self) -> f64 {
        self.reported
    }

    /// Calibrated smoothed heading without the deadzone applied.
    pub fn smoothed_heading(&self) -> f64 {
        normalize_360(self.smoothed.unwrap_or(0.0) + self.offset)
    }

    pub fn raw_smoothed(&self) -> Option<f64> {
        self.smoothed
    }

    pub fn last_raw(&self) -> Option<f64> {
        self.last_raw
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    pub fn has_heading(&self) -> bool {
        self.smoothed.is_some()
    }

    /// Heading for the map view: blends toward GPS course over ground when
    /// walking fast enough for the course to be meaningful.
    pub fn composite_heading(&self, speed: Option<f64>, course: Option<f64>) -> f64 {
        let compass = self.heading();
        match (speed, course) {
            (Some(speed), Some(course))
                if speed.is_finite() && course.is_finite() && speed >= self.config.cog_min_speed =>
            {
                let weight = (speed / self.config.cog_speed_divisor).min(self.config.cog_max_weight);
                normalize_360(compass + weight * shortest_angle_delta(compass, course))
            }
            _ => compass,
        }
    }

    pub fn get_state(&self) -> HeadingState {
        HeadingState {
            heading_deg: self.heading(),
            smoothed_deg: self.smoothed_heading(),
            offset_deg: self.offset,
            pitch_deg: self.pitch,
            samples: self.samples,
            source: self.provider.name().to_string(),
        }
    }
}

/// Move `current` toward `target` by `factor` along the unit circle.
fn circular_lerp(current: f64, target: f64, factor: f64) -> f64 {
    let (cy, cx) = to_radians(current).sin_cos();
    let (ty, tx) = to_radians(target).sin_cos();
    let nx = cx + (tx - cx) * factor;
    let ny = cy + (ty - cy) * factor;
    normalize_360(to_degrees(ny.atan2(nx)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn compass(heading: f64) -> OrientationSample {
        OrientationSample {
            compass_heading_deg: Some(heading),
            ..Default::default()
        }
    }

    fn estimator() -> HeadingEstimator {
        HeadingEstimator::new(HeadingConfig::default(), Box::new(AbsoluteCompassProvider))
    }

    #[test]
    fn test_providers() {
        let sample = OrientationSample {
            compass_heading_deg: Some(42.0),
            alpha_deg: Some(90.0),
            ..Default::default()
        };
        assert_eq!(AbsoluteCompassProvider.raw_heading(&sample), Some(42.0));
        assert_eq!(VerticalRotationProvider.raw_heading(&sample), Some(270.0));
        assert_eq!(VerticalRotationProvider.raw_heading(&compass(10.0)), None);
        let alpha_zero = OrientationSample { alpha_deg: Some(0.0), ..Default::default() };
        assert_eq!(VerticalRotationProvider.raw_heading(&alpha_zero), Some(0.0));
    }

    #[test]
    fn test_first_sample_initializes_directly() {
        let mut est = estimator();
        assert_eq!(est.update(&compass(123.0)), HeadingUpdate::Updated { heading: 123.0 });
        assert_eq!(est.heading(), 123.0);
    }

    #[test]
    fn test_missing_heading_is_noop() {
        let mut est = estimator();
        est.update(&compass(80.0));
        let sample = OrientationSample { pitch_deg: Some(75.0), ..Default::default() };
        assert_eq!(est.update(&sample), HeadingUpdate::NoHeading);
        assert_eq!(est.heading(), 80.0);
        assert_eq!(est.pitch(), 75.0);
    }

    #[test]
    fn test_screen_rotation_applied_before_smoothing() {
        let mut est = estimator();
        let sample = OrientationSample {
            compass_heading_deg: Some(350.0),
            screen_rotation_deg: 90.0,
            ..Default::default()
        };
        est.update(&sample);
        assert_abs_diff_eq!(est.heading(), 80.0, epsilon = 1e-9);
    }

    #[test]
    fn test_wraps_along_short_path() {
        let mut est = estimator();
        est.update(&compass(350.0));
        est.update(&compass(10.0));
        // angle-space short path would land at 352
        let smoothed = est.smoothed_heading();
        assert!(shortest_angle_delta(352.0, smoothed).abs() < 1.0, "got {smoothed}");
        assert!(smoothed > 350.0);
    }

    #[test]
    fn test_converges_to_constant_input() {
        let mut est = estimator();
        est.update(&compass(10.0));
        let mut converged_at = None;
        for i in 0..100 {
            est.update(&compass(200.0));
            if shortest_angle_delta(est.smoothed_heading(), 200.0).abs() < 0.5 {
                converged_at = Some(i);
                break;
            }
        }
        assert!(converged_at.is_some(), "did not converge: {}", est.smoothed_heading());
    }

    #[test]
    fn test_deadzone_suppresses_small_changes() {
        let mut est = estimator();
        est.update(&compass(100.0));
        assert!(matches!(est.update(&compass(101.0)), HeadingUpdate::Suppressed { .. }));
        assert_eq!(est.heading(), 100.0);
        assert!(est.smoothed_heading() > 100.0);

        assert!(matches!(est.update(&compass(140.0)), HeadingUpdate::Updated { .. }));
        assert!(est.heading() > 102.0);
    }

    #[test]
    fn test_calibration_offset() {
        let mut est = estimator();
        est.update(&compass(30.0));
        let offset = est.calibrate(350.0).unwrap();
        assert_abs_diff_eq!(offset, -40.0, epsilon = 1e-9);
        assert_abs_diff_eq!(est.heading(), 350.0, epsilon = 1e-9);

        // idempotent
        assert_abs_diff_eq!(est.calibrate(350.0).unwrap(), -40.0, epsilon = 1e-9);

        // subsequent samples carry the offset
        for _ in 0..200 {
            est.update(&compass(90.0));
        }
        assert_abs_diff_eq!(est.smoothed_heading(), 50.0, epsilon = 0.5);
    }

    #[test]
    fn test_calibration_needs_a_compass_sample() {
        let mut est = estimator();
        assert_eq!(est.calibrate(90.0), None);
        assert_eq!(est.offset(), 0.0);

        // facing along an eastbound road
        est.update(&compass(90.0));
        assert_abs_diff_eq!(est.heading(), 90.0, epsilon = 1e-9);
        assert_abs_diff_eq!(est.calibrate(90.0).unwrap(), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(est.heading(), 90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_composite_heading_blends_course() {
        let mut est = estimator();
        est.update(&compass(350.0));

        // slow walk: compass only
        assert_eq!(est.composite_heading(Some(0.3), Some(10.0)), 350.0);
        assert_eq!(est.composite_heading(Some(2.0), None), 350.0);

        // weight = min(0.8, 3/3) = 0.8 along the +20° short path
        assert_abs_diff_eq!(est.composite_heading(Some(3.0), Some(10.0)), 6.0, epsilon = 1e-9);

        // weight = 1.5/3 = 0.5
        assert_abs_diff_eq!(est.composite_heading(Some(1.5), Some(10.0)), 0.0, epsilon = 1e-9);
    }
}
