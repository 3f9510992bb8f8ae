//! Constant-velocity Kalman filter over raw latitude/longitude.
//!
//! State is `[lat, lon, v_lat, v_lon]` in degrees and degrees per second. GPS
//! fixes arrive around 1 Hz; `predict` is called between them (20 Hz by
//! default) so the smoothed position glides instead of jumping.

use serde::{Deserialize, Serialize};

use crate::types::{
    GpsPosNoise, GpsPosVec, KalmanGainGpsPos, ObservationGpsPos, StateMat4, StateVec4,
};

pub const DEFAULT_PROCESS_NOISE: f64 = 1e-8;
pub const DEFAULT_GPS_ACCURACY_M: f64 = 10.0;
pub const DEFAULT_MAX_PREDICT_GAP_SECS: f64 = 5.0;

const METERS_PER_DEGREE: f64 = 111_000.0;
const INIT_POSITION_VAR: f64 = 1e-6; // deg^2
const INIT_VELOCITY_VAR: f64 = 1e-4; // (deg/s)^2
const SINGULAR_DET_THRESHOLD: f64 = 1e-20;
const FALLBACK_INVERSE_SCALE: f64 = 1e10;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Kf2dState {
    pub lat: f64,
    pub lon: f64,
    pub v_lat: f64,
    pub v_lon: f64,
    pub position_std_m: f64,
    pub predict_count: u64,
    pub update_count: u64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PredictOutcome {
    Propagated { dt: f64 },
    /// Clock went backwards or the gap was too long; only the timestamp moved.
    Skipped { dt: f64 },
    Uninitialized,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UpdateOutcome {
    Corrected,
    /// |det(S)| fell below the singularity threshold; a scaled-identity
    /// inverse was used instead.
    DegenerateFallback { det: f64 },
    Uninitialized,
}

#[derive(Clone, Debug)]
struct Tracking {
    state: StateVec4,
    covariance: StateMat4,
    last_timestamp_ms: f64,
}

#[derive(Clone, Debug)]
pub struct KalmanFilter2d {
    process_noise: f64,
    max_predict_gap_secs: f64,
    tracking: Option<Tracking>,
    predict_count: u64,
    update_count: u64,
}

impl Default for KalmanFilter2d {
    fn default() -> Self {
        Self::new(DEFAULT_PROCESS_NOISE, DEFAULT_MAX_PREDICT_GAP_SECS)
    }
}

impl KalmanFilter2d {
    pub fn new(process_noise: f64, max_predict_gap_secs: f64) -> Self {
        Self {
            process_noise,
            max_predict_gap_secs,
            tracking: None,
            predict_count: 0,
            update_count: 0,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.tracking.is_some()
    }

    /// Start tracking at the first fix: zero velocity, tight position and
    /// loose velocity variance.
    pub fn init(&mut self, lat: f64, lon: f64, timestamp_ms: f64) {
        let covariance = StateMat4::from_diagonal(&StateVec4::new(
            INIT_POSITION_VAR,
            INIT_POSITION_VAR,
            INIT_VELOCITY_VAR,
            INIT_VELOCITY_VAR,
        ));
        self.tracking = Some(Tracking {
            state: StateVec4::new(lat, lon, 0.0, 0.0),
            covariance,
            last_timestamp_ms: timestamp_ms,
        });
        log::debug!("position filter initialized at ({lat:.7}, {lon:.7})");
    }

    /// Time update: `x = F x`, `P = F P F^T + Q`.
    pub fn predict(&mut self, timestamp_ms: f64) -> PredictOutcome {
        let max_gap = self.max_predict_gap_secs;
        let q = self.process_noise;
        let Some(track) = self.tracking.as_mut() else {
            return PredictOutcome::Uninitialized;
        };

        let dt = (timestamp_ms - track.last_timestamp_ms) / 1000.0;
        track.last_timestamp_ms = timestamp_ms;
        if dt <= 0.0 || dt > max_gap {
            return PredictOutcome::Skipped { dt };
        }

        let f = transition_matrix(dt);
        track.state = f * track.state;
        let propagated = f * track.covariance * f.transpose() + process_noise(q, dt);
        track.covariance = symmetrize(&propagated);

        self.predict_count += 1;
        PredictOutcome::Propagated { dt }
    }

    /// Measurement update with a direct position observation.
    ///
    /// `accuracy_m` is the reported horizontal accuracy; `None` (or a negative
    /// or non-finite value) falls back to 10 m.
    pub fn update(&mut self, lat: f64, lon: f64, accuracy_m: Option<f64>) -> UpdateOutcome {
        let Some(track) = self.tracking.as_mut() else {
            return UpdateOutcome::Uninitialized;
        };

        let accuracy = accuracy_m
            .filter(|a| a.is_finite() && *a >= 0.0)
            .unwrap_or(DEFAULT_GPS_ACCURACY_M);
        let deg_noise = accuracy / METERS_PER_DEGREE;
        let r = GpsPosNoise::identity() * (deg_noise * deg_noise);

        let h = observation_matrix();
        let z = GpsPosVec::new(lat, lon);
        let innovation = z - h * track.state;

        let p = track.covariance;
        let s = h * p * h.transpose() + r;
        let det = s.determinant();

        let (s_inv, outcome) = match s.try_inverse() {
            Some(inv) if det.abs() >= SINGULAR_DET_THRESHOLD => (inv, UpdateOutcome::Corrected),
            _ => (
                GpsPosNoise::identity() * FALLBACK_INVERSE_SCALE,
                UpdateOutcome::DegenerateFallback { det },
            ),
        };

        let k: KalmanGainGpsPos = p * h.transpose() * s_inv;
        track.state += k * innovation;

        // Joseph form keeps P symmetric positive semi-definite
        let i_kh = StateMat4::identity() - k * h;
        let updated = i_kh * p * i_kh.transpose() + k * r * k.transpose();
        track.covariance = symmetrize(&updated);

        if let UpdateOutcome::DegenerateFallback { det } = outcome {
            log::warn!("innovation covariance near-singular (det={det:e}), using fallback gain");
        }
        self.update_count += 1;
        outcome
    }

    pub fn get_state(&self) -> Option<Kf2dState> {
        self.tracking.as_ref().map(|track| Kf2dState {
            lat: track.state[0],
            lon: track.state[1],
            v_lat: track.state[2],
            v_lon: track.state[3],
            position_std_m: position_std_m(&track.covariance),
            predict_count: self.predict_count,
            update_count: self.update_count,
        })
    }

    pub fn last_timestamp_ms(&self) -> Option<f64> {
        self.tracking.as_ref().map(|t| t.last_timestamp_ms)
    }

    /// Diagonal position variances (deg^2).
    pub fn position_variance(&self) -> Option<(f64, f64)> {
        self.tracking
            .as_ref()
            .map(|t| (t.covariance[(0, 0)], t.covariance[(1, 1)]))
    }
}

fn transition_matrix(dt: f64) -> StateMat4 {
    let mut f = StateMat4::identity();
    f[(0, 2)] = dt;
    f[(1, 3)] = dt;
    f
}

/// Discretized white-noise-acceleration process noise.
fn process_noise(q: f64, dt: f64) -> StateMat4 {
    let dt2 = dt * dt;
    let dt3 = dt2 * dt / 2.0;
    let dt4 = dt2 * dt2 / 4.0;
    let mut m = StateMat4::zeros();
    m[(0, 0)] = q * dt4;
    m[(1, 1)] = q * dt4;
    m[(0, 2)] = q * dt3;
    m[(2, 0)] = q * dt3;
    m[(1, 3)] = q * dt3;
    m[(3, 1)] = q * dt3;
    m[(2, 2)] = q * dt2;
    m[(3, 3)] = q * dt2;
    m
}

fn observation_matrix() -> ObservationGpsPos {
    let mut h = ObservationGpsPos::zeros();
    h[(0, 0)] = 1.0;
    h[(1, 1)] = 1.0;
    h
}

fn symmetrize(p: &StateMat4) -> StateMat4 {
    (p + p.transpose()) * 0.5
}

fn position_std_m(p: &StateMat4) -> f64 {
    let var = p[(0, 0)].max(0.0) + p[(1, 1)].max(0.0);
    (var / 2.0).sqrt() * METERS_PER_DEGREE
}
