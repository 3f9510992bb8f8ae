//! Linear algebra type system for the position filter
//!
//! Fixed-size, stack-allocated matrices so every product in the filter is
//! dimension-checked at compile time.

use nalgebra::{SMatrix, SVector};

// ===== State Dimensions =====
pub const STATE_DIM: usize = 4; // [lat, lon, v_lat, v_lon]

// ===== Measurement Dimensions =====
pub const MEASURE_DIM_GPS_POS: usize = 2; // (lat, lon)

// ===== Constant-Velocity Filter Types =====
pub type StateVec4 = SVector<f64, STATE_DIM>;
pub type StateMat4 = SMatrix<f64, STATE_DIM, STATE_DIM>;

// Measurement types
pub type GpsPosVec = SVector<f64, MEASURE_DIM_GPS_POS>;
pub type GpsPosNoise = SMatrix<f64, MEASURE_DIM_GPS_POS, MEASURE_DIM_GPS_POS>;

// Observation matrix (2×4) and Kalman gain (4×2)
pub type ObservationGpsPos = SMatrix<f64, MEASURE_DIM_GPS_POS, STATE_DIM>;
pub type KalmanGainGpsPos = SMatrix<f64, STATE_DIM, MEASURE_DIM_GPS_POS>;
