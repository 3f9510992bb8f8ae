//! Pedestrian bus-route guidance core.
//!
//! Smooths jittery GPS through a constant-velocity Kalman filter, smooths the
//! compass on the unit circle, and walks an ordered waypoint list with
//! proximity cues and turn look-ahead bearings. `SensorFusion` ties the pieces
//! into one update cycle; `sensors` and `session` feed it live or from a
//! recording.

pub mod error;
pub mod filters;
pub mod geodesy;
pub mod live_status;
pub mod route;
pub mod sensor_fusion;
pub mod sensors;
pub mod session;
pub mod types;

pub use error::{LocationErrorKind, NavError, Result};
pub use route::{RouteDirection, RouteSet, Waypoint, WaypointKind};
pub use sensor_fusion::{FusionConfig, FusionEvent, FusionSnapshot, LocationStatus, SensorFusion};
pub use types::{Coordinate, GpsFix, OrientationSample};
