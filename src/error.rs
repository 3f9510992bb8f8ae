use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Route guide error types
#[derive(Error, Debug)]
pub enum NavError {
    #[error("Location unavailable: {0}")]
    LocationUnavailable(String),

    #[error("Location request timed out")]
    LocationTimeout,

    #[error("Orientation unavailable: {0}")]
    OrientationUnavailable(String),

    #[error("Route {0} has no waypoints")]
    EmptyRoute(String),

    #[error("Route {route} has duplicate waypoint id {id}")]
    DuplicateWaypointId { route: String, id: String },

    #[error("Invalid route data: {0}")]
    RouteData(#[from] serde_json::Error),

    #[error("Invalid session data: {0}")]
    SessionData(#[source] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NavError>;

/// Failure reported by the location service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationErrorKind {
    PermissionDenied,
    Unavailable,
    Timeout,
}

impl LocationErrorKind {
    /// Permission and capability failures end navigation; timeouts do not.
    pub fn is_terminal(self) -> bool {
        !matches!(self, LocationErrorKind::Timeout)
    }

    pub fn into_error(self, message: &str) -> NavError {
        match self {
            LocationErrorKind::PermissionDenied => {
                NavError::LocationUnavailable(format!("permission denied: {message}"))
            }
            LocationErrorKind::Unavailable => NavError::LocationUnavailable(message.to_string()),
            LocationErrorKind::Timeout => NavError::LocationTimeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_transient() {
        assert!(!LocationErrorKind::Timeout.is_terminal());
        assert!(LocationErrorKind::PermissionDenied.is_terminal());
        assert!(LocationErrorKind::Unavailable.is_terminal());
    }

    #[test]
    fn test_error_messages() {
        let err = LocationErrorKind::PermissionDenied.into_error("user declined");
        assert_eq!(err.to_string(), "Location unavailable: permission denied: user declined");
        assert!(matches!(
            LocationErrorKind::Timeout.into_error("5000 ms"),
            NavError::LocationTimeout
        ));
    }
}
