use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::sensor_fusion::{FusionSnapshot, LocationStatus};

/// Flat status file for anything watching a live session from outside.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct LiveStatus {
    pub timestamp: f64,
    pub uptime_seconds: u64,
    // Input counters
    pub gps_fixes: u64,
    pub orientation_samples: u64,
    pub predict_ticks: u64,
    pub cues_fired: u64,
    // Location
    pub location_status: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub gps_accuracy: Option<f64>,
    pub position_std_m: Option<f64>,
    // Heading
    pub heading_deg: f64,
    pub composite_heading_deg: f64,
    pub heading_offset_deg: f64,
    pub pitch_deg: f64,
    pub orientation_available: bool,
    // Navigation
    pub direction: Option<String>,
    pub target_index: Option<usize>,
    pub target_id: Option<String>,
    pub distance_to_target_m: Option<f64>,
    pub next_turn_id: Option<String>,
    pub next_turn_distance_m: Option<f64>,
    pub next_stop_id: Option<String>,
    pub next_stop_distance_m: Option<f64>,
    pub stops_until_next_turn: Option<usize>,
    pub navigation_bearing: Option<f64>,
    pub progress_percent: f64,
    pub arrived: bool,
    pub cue_playing: bool,
}

impl LiveStatus {
    pub fn new() -> Self {
        Self { timestamp: current_timestamp(), ..Default::default() }
    }

    pub fn from_snapshot(snapshot: &FusionSnapshot) -> Self {
        let mut status = Self::new();
        status.location_status = match &snapshot.location_status {
            LocationStatus::Waiting => "waiting".to_string(),
            LocationStatus::Tracking => "tracking".to_string(),
            LocationStatus::Lost { message, .. } => format!("lost: {message}"),
        };
        status.lat = snapshot.position.as_ref().map(|p| p.lat);
        status.lon = snapshot.position.as_ref().map(|p| p.lon);
        status.gps_accuracy = snapshot.gps_accuracy_m;
        status.position_std_m = snapshot.filter_state.as_ref().map(|s| s.position_std_m);

        status.heading_deg = snapshot.heading_deg;
        status.composite_heading_deg = snapshot.composite_heading_deg;
        status.heading_offset_deg = snapshot.heading_state.offset_deg;
        status.pitch_deg = snapshot.pitch_deg;
        status.orientation_available = snapshot.orientation_available;
        status.cue_playing = snapshot.cue_playing;

        if let Some(nav) = &snapshot.navigation {
            status.direction = Some(nav.direction.to_string());
            status.target_index = Some(nav.target_index);
            status.target_id = Some(nav.target.waypoint_id.clone());
            status.distance_to_target_m = Some(nav.distance_to_target_m);
            status.next_turn_id = nav.next_turn.as_ref().map(|t| t.waypoint_id.clone());
            status.next_turn_distance_m = nav.next_turn.as_ref().map(|t| t.distance_m);
            status.stops_until_next_turn = nav.next_turn.as_ref().map(|t| t.stops_until);
            status.next_stop_id = nav.next_bus_stop.as_ref().map(|s| s.waypoint_id.clone());
            status.next_stop_distance_m = nav.next_bus_stop.as_ref().map(|s| s.distance_m);
            status.navigation_bearing = Some(nav.navigation_bearing);
            status.progress_percent = nav.progress_percent;
            status.arrived = nav.arrived;
        }
        status
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

pub fn current_timestamp() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::{NavigationConfig, RouteSet, Waypoint, WaypointKind};
    use crate::sensor_fusion::{FusionConfig, SensorFusion};
    use crate::types::GpsFix;

    #[test]
    fn test_status_before_first_fix() {
        let routes = RouteSet::new(
            vec![Waypoint::new("a", 46.0, -63.0, WaypointKind::Goal)],
            vec![Waypoint::new("b", 46.1, -63.0, WaypointKind::Goal)],
        )
        .unwrap();
        let mut fusion = SensorFusion::new(FusionConfig::default(), NavigationConfig::default(), routes);
        let status = LiveStatus::from_snapshot(&fusion.get_snapshot());
        assert_eq!(status.location_status, "waiting");
        assert!(status.lat.is_none());
        assert!(status.target_index.is_none());

        fusion.feed_gps(&GpsFix::new(1000.0, 46.0001, -63.0, Some(4.0)));
        let status = LiveStatus::from_snapshot(&fusion.get_snapshot());
        assert_eq!(status.location_status, "tracking");
        assert_eq!(status.direction.as_deref(), Some("outbound"));
        assert_eq!(status.target_id.as_deref(), Some("a"));
        assert_eq!(status.progress_percent, 100.0);
    }
}
