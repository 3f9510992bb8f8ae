//! Static route data: two ordered waypoint lists loaded once at startup.

pub mod cues;
pub mod progress;

pub use cues::{CueEvent, CueGuard};
pub use progress::{
    BearingSource, Lookahead, NavigationConfig, NavigationSummary, ProgressEvent, RouteProgress,
    UpcomingWaypoint,
};

use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NavError, Result};
use crate::types::Coordinate;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaypointKind {
    BusStop,
    TurnLeft,
    TurnRight,
    TurnStraight,
    Goal,
    Plain,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnDirection {
    Left,
    Right,
    Straight,
}

impl WaypointKind {
    pub fn is_turn(self) -> bool {
        self.turn_direction().is_some()
    }

    pub fn is_stop(self) -> bool {
        self == WaypointKind::BusStop
    }

    pub fn turn_direction(self) -> Option<TurnDirection> {
        match self {
            WaypointKind::TurnLeft => Some(TurnDirection::Left),
            WaypointKind::TurnRight => Some(TurnDirection::Right),
            WaypointKind::TurnStraight => Some(TurnDirection::Straight),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub id: String,
    #[serde(flatten)]
    pub position: Coordinate,
    #[serde(rename = "type")]
    pub kind: WaypointKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "audioFile", skip_serializing_if = "Option::is_none")]
    pub audio_cue: Option<String>,
}

impl Waypoint {
    pub fn new(id: &str, lat: f64, lon: f64, kind: WaypointKind) -> Self {
        Self {
            id: id.to_string(),
            position: Coordinate::new(lat, lon),
            kind,
            name: None,
            audio_cue: None,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_audio_cue(mut self, cue: &str) -> Self {
        self.audio_cue = Some(cue.to_string());
        self
    }
}

impl AsRef<Coordinate> for Waypoint {
    fn as_ref(&self) -> &Coordinate {
        &self.position
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RouteDirection {
    Outbound,
    Inbound,
}

impl RouteDirection {
    pub fn opposite(self) -> Self {
        match self {
            RouteDirection::Outbound => RouteDirection::Inbound,
            RouteDirection::Inbound => RouteDirection::Outbound,
        }
    }
}

impl Display for RouteDirection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteDirection::Outbound => write!(f, "outbound"),
            RouteDirection::Inbound => write!(f, "inbound"),
        }
    }
}

/// Non-empty ordered waypoint list; order is traversal order.
#[derive(Clone, Debug)]
pub struct Route {
    direction: RouteDirection,
    waypoints: Vec<Waypoint>,
}

impl Route {
    pub fn new(direction: RouteDirection, waypoints: Vec<Waypoint>) -> Result<Self> {
        if waypoints.is_empty() {
            return Err(NavError::EmptyRoute(direction.to_string()));
        }
        let mut seen = HashSet::with_capacity(waypoints.len());
        for wp in &waypoints {
            if !seen.insert(wp.id.as_str()) {
                return Err(NavError::DuplicateWaypointId {
                    route: direction.to_string(),
                    id: wp.id.clone(),
                });
            }
        }
        Ok(Self { direction, waypoints })
    }

    pub fn direction(&self) -> RouteDirection {
        self.direction
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn last_index(&self) -> usize {
        self.waypoints.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&Waypoint> {
        self.waypoints.get(index)
    }

    pub fn first(&self) -> &Waypoint {
        &self.waypoints[0]
    }
}

#[derive(Deserialize)]
struct RouteFile {
    outbound: Vec<Waypoint>,
    inbound: Vec<Waypoint>,
}

/// The outbound/inbound pair. Immutable once loaded.
#[derive(Clone, Debug)]
pub struct RouteSet {
    outbound: Route,
    inbound: Route,
}

impl RouteSet {
    pub fn new(outbound: Vec<Waypoint>, inbound: Vec<Waypoint>) -> Result<Self> {
        Ok(Self {
            outbound: Route::new(RouteDirection::Outbound, outbound)?,
            inbound: Route::new(RouteDirection::Inbound, inbound)?,
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: RouteFile = serde_json::from_str(json)?;
        Self::new(file.outbound, file.inbound)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let file: RouteFile = serde_json::from_reader(reader)?;
        let routes = Self::new(file.outbound, file.inbound)?;
        log::info!(
            "loaded routes from {}: {} outbound, {} inbound waypoints",
            path.display(),
            routes.outbound.len(),
            routes.inbound.len()
        );
        Ok(routes)
    }

    pub fn route(&self, direction: RouteDirection) -> &Route {
        match direction {
            RouteDirection::Outbound => &self.outbound,
            RouteDirection::Inbound => &self.inbound,
        }
    }
}
