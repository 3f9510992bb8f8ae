// ---------------------------------------------------------------------------
// Route progress state machine
//
// Idle until the first position arrives, then Tracking one route with a target
// waypoint index that only moves forward. A direction toggle is the only way
// the index can go back, and it re-seeds from the nearest waypoint.
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use super::cues::{CueEvent, CueGuard};
use super::{Route, RouteDirection, RouteSet, TurnDirection, Waypoint, WaypointKind};
use crate::geodesy::{bearing, distance, nearest_waypoint_index, project};
use crate::types::Coordinate;

#[derive(Clone, Debug)]
pub struct NavigationConfig {
    /// Target advances once the user is closer than this (m)
    pub advance_radius_m: f64,
    /// Stop cues fire strictly inside (min, max) meters
    pub cue_min_distance_m: f64,
    pub cue_max_distance_m: f64,
    /// Turn look-ahead bearing kicks in below this distance to the turn (m)
    pub turn_trigger_radius_m: f64,
    /// Distance past the turn vertex used for the look-ahead point (m)
    pub turn_lookahead_m: f64,
    pub upcoming_count: usize,
    /// Played before the stop-specific cue
    pub approach_cue: Option<String>,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            advance_radius_m: 20.0,
            cue_min_distance_m: 10.0,
            cue_max_distance_m: 50.0,
            turn_trigger_radius_m: 45.0,
            turn_lookahead_m: 15.0,
            upcoming_count: 5,
            approach_cue: Some("getOff.mp3".to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProgressState {
    Idle,
    Tracking {
        direction: RouteDirection,
        target_index: usize,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    RouteSelected {
        direction: RouteDirection,
        nearest_index: usize,
        target_index: usize,
    },
    DirectionToggled {
        direction: RouteDirection,
        nearest_index: usize,
        target_index: usize,
    },
    Advanced {
        from: usize,
        to: usize,
        waypoint_id: String,
    },
    Arrived {
        waypoint_id: String,
    },
    Cue(CueEvent),
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum BearingSource {
    /// Straight-ahead cue: no turn close enough
    DeviceHeading,
    /// Aimed at a point projected past the turn vertex
    TurnLookAhead { turn_index: usize },
    /// Turn has no exit waypoint; aimed at the vertex itself
    TurnVertex { turn_index: usize },
}

/// A waypoint found by scanning forward from the target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lookahead {
    pub index: usize,
    pub waypoint_id: String,
    pub name: Option<String>,
    pub kind: WaypointKind,
    pub turn_direction: Option<TurnDirection>,
    pub distance_m: f64,
    /// Bus stops strictly between the target and this waypoint
    pub stops_until: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpcomingWaypoint {
    pub index: usize,
    pub waypoint_id: String,
    pub name: Option<String>,
    pub kind: WaypointKind,
    pub position: Coordinate,
    pub distance_m: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NavigationSummary {
    pub direction: RouteDirection,
    pub target_index: usize,
    pub target: UpcomingWaypoint,
    pub distance_to_target_m: f64,
    pub next_turn: Option<Lookahead>,
    pub next_bus_stop: Option<Lookahead>,
    pub upcoming_waypoints: Vec<UpcomingWaypoint>,
    pub navigation_bearing: f64,
    pub bearing_source: BearingSource,
    pub progress_percent: f64,
    pub arrived: bool,
}

pub struct RouteProgress {
    config: NavigationConfig,
    routes: RouteSet,
    state: ProgressState,
    cue_guard: CueGuard,
    arrived: bool,
}

impl RouteProgress {
    pub fn new(routes: RouteSet, config: NavigationConfig) -> Self {
        Self {
            config,
            routes,
            state: ProgressState::Idle,
            cue_guard: CueGuard::new(),
            arrived: false,
        }
    }

    pub fn state(&self) -> ProgressState {
        self.state
    }

    pub fn direction(&self) -> Option<RouteDirection> {
        match self.state {
            ProgressState::Tracking { direction, .. } => Some(direction),
            ProgressState::Idle => None,
        }
    }

    pub fn target_index(&self) -> Option<usize> {
        match self.state {
            ProgressState::Tracking { target_index, .. } => Some(target_index),
            ProgressState::Idle => None,
        }
    }

    pub fn active_route(&self) -> Option<&Route> {
        self.direction().map(|d| self.routes.route(d))
    }

    pub fn routes(&self) -> &RouteSet {
        &self.routes
    }

    pub fn config(&self) -> &NavigationConfig {
        &self.config
    }

    pub fn is_cue_playing(&self) -> bool {
        self.cue_guard.is_playing()
    }

    pub fn has_arrived(&self) -> bool {
        self.arrived
    }

    /// The audio collaborator finished (or failed) the last cue sequence.
    pub fn cue_finished(&mut self) {
        self.cue_guard.playback_finished();
    }

    // ── Position updates ─────────────────────────────────────────────────

    pub fn update_position(&mut self, position: &Coordinate) -> Vec<ProgressEvent> {
        let mut events = Vec::new();

        let (direction, target_index) = match self.state {
            ProgressState::Tracking { direction, target_index } => (direction, target_index),
            ProgressState::Idle => {
                let direction = self.select_direction(position);
                let (nearest_index, target_index) = self.seed_target(direction, position);
                log::info!(
                    "route selected: {direction}, nearest waypoint {nearest_index}, targeting {target_index}"
                );
                events.push(ProgressEvent::RouteSelected { direction, nearest_index, target_index });
                self.state = ProgressState::Tracking { direction, target_index };
                (direction, target_index)
            }
        };

        let route = self.routes.route(direction);
        let last_index = route.last_index();
        let target = &route.waypoints()[target_index];
        let dist = distance(position, &target.position);

        if let Some(cue) = Self::check_cue(&self.config, &mut self.cue_guard, target, target_index, dist) {
            log::info!("cue for {} at {dist:.0} m: {:?}", target.id, cue.cues);
            events.push(ProgressEvent::Cue(cue));
        }

        if dist < self.config.advance_radius_m {
            if target_index < last_index {
                let next = target_index + 1;
                log::info!("passed waypoint {} ({target_index} -> {next})", target.id);
                events.push(ProgressEvent::Advanced {
                    from: target_index,
                    to: next,
                    waypoint_id: target.id.clone(),
                });
                self.state = ProgressState::Tracking { direction, target_index: next };
            } else if !self.arrived {
                log::info!("arrived at {}", target.id);
                events.push(ProgressEvent::Arrived { waypoint_id: target.id.clone() });
                self.arrived = true;
            }
        }

        events
    }

    /// Swap to the other route and re-seed the target from `position`.
    /// Returns `None` before the first position update.
    pub fn toggle_direction(&mut self, position: &Coordinate) -> Option<ProgressEvent> {
        let ProgressState::Tracking { direction, .. } = self.state else {
            log::warn!("direction toggle ignored: no position yet");
            return None;
        };

        let direction = direction.opposite();
        let (nearest_index, target_index) = self.seed_target(direction, position);
        self.state = ProgressState::Tracking { direction, target_index };
        self.cue_guard.reset();
        self.arrived = false;
        log::info!("direction toggled to {direction}, targeting {target_index}");

        Some(ProgressEvent::DirectionToggled { direction, nearest_index, target_index })
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn summary(&self, position: &Coordinate, device_heading: f64) -> Option<NavigationSummary> {
        let ProgressState::Tracking { direction, target_index } = self.state else {
            return None;
        };
        let route = self.routes.route(direction);
        let target = &route.waypoints()[target_index];
        let (navigation_bearing, bearing_source) = self.navigation_bearing(position, device_heading);
        let distance_to_target_m = distance(position, &target.position);

        Some(NavigationSummary {
            direction,
            target_index,
            target: UpcomingWaypoint {
                index: target_index,
                waypoint_id: target.id.clone(),
                name: target.name.clone(),
                kind: target.kind,
                position: target.position.clone(),
                distance_m: distance_to_target_m,
            },
            distance_to_target_m,
            next_turn: self.next_turn(position),
            next_bus_stop: self.next_bus_stop(position),
            upcoming_waypoints: self.upcoming_waypoints(position),
            navigation_bearing,
            bearing_source,
            progress_percent: self.progress_percent(),
            arrived: self.arrived,
        })
    }

    pub fn next_turn(&self, position: &Coordinate) -> Option<Lookahead> {
        self.scan_forward(position, |kind| kind.is_turn())
    }

    pub fn next_bus_stop(&self, position: &Coordinate) -> Option<Lookahead> {
        self.scan_forward(position, |kind| kind.is_stop())
    }

    pub fn upcoming_waypoints(&self, position: &Coordinate) -> Vec<UpcomingWaypoint> {
        let (Some(route), Some(target_index)) = (self.active_route(), self.target_index()) else {
            return Vec::new();
        };
        route
            .waypoints()
            .iter()
            .enumerate()
            .skip(target_index)
            .take(self.config.upcoming_count)
            .map(|(index, wp)| UpcomingWaypoint {
                index,
                waypoint_id: wp.id.clone(),
                name: wp.name.clone(),
                kind: wp.kind,
                position: wp.position.clone(),
                distance_m: distance(position, &wp.position),
            })
            .collect()
    }

    /// Bearing the directional cue should point along.
    ///
    /// Only the first turn at or after the target is considered. Inside the
    /// trigger radius the cue aims a little past the turn vertex along the exit
    /// leg; otherwise it points straight ahead (`device_heading`).
    pub fn navigation_bearing(&self, position: &Coordinate, device_heading: f64) -> (f64, BearingSource) {
        let (Some(route), Some(target_index)) = (self.active_route(), self.target_index()) else {
            return (device_heading, BearingSource::DeviceHeading);
        };

        let next_turn = route
            .waypoints()
            .iter()
            .enumerate()
            .skip(target_index)
            .find(|(_, wp)| wp.kind.is_turn());

        match next_turn {
            Some((turn_index, turn))
                if distance(position, &turn.position) < self.config.turn_trigger_radius_m =>
            {
                self.look_ahead_bearing(route, turn_index, position)
            }
            _ => (device_heading, BearingSource::DeviceHeading),
        }
    }

    pub fn progress_percent(&self) -> f64 {
        let (Some(route), Some(target_index)) = (self.active_route(), self.target_index()) else {
            return 0.0;
        };
        if route.len() <= 1 {
            return 100.0;
        }
        (target_index as f64 / route.last_index() as f64 * 100.0).min(100.0)
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    /// Closer first waypoint wins; a tie keeps outbound.
    fn select_direction(&self, position: &Coordinate) -> RouteDirection {
        let to_outbound = distance(position, &self.routes.route(RouteDirection::Outbound).first().position);
        let to_inbound = distance(position, &self.routes.route(RouteDirection::Inbound).first().position);
        if to_inbound < to_outbound {
            RouteDirection::Inbound
        } else {
            RouteDirection::Outbound
        }
    }

    /// The user is assumed to be heading for the waypoint after the nearest one.
    fn seed_target(&self, direction: RouteDirection, position: &Coordinate) -> (usize, usize) {
        let route = self.routes.route(direction);
        let nearest = nearest_waypoint_index(position, route.waypoints());
        (nearest, (nearest + 1).min(route.last_index()))
    }

    fn check_cue(
        config: &NavigationConfig,
        guard: &mut CueGuard,
        target: &Waypoint,
        target_index: usize,
        dist: f64,
    ) -> Option<CueEvent> {
        let in_band = dist > config.cue_min_distance_m && dist < config.cue_max_distance_m;
        if !in_band || !target.kind.is_stop() {
            return None;
        }
        let stop_cue = target.audio_cue.as_ref()?;
        if !guard.can_fire(&target.id) {
            return None;
        }
        guard.mark_fired(&target.id);

        let cues = config
            .approach_cue
            .iter()
            .chain(std::iter::once(stop_cue))
            .cloned()
            .collect();
        Some(CueEvent {
            waypoint_id: target.id.clone(),
            waypoint_index: target_index,
            distance_m: dist,
            cues,
        })
    }

    fn scan_forward(&self, position: &Coordinate, matches: impl Fn(WaypointKind) -> bool) -> Option<Lookahead> {
        let route = self.active_route()?;
        let target_index = self.target_index()?;
        let waypoints = route.waypoints();

        let (index, wp) = waypoints
            .iter()
            .enumerate()
            .skip(target_index)
            .find(|(_, wp)| matches(wp.kind))?;
        let stops_until = waypoints[..index]
            .iter()
            .skip(target_index + 1)
            .filter(|w| w.kind.is_stop())
            .count();

        Some(Lookahead {
            index,
            waypoint_id: wp.id.clone(),
            name: wp.name.clone(),
            kind: wp.kind,
            turn_direction: wp.kind.turn_direction(),
            distance_m: distance(position, &wp.position),
            stops_until,
        })
    }

    fn look_ahead_bearing(&self, route: &Route, turn_index: usize, position: &Coordinate) -> (f64, BearingSource) {
        let turn = &route.waypoints()[turn_index].position;
        match route.get(turn_index + 1) {
            Some(exit) => {
                let exit_bearing = bearing(turn, &exit.position);
                let aim = project(turn, exit_bearing, self.config.turn_lookahead_m);
                (bearing(position, &aim), BearingSource::TurnLookAhead { turn_index })
            }
            None => (bearing(position, turn), BearingSource::TurnVertex { turn_index }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const ORIGIN: (f64, f64) = (46.2382, -63.1311);

    fn origin() -> Coordinate {
        Coordinate::new(ORIGIN.0, ORIGIN.1)
    }

    fn at(bearing_deg: f64, distance_m: f64) -> Coordinate {
        project(&origin(), bearing_deg, distance_m)
    }

    fn wp(id: &str, pos: Coordinate, kind: WaypointKind) -> Waypoint {
        Waypoint { id: id.to_string(), position: pos, kind, name: None, audio_cue: None }
    }

    /// A(turn_left) at origin, B(bus_stop) 200 m north, C(goal) 400 m north;
    /// inbound is the same line reversed.
    fn line_routes() -> RouteSet {
        let outbound = vec![
            wp("A", origin(), WaypointKind::TurnLeft),
            wp("B", at(0.0, 200.0), WaypointKind::BusStop).with_audio_cue("stop1.mp3"),
            wp("C", at(0.0, 400.0), WaypointKind::Goal),
        ];
        let inbound = vec![
            wp("C'", at(0.0, 400.0), WaypointKind::Plain),
            wp("B'", at(0.0, 200.0), WaypointKind::BusStop).with_audio_cue("stop1_in.mp3"),
            wp("A'", origin(), WaypointKind::Goal),
        ];
        RouteSet::new(outbound, inbound).unwrap()
    }

    fn tracking(routes: RouteSet, start: &Coordinate) -> RouteProgress {
        let mut progress = RouteProgress::new(routes, NavigationConfig::default());
        progress.update_position(start);
        progress
    }

    fn cue_events(events: &[ProgressEvent]) -> Vec<&CueEvent> {
        events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Cue(cue) => Some(cue),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_idle_until_first_position() {
        let progress = RouteProgress::new(line_routes(), NavigationConfig::default());
        assert_eq!(progress.state(), ProgressState::Idle);
        assert!(progress.summary(&origin(), 0.0).is_none());
        assert_eq!(progress.progress_percent(), 0.0);
    }

    #[test]
    fn test_initialization_picks_closer_route_and_next_waypoint() {
        let mut progress = RouteProgress::new(line_routes(), NavigationConfig::default());
        let events = progress.update_position(&at(180.0, 5.0));
        assert_eq!(
            events[0],
            ProgressEvent::RouteSelected {
                direction: RouteDirection::Outbound,
                nearest_index: 0,
                target_index: 1,
            }
        );
        assert_eq!(progress.target_index(), Some(1));

        let progress = tracking(line_routes(), &at(0.0, 405.0));
        assert_eq!(progress.direction(), Some(RouteDirection::Inbound));
        assert_eq!(progress.target_index(), Some(1));
    }

    #[test]
    fn test_tie_favors_outbound() {
        let routes = RouteSet::new(
            vec![wp("o", origin(), WaypointKind::Goal)],
            vec![wp("i", origin(), WaypointKind::Goal)],
        )
        .unwrap();
        let progress = tracking(routes, &at(90.0, 30.0));
        assert_eq!(progress.direction(), Some(RouteDirection::Outbound));
        // single-waypoint route: target clamps to 0
        assert_eq!(progress.target_index(), Some(0));
        assert_eq!(progress.progress_percent(), 100.0);
    }

    #[test]
    fn test_target_clamps_at_last_waypoint() {
        // nearest is C (last) for the outbound route
        let routes = RouteSet::new(
            line_routes().route(RouteDirection::Outbound).waypoints().to_vec(),
            vec![wp("far", at(180.0, 5000.0), WaypointKind::Goal)],
        )
        .unwrap();
        let progress = tracking(routes, &at(0.0, 395.0));
        assert_eq!(progress.target_index(), Some(2));
    }

    #[test]
    fn test_advancement_is_monotonic_and_bounded() {
        let mut progress = tracking(line_routes(), &at(180.0, 5.0));
        let mut seen = vec![progress.target_index().unwrap()];
        let mut arrived = 0;

        for d in [50.0, 100.0, 150.0, 185.0, 190.0, 250.0, 300.0, 385.0, 395.0, 399.0] {
            for event in progress.update_position(&at(0.0, d)) {
                if matches!(event, ProgressEvent::Arrived { .. }) {
                    arrived += 1;
                }
            }
            seen.push(progress.target_index().unwrap());
        }

        assert_eq!(seen.first(), Some(&1));
        assert_eq!(seen.last(), Some(&2));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "target went backwards: {seen:?}");
        assert!(seen.iter().all(|&t| t <= 2));
        assert_eq!(arrived, 1);
        assert!(progress.has_arrived());
        assert_eq!(progress.progress_percent(), 100.0);
    }

    #[test]
    fn test_advances_at_most_one_waypoint_per_update() {
        let outbound = vec![
            wp("p0", at(180.0, 100.0), WaypointKind::Plain),
            wp("p1", origin(), WaypointKind::Plain),
            wp("p2", at(0.0, 3.0), WaypointKind::Plain),
            wp("p3", at(0.0, 6.0), WaypointKind::Goal),
        ];
        let inbound = vec![wp("x", at(0.0, 5000.0), WaypointKind::Goal)];
        let mut progress = tracking(RouteSet::new(outbound, inbound).unwrap(), &at(180.0, 100.0));
        assert_eq!(progress.target_index(), Some(1));

        // p1, p2 and p3 are all within 20 m
        progress.update_position(&at(0.0, 1.0));
        assert_eq!(progress.target_index(), Some(2));
        progress.update_position(&at(0.0, 1.0));
        assert_eq!(progress.target_index(), Some(3));
        progress.update_position(&at(0.0, 1.0));
        assert_eq!(progress.target_index(), Some(3));
    }

    #[test]
    fn test_cue_fires_once_while_dwelling() {
        let mut progress = tracking(line_routes(), &at(180.0, 5.0));
        let mut fired = Vec::new();
        for _ in 0..10 {
            // 30 m short of B
            let events = progress.update_position(&at(0.0, 170.0));
            fired.extend(cue_events(&events).into_iter().cloned());
            progress.cue_finished();
        }
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].waypoint_id, "B");
        assert_eq!(fired[0].cues, vec!["getOff.mp3".to_string(), "stop1.mp3".to_string()]);
        assert_eq!(progress.target_index(), Some(1));
    }

    #[test]
    fn test_cue_outside_band_or_while_playing() {
        let mut progress = tracking(line_routes(), &at(180.0, 5.0));
        // 100 m away: outside the band
        assert!(cue_events(&progress.update_position(&at(0.0, 100.0))).is_empty());

        // something else still playing
        progress.cue_guard.mark_fired("elsewhere");
        assert!(cue_events(&progress.update_position(&at(0.0, 170.0))).is_empty());
        progress.cue_finished();
        assert_eq!(cue_events(&progress.update_position(&at(0.0, 170.0))).len(), 1);
    }

    #[test]
    fn test_no_cue_inside_inner_radius() {
        let mut progress = tracking(line_routes(), &at(180.0, 5.0));
        // 5 m from B: below the band, and the target advances past it
        let events = progress.update_position(&at(0.0, 195.0));
        assert!(cue_events(&events).is_empty());
        assert_eq!(progress.target_index(), Some(2));
    }

    #[test]
    fn test_no_cue_without_audio_or_for_non_stops() {
        let outbound = vec![
            wp("s0", origin(), WaypointKind::Plain),
            wp("s1", at(0.0, 200.0), WaypointKind::BusStop),
            wp("s2", at(0.0, 400.0), WaypointKind::Goal).with_audio_cue("goal.mp3"),
        ];
        let inbound = vec![wp("x", at(0.0, 5000.0), WaypointKind::Goal)];
        let mut progress = tracking(RouteSet::new(outbound, inbound).unwrap(), &at(180.0, 5.0));
        assert!(cue_events(&progress.update_position(&at(0.0, 170.0))).is_empty());
        progress.update_position(&at(0.0, 190.0));
        assert_eq!(progress.target_index(), Some(2));
        assert!(cue_events(&progress.update_position(&at(0.0, 370.0))).is_empty());
    }

    #[test]
    fn test_toggle_reseeds_from_nearest() {
        let mut progress = RouteProgress::new(line_routes(), NavigationConfig::default());
        assert!(progress.toggle_direction(&origin()).is_none());

        progress.update_position(&at(180.0, 5.0));
        let fired = cue_events(&progress.update_position(&at(0.0, 170.0))).len();
        assert_eq!(fired, 1);
        progress.cue_finished();

        let here = at(0.0, 170.0);
        let event = progress.toggle_direction(&here).unwrap();
        assert_eq!(
            event,
            ProgressEvent::DirectionToggled {
                direction: RouteDirection::Inbound,
                nearest_index: 1,
                target_index: 2,
            }
        );
        assert_eq!(progress.direction(), Some(RouteDirection::Inbound));

        // back to outbound from 90 m north of A: B is the target and its cue fires again
        let here = at(0.0, 90.0);
        progress.toggle_direction(&here);
        assert_eq!(progress.target_index(), Some(1));
        assert_eq!(progress.direction(), Some(RouteDirection::Outbound));
        let events = progress.update_position(&at(0.0, 170.0));
        let cues = cue_events(&events);
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].waypoint_id, "B");
    }

    #[test]
    fn test_toggle_seeds_from_given_position() {
        let mut progress = tracking(line_routes(), &at(180.0, 5.0));
        let event = progress.toggle_direction(&at(0.0, 390.0)).unwrap();
        assert_eq!(
            event,
            ProgressEvent::DirectionToggled {
                direction: RouteDirection::Inbound,
                nearest_index: 0,
                target_index: 1,
            }
        );
    }

    #[test]
    fn test_lookahead_scans_from_target() {
        let outbound = vec![
            wp("p0", origin(), WaypointKind::Plain),
            wp("s1", at(0.0, 100.0), WaypointKind::BusStop).with_name("Library"),
            wp("t2", at(0.0, 200.0), WaypointKind::TurnRight),
            wp("s3", at(90.0, 100.0), WaypointKind::BusStop),
            wp("g4", at(90.0, 200.0), WaypointKind::Goal),
        ];
        let inbound = vec![wp("x", at(0.0, 5000.0), WaypointKind::Goal)];
        let progress = tracking(RouteSet::new(outbound, inbound).unwrap(), &at(180.0, 5.0));
        let here = at(180.0, 5.0);

        let turn = progress.next_turn(&here).unwrap();
        assert_eq!(turn.index, 2);
        assert_eq!(turn.turn_direction, Some(TurnDirection::Right));
        // s1 is the target itself
        assert_eq!(turn.stops_until, 0);
        assert_abs_diff_eq!(turn.distance_m, 205.0, epsilon = 0.01);

        let stop = progress.next_bus_stop(&here).unwrap();
        assert_eq!(stop.index, 1);
        assert_eq!(stop.name.as_deref(), Some("Library"));
        assert_eq!(stop.stops_until, 0);

        let upcoming = progress.upcoming_waypoints(&here);
        assert_eq!(upcoming.len(), 4);
        assert_eq!(upcoming[0].index, 1);
        assert_eq!(upcoming[3].waypoint_id, "g4");
    }

    #[test]
    fn test_stops_until_counts_strictly_between() {
        let outbound = vec![
            wp("p0", origin(), WaypointKind::Plain),
            wp("s1", at(0.0, 100.0), WaypointKind::BusStop),
            wp("s2", at(0.0, 200.0), WaypointKind::BusStop),
            wp("p3", at(0.0, 300.0), WaypointKind::Plain),
            wp("t4", at(0.0, 400.0), WaypointKind::TurnLeft),
        ];
        let inbound = vec![wp("x", at(0.0, 5000.0), WaypointKind::Goal)];
        let progress = tracking(RouteSet::new(outbound, inbound).unwrap(), &at(180.0, 5.0));
        assert_eq!(progress.target_index(), Some(1));

        let here = at(180.0, 5.0);
        // s2 only; the target s1 is not counted
        assert_eq!(progress.next_turn(&here).unwrap().stops_until, 1);
        assert_eq!(progress.next_bus_stop(&here).unwrap().stops_until, 0);
    }

    /// p0 100 m south of turn T, exit X 100 m east of T.
    fn turn_routes(with_exit: bool) -> RouteSet {
        let mut outbound = vec![
            wp("p0", at(180.0, 100.0), WaypointKind::Plain),
            wp("T", origin(), WaypointKind::TurnRight),
        ];
        if with_exit {
            outbound.push(wp("X", at(90.0, 100.0), WaypointKind::Goal));
        }
        let inbound = vec![wp("x", at(0.0, 5000.0), WaypointKind::Goal)];
        RouteSet::new(outbound, inbound).unwrap()
    }

    #[test]
    fn test_turn_lookahead_bearing() {
        let mut progress = tracking(turn_routes(true), &at(180.0, 100.0));
        assert_eq!(progress.target_index(), Some(1));

        let user = at(180.0, 30.0);
        progress.update_position(&user);
        assert_eq!(progress.target_index(), Some(1));

        let (nav, source) = progress.navigation_bearing(&user, 123.0);
        let aim = project(&origin(), 90.0, 15.0);
        assert_eq!(source, BearingSource::TurnLookAhead { turn_index: 1 });
        assert_abs_diff_eq!(nav, bearing(&user, &aim), epsilon = 1e-9);
        // atan(15/30) east of north, not straight at the vertex
        assert_abs_diff_eq!(nav, 26.565, epsilon = 0.05);
        assert!((nav - bearing(&user, &origin())).abs() > 20.0);
    }

    #[test]
    fn test_turn_without_exit_aims_at_vertex() {
        let progress = tracking(turn_routes(false), &at(180.0, 100.0));
        let user = at(180.0, 30.0);
        let (nav, source) = progress.navigation_bearing(&user, 123.0);
        assert_eq!(source, BearingSource::TurnVertex { turn_index: 1 });
        assert_abs_diff_eq!(nav, bearing(&user, &origin()), epsilon = 1e-9);
    }

    #[test]
    fn test_far_turn_keeps_device_heading() {
        let progress = tracking(turn_routes(true), &at(180.0, 100.0));
        let (nav, source) = progress.navigation_bearing(&at(180.0, 60.0), 123.0);
        assert_eq!(source, BearingSource::DeviceHeading);
        assert_eq!(nav, 123.0);
    }

    #[test]
    fn test_only_first_upcoming_turn_considered() {
        // t1 is far along the route; t2 loops back next to the user
        let outbound = vec![
            wp("p0", origin(), WaypointKind::Plain),
            wp("t1", at(0.0, 100.0), WaypointKind::TurnLeft),
            wp("t2", at(90.0, 10.0), WaypointKind::TurnRight),
            wp("g3", at(90.0, 100.0), WaypointKind::Goal),
        ];
        let inbound = vec![wp("x", at(0.0, 5000.0), WaypointKind::Goal)];
        let progress = tracking(RouteSet::new(outbound, inbound).unwrap(), &at(180.0, 5.0));
        assert_eq!(progress.target_index(), Some(1));

        let (nav, source) = progress.navigation_bearing(&at(180.0, 5.0), 77.0);
        assert_eq!(source, BearingSource::DeviceHeading);
        assert_eq!(nav, 77.0);
    }

    #[test]
    fn test_summary_fields() {
        let progress = tracking(line_routes(), &at(180.0, 5.0));
        let here = at(180.0, 5.0);
        let summary = progress.summary(&here, 10.0).unwrap();
        assert_eq!(summary.direction, RouteDirection::Outbound);
        assert_eq!(summary.target_index, 1);
        assert_eq!(summary.target.waypoint_id, "B");
        assert_abs_diff_eq!(summary.distance_to_target_m, 205.0, epsilon = 0.01);
        assert_abs_diff_eq!(summary.progress_percent, 50.0);
        assert!(summary.next_turn.is_none());
        assert_eq!(summary.next_bus_stop.as_ref().map(|s| s.index), Some(1));
        assert_eq!(summary.upcoming_waypoints.len(), 2);
        assert_eq!(summary.bearing_source, BearingSource::DeviceHeading);
        assert!(!summary.arrived);
    }
}
