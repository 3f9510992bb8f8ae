use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Ordered audio cues to play for one stop approach. Playback itself belongs
/// to the audio collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CueEvent {
    pub waypoint_id: String,
    pub waypoint_index: usize,
    pub distance_m: f64,
    pub cues: Vec<String>,
}

/// At-most-once bookkeeping for stop announcements.
///
/// A waypoint id fires at most once per route direction, and nothing fires
/// while a previous cue is still playing.
#[derive(Clone, Debug, Default)]
pub struct CueGuard {
    fired: HashSet<String>,
    playing: bool,
}

impl CueGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_fire(&self, waypoint_id: &str) -> bool {
        !self.playing && !self.fired.contains(waypoint_id)
    }

    pub fn mark_fired(&mut self, waypoint_id: &str) {
        self.fired.insert(waypoint_id.to_string());
        self.playing = true;
    }

    /// Called by the audio side when the cue sequence ends or fails.
    pub fn playback_finished(&mut self) {
        self.playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn has_fired(&self, waypoint_id: &str) -> bool {
        self.fired.contains(waypoint_id)
    }

    pub fn fired_count(&self) -> usize {
        self.fired.len()
    }

    /// Forget fired waypoints; an in-flight playback stays in flight.
    pub fn reset(&mut self) {
        self.fired.clear();
    }
}
