use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::BridgeConfig;
use crate::types::{MarkerId, MarkerObservation, Point};

/// Lifecycle state of a tracked marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackState {
    /// Never seen, or lost for longer than the grace period.
    #[default]
    Searching,
    /// Visible, accumulating a stability window.
    Candidate,
    /// Held still for the full stability window.
    Stable,
    /// Already fired this episode; latched until an explicit reset.
    Triggered,
}

/// Per-marker tracking record.
///
/// The `triggered` latch is kept separately from the motion lifecycle:
/// absence beyond the grace period discards accumulated stability progress,
/// but a marker that has fired stays fired until a reset. Episodes are
/// bounded by resets, not by visibility.
#[derive(Debug)]
struct TrackedMarker {
    state: TrackState,
    history: VecDeque<(Point, Instant)>,
    /// When the current in-threshold run began. Eviction bounds `history`
    /// to the stability window, so the elapsed window is measured against
    /// this timestamp, which eviction never discards.
    candidate_since: Instant,
    stable_since: Option<Instant>,
    last_seen: Instant,
    triggered: bool,
}

impl TrackedMarker {
    fn first_seen(centroid: Point, now: Instant) -> Self {
        let mut history = VecDeque::new();
        history.push_back((centroid, now));
        Self {
            state: TrackState::Candidate,
            history,
            candidate_since: now,
            stable_since: None,
            last_seen: now,
            triggered: false,
        }
    }

    fn effective_state(&self) -> TrackState {
        if self.triggered {
            TrackState::Triggered
        } else {
            self.state
        }
    }

    /// Drop motion state, keeping the triggered latch.
    fn lose(&mut self) {
        self.state = TrackState::Searching;
        self.history.clear();
        self.stable_since = None;
    }
}

/// Detects markers that have held geometrically still for a configured
/// duration.
///
/// Per marker, keeps a time-bounded history of centroid samples. A marker
/// becomes Stable at the first frame where every retained sample lies
/// within `stability_threshold` of the current centroid and the current
/// in-threshold run has lasted `stability_duration`. Any excursion beyond
/// the threshold collapses the history to the current sample and restarts
/// the window.
pub struct StabilityTracker {
    stability_threshold: f64,
    stability_duration: Duration,
    grace_period: Duration,
    markers: HashMap<MarkerId, TrackedMarker>,
}

impl StabilityTracker {
    /// Create a tracker. The caller validates the configuration values;
    /// see `BridgeConfig::validate`.
    pub fn new(
        stability_threshold: f64,
        stability_duration: Duration,
        grace_period: Duration,
    ) -> Self {
        Self {
            stability_threshold,
            stability_duration,
            grace_period,
            markers: HashMap::new(),
        }
    }

    /// Create a tracker from a validated bridge configuration.
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(
            config.stability_threshold,
            config.stability_duration(),
            config.grace_period(),
        )
    }

    /// Record one sighting of a marker. Returns `true` exactly when this
    /// observation completes a stability window — the "became stable"
    /// transition.
    pub fn observe(&mut self, id: MarkerId, centroid: Point, now: Instant) -> bool {
        let marker = match self.markers.get_mut(&id) {
            Some(marker) => marker,
            None => {
                self.markers.insert(id, TrackedMarker::first_seen(centroid, now));
                return false;
            }
        };

        marker.last_seen = now;
        if marker.state == TrackState::Searching {
            // Back after a long absence — start a fresh window
            marker.state = TrackState::Candidate;
            marker.candidate_since = now;
        }
        marker.history.push_back((centroid, now));
        let window = self.stability_duration;
        while let Some(&(_, t)) = marker.history.front() {
            if now.duration_since(t) > window {
                marker.history.pop_front();
            } else {
                break;
            }
        }

        let max_displacement = marker
            .history
            .iter()
            .map(|(p, _)| p.distance(&centroid))
            .fold(0.0_f64, f64::max);

        if max_displacement > self.stability_threshold {
            // Moved: restart the window from the current sample
            marker.history.clear();
            marker.history.push_back((centroid, now));
            marker.candidate_since = now;
            marker.stable_since = None;
            if marker.state == TrackState::Stable {
                debug!(marker = %id, "marker no longer stable");
            }
            marker.state = TrackState::Candidate;
            return false;
        }

        if now.duration_since(marker.candidate_since) >= self.stability_duration
            && marker.state != TrackState::Stable
            && !marker.triggered
        {
            marker.state = TrackState::Stable;
            marker.stable_since = Some(now);
            debug!(marker = %id, "marker became stable");
            return true;
        }

        false
    }

    /// Process markers missing from the current frame. A gap longer than
    /// the grace period reverts the marker to Searching and clears its
    /// history; shorter gaps keep accumulated stability progress so
    /// detector flicker does not restart the window.
    pub fn mark_absent(&mut self, visible: &HashSet<MarkerId>, now: Instant) {
        for (id, marker) in self.markers.iter_mut() {
            if visible.contains(id) {
                continue;
            }
            if marker.state == TrackState::Searching {
                continue;
            }
            if now.duration_since(marker.last_seen) > self.grace_period {
                debug!(marker = %id, "marker lost, reverting to searching");
                marker.lose();
            }
        }
    }

    /// Process one full frame: observe every visible marker, then apply
    /// absence handling to the rest. Returns the ids that became stable on
    /// this frame.
    pub fn track_frame(&mut self, observations: &[MarkerObservation], now: Instant) -> Vec<MarkerId> {
        let mut became_stable = Vec::new();
        let mut visible = HashSet::with_capacity(observations.len());
        for obs in observations {
            visible.insert(obs.id);
            if self.observe(obs.id, obs.centroid, now) {
                became_stable.push(obs.id);
            }
        }
        self.mark_absent(&visible, now);
        became_stable
    }

    /// Latch the Triggered state for a marker. Returns `false` if the
    /// marker is unknown or already triggered — the caller's at-most-once
    /// guarantee rests on this.
    pub fn latch_triggered(&mut self, id: MarkerId) -> bool {
        match self.markers.get_mut(&id) {
            Some(marker) if !marker.triggered => {
                marker.triggered = true;
                true
            }
            _ => false,
        }
    }

    /// Clear one marker's triggered latch and motion state, re-enabling
    /// triggering without requiring physical marker removal. Idempotent.
    pub fn reset(&mut self, id: MarkerId) {
        if let Some(marker) = self.markers.get_mut(&id) {
            marker.triggered = false;
            marker.lose();
        }
    }

    /// Clear every marker's triggered latch and motion state.
    pub fn reset_all(&mut self) {
        for marker in self.markers.values_mut() {
            marker.triggered = false;
            marker.lose();
        }
    }

    /// Current lifecycle state of a marker, if it has ever been seen.
    pub fn state(&self, id: MarkerId) -> Option<TrackState> {
        self.markers.get(&id).map(TrackedMarker::effective_state)
    }

    /// Number of markers ever seen (bounded by the id space of the
    /// fiducial dictionary, so no eviction is needed).
    pub fn tracked_count(&self) -> usize {
        self.markers.len()
    }
}
