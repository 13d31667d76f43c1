use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::registry::TargetRegistry;
use crate::tracking::stability::StabilityTracker;
use crate::types::{MarkerId, TriggerEvent};

/// Action invoked when a target marker triggers.
///
/// Concrete handlers are supplied by the embedding application — the
/// coordinator never needs to change when a new action is added.
pub trait TriggerAction: Send + Sync {
    fn on_trigger(&self, event: &TriggerEvent);
}

/// Blanket impl so plain closures can be registered as actions.
impl<F> TriggerAction for F
where
    F: Fn(&TriggerEvent) + Send + Sync,
{
    fn on_trigger(&self, event: &TriggerEvent) {
        self(event)
    }
}

/// Routes trigger events to registered handlers: an optional per-marker
/// handler plus any number of generic handlers that see every trigger.
#[derive(Default)]
pub struct ActionRouter {
    per_marker: HashMap<MarkerId, Arc<dyn TriggerAction>>,
    generic: Vec<Arc<dyn TriggerAction>>,
}

impl ActionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one specific marker id, replacing any
    /// previous handler for that id.
    pub fn register_for(&mut self, id: MarkerId, action: Arc<dyn TriggerAction>) {
        self.per_marker.insert(id, action);
    }

    /// Register a handler that receives every trigger.
    pub fn register(&mut self, action: Arc<dyn TriggerAction>) {
        self.generic.push(action);
    }

    /// Dispatch an event to the matching per-marker handler and all
    /// generic handlers.
    pub fn dispatch(&self, event: &TriggerEvent) {
        if let Some(action) = self.per_marker.get(&event.marker_id) {
            action.on_trigger(event);
        }
        for action in &self.generic {
            action.on_trigger(event);
        }
    }
}

/// Turns "became stable" transitions into at-most-one trigger per marker
/// per episode.
///
/// Filtering order matters: registry membership is checked first (a stable
/// non-target is simply not interesting), then the Triggered latch is
/// taken atomically from the tracker, so repeated stable transitions are
/// silent no-ops rather than errors.
pub struct TriggerCoordinator {
    registry: Arc<TargetRegistry>,
    outbound: mpsc::Sender<TriggerEvent>,
    actions: ActionRouter,
}

impl TriggerCoordinator {
    pub fn new(
        registry: Arc<TargetRegistry>,
        outbound: mpsc::Sender<TriggerEvent>,
        actions: ActionRouter,
    ) -> Self {
        Self {
            registry,
            outbound,
            actions,
        }
    }

    /// Handle a marker that just completed a stability window. Returns the
    /// emitted event, or `None` when the marker is not a target or has
    /// already fired this episode.
    pub fn on_became_stable(
        &self,
        tracker: &mut StabilityTracker,
        id: MarkerId,
    ) -> Option<TriggerEvent> {
        let payload = match self.registry.get(id) {
            Some(payload) => payload,
            None => {
                debug!(marker = %id, "stable marker is not a registered target");
                return None;
            }
        };

        if !tracker.latch_triggered(id) {
            // Already fired this episode
            return None;
        }

        let event = TriggerEvent::now(id, payload);
        info!(marker = %id, "marker triggered");

        // Best-effort handoff to the message channel. The frame loop must
        // never block on network I/O; a full or closed channel drops the
        // event, which is tolerable because the marker can re-trigger
        // after a reset.
        if let Err(e) = self.outbound.try_send(event.clone()) {
            warn!(marker = %id, "dropping trigger confirmation: {e}");
        }

        self.actions.dispatch(&event);
        Some(event)
    }

    /// Re-enable triggering for one marker, or for all markers when `id`
    /// is `None`. Idempotent.
    pub fn reset(&self, tracker: &mut StabilityTracker, id: Option<MarkerId>) {
        match id {
            Some(id) => tracker.reset(id),
            None => tracker.reset_all(),
        }
    }
}
