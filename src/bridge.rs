use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::channel::client::MessageChannel;
use crate::config::{BridgeConfig, ConfigError};
use crate::diagnostics::BridgeStats;
use crate::registry::TargetRegistry;
use crate::source::{FrameSource, SourceError};
use crate::tracking::stability::StabilityTracker;
use crate::tracking::trigger::{ActionRouter, TriggerAction, TriggerCoordinator};
use crate::types::MarkerId;

/// Depth of the trigger handoff queue between the frame loop and the
/// message channel. Triggers are rare (one per marker per episode), so a
/// small buffer is plenty; overflow drops with a warning.
const TRIGGER_QUEUE_DEPTH: usize = 32;

/// How often the frame loop logs a stats snapshot.
const STATS_INTERVAL: Duration = Duration::from_secs(10);

/// Bridge startup errors.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to spawn tracking thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// User-interrupt commands routed into the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Re-enable triggering for every marker.
    ResetAll,
    /// Remove one target and re-enable its triggering.
    Clear(MarkerId),
    /// Stop both loops and release resources.
    Shutdown,
}

/// Cloneable handle for steering a running bridge from outside the loops.
#[derive(Clone)]
pub struct BridgeHandle {
    control: Sender<ControlCommand>,
    stop: Arc<AtomicBool>,
}

impl BridgeHandle {
    /// Re-enable triggering for all markers without touching the registry.
    pub fn reset_all(&self) {
        let _ = self.control.send(ControlCommand::ResetAll);
    }

    /// Remove one target and clear its triggered latch.
    pub fn clear(&self, id: MarkerId) {
        let _ = self.control.send(ControlCommand::Clear(id));
    }

    /// Request shutdown. Both loops exit within one iteration.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::Relaxed);
        let _ = self.control.send(ControlCommand::Shutdown);
    }
}

/// Wires the frame loop, stability tracker, trigger coordinator, and
/// message channel together.
///
/// The frame loop runs on a dedicated named thread at camera rate; the
/// message channel runs as a task on the async runtime. They share only
/// the target registry (channel writes, loop reads) and the bounded
/// trigger queue (loop sends, channel drains).
pub struct Bridge {
    config: BridgeConfig,
    registry: Arc<TargetRegistry>,
    actions: ActionRouter,
    control_rx: Receiver<ControlCommand>,
    stop: Arc<AtomicBool>,
}

impl Bridge {
    /// Create a bridge and its control handle.
    pub fn new(config: BridgeConfig) -> (Self, BridgeHandle) {
        let (control_tx, control_rx) = std::sync::mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let handle = BridgeHandle {
            control: control_tx,
            stop: Arc::clone(&stop),
        };
        let bridge = Self {
            config,
            registry: Arc::new(TargetRegistry::new()),
            actions: ActionRouter::new(),
            control_rx,
            stop,
        };
        (bridge, handle)
    }

    /// Shared registry handle, mainly for tests and embedding callers.
    pub fn registry(&self) -> Arc<TargetRegistry> {
        Arc::clone(&self.registry)
    }

    /// Register a handler invoked on every trigger.
    pub fn register_action(&mut self, action: Arc<dyn TriggerAction>) {
        self.actions.register(action);
    }

    /// Register a handler for one specific marker id.
    pub fn register_action_for(&mut self, id: MarkerId, action: Arc<dyn TriggerAction>) {
        self.actions.register_for(id, action);
    }

    /// Run until the source is exhausted or shutdown is requested.
    ///
    /// Owns teardown on every exit path: the frame thread is joined, the
    /// channel task is cancelled and awaited.
    pub async fn run(self, source: impl FrameSource + 'static) -> Result<(), BridgeError> {
        self.config.validate()?;

        let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_QUEUE_DEPTH);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let channel = MessageChannel::new(
            &self.config,
            Arc::clone(&self.registry),
            trigger_rx,
            shutdown_rx,
        );
        let channel_task = tokio::spawn(channel.run());

        let tracker = StabilityTracker::from_config(&self.config);
        let coordinator =
            TriggerCoordinator::new(Arc::clone(&self.registry), trigger_tx, self.actions);
        let registry = Arc::clone(&self.registry);
        let control_rx = self.control_rx;
        let stop = Arc::clone(&self.stop);

        let frame_thread = std::thread::Builder::new()
            .name("frame-loop".to_string())
            .spawn(move || run_frame_loop(source, tracker, coordinator, registry, control_rx, stop))?;

        // Wait for the frame loop without blocking the runtime
        match tokio::task::spawn_blocking(move || frame_thread.join()).await {
            Ok(Ok(stats)) => {
                let snap = stats.snapshot();
                info!(
                    frames = snap.frame_count,
                    triggers = snap.trigger_count,
                    "tracking loop finished"
                );
            }
            _ => error!("tracking loop panicked"),
        }

        // Frame loop is done; take the channel down too
        let _ = shutdown_tx.send(true);
        if channel_task.await.is_err() {
            error!("message channel task panicked");
        }
        Ok(())
    }
}

/// The capture/detect/track loop. Runs at frame rate until the source is
/// exhausted or shutdown is requested, and returns the final counters.
fn run_frame_loop(
    mut source: impl FrameSource,
    mut tracker: StabilityTracker,
    coordinator: TriggerCoordinator,
    registry: Arc<TargetRegistry>,
    control: Receiver<ControlCommand>,
    stop: Arc<AtomicBool>,
) -> BridgeStats {
    let mut stats = BridgeStats::new();
    let mut last_report = Instant::now();
    info!("tracking loop started");

    loop {
        // Drain pending control commands before the (possibly blocking)
        // frame read
        loop {
            match control.try_recv() {
                Ok(ControlCommand::ResetAll) => {
                    info!("reset-all: re-enabling every trigger");
                    coordinator.reset(&mut tracker, None);
                }
                Ok(ControlCommand::Clear(id)) => {
                    info!(marker = %id, "clearing target");
                    registry.clear(id);
                    coordinator.reset(&mut tracker, Some(id));
                }
                Ok(ControlCommand::Shutdown) => {
                    stop.store(true, Ordering::Relaxed);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        if stop.load(Ordering::Relaxed) {
            info!("tracking loop stopping on shutdown request");
            break;
        }

        let now = Instant::now();
        match source.next_frame() {
            Ok(frame) => {
                stats.record_frame(frame.len());
                for id in tracker.track_frame(&frame, now) {
                    stats.record_stable();
                    if coordinator.on_became_stable(&mut tracker, id).is_some() {
                        stats.record_trigger();
                    }
                }
            }
            Err(SourceError::Capture(e)) => {
                warn!("sensor fault, treating frame as empty: {e}");
                stats.record_sensor_fault();
                tracker.track_frame(&[], now);
            }
            Err(SourceError::Exhausted) => {
                info!("frame source exhausted, stopping");
                break;
            }
        }

        if last_report.elapsed() >= STATS_INTERVAL {
            let snap = stats.snapshot();
            info!(
                fps = format!("{:.1}", snap.fps),
                frames = snap.frame_count,
                observations = snap.observation_count,
                triggers = snap.trigger_count,
                "tracking stats"
            );
            last_report = Instant::now();
        }
    }

    stats
}
