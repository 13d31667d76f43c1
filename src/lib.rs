//! Marker bridge: watches a stream of fiducial-marker detections and
//! fires a single trigger when a registered target marker holds still
//! long enough.
//!
//! The core is split along the two clocks involved: the frame loop
//! ([`bridge`], [`tracking`], [`source`]) runs on its own thread at camera
//! rate, while the message channel ([`channel`]) runs on the async runtime
//! and keeps a reconnecting WebSocket link to the control server that
//! supplies target ids. They meet in the shared [`registry`] and a bounded
//! trigger queue.

pub mod bridge;
pub mod channel;
pub mod config;
pub mod diagnostics;
pub mod registry;
pub mod source;
pub mod tracking;
pub mod types;

pub use bridge::{Bridge, BridgeError, BridgeHandle};
pub use config::BridgeConfig;
pub use registry::TargetRegistry;
pub use source::FrameSource;
pub use tracking::stability::StabilityTracker;
pub use types::{MarkerId, MarkerObservation, Point, TriggerEvent};
