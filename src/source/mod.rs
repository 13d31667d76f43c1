// Frame source seam — detection happens outside this crate.

pub mod scripted;
pub mod stdin;

use thiserror::Error;

use crate::types::MarkerObservation;

/// Frame source errors.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Transient sensor fault — the caller logs it and treats the frame as
    /// an empty observation set.
    #[error("frame capture failed: {0}")]
    Capture(String),

    /// The source has no more frames to deliver (end of script, stdin EOF).
    #[error("frame source exhausted")]
    Exhausted,
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, SourceError>;

/// Capability consumed from the detector collaborator.
///
/// One call per loop iteration; the implementation may block up to one
/// frame interval. Returns the set of markers visible in the current frame
/// with their image-plane centroids.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Vec<MarkerObservation>>;
}
