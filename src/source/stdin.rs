use std::io::BufRead;

use serde::Deserialize;

use crate::source::{FrameSource, Result, SourceError};
use crate::types::{MarkerId, MarkerObservation, Point};

/// One detected marker as reported by the external detector process.
#[derive(Debug, Deserialize)]
struct DetectedMarker {
    id: u32,
    x: f64,
    y: f64,
}

/// One frame's detection results.
#[derive(Debug, Deserialize)]
struct FrameLine {
    #[serde(default)]
    markers: Vec<DetectedMarker>,
}

/// Frame source reading JSON lines from a detector process.
///
/// Expected shape, one object per line:
/// `{"markers":[{"id":5,"x":100.0,"y":100.0}]}`
///
/// The detector is expected to emit a line per frame, so each read blocks
/// at most one frame interval. A malformed line is a sensor fault, not a
/// stream-terminating error.
pub struct LineSource<R: BufRead> {
    reader: R,
    line: String,
}

impl<R: BufRead> LineSource<R> {
    /// Wrap any buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
        }
    }
}

/// `LineSource` over the process's stdin.
pub type StdinSource = LineSource<std::io::BufReader<std::io::Stdin>>;

impl StdinSource {
    /// Create a source reading from stdin.
    pub fn from_stdin() -> Self {
        LineSource::new(std::io::BufReader::new(std::io::stdin()))
    }
}

impl<R: BufRead + Send> FrameSource for LineSource<R> {
    fn next_frame(&mut self) -> Result<Vec<MarkerObservation>> {
        self.line.clear();
        let read = self
            .reader
            .read_line(&mut self.line)
            .map_err(|e| SourceError::Capture(e.to_string()))?;
        if read == 0 {
            return Err(SourceError::Exhausted);
        }
        let trimmed = self.line.trim();
        if trimmed.is_empty() {
            return Ok(vec![]);
        }
        let frame: FrameLine = serde_json::from_str(trimmed)
            .map_err(|e| SourceError::Capture(format!("malformed frame line: {e}")))?;
        Ok(frame
            .markers
            .into_iter()
            .map(|m| MarkerObservation::new(MarkerId::new(m.id), Point::new(m.x, m.y)))
            .collect())
    }
}
