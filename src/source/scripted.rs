use std::time::{Duration, Instant};

use crate::source::{FrameSource, Result, SourceError};
use crate::types::{MarkerId, MarkerObservation, Point};

/// A fake frame source for testing and demos without a camera.
///
/// Replays a pre-built list of frames. With pacing enabled, each
/// `next_frame` call sleeps until the next frame boundary so downstream
/// timing behaves like a real camera; tests disable pacing and drive time
/// themselves.
pub struct ScriptedSource {
    frames: Vec<Vec<MarkerObservation>>,
    cursor: usize,
    frame_interval: Option<Duration>,
    next_due: Option<Instant>,
}

impl ScriptedSource {
    /// Create a source replaying `frames` as fast as the caller polls.
    pub fn new(frames: Vec<Vec<MarkerObservation>>) -> Self {
        Self {
            frames,
            cursor: 0,
            frame_interval: None,
            next_due: None,
        }
    }

    /// Pace frame delivery at a fixed rate.
    pub fn with_fps(mut self, fps: f64) -> Self {
        self.frame_interval = Some(Duration::from_secs_f64(1.0 / fps));
        self
    }

    /// Build the demo script: one marker holding still long enough to
    /// trigger, then wandering off.
    pub fn demo(id: u32) -> Self {
        let mut frames = Vec::new();
        // ~3s stationary at (320, 240)
        for _ in 0..90 {
            frames.push(vec![MarkerObservation::new(
                MarkerId::new(id),
                Point::new(320.0, 240.0),
            )]);
        }
        // Drift away
        for i in 0..30 {
            frames.push(vec![MarkerObservation::new(
                MarkerId::new(id),
                Point::new(320.0 + f64::from(i) * 8.0, 240.0),
            )]);
        }
        // Gone
        for _ in 0..30 {
            frames.push(vec![]);
        }
        Self::new(frames).with_fps(30.0)
    }

    /// Number of frames remaining in the script.
    pub fn remaining(&self) -> usize {
        self.frames.len().saturating_sub(self.cursor)
    }
}

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self) -> Result<Vec<MarkerObservation>> {
        if let Some(interval) = self.frame_interval {
            let now = Instant::now();
            let due = self.next_due.unwrap_or(now);
            if due > now {
                std::thread::sleep(due - now);
            }
            self.next_due = Some(due.max(now) + interval);
        }

        let frame = self
            .frames
            .get(self.cursor)
            .cloned()
            .ok_or(SourceError::Exhausted)?;
        self.cursor += 1;
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(id: u32, x: f64, y: f64) -> MarkerObservation {
        MarkerObservation::new(MarkerId::new(id), Point::new(x, y))
    }

    #[test]
    fn replays_frames_in_order() {
        let mut source = ScriptedSource::new(vec![
            vec![obs(1, 10.0, 10.0)],
            vec![obs(1, 11.0, 10.0), obs(2, 50.0, 50.0)],
        ]);
        assert_eq!(source.next_frame().unwrap(), vec![obs(1, 10.0, 10.0)]);
        assert_eq!(source.next_frame().unwrap().len(), 2);
    }

    #[test]
    fn exhausted_after_last_frame() {
        let mut source = ScriptedSource::new(vec![vec![]]);
        source.next_frame().unwrap();
        assert!(matches!(source.next_frame(), Err(SourceError::Exhausted)));
    }

    #[test]
    fn remaining_counts_down() {
        let mut source = ScriptedSource::new(vec![vec![], vec![], vec![]]);
        assert_eq!(source.remaining(), 3);
        source.next_frame().unwrap();
        assert_eq!(source.remaining(), 2);
    }

    #[test]
    fn unpaced_source_does_not_sleep() {
        let mut source = ScriptedSource::new(vec![vec![]; 100]);
        let start = Instant::now();
        while source.next_frame().is_ok() {}
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn paced_source_spaces_frames() {
        let mut source = ScriptedSource::new(vec![vec![]; 4]).with_fps(100.0);
        let start = Instant::now();
        while source.next_frame().is_ok() {}
        // 4 frames at 10ms intervals: the last three each wait their turn
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn demo_script_holds_then_drifts() {
        let mut source = ScriptedSource::demo(7);
        source.frame_interval = None;
        let first = source.next_frame().unwrap();
        assert_eq!(first[0].id, MarkerId::new(7));
        assert_eq!(first[0].centroid, Point::new(320.0, 240.0));
        // Skip to the drift section
        for _ in 0..89 {
            source.next_frame().unwrap();
        }
        let drifting = source.next_frame().unwrap();
        assert_eq!(drifting[0].centroid, Point::new(320.0, 240.0));
        let drifting = source.next_frame().unwrap();
        assert!(drifting[0].centroid.x > 320.0);
    }
}
