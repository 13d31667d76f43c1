use serde::Serialize;
use std::time::Instant;

/// Counters for one run of the tracking loop.
///
/// Owned by the frame loop (single writer); snapshots are taken for
/// periodic log lines.
pub struct BridgeStats {
    frame_count: u64,
    observation_count: u64,
    sensor_fault_count: u64,
    stable_count: u64,
    trigger_count: u64,
    start_time: Instant,
}

/// Serialisable snapshot of the bridge counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub fps: f64,
    pub frame_count: u64,
    pub observation_count: u64,
    pub sensor_fault_count: u64,
    pub stable_count: u64,
    pub trigger_count: u64,
}

impl BridgeStats {
    /// Create new stats with zeroed counters.
    pub fn new() -> Self {
        Self {
            frame_count: 0,
            observation_count: 0,
            sensor_fault_count: 0,
            stable_count: 0,
            trigger_count: 0,
            start_time: Instant::now(),
        }
    }

    /// Record one processed frame with its number of marker sightings.
    pub fn record_frame(&mut self, observations: usize) {
        self.frame_count += 1;
        self.observation_count += observations as u64;
    }

    /// Record a frame lost to a sensor fault.
    pub fn record_sensor_fault(&mut self) {
        self.sensor_fault_count += 1;
    }

    /// Record a "became stable" transition.
    pub fn record_stable(&mut self) {
        self.stable_count += 1;
    }

    /// Record an emitted trigger event.
    pub fn record_trigger(&mut self) {
        self.trigger_count += 1;
    }

    /// Frames per second since the stats were created.
    pub fn fps(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0.0;
        }
        self.frame_count as f64 / elapsed
    }

    /// Take a serialisable snapshot.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            fps: self.fps(),
            frame_count: self.frame_count,
            observation_count: self.observation_count,
            sensor_fault_count: self.sensor_fault_count,
            stable_count: self.stable_count,
            trigger_count: self.trigger_count,
        }
    }
}

impl Default for BridgeStats {
    fn default() -> Self {
        Self::new()
    }
}
