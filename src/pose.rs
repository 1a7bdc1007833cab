//! Pose estimation seam.
//!
//! Pose estimation is an opaque external capability: the pipeline only
//! needs a keypoint set per frame to feed the overlay renderer. Estimators
//! implement `PoseEstimator`; a missing or failed estimator degrades the
//! overlay to nothing and must never suppress detection sampling.

use anyhow::Result;

use crate::frame::{Frame, Keypoint, KeypointSet};

pub trait PoseEstimator: Send {
    /// Estimate landmarks for one frame. `None` means no person in view.
    fn estimate(&mut self, frame: &Frame) -> Result<Option<KeypointSet>>;
}

/// Stub estimator producing a deterministic standing figure with a slight
/// sway, for demos and tests. Landmark indices follow the 33-point body
/// topology the overlay's connectivity table expects.
pub struct StubPoseEstimator {
    tick: u64,
}

impl StubPoseEstimator {
    pub fn new() -> Self {
        Self { tick: 0 }
    }
}

impl Default for StubPoseEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl PoseEstimator for StubPoseEstimator {
    fn estimate(&mut self, _frame: &Frame) -> Result<Option<KeypointSet>> {
        self.tick += 1;
        // Sway the figure a little so consecutive overlays differ.
        let sway = ((self.tick % 20) as f32 - 10.0) / 200.0;

        let mut points = vec![Keypoint::default(); 33];
        let mut place = |index: usize, x: f32, y: f32| {
            points[index] = Keypoint::new(x + sway, y).with_visibility(0.9);
        };

        place(0, 0.50, 0.15); // nose
        place(11, 0.42, 0.30); // left shoulder
        place(12, 0.58, 0.30); // right shoulder
        place(13, 0.38, 0.42); // left elbow
        place(14, 0.62, 0.42); // right elbow
        place(15, 0.36, 0.54); // left wrist
        place(16, 0.64, 0.54); // right wrist
        place(23, 0.44, 0.55); // left hip
        place(24, 0.56, 0.55); // right hip
        place(25, 0.44, 0.72); // left knee
        place(26, 0.56, 0.72); // right knee
        place(27, 0.44, 0.90); // left ankle
        place(28, 0.56, 0.90); // right ankle

        Ok(Some(KeypointSet::new(points)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_estimator_emits_full_topology() {
        let frame = Frame::new(vec![0u8; 4 * 4 * 3], 4, 4, 0);
        let mut estimator = StubPoseEstimator::new();
        let keypoints = estimator.estimate(&frame).unwrap().unwrap();
        assert_eq!(keypoints.len(), 33);
        assert!(keypoints.get(11).unwrap().is_visible(0.5));
    }
}
