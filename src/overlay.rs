//! Pose overlay rendering.
//!
//! Draws a skeletal line/point overlay for one frame's keypoint set onto an
//! RGBA canvas kept separate from the frame itself. The renderer is a pure
//! sink: it holds no state beyond the canvas and the enabled toggle, and it
//! never gates or blocks the detection path.
//!
//! An edge is drawn only when both endpoint landmarks clear the visibility
//! threshold; a marker is drawn at every landmark clearing the threshold.
//! The canvas is fully cleared before each draw, and cleared again (with no
//! drawing) when overlays are disabled.

use image::{Rgba, RgbaImage};

use crate::frame::KeypointSet;

/// Minimum landmark visibility before an edge or marker is drawn.
pub const VISIBILITY_THRESHOLD: f32 = 0.5;

const EDGE_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);
const MARKER_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
const MARKER_RADIUS: i32 = 3;

/// Skeletal edges over the 33-landmark body topology, as index pairs.
pub const POSE_CONNECTIONS: &[(usize, usize)] = &[
    // Head
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 7),
    (0, 4),
    (4, 5),
    (5, 6),
    (6, 8),
    (9, 10),
    // Torso
    (11, 12),
    (11, 23),
    (12, 24),
    (23, 24),
    // Arms
    (11, 13),
    (13, 15),
    (15, 17),
    (15, 19),
    (15, 21),
    (17, 19),
    (12, 14),
    (14, 16),
    (16, 18),
    (16, 20),
    (16, 22),
    (18, 20),
    // Legs
    (23, 25),
    (24, 26),
    (25, 27),
    (26, 28),
    (27, 29),
    (28, 30),
    (29, 31),
    (30, 32),
];

/// Overlay renderer for one video surface.
pub struct PoseOverlay {
    canvas: RgbaImage,
    enabled: bool,
    draws: u64,
}

impl PoseOverlay {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: RgbaImage::new(width, height),
            enabled: true,
            draws: 0,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.clear();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of completed draw passes. Used by health logging and tests.
    pub fn draw_count(&self) -> u64 {
        self.draws
    }

    /// Resize the canvas to track the source dimensions. Clears it.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.canvas.width() != width || self.canvas.height() != height {
            self.canvas = RgbaImage::new(width, height);
        }
    }

    /// Clear the canvas to fully transparent.
    pub fn clear(&mut self) {
        for px in self.canvas.pixels_mut() {
            *px = Rgba([0, 0, 0, 0]);
        }
    }

    /// Render one keypoint set. Clears first; skips drawing when disabled.
    pub fn render(&mut self, keypoints: &KeypointSet) {
        self.clear();
        if !self.enabled {
            return;
        }

        let (w, h) = (self.canvas.width() as f32, self.canvas.height() as f32);

        for &(a, b) in POSE_CONNECTIONS {
            let (Some(start), Some(end)) = (keypoints.get(a), keypoints.get(b)) else {
                continue;
            };
            if !start.is_visible(VISIBILITY_THRESHOLD) || !end.is_visible(VISIBILITY_THRESHOLD) {
                continue;
            }
            self.draw_line(
                (start.x * w) as i32,
                (start.y * h) as i32,
                (end.x * w) as i32,
                (end.y * h) as i32,
            );
        }

        for kp in keypoints.iter() {
            if kp.is_visible(VISIBILITY_THRESHOLD) {
                self.draw_marker((kp.x * w) as i32, (kp.y * h) as i32);
            }
        }

        self.draws += 1;
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    fn put(&mut self, x: i32, y: i32, color: Rgba<u8>) {
        if x >= 0 && y >= 0 && (x as u32) < self.canvas.width() && (y as u32) < self.canvas.height()
        {
            self.canvas.put_pixel(x as u32, y as u32, color);
        }
    }

    // Bresenham; the canvas is small enough that per-pixel puts are fine.
    fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let (mut x, mut y) = (x0, y0);
        loop {
            self.put(x, y, EDGE_COLOR);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    fn draw_marker(&mut self, cx: i32, cy: i32) {
        for dy in -MARKER_RADIUS..=MARKER_RADIUS {
            for dx in -MARKER_RADIUS..=MARKER_RADIUS {
                if dx * dx + dy * dy <= MARKER_RADIUS * MARKER_RADIUS {
                    self.put(cx + dx, cy + dy, MARKER_COLOR);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Keypoint;

    fn visible_pair() -> KeypointSet {
        // Landmarks 0 and 1 are connected in the table.
        let mut points = vec![Keypoint::default(); 33];
        points[0] = Keypoint::new(0.25, 0.25).with_visibility(0.9);
        points[1] = Keypoint::new(0.75, 0.75).with_visibility(0.9);
        KeypointSet::new(points)
    }

    fn painted_pixels(overlay: &PoseOverlay) -> usize {
        overlay.canvas().pixels().filter(|p| p.0[3] != 0).count()
    }

    #[test]
    fn renders_visible_edges_and_markers() {
        let mut overlay = PoseOverlay::new(64, 64);
        overlay.render(&visible_pair());
        assert!(painted_pixels(&overlay) > 0);
        assert_eq!(overlay.draw_count(), 1);
    }

    #[test]
    fn low_visibility_landmarks_are_skipped() {
        let mut points = vec![Keypoint::default(); 33];
        points[0] = Keypoint::new(0.25, 0.25).with_visibility(0.4);
        points[1] = Keypoint::new(0.75, 0.75).with_visibility(0.4);

        let mut overlay = PoseOverlay::new(64, 64);
        overlay.render(&KeypointSet::new(points));
        assert_eq!(painted_pixels(&overlay), 0);
    }

    #[test]
    fn previous_overlay_is_cleared_before_draw() {
        let mut overlay = PoseOverlay::new(64, 64);
        overlay.render(&visible_pair());
        // Second pass with nothing visible must leave a blank canvas.
        overlay.render(&KeypointSet::default());
        assert_eq!(painted_pixels(&overlay), 0);
    }

    #[test]
    fn disabled_overlay_clears_and_skips() {
        let mut overlay = PoseOverlay::new(64, 64);
        overlay.render(&visible_pair());
        assert!(painted_pixels(&overlay) > 0);

        overlay.set_enabled(false);
        assert_eq!(painted_pixels(&overlay), 0);

        overlay.render(&visible_pair());
        assert_eq!(painted_pixels(&overlay), 0);
        assert_eq!(overlay.draw_count(), 1);
    }
}
