use std::collections::VecDeque;

use dashmap::DashMap;

use super::landmarks::LandmarkFrame;

/// Per-connection sliding windows of recent landmark frames.
///
/// Each connection owns its own bounded FIFO, so concurrent connections
/// sending video never see each other's frames, even under one user id.
#[derive(Debug)]
pub struct GestureWindows {
    windows: DashMap<String, VecDeque<LandmarkFrame>>,
    capacity: usize,
    min_frames: usize,
}

impl GestureWindows {
    pub fn new(capacity: usize, min_frames: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            windows: DashMap::new(),
            capacity,
            min_frames: min_frames.clamp(1, capacity),
        }
    }

    /// Append a frame, evicting the oldest beyond capacity.
    ///
    /// Returns a snapshot of the window, oldest first, once it holds at least
    /// `min_frames` frames.
    pub fn push(&self, conn_id: &str, frame: LandmarkFrame) -> Option<Vec<LandmarkFrame>> {
        let mut window = self
            .windows
            .entry(conn_id.to_string())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));
        window.push_back(frame);
        while window.len() > self.capacity {
            window.pop_front();
        }
        (window.len() >= self.min_frames).then(|| window.iter().cloned().collect())
    }

    pub fn len(&self, conn_id: &str) -> usize {
        self.windows.get(conn_id).map_or(0, |w| w.len())
    }

    /// Empty a connection's window but keep tracking it.
    pub fn clear(&self, conn_id: &str) {
        if let Some(mut window) = self.windows.get_mut(conn_id) {
            window.clear();
        }
    }

    /// Forget a connection entirely.
    pub fn remove(&self, conn_id: &str) {
        self.windows.remove(conn_id);
    }

    /// Number of connections with a tracked window.
    pub fn connection_count(&self) -> usize {
        self.windows.len()
    }
}

/// Coarse movement between two frames: the sum of `|dx| + |dy|` over
/// corresponding points of corresponding hands. Hands whose point counts
/// differ are skipped.
pub fn movement(first: &LandmarkFrame, last: &LandmarkFrame) -> f32 {
    first
        .iter()
        .zip(last)
        .filter(|(a, b)| a.points.len() == b.points.len())
        .flat_map(|(a, b)| a.points.iter().zip(&b.points))
        .map(|(p, q)| (p.x - q.x).abs() + (p.y - q.y).abs())
        .sum()
}
