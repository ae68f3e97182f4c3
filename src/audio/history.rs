// Copyright © 2025 Jocelyn Turcotte <turcotte.j@gmail.com>
// SPDX-License-Identifier: MIT

use super::AudioFrame;

/// The most recent `capacity` frames, oldest first.
///
/// Storage is allocated once. Pushing into a full window evicts the oldest frame,
/// so the trace always covers the last `samples_per_frame * persistence` samples.
pub struct HistoryWindow {
    frames: Box<[AudioFrame]>,
    start: usize,
    count: usize,
}

impl HistoryWindow {
    pub fn new(capacity: usize) -> HistoryWindow {
        assert!(capacity > 0, "history capacity must be non-zero");
        HistoryWindow {
            frames: vec![AudioFrame::default(); capacity].into_boxed_slice(),
            start: 0,
            count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn push(&mut self, frame: AudioFrame) {
        if self.count == self.capacity() {
            self.drop_oldest(1);
        }
        let end = (self.start + self.count) % self.capacity();
        self.frames[end] = frame;
        self.count += 1;
    }

    /// Evicts the `n` oldest frames, or everything if fewer are held.
    pub fn drop_oldest(&mut self, n: usize) {
        let n = n.min(self.count);
        self.start = (self.start + n) % self.capacity();
        self.count -= n;
    }

    /// Appends a batch, evicting as many old frames as needed in a single step.
    /// Only the last `capacity` frames of an oversized batch are kept.
    pub fn extend_from_slice(&mut self, frames: &[AudioFrame]) {
        let frames = &frames[frames.len().saturating_sub(self.capacity())..];
        let overflow = (self.count + frames.len()).saturating_sub(self.capacity());
        self.drop_oldest(overflow);
        for frame in frames {
            self.push(*frame);
        }
    }

    /// Frame `i` counting from the oldest.
    pub fn get(&self, i: usize) -> Option<AudioFrame> {
        (i < self.count).then(|| self.frames[(self.start + i) % self.capacity()])
    }

    pub fn iter(&self) -> impl Iterator<Item = AudioFrame> + '_ {
        (0..self.count).filter_map(move |i| self.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(v: f32) -> AudioFrame {
        AudioFrame { left: v, right: -v }
    }

    #[test]
    fn keeps_arrival_order_across_wrap() {
        let mut history = HistoryWindow::new(4);
        for i in 0..10 {
            history.push(frame(i as f32));
            assert!(history.count() <= history.capacity());
        }
        let lefts: Vec<f32> = history.iter().map(|f| f.left).collect();
        assert_eq!(lefts, vec![6.0, 7.0, 8.0, 9.0]);
        assert_eq!(history.get(0), Some(frame(6.0)));
        assert_eq!(history.get(3), Some(frame(9.0)));
        assert_eq!(history.get(4), None);
    }

    #[test]
    fn drop_oldest_is_clamped() {
        let mut history = HistoryWindow::new(8);
        history.extend_from_slice(&[frame(1.0), frame(2.0), frame(3.0)]);
        history.drop_oldest(2);
        assert_eq!(history.count(), 1);
        assert_eq!(history.get(0), Some(frame(3.0)));
        history.drop_oldest(100);
        assert!(history.is_empty());
        history.push(frame(4.0));
        assert_eq!(history.iter().collect::<Vec<_>>(), vec![frame(4.0)]);
    }

    #[test]
    fn batch_eviction_keeps_newest_frames() {
        let mut history = HistoryWindow::new(5);
        history.extend_from_slice(&[frame(0.0), frame(1.0), frame(2.0)]);
        history.extend_from_slice(&[frame(3.0), frame(4.0), frame(5.0), frame(6.0)]);
        let lefts: Vec<f32> = history.iter().map(|f| f.left).collect();
        assert_eq!(lefts, vec![2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn oversized_batch_keeps_its_tail() {
        let mut history = HistoryWindow::new(3);
        history.push(frame(-1.0));
        let batch: Vec<AudioFrame> = (0..10).map(|i| frame(i as f32)).collect();
        history.extend_from_slice(&batch);
        let lefts: Vec<f32> = history.iter().map(|f| f.left).collect();
        assert_eq!(lefts, vec![7.0, 8.0, 9.0]);
    }
}
