// Copyright © 2025 Jocelyn Turcotte <turcotte.j@gmail.com>
// SPDX-License-Identifier: MIT

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use super::{AudioFrame, AudioSink};

/// Creates the single-producer single-consumer ring carrying frames from the
/// playback thread to the render thread.
pub fn capture_ring(capacity: usize) -> (CaptureWriter, CaptureReader) {
    let (prod, cons) = HeapRb::<AudioFrame>::new(capacity.max(1)).split();
    (
        CaptureWriter { prod },
        CaptureReader { cons },
    )
}

/// Real-time side of the capture ring. Never blocks nor allocates.
pub struct CaptureWriter {
    prod: HeapProd<AudioFrame>,
}

impl CaptureWriter {
    /// Returns how many frames made it into the ring, the rest are dropped.
    pub fn write(&mut self, frames: &[AudioFrame]) -> usize {
        let mut written = 0;
        while written < frames.len() {
            let n = self.prod.push_slice(&frames[written..]);
            if n == 0 {
                break;
            }
            written += n;
        }
        written
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.prod.occupied_len()
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.prod.capacity().get()
    }
}

impl AudioSink for CaptureWriter {
    fn on_buffer(&mut self, frames: &[AudioFrame]) {
        self.write(frames);
    }
}

pub struct CaptureReader {
    cons: HeapCons<AudioFrame>,
}

impl CaptureReader {
    /// Pops up to `out.len()` frames, oldest first.
    pub fn read(&mut self, out: &mut [AudioFrame]) -> usize {
        self.cons.pop_slice(out)
    }

    pub fn len(&self) -> usize {
        self.cons.occupied_len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.cons.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cons.capacity().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(range: std::ops::Range<i32>) -> Vec<AudioFrame> {
        range
            .map(|i| AudioFrame {
                left: i as f32,
                right: i as f32 * 0.5,
            })
            .collect()
    }

    #[test]
    fn full_ring_drops_the_remainder() {
        let (mut writer, mut reader) = capture_ring(8);
        assert_eq!(writer.write(&frames(0..5)), 5);
        assert_eq!(writer.write(&frames(5..12)), 3);
        assert_eq!(writer.len(), writer.capacity());
        assert_eq!(reader.len(), reader.capacity());

        let mut out = [AudioFrame::default(); 16];
        assert_eq!(reader.read(&mut out), 8);
        let lefts: Vec<f32> = out[..8].iter().map(|f| f.left).collect();
        assert_eq!(lefts, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn reads_never_return_consumed_frames() {
        let (mut writer, mut reader) = capture_ring(4);
        let mut out = [AudioFrame::default(); 3];
        let mut seen = Vec::new();
        for chunk in frames(0..20).chunks(3) {
            writer.write(chunk);
            assert!(reader.len() <= reader.capacity());
            let n = reader.read(&mut out);
            seen.extend(out[..n].iter().map(|f| f.left));
        }
        assert_eq!(seen, (0..20).map(|i| i as f32).collect::<Vec<_>>());
        assert!(reader.is_empty());
        assert_eq!(reader.read(&mut out), 0);
    }

    #[test]
    fn writer_and_reader_on_separate_threads() {
        let (mut writer, mut reader) = capture_ring(64);
        let producer = std::thread::spawn(move || {
            let mut written = 0;
            for chunk in frames(0..1000).chunks(10) {
                written += writer.write(chunk);
            }
            written
        });
        let written = producer.join().unwrap();

        let mut out = vec![AudioFrame::default(); 128];
        let n = reader.read(&mut out);
        assert_eq!(n, written);
        assert!(n <= 64);
        // Whatever got through stays in order.
        assert!(out[..n].windows(2).all(|w| w[0].left < w[1].left));
    }

    #[test]
    fn sink_forwards_to_the_ring() {
        let (mut writer, reader) = capture_ring(16);
        writer.on_buffer(&frames(0..6));
        assert_eq!(reader.len(), 6);
        assert_eq!(writer.len(), 6);
        assert_eq!(writer.capacity(), 16);
    }
}
