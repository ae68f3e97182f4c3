// Copyright © 2025 Jocelyn Turcotte <turcotte.j@gmail.com>
// SPDX-License-Identifier: MIT

use tracing::{debug, instrument, trace};

use crate::audio::{AudioFrame, CaptureReader, HistoryWindow};

const READ_CHUNK_FRAMES: usize = 512;

/// Frames the render loop should drain for a tick lasting `dt` seconds.
pub fn frames_to_consume(sample_rate: u32, dt: f32) -> usize {
    (sample_rate as f64 * dt as f64).ceil().max(0.0) as usize
}

/// Render-thread end of the audio pipeline: drains the capture ring into the
/// history window, unless paused.
pub struct Scope {
    reader: CaptureReader,
    history: HistoryWindow,
    scratch: Vec<AudioFrame>,
    sample_rate: u32,
    paused: bool,
    iconified: bool,
}

impl Scope {
    pub fn new(reader: CaptureReader, history: HistoryWindow, sample_rate: u32) -> Scope {
        Scope {
            reader,
            history,
            scratch: vec![AudioFrame::default(); READ_CHUNK_FRAMES],
            sample_rate,
            paused: false,
            iconified: false,
        }
    }

    /// Returns false when paused, in which case neither the history nor the ring are touched.
    #[instrument(skip(self))]
    pub fn update(&mut self, dt: f32) -> bool {
        if self.paused {
            return false;
        }
        let mut remaining = frames_to_consume(self.sample_rate, dt);
        while remaining > 0 {
            let want = remaining.min(self.scratch.len());
            let n = self.reader.read(&mut self.scratch[..want]);
            if n == 0 {
                break;
            }
            self.history.extend_from_slice(&self.scratch[..n]);
            remaining -= n;
        }
        trace!(
            "Ring holds {}/{} frames, history {}/{}",
            self.reader.len(),
            self.reader.capacity(),
            self.history.count(),
            self.history.capacity()
        );
        true
    }

    pub fn history(&self) -> &HistoryWindow {
        &self.history
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
        debug!("Paused: {}", self.paused);
    }

    /// A hidden window is always paused, showing it again resumes.
    pub fn set_iconified(&mut self, iconified: bool) {
        self.iconified = iconified;
        self.paused = iconified;
    }

    #[cfg(test)]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_iconified(&self) -> bool {
        self.iconified
    }
}
