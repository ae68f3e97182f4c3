// Copyright © 2025 Jocelyn Turcotte <turcotte.j@gmail.com>
// SPDX-License-Identifier: MIT

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use rodio::Source;
use rodio::decoder::DecoderError;
use thiserror::Error;
use tracing::{debug, instrument};

use super::AudioFrame;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Format(#[from] DecoderError),
    #[error("file contains no audio frames")]
    Empty,
    #[error("file has no audio channels")]
    NoChannels,
}

/// Source of stereo frames for the playback stream.
///
/// `read_frames` is called from the real-time thread, implementations must not
/// block or allocate there. Returning 0 means the end of the stream.
pub trait Decoder: Send + 'static {
    fn sample_rate(&self) -> u32;
    fn read_frames(&mut self, out: &mut [AudioFrame]) -> usize;
}

/// An audio file (WAV, FLAC, MP3, Ogg Vorbis) decoded to memory up front.
pub struct FileDecoder {
    frames: Vec<AudioFrame>,
    sample_rate: u32,
    position: usize,
}

impl FileDecoder {
    #[instrument]
    pub fn open(path: &Path) -> Result<FileDecoder, DecodeError> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }

    /// The container is detected from its content, not from a file extension.
    pub fn from_reader<R>(reader: R) -> Result<FileDecoder, DecodeError>
    where
        R: Read + Seek + Send + Sync + 'static,
    {
        let source = rodio::Decoder::new(reader)?;
        let channels = u16::from(source.channels()) as usize;
        let sample_rate = u32::from(source.sample_rate());
        if channels == 0 {
            return Err(DecodeError::NoChannels);
        }

        let samples: Vec<f32> = source.collect();

        // Mono goes to both axes, anything past the second channel is ignored.
        let frames: Vec<AudioFrame> = samples
            .chunks_exact(channels)
            .map(|s| AudioFrame {
                left: s[0],
                right: if channels > 1 { s[1] } else { s[0] },
            })
            .collect();
        if frames.is_empty() {
            return Err(DecodeError::Empty);
        }

        debug!(
            "Decoded {} frames, rate:{} channels:{}",
            frames.len(),
            sample_rate,
            channels
        );

        Ok(FileDecoder {
            frames,
            sample_rate,
            position: 0,
        })
    }

    pub fn remaining(&self) -> usize {
        self.frames.len() - self.position
    }
}

impl Decoder for FileDecoder {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_frames(&mut self, out: &mut [AudioFrame]) -> usize {
        let n = out.len().min(self.remaining());
        out[..n].copy_from_slice(&self.frames[self.position..self.position + n]);
        self.position += n;
        n
    }
}
