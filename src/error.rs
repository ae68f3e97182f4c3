// Copyright © 2025 Jocelyn Turcotte <turcotte.j@gmail.com>
// SPDX-License-Identifier: MIT

use std::path::PathBuf;

use thiserror::Error;

use crate::audio::{DecodeError, PlaybackError};

/// Everything that can stop the application before or while it starts.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("cannot read {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },
    #[error("audio playback: {0}")]
    Playback(#[from] PlaybackError),
    #[error("no suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    #[error("cannot open GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("cannot create rendering surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("surface does not support rendering with this adapter")]
    UnsupportedSurface,
    #[error("cannot create window: {0}")]
    Window(#[from] winit::error::OsError),
    #[error("event loop: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
}
