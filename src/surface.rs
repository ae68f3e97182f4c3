// Copyright © 2025 Jocelyn Turcotte <turcotte.j@gmail.com>
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use tracing::{info, instrument};
use winit::window::Window;

use crate::error::AppError;

pub mod sync;
pub mod window;

/// Device-level wgpu state shared by the presenter and the views.
pub struct GraphicsContext {
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: Arc<wgpu::Queue>,
}

impl GraphicsContext {
    #[instrument(skip(window))]
    pub fn new(window: Arc<Window>) -> Result<(GraphicsContext, wgpu::Surface<'static>), AppError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance.create_surface(window)?;

        // Pick a supported adapter
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            compatible_surface: Some(&surface),
            ..Default::default()
        }))?;

        let (device, queue) = pollster::block_on(adapter.request_device(&Default::default()))?;

        let adapter_info = adapter.get_info();
        info!(
            "Using adapter {} ({:?})",
            adapter_info.name, adapter_info.backend
        );

        Ok((
            GraphicsContext {
                adapter,
                device,
                queue: Arc::new(queue),
            },
            surface,
        ))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }
}

/// What drawables record into for one frame.
pub struct FrameTarget {
    pub encoder: wgpu::CommandEncoder,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}
