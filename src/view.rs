// Copyright © 2025 Jocelyn Turcotte <turcotte.j@gmail.com>
// SPDX-License-Identifier: MIT

use crate::audio::HistoryWindow;

mod line;
pub mod mesh;

pub use line::LineView;

/// Something that draws into each frame recorded by the synchronizer.
pub trait Drawable<T> {
    /// Called once per tick with fresh history. Not called while paused.
    fn process_audio(&mut self, _history: &HistoryWindow) {}

    /// Records this drawable's commands into `target`.
    fn render(&mut self, dt: f32, target: &mut T);
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    /// Pixel-space x, y and the segment's width factor.
    pub position: [f32; 3],
    pub normal: [f32; 2],
}

impl Vertex {
    fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: 12,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}
