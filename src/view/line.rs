// Copyright © 2025 Jocelyn Turcotte <turcotte.j@gmail.com>
// SPDX-License-Identifier: MIT

use crate::audio::HistoryWindow;
use crate::config::LineConfig;
use crate::surface::{FrameTarget, GraphicsContext};

use cgmath::{Matrix4, Vector4};
use std::{borrow::Cow, sync::Arc};
use tracing::{debug, instrument};
use wgpu::BufferUsages;
use wgpu::util::{DeviceExt, StagingBelt};

use super::mesh::{LineMesh, MeshParams};
use super::{Drawable, Vertex};

// cgmath outputs z values in [-1, 1] for the near and far planes, but wgpu expects them in [0, 1].
const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::from_cols(
    Vector4::new(1.0, 0.0, 0.0, 0.0),
    Vector4::new(0.0, 1.0, 0.0, 0.0),
    Vector4::new(0.0, 0.0, 0.5, 0.0),
    Vector4::new(0.0, 0.0, 0.5, 1.0),
);

const STAGING_CHUNK_SIZE: wgpu::BufferAddress = 1 << 20;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct LineUniform {
    projection: [[f32; 4]; 4],
    color: [f32; 4],
    line_width: f32,
    vertex_count: f32,
    _padding: [f32; 2],
}

/// A GPU buffer together with the size it was allocated with.
struct GpuBuffer {
    label: &'static str,
    buffer: wgpu::Buffer,
    capacity: wgpu::BufferAddress,
    usage: BufferUsages,
}

impl GpuBuffer {
    fn new(
        device: &wgpu::Device,
        label: &'static str,
        usage: BufferUsages,
        capacity: wgpu::BufferAddress,
    ) -> GpuBuffer {
        let capacity = capacity.max(wgpu::COPY_BUFFER_ALIGNMENT);
        GpuBuffer {
            label,
            buffer: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: capacity,
                usage,
                mapped_at_creation: false,
            }),
            capacity,
            usage,
        }
    }

    /// Reallocates to the next power of two when `size` doesn't fit. Contents are not kept.
    fn ensure_capacity(&mut self, device: &wgpu::Device, size: wgpu::BufferAddress) {
        if size <= self.capacity {
            return;
        }
        debug!(
            "Growing {} from {} to {} bytes",
            self.label,
            self.capacity,
            size.next_power_of_two()
        );
        *self = GpuBuffer::new(device, self.label, self.usage, size.next_power_of_two());
    }

    fn upload(
        &self,
        belt: &mut StagingBelt,
        encoder: &mut wgpu::CommandEncoder,
        device: &wgpu::Device,
        bytes: &[u8],
    ) {
        if let Some(size) = wgpu::BufferSize::new(bytes.len() as wgpu::BufferAddress) {
            belt.write_buffer(encoder, &self.buffer, 0, size, device)
                .copy_from_slice(bytes);
        }
    }
}

/// Draws the history as a glowing tapered line.
pub struct LineView {
    device: wgpu::Device,
    wgpu_queue: Arc<wgpu::Queue>,
    render_pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    uniform_buffer: wgpu::Buffer,
    vertex_buffer: GpuBuffer,
    index_buffer: GpuBuffer,
    staging_belt: StagingBelt,
    mesh: LineMesh,
    color: [f32; 4],
    line_width: f32,
    vertex_count: u32,
    index_count: u32,
}

impl LineView {
    #[instrument(skip(context, config))]
    pub fn new(
        context: &GraphicsContext,
        swapchain_format: wgpu::TextureFormat,
        config: &LineConfig,
        history_capacity: usize,
    ) -> LineView {
        let device = context.device();

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Line Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("line.wgsl"))),
        });

        let segments = history_capacity.saturating_sub(1).max(1) as wgpu::BufferAddress;
        let vertex_buffer = GpuBuffer::new(
            device,
            "Line Vertex Buffer",
            BufferUsages::VERTEX | BufferUsages::COPY_DST,
            segments * 4 * std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
        );
        let index_buffer = GpuBuffer::new(
            device,
            "Line Index Buffer",
            BufferUsages::INDEX | BufferUsages::COPY_DST,
            segments * 6 * std::mem::size_of::<u32>() as wgpu::BufferAddress,
        );

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Line Uniform Buffer"),
            contents: bytemuck::cast_slice(&[LineUniform {
                projection: OPENGL_TO_WGPU_MATRIX.into(),
                color: config.color.to_f32_array(),
                line_width: config.width,
                vertex_count: 0.0,
                _padding: Default::default(),
            }]),
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
            label: None,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
            label: Some("Line Bind Group"),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Line Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        // Overlapping strokes add up like phosphor.
        let additive = wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent::OVER,
        };

        let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Line Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[Vertex::desc()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: swapchain_format,
                    blend: Some(additive),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        LineView {
            device: device.clone(),
            wgpu_queue: context.queue().clone(),
            render_pipeline,
            bind_group,
            uniform_buffer,
            vertex_buffer,
            index_buffer,
            staging_belt: StagingBelt::new(STAGING_CHUNK_SIZE),
            mesh: LineMesh::new(MeshParams::from(config), history_capacity),
            color: config.color.to_f32_array(),
            line_width: config.width,
            vertex_count: 0,
            index_count: 0,
        }
    }

    fn projection(width: u32, height: u32) -> [[f32; 4]; 4] {
        let half_w = width as f32 * 0.5;
        let half_h = height as f32 * 0.5;
        // Pixel space centered on the window, +y up.
        (OPENGL_TO_WGPU_MATRIX * cgmath::ortho(-half_w, half_w, -half_h, half_h, -1.0, 1.0)).into()
    }

    /// Rebuilds the mesh if new points are pending and stages its upload into `encoder`.
    #[instrument(skip(self, encoder))]
    fn upload_mesh(&mut self, encoder: &mut wgpu::CommandEncoder, width: u32, height: u32) {
        let scale = width.min(height) as f32 * 0.5;
        if !self.mesh.build(scale) {
            return;
        }

        let vertices: &[u8] = bytemuck::cast_slice(self.mesh.vertices());
        let indices: &[u8] = bytemuck::cast_slice(self.mesh.indices());
        self.vertex_buffer
            .ensure_capacity(&self.device, vertices.len() as wgpu::BufferAddress);
        self.index_buffer
            .ensure_capacity(&self.device, indices.len() as wgpu::BufferAddress);
        self.vertex_buffer
            .upload(&mut self.staging_belt, encoder, &self.device, vertices);
        self.index_buffer
            .upload(&mut self.staging_belt, encoder, &self.device, indices);

        self.vertex_count = self.mesh.vertices().len() as u32;
        self.index_count = self.mesh.indices().len() as u32;
    }
}

impl Drawable<FrameTarget> for LineView {
    fn process_audio(&mut self, history: &HistoryWindow) {
        self.mesh.add_history(history);
    }

    #[instrument(skip(self, target))]
    fn render(&mut self, _dt: f32, target: &mut FrameTarget) {
        // The previous frame was submitted before this one started recording.
        self.staging_belt.recall();

        self.upload_mesh(&mut target.encoder, target.width, target.height);
        self.staging_belt.finish();

        let uniform = LineUniform {
            projection: Self::projection(target.width, target.height),
            color: self.color,
            line_width: self.line_width,
            vertex_count: self.vertex_count as f32,
            _padding: Default::default(),
        };
        self.wgpu_queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[uniform]));

        if self.index_count == 0 {
            return;
        }

        let mut render_pass = target.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Line Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        render_pass.set_viewport(
            0.0,
            0.0,
            target.width as f32,
            target.height as f32,
            0.0,
            1.0,
        );
        render_pass.set_scissor_rect(0, 0, target.width, target.height);
        render_pass.set_pipeline(&self.render_pipeline);
        render_pass.set_bind_group(0, &self.bind_group, &[]);
        render_pass.set_vertex_buffer(0, self.vertex_buffer.buffer.slice(..));
        render_pass.set_index_buffer(self.index_buffer.buffer.slice(..), wgpu::IndexFormat::Uint32);
        render_pass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}
