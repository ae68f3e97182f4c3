// Copyright © 2025 Jocelyn Turcotte <turcotte.j@gmail.com>
// SPDX-License-Identifier: MIT

use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowAttributes, WindowId};

use super::sync::{Acquire, FrameOutcome, FrameSynchronizer, Presenter};
use super::{FrameTarget, GraphicsContext};
use crate::ApplicationState;
use crate::error::AppError;
use crate::view::LineView;

const MAX_FRAMES_IN_FLIGHT: u32 = 2;

/// Presents to a winit window through a wgpu surface.
///
/// Fences are queue submission indices, one slot per frame in flight.
pub struct WindowPresenter {
    context: Rc<GraphicsContext>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    window: Arc<Window>,
    clear_color: wgpu::Color,
    next_slot: usize,
}

impl WindowPresenter {
    pub fn new(
        context: Rc<GraphicsContext>,
        surface: wgpu::Surface<'static>,
        window: Arc<Window>,
        clear_color: wgpu::Color,
    ) -> Result<WindowPresenter, AppError> {
        let swapchain_capabilities = surface.get_capabilities(&context.adapter);
        let format = swapchain_capabilities
            .formats
            .iter()
            .copied()
            .find(wgpu::TextureFormat::is_srgb)
            .or_else(|| swapchain_capabilities.formats.first().copied())
            .ok_or(AppError::UnsupportedSurface)?;
        let alpha_mode = swapchain_capabilities
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let size = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: MAX_FRAMES_IN_FLIGHT,
            alpha_mode,
            view_formats: vec![],
        };
        surface.configure(context.device(), &config);

        Ok(WindowPresenter {
            context,
            surface,
            config,
            window,
            clear_color,
            next_slot: 0,
        })
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }
}

impl Presenter for WindowPresenter {
    type Image = wgpu::SurfaceTexture;
    type Target = FrameTarget;
    type Fence = wgpu::SubmissionIndex;

    fn slot_count(&self) -> usize {
        MAX_FRAMES_IN_FLIGHT as usize + 1
    }

    fn acquire(&mut self) -> Acquire<wgpu::SurfaceTexture> {
        match self.surface.get_current_texture() {
            Ok(frame) => {
                let slot = self.next_slot;
                self.next_slot = (self.next_slot + 1) % self.slot_count();
                Acquire::Image {
                    slot,
                    suboptimal: frame.suboptimal,
                    image: frame,
                }
            }
            Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => Acquire::Outdated,
            Err(wgpu::SurfaceError::Timeout) => {
                debug!("Timed out acquiring the next surface texture");
                Acquire::Unavailable
            }
            Err(e) => {
                warn!("Failed to acquire the next surface texture: {e}");
                Acquire::Unavailable
            }
        }
    }

    fn wait(&mut self, fence: wgpu::SubmissionIndex) {
        if let Err(e) = self.context.device().poll(wgpu::PollType::Wait {
            submission_index: Some(fence),
            timeout: None,
        }) {
            warn!("Failed waiting for a frame to complete: {e}");
        }
    }

    fn begin(&mut self, image: &wgpu::SurfaceTexture, width: u32, height: u32) -> FrameTarget {
        let view = image
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder =
            self.context
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Frame Encoder"),
                });
        {
            let _clear_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        FrameTarget {
            encoder,
            view,
            width,
            height,
        }
    }

    fn submit(&mut self, target: FrameTarget) -> wgpu::SubmissionIndex {
        self.context.queue().submit(Some(target.encoder.finish()))
    }

    fn present(&mut self, image: wgpu::SurfaceTexture) {
        self.window.pre_present_notify();
        image.present();
    }

    fn recreate(&mut self, width: u32, height: u32) {
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(self.context.device(), &self.config);
        self.next_slot = 0;
    }

    fn surface_extent(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }
}

struct FpsCounter {
    last_fps_dump_time: Instant,
    frame_count: u32,
}

impl FpsCounter {
    fn new() -> FpsCounter {
        FpsCounter {
            last_fps_dump_time: Instant::now(),
            frame_count: 0,
        }
    }

    fn frame_presented(&mut self, now: Instant) {
        self.frame_count += 1;
        if now.duration_since(self.last_fps_dump_time) >= Duration::from_secs(1) {
            debug!("{} fps", self.frame_count);
            self.frame_count = 0;
            self.last_fps_dump_time = now;
        }
    }
}

/// Owns the application state and the window-side rendering objects.
pub struct WindowEventHandler {
    app_state: ApplicationState,
    title: String,
    window: Option<Arc<Window>>,
    synchronizer: Option<FrameSynchronizer<WindowPresenter>>,
    last_frame_time: Instant,
    fps: FpsCounter,
    error: Option<AppError>,
}

impl WindowEventHandler {
    pub fn new(app_state: ApplicationState, title: String) -> WindowEventHandler {
        WindowEventHandler {
            app_state,
            title,
            window: None,
            synchronizer: None,
            last_frame_time: Instant::now(),
            fps: FpsCounter::new(),
            error: None,
        }
    }

    /// The error that made the event loop exit, if any.
    pub fn take_error(&mut self) -> Option<AppError> {
        self.error.take()
    }

    #[instrument(skip(self, event_loop))]
    fn initialize(&mut self, event_loop: &ActiveEventLoop) -> Result<(), AppError> {
        let general = &self.app_state.config.general;
        let window_attributes = WindowAttributes::default()
            .with_title(self.title.clone())
            .with_inner_size(PhysicalSize::new(
                general.window_width.max(1),
                general.window_height.max(1),
            ));
        let window = Arc::new(event_loop.create_window(window_attributes)?);

        let (context, surface) = GraphicsContext::new(window.clone())?;
        let context = Rc::new(context);
        let line_config = &self.app_state.config.line;
        let presenter = WindowPresenter::new(
            context.clone(),
            surface,
            window.clone(),
            line_config.background.to_wgpu(),
        )?;
        let (width, height) = presenter.size();
        let line_view = LineView::new(
            &context,
            presenter.format(),
            line_config,
            self.app_state.scope.history().capacity(),
        );

        let mut synchronizer = FrameSynchronizer::new(presenter, width, height);
        synchronizer.add_drawable(Box::new(line_view));

        window.request_redraw();
        self.last_frame_time = Instant::now();
        self.window = Some(window);
        self.synchronizer = Some(synchronizer);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: AppError) {
        self.error = Some(error);
        event_loop.exit();
    }

    #[instrument(skip(self))]
    fn redraw(&mut self) {
        let (Some(window), Some(synchronizer)) = (&self.window, &mut self.synchronizer) else {
            return;
        };
        if self.app_state.scope.is_iconified() {
            return;
        }

        let now = Instant::now();
        let dt = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;

        self.app_state.process_audio(dt, synchronizer);
        if synchronizer.render_frame(dt) == FrameOutcome::Presented {
            self.fps.frame_presented(now);
        }
        window.request_redraw();
    }
}

impl ApplicationHandler for WindowEventHandler {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.initialize(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(synchronizer) = &mut self.synchronizer {
                    synchronizer.notify_resize(size.width, size.height);
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => self.app_state.toggle_pause(),
            WindowEvent::Occluded(occluded) => {
                self.app_state.set_iconified(occluded);
                if !occluded {
                    // The frame clock restarts from here, not from when the window was hidden.
                    self.last_frame_time = Instant::now();
                    if let Some(window) = &self.window {
                        window.request_redraw();
                    }
                }
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Stop the audio thread before the GPU resources are released.
        self.app_state.stop_audio();
        if let Some(mut synchronizer) = self.synchronizer.take() {
            synchronizer.wait_idle();
        }
        self.window = None;
    }
}
