//! Desktop window backend: winit for the window and event pump, wgpu for
//! presentation. Sprites are composited on a [`CanvasBackend`] and the finished
//! canvas is uploaded and stretched over the surface on `present`.

use std::sync::Arc;
use std::time::Duration;

use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode as WinitKey, PhysicalKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowId};

use super::{CanvasBackend, Rect, RenderBackend, TextureDesc, TextureHandle};
use crate::config::WindowConfig;
use crate::error::{EngineError, Result};
use crate::input::{EventSource, InputEvent, KeyCode};

const PRESENT_SHADER: &str = r#"
struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

struct Present {
    scale: vec2<f32>,
    _pad: vec2<f32>,
};

@group(0) @binding(0) var canvas_tex: texture_2d<f32>;
@group(0) @binding(1) var canvas_sampler: sampler;
@group(0) @binding(2) var<uniform> params: Present;

@vertex
fn vs_main(@builtin(vertex_index) idx: u32) -> VsOut {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(0.0, 0.0), vec2<f32>(1.0, 0.0), vec2<f32>(0.0, 1.0),
        vec2<f32>(0.0, 1.0), vec2<f32>(1.0, 0.0), vec2<f32>(1.0, 1.0),
    );
    let uv = corners[idx];
    var out: VsOut;
    out.pos = vec4<f32>((uv.x * 2.0 - 1.0) * params.scale.x, (1.0 - uv.y * 2.0) * params.scale.y, 0.0, 1.0);
    out.uv = uv;
    return out;
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    return textureSample(canvas_tex, canvas_sampler, in.uv);
}
"#;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct PresentUniform {
    scale: [f32; 2],
    _pad: [f32; 2],
}

/// Clip-space scale that fits the canvas inside the surface without
/// distorting it.
fn letterbox_scale(canvas: (u32, u32), surface: (u32, u32)) -> [f32; 2] {
    if canvas.0 == 0 || canvas.1 == 0 || surface.0 == 0 || surface.1 == 0 {
        return [1.0, 1.0];
    }
    let canvas_aspect = canvas.0 as f32 / canvas.1 as f32;
    let surface_aspect = surface.0 as f32 / surface.1 as f32;
    if surface_aspect > canvas_aspect {
        [canvas_aspect / surface_aspect, 1.0]
    } else {
        [1.0, surface_aspect / canvas_aspect]
    }
}

/// Creates the (hidden) window and its event pump. The window becomes visible
/// when the backend is opened.
pub fn open(config: &WindowConfig) -> Result<(WindowBackend, WindowEvents)> {
    let event_loop = EventLoop::new().map_err(|err| EngineError::InitFailure(format!("event loop: {err}")))?;
    let attrs = Window::default_attributes()
        .with_title(config.title.clone())
        .with_inner_size(PhysicalSize::new(config.width, config.height))
        .with_visible(false);
    #[allow(deprecated)]
    let window = event_loop
        .create_window(attrs)
        .map_err(|err| EngineError::InitFailure(format!("window creation: {err}")))?;
    let window = Arc::new(window);
    let events = WindowEvents {
        event_loop,
        collector: EventCollector { window_id: window.id(), pending: Vec::new() },
    };
    let backend = WindowBackend { window, canvas: CanvasBackend::new([0, 0, 0, 255]), gpu: None, vsync: config.vsync };
    Ok((backend, events))
}

pub struct WindowEvents {
    event_loop: EventLoop<()>,
    collector: EventCollector,
}

struct EventCollector {
    window_id: WindowId,
    pending: Vec<InputEvent>,
}

impl ApplicationHandler for EventCollector {
    fn resumed(&mut self, _event_loop: &ActiveEventLoop) {}

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        if id != self.window_id {
            return;
        }
        match event {
            WindowEvent::CloseRequested => self.pending.push(InputEvent::Quit),
            WindowEvent::KeyboardInput { event: KeyEvent { physical_key, state, .. }, .. } => {
                if let Some(code) = map_key(physical_key) {
                    self.pending.push(InputEvent::Key { code, pressed: state == ElementState::Pressed });
                }
            }
            _ => {}
        }
    }
}

fn map_key(key: PhysicalKey) -> Option<KeyCode> {
    match key {
        PhysicalKey::Code(WinitKey::KeyW) => Some(KeyCode::W),
        PhysicalKey::Code(WinitKey::KeyA) => Some(KeyCode::A),
        PhysicalKey::Code(WinitKey::KeyS) => Some(KeyCode::S),
        PhysicalKey::Code(WinitKey::KeyD) => Some(KeyCode::D),
        PhysicalKey::Code(WinitKey::Escape) => Some(KeyCode::Escape),
        PhysicalKey::Code(WinitKey::Space) => Some(KeyCode::Space),
        _ => None,
    }
}

impl EventSource for WindowEvents {
    fn pump(&mut self, out: &mut Vec<InputEvent>) -> Result<()> {
        let status = self.event_loop.pump_app_events(Some(Duration::ZERO), &mut self.collector);
        out.append(&mut self.collector.pending);
        if let PumpStatus::Exit(code) = status {
            log::debug!(target: "ember::engine", "event loop exited with status {code}");
            out.push(InputEvent::Quit);
        }
        Ok(())
    }
}

pub struct WindowBackend {
    window: Arc<Window>,
    canvas: CanvasBackend,
    gpu: Option<GpuPresenter>,
    vsync: bool,
}

impl WindowBackend {
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Sets the color the canvas is cleared to each frame. Takes effect on `open`.
    pub fn set_clear_color(&mut self, color: [u8; 4]) {
        if !self.canvas.is_open() {
            self.canvas = CanvasBackend::new(color);
        }
    }
}

impl RenderBackend for WindowBackend {
    fn open(&mut self, width: u32, height: u32) -> Result<()> {
        let _ = self.window.request_inner_size(PhysicalSize::new(width, height));
        self.window.set_visible(true);
        let gpu = pollster::block_on(GpuPresenter::new(self.window.clone(), width, height, self.vsync))?;
        self.gpu = Some(gpu);
        if let Err(err) = self.canvas.open(width, height) {
            self.gpu = None;
            return Err(err);
        }
        log::info!(target: "ember::render", "window backend opened at {width}x{height}");
        Ok(())
    }

    fn close(&mut self) {
        self.canvas.close();
        if self.gpu.take().is_some() {
            self.window.set_visible(false);
            log::info!(target: "ember::render", "window backend closed");
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc, bytes: &[u8]) -> Result<TextureHandle> {
        self.canvas.create_texture(desc, bytes)
    }

    fn clear(&mut self) -> Result<()> {
        self.canvas.clear()
    }

    fn blit(&mut self, texture: TextureHandle, src: Rect, dst: Rect) -> Result<()> {
        self.canvas.blit(texture, src, dst)
    }

    fn present(&mut self) -> Result<()> {
        self.canvas.present()?;
        let gpu = self.gpu.as_mut().ok_or_else(|| EngineError::BackendFailure("surface not initialized".into()))?;
        gpu.present(&self.window, self.canvas.pixels())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SurfaceErrorAction {
    Reconfigure,
    SkipFrame,
    Fatal,
}

fn surface_error_action(error: &wgpu::SurfaceError) -> SurfaceErrorAction {
    match error {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => SurfaceErrorAction::Reconfigure,
        wgpu::SurfaceError::Timeout => SurfaceErrorAction::SkipFrame,
        wgpu::SurfaceError::OutOfMemory | wgpu::SurfaceError::Other => SurfaceErrorAction::Fatal,
    }
}

struct GpuPresenter {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    canvas_texture: wgpu::Texture,
    canvas_size: wgpu::Extent3d,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    pipeline: wgpu::RenderPipeline,
}

impl GpuPresenter {
    async fn new(window: Arc<Window>, width: u32, height: u32, vsync: bool) -> Result<Self> {
        let backend_err = |what: &str, err: &dyn std::fmt::Display| EngineError::InitFailure(format!("{what}: {err}"));
        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window.clone()).map_err(|err| backend_err("surface", &err))?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|err| backend_err("adapter", &err))?;
        let device_desc = wgpu::DeviceDescriptor {
            label: Some("Ember Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_webgl2_defaults().using_resolution(adapter.limits()),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::default(),
        };
        let (device, queue) = adapter.request_device(&device_desc).await.map_err(|err| backend_err("device", &err))?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| EngineError::InitFailure("surface reports no formats".into()))?;
        let present_mode = if vsync {
            wgpu::PresentMode::Fifo
        } else {
            caps.present_modes
                .iter()
                .copied()
                .find(|mode| *mode != wgpu::PresentMode::Fifo)
                .unwrap_or(wgpu::PresentMode::Fifo)
        };
        let size = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode: caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let canvas_size = wgpu::Extent3d { width, height, depth_or_array_layers: 1 };
        let canvas_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Canvas Texture"),
            size: canvas_size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let canvas_view = canvas_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Canvas Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Canvas BGL"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Present Uniform Buffer"),
            size: std::mem::size_of::<PresentUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Canvas BG"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&canvas_view) },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(&sampler) },
                wgpu::BindGroupEntry { binding: 2, resource: uniform_buffer.as_entire_binding() },
            ],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Present Shader"),
            source: wgpu::ShaderSource::Wgsl(PRESENT_SHADER.into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Present Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Present Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState { topology: wgpu::PrimitiveTopology::TriangleList, ..Default::default() },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Ok(Self { surface, device, queue, config, canvas_texture, canvas_size, uniform_buffer, bind_group, pipeline })
    }

    fn reconfigure(&mut self, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.config.width = size.width;
        self.config.height = size.height;
        self.surface.configure(&self.device, &self.config);
    }

    fn present(&mut self, window: &Window, pixels: &[u8]) -> Result<()> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Ok(());
        }
        if size.width != self.config.width || size.height != self.config.height {
            self.reconfigure(size);
        }

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.canvas_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * self.canvas_size.width),
                rows_per_image: Some(self.canvas_size.height),
            },
            self.canvas_size,
        );
        let uniform = PresentUniform {
            scale: letterbox_scale(
                (self.canvas_size.width, self.canvas_size.height),
                (self.config.width, self.config.height),
            ),
            _pad: [0.0; 2],
        };
        self.queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniform));

        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(err) => {
                return match surface_error_action(&err) {
                    SurfaceErrorAction::Reconfigure => {
                        log::warn!(target: "ember::render", "surface {err}; reconfiguring");
                        self.reconfigure(size);
                        Ok(())
                    }
                    SurfaceErrorAction::SkipFrame => {
                        log::debug!(target: "ember::render", "surface {err}; skipping frame");
                        Ok(())
                    }
                    SurfaceErrorAction::Fatal => Err(EngineError::BackendFailure(format!("surface: {err}"))),
                };
            }
        };
        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder =
            self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Present Encoder") });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Present Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations { load: wgpu::LoadOp::Clear(wgpu::Color::BLACK), store: wgpu::StoreOp::Store },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.draw(0..6, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_error_action_matches_variants() {
        assert_eq!(surface_error_action(&wgpu::SurfaceError::Lost), SurfaceErrorAction::Reconfigure);
        assert_eq!(surface_error_action(&wgpu::SurfaceError::Outdated), SurfaceErrorAction::Reconfigure);
        assert_eq!(surface_error_action(&wgpu::SurfaceError::Timeout), SurfaceErrorAction::SkipFrame);
        assert_eq!(surface_error_action(&wgpu::SurfaceError::OutOfMemory), SurfaceErrorAction::Fatal);
        assert_eq!(surface_error_action(&wgpu::SurfaceError::Other), SurfaceErrorAction::Fatal);
    }

    #[test]
    fn letterbox_keeps_canvas_aspect() {
        assert_eq!(letterbox_scale((320, 240), (640, 480)), [1.0, 1.0]);
        assert_eq!(letterbox_scale((100, 100), (200, 100)), [0.5, 1.0]);
        assert_eq!(letterbox_scale((100, 100), (100, 200)), [1.0, 0.5]);
        assert_eq!(letterbox_scale((0, 100), (100, 200)), [1.0, 1.0]);
    }

    #[test]
    fn maps_supported_physical_keys() {
        assert_eq!(map_key(PhysicalKey::Code(WinitKey::KeyW)), Some(KeyCode::W));
        assert_eq!(map_key(PhysicalKey::Code(WinitKey::Escape)), Some(KeyCode::Escape));
        assert_eq!(map_key(PhysicalKey::Code(WinitKey::KeyQ)), None);
    }
}
