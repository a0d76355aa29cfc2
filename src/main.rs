// Metablob viewer: drives BlobEngine once per frame and draws the mesh it
// returns with per-vertex color and a depth buffer.
//
// Keys 1-4 pick the mood, the cursor pulls the blob, F3 shows stats,
// F4 shows node markers. RUST_LOG controls log output, METABLOB_CONFIG
// may name a JSON file with configuration overrides and METABLOB_MOOD the
// starting mood.

use std::sync::Arc;
use std::time::Instant;

use glam::{Mat4, Vec4};
use metablob::engine::camera::OrbitCamera;
use metablob::engine::debug_overlay::{DebugOverlay, DebugStats, NodeMarker};
use metablob::engine::input::InputState;
use metablob::{BlobConfig, BlobEngine, BlobMesh, Mood};
use metablob::engine::{FrameCounters, GpuVertex};
use wgpu::util::DeviceExt;
use winit::{
    event::{ElementState, Event as WinitEvent, KeyEvent, WindowEvent},
    event_loop::EventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const CONFIG_ENV: &str = "METABLOB_CONFIG";
const MOOD_ENV: &str = "METABLOB_MOOD";

// ============================================================================
// UNIFORM DATA
// ============================================================================

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Uniforms {
    view_proj: [[f32; 4]; 4],
    /// xyz = eye position, w unused
    camera_pos: [f32; 4],
}

impl Uniforms {
    fn new() -> Self {
        Self {
            view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            camera_pos: [0.0; 4],
        }
    }
}

// ============================================================================
// FRAME TIMING
// ============================================================================

/// Frame times over the last second, for the FPS readout.
struct FrameTimer {
    window_start: Instant,
    samples_ms: Vec<f32>,
    fps: u32,
    avg_ms: f32,
    min_ms: f32,
    max_ms: f32,
}

impl FrameTimer {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            samples_ms: Vec::with_capacity(240),
            fps: 0,
            avg_ms: 0.0,
            min_ms: 0.0,
            max_ms: 0.0,
        }
    }

    /// Returns true when a new one-second window has just been summarized.
    fn record(&mut self, dt: f32) -> bool {
        self.samples_ms.push(dt * 1000.0);
        if self.window_start.elapsed().as_secs_f32() < 1.0 {
            return false;
        }
        let n = self.samples_ms.len().max(1) as f32;
        self.fps = self.samples_ms.len() as u32;
        self.avg_ms = self.samples_ms.iter().sum::<f32>() / n;
        self.min_ms = self.samples_ms.iter().copied().fold(f32::INFINITY, f32::min);
        self.max_ms = self.samples_ms.iter().copied().fold(0.0, f32::max);
        self.samples_ms.clear();
        self.window_start = Instant::now();
        true
    }
}

// ============================================================================
// APPLICATION STATE
// ============================================================================

struct State {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: winit::dpi::PhysicalSize<u32>,
    render_pipeline: wgpu::RenderPipeline,
    depth_view: wgpu::TextureView,

    // Mesh buffers grow on demand; capacities are in elements
    vertex_buffer: wgpu::Buffer,
    vertex_capacity: usize,
    index_buffer: wgpu::Buffer,
    index_capacity: usize,
    num_indices: u32,

    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,

    blob: BlobEngine<FrameCounters>,
    camera: OrbitCamera,
    input: InputState,
    overlay: DebugOverlay,
    show_markers: bool,
    timer: FrameTimer,
    last_update: Instant,
    last_step_ms: f32,
}

impl State {
    async fn new(window: Arc<Window>, blob_config: BlobConfig) -> AppResult<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or("no compatible graphics adapter")?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: None,
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or("surface reports no formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps.present_modes.first().copied().unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: surface_caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        surface.configure(&device, &config);
        let depth_view = create_depth_view(&device, &config);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Blob Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("blob.wgsl").into()),
        });

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Uniform Buffer"),
            contents: bytemuck::cast_slice(&[Uniforms::new()]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let uniform_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
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
                label: Some("uniform_bind_group_layout"),
            });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &uniform_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
            label: Some("uniform_bind_group"),
        });

        let render_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Render Pipeline Layout"),
                bind_group_layouts: &[&uniform_bind_group_layout],
                push_constant_ranges: &[],
            });

        let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Blob Pipeline"),
            layout: Some(&render_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[GpuVertex::desc()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: config.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                // Mesher winds triangles CCW seen from outside
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
            cache: None,
        });

        // Start with room for a modest blob; grown in upload_mesh()
        let vertex_capacity = 4096;
        let index_capacity = vertex_capacity * 6;
        let vertex_buffer = create_mesh_buffer::<GpuVertex>(&device, "Blob Vertex Buffer", vertex_capacity, wgpu::BufferUsages::VERTEX);
        let index_buffer = create_mesh_buffer::<u32>(&device, "Blob Index Buffer", index_capacity, wgpu::BufferUsages::INDEX);

        let blob = BlobEngine::with_observer(blob_config, FrameCounters::default())?;
        let overlay = DebugOverlay::new(&window, &device, surface_format);

        let mut input = InputState::new();
        input.window_size = (size.width, size.height);

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
            render_pipeline,
            depth_view,
            vertex_buffer,
            vertex_capacity,
            index_buffer,
            index_capacity,
            num_indices: 0,
            uniform_buffer,
            uniform_bind_group,
            blob,
            camera: OrbitCamera::new(),
            input,
            overlay,
            show_markers: false,
            timer: FrameTimer::new(),
            last_update: Instant::now(),
            last_step_ms: 0.0,
        })
    }

    fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.size = new_size;
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
            self.depth_view = create_depth_view(&self.device, &self.config);
        }
    }

    fn update(&mut self) {
        let now = Instant::now();
        let dt = (now - self.last_update).as_secs_f32();
        self.last_update = now;

        if let Some(mood) = self.input.mood_selection() {
            self.blob.set_state(mood);
        }
        if self.input.was_key_pressed(KeyCode::F3) {
            self.overlay.toggle();
        }
        if self.input.was_key_pressed(KeyCode::F4) {
            self.show_markers = !self.show_markers;
        }

        match self.input.normalized_pointer() {
            Some(p) => self.blob.set_pointer(p.x, p.y),
            None => self.blob.clear_pointer(),
        }

        self.camera.update(&self.input, dt);
        self.blob.set_view_rotation(self.camera.orientation());

        let step_start = Instant::now();
        self.blob.step(dt);
        self.last_step_ms = step_start.elapsed().as_secs_f32() * 1000.0;

        if self.timer.record(dt) {
            log::info!(
                "FPS: {} | mood {} | {} tris | step {:.2} ms",
                self.timer.fps,
                self.blob.mood(),
                self.blob.mesh().triangle_count(),
                self.last_step_ms
            );
        }

        self.input.end_frame();
    }

    /// Copy the current mesh into the GPU buffers, growing them if needed.
    fn upload_mesh(&mut self) {
        let mesh: &BlobMesh = self.blob.mesh();
        if mesh.is_empty() {
            self.num_indices = 0;
            return;
        }

        let vertices = mesh.gpu_vertices();
        if vertices.len() > self.vertex_capacity {
            self.vertex_capacity = vertices.len().next_power_of_two();
            self.vertex_buffer = create_mesh_buffer::<GpuVertex>(&self.device, "Blob Vertex Buffer", self.vertex_capacity, wgpu::BufferUsages::VERTEX);
            log::debug!("vertex buffer grown to {} vertices", self.vertex_capacity);
        }
        if mesh.indices.len() > self.index_capacity {
            self.index_capacity = mesh.indices.len().next_power_of_two();
            self.index_buffer = create_mesh_buffer::<u32>(&self.device, "Blob Index Buffer", self.index_capacity, wgpu::BufferUsages::INDEX);
            log::debug!("index buffer grown to {} indices", self.index_capacity);
        }

        self.queue.write_buffer(&self.vertex_buffer, 0, bytemuck::cast_slice(&vertices));
        self.queue.write_buffer(&self.index_buffer, 0, mesh.index_bytes());
        self.num_indices = mesh.indices.len() as u32;
    }

    /// Project every node to egui points for the F4 layer.
    fn node_markers(&self, view_proj: Mat4) -> Vec<NodeMarker> {
        let scale = self.window.scale_factor() as f32;
        let (w, h) = (self.size.width as f32 / scale, self.size.height as f32 / scale);
        self.blob
            .nodes()
            .iter()
            .filter_map(|node| {
                let clip = view_proj * Vec4::from((node.position, 1.0));
                if clip.w <= 0.0 {
                    return None;
                }
                let ndc = clip.truncate() / clip.w;
                Some(NodeMarker {
                    pos: egui::pos2((ndc.x * 0.5 + 0.5) * w, (0.5 - ndc.y * 0.5) * h),
                    radius_px: 4.0 + 6.0 * node.strength,
                    is_core: node.is_core(),
                })
            })
            .collect()
    }

    fn debug_stats(&self) -> DebugStats {
        let mesh = self.blob.mesh();
        DebugStats {
            fps: self.timer.fps,
            frame_time_avg_ms: self.timer.avg_ms,
            frame_time_min_ms: self.timer.min_ms,
            frame_time_max_ms: self.timer.max_ms,
            mood: self.blob.mood().to_string(),
            node_count: self.blob.nodes().len(),
            vertex_count: mesh.vertex_count(),
            triangle_count: mesh.triangle_count(),
            extract_ms: self.last_step_ms,
            grid_resolution: self.blob.grid().resolution(),
            isolation: self.blob.isolation(),
            resolution: (self.size.width, self.size.height),
            camera_distance: self.camera.distance(),
            clamped_frames: self.blob.observer().clamped_frames,
        }
    }

    fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        // All buffer writes happen before the render pass
        self.upload_mesh();

        let aspect = self.size.width as f32 / self.size.height.max(1) as f32;
        let view_proj = self.camera.view_projection(aspect);
        let uniforms = Uniforms {
            view_proj: view_proj.to_cols_array_2d(),
            camera_pos: self.camera.camera_position().extend(1.0).to_array(),
        };
        self.queue.write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Blob Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.02,
                            g: 0.02,
                            b: 0.05,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            if self.num_indices > 0 {
                render_pass.set_pipeline(&self.render_pipeline);
                render_pass.set_bind_group(0, &self.uniform_bind_group, &[]);
                render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
                render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..self.num_indices, 0, 0..1);
            }
        }

        let stats = self.overlay.visible.then(|| self.debug_stats());
        let markers = self.show_markers.then(|| self.node_markers(view_proj));
        if stats.is_some() || markers.is_some() {
            let screen_descriptor = egui_wgpu::ScreenDescriptor {
                size_in_pixels: [self.config.width, self.config.height],
                pixels_per_point: self.window.scale_factor() as f32,
            };
            self.overlay.render(
                &self.device,
                &self.queue,
                &mut encoder,
                &self.window,
                &view,
                &screen_descriptor,
                stats.as_ref(),
                markers.as_deref(),
            );
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }
}

fn create_depth_view(device: &wgpu::Device, config: &wgpu::SurfaceConfiguration) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: wgpu::Extent3d {
            width: config.width.max(1),
            height: config.height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn create_mesh_buffer<T>(device: &wgpu::Device, label: &str, capacity: usize, usage: wgpu::BufferUsages) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: (capacity * std::mem::size_of::<T>()) as u64,
        usage: usage | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Defaults, overridden by the JSON file named in `METABLOB_CONFIG` if set.
fn load_config() -> AppResult<BlobConfig> {
    match std::env::var(CONFIG_ENV) {
        Ok(path) => {
            let json = std::fs::read_to_string(&path)?;
            let config = BlobConfig::from_json_str(&json)?;
            log::info!("loaded configuration from {path}");
            Ok(config)
        }
        Err(_) => Ok(BlobConfig::default()),
    }
}

/// Starting mood named in `METABLOB_MOOD`, if set.
fn start_mood() -> AppResult<Option<Mood>> {
    match std::env::var(MOOD_ENV) {
        Ok(name) => Ok(Some(name.parse::<Mood>()?)),
        Err(_) => Ok(None),
    }
}

// ============================================================================
// MAIN
// ============================================================================

fn main() -> AppResult<()> {
    env_logger::init();

    let blob_config = load_config()?;
    let mood = start_mood()?;
    let event_loop = EventLoop::new()?;

    let window_attributes = Window::default_attributes()
        .with_title("Metablob")
        .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));

    let window = Arc::new(event_loop.create_window(window_attributes)?);

    let mut state = pollster::block_on(State::new(window.clone(), blob_config))?;
    if let Some(mood) = mood {
        state.blob.set_state(mood);
    }

    event_loop.run(move |event, control_flow| {
        match event {
            WinitEvent::WindowEvent {
                ref event,
                window_id,
            } if window_id == window.id() => {
                let _ = state.overlay.handle_window_event(&window, event);
                state.input.process_event(event);

                match event {
                    WindowEvent::CloseRequested
                    | WindowEvent::KeyboardInput {
                        event:
                            KeyEvent {
                                state: ElementState::Pressed,
                                physical_key: PhysicalKey::Code(KeyCode::Escape),
                                ..
                            },
                        ..
                    } => control_flow.exit(),
                    WindowEvent::Resized(physical_size) => {
                        state.resize(*physical_size);
                    }
                    WindowEvent::RedrawRequested => {
                        state.update();
                        match state.render() {
                            Ok(_) => {}
                            Err(wgpu::SurfaceError::Lost) => state.resize(state.size),
                            Err(wgpu::SurfaceError::OutOfMemory) => control_flow.exit(),
                            Err(e) => log::warn!("{:?}", e),
                        }
                    }
                    _ => {}
                }
            }
            WinitEvent::AboutToWait => {
                window.request_redraw();
            }
            _ => {}
        }
    })?;

    Ok(())
}
