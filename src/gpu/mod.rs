//! wgpu implementation of the device handle.
//!
//! [`GpuContext`] owns the instance, adapter, device and queue for one window
//! and outlives mounts. Every mount asks [`WgpuFactory`] for a fresh
//! [`WgpuBackend`], which owns the configured surface, the depth buffer, the
//! scene pipeline and one set of GPU buffers per mesh. Disposing the backend
//! hands the surface back to the context for the next mount.

use std::{
    cell::RefCell,
    collections::HashMap,
    rc::Rc,
    sync::Arc,
};

use cgmath::{Matrix, SquareMatrix};
use wgpu::util::DeviceExt;
use winit::{dpi::PhysicalSize, window::Window};

use crate::{
    engine::{BackendFactory, GraphicsBackend},
    error::{InitializationError, RenderError},
    options::EngineOptions,
    scene::{Mesh, MeshId, SceneData},
    surface::SurfaceHandle,
};

pub mod pipeline;
pub mod texture;

use pipeline::{MeshVertex, ModelUniform, SceneUniform};
use texture::DepthTexture;

/// Instance, adapter, device and queue for one window.
pub struct GpuContext {
    pub window: Arc<Window>,
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    spare_surface: RefCell<Option<wgpu::Surface<'static>>>,
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("adapter", &self.adapter.get_info().name)
            .field("backend", &self.adapter.get_info().backend)
            .finish()
    }
}

impl GpuContext {
    /// Request an adapter and device able to present to `window`.
    pub async fn new(window: Arc<Window>) -> Result<Self, InitializationError> {
        // BackendBit::PRIMARY => Vulkan + Metal + DX12 + Browser WebGPU
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::GL,
            ..wgpu::InstanceDescriptor::new_without_display_handle()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| InitializationError::SurfaceCreation(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| InitializationError::NoAdapter(e.to_string()))?;
        log::info!("Using adapter {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                // WebGL doesn't support all of wgpu's features
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| InitializationError::DeviceRequest(e.to_string()))?;

        Ok(Self {
            window,
            instance,
            adapter,
            device,
            queue,
            spare_surface: RefCell::new(Some(surface)),
        })
    }

    fn take_surface(&self) -> Result<wgpu::Surface<'static>, InitializationError> {
        if let Some(surface) = self.spare_surface.borrow_mut().take() {
            return Ok(surface);
        }
        self.instance
            .create_surface(self.window.clone())
            .map_err(|e| InitializationError::SurfaceCreation(e.to_string()))
    }

    fn return_surface(&self, surface: wgpu::Surface<'static>) {
        *self.spare_surface.borrow_mut() = Some(surface);
    }
}

/// Creates one [`WgpuBackend`] per mount on a shared [`GpuContext`].
#[derive(Clone, Debug)]
pub struct WgpuFactory {
    gpu: Rc<GpuContext>,
}

impl WgpuFactory {
    /// A factory handing out backends on `gpu`.
    pub fn new(gpu: Rc<GpuContext>) -> Self {
        Self { gpu }
    }
}

impl BackendFactory for WgpuFactory {
    type Backend = WgpuBackend;

    fn create(
        &self,
        _surface: &dyn SurfaceHandle,
        size: PhysicalSize<u32>,
        options: &EngineOptions,
    ) -> Result<WgpuBackend, InitializationError> {
        let surface = self.gpu.take_surface()?;
        let caps = surface.get_capabilities(&self.gpu.adapter);
        let Some(&first_format) = caps.formats.first() else {
            self.gpu.return_surface(surface);
            return Err(InitializationError::UnsupportedSurface);
        };
        // The shader assumes an sRGB target, otherwise colours come out darker.
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or(first_format);

        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
        if options.preserve_drawing_buffer {
            if caps.usages.contains(wgpu::TextureUsages::COPY_SRC) {
                usage |= wgpu::TextureUsages::COPY_SRC;
            } else {
                log::warn!("Surface cannot be read back, preserve_drawing_buffer has no effect");
            }
        }

        let config = wgpu::SurfaceConfiguration {
            usage,
            format,
            width: size.width,
            height: size.height,
            present_mode: caps
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&self.gpu.device, &config);
        let depth = DepthTexture::new(
            &self.gpu.device,
            [config.width, config.height],
            options.stencil,
            "depth_texture",
        );

        Ok(WgpuBackend {
            gpu: self.gpu.clone(),
            surface: Some(surface),
            config,
            depth,
            clear_colour: options.clear_colour,
            resources: None,
            meshes: HashMap::new(),
        })
    }
}

struct SceneResources {
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    model_layout: wgpu::BindGroupLayout,
}

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    num_elements: u32,
    model_buffer: wgpu::Buffer,
    model_bind_group: wgpu::BindGroup,
}

/// GPU state of one mount: surface, depth buffer, pipeline and mesh buffers.
pub struct WgpuBackend {
    gpu: Rc<GpuContext>,
    surface: Option<wgpu::Surface<'static>>,
    config: wgpu::SurfaceConfiguration,
    depth: DepthTexture,
    clear_colour: wgpu::Color,
    resources: Option<SceneResources>,
    meshes: HashMap<MeshId, GpuMesh>,
}

impl std::fmt::Debug for WgpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuBackend")
            .field("size", &(self.config.width, self.config.height))
            .field("format", &self.config.format)
            .field("depth", &self.depth.format)
            .field("meshes", &self.meshes.len())
            .finish()
    }
}

impl WgpuBackend {
    fn upload(&self, id: MeshId, mesh: &Mesh, layout: &wgpu::BindGroupLayout) -> GpuMesh {
        let device = &self.gpu.device;
        let vertices: Vec<MeshVertex> = mesh
            .data
            .positions
            .iter()
            .enumerate()
            .map(|(i, position)| MeshVertex {
                position: *position,
                normal: mesh.data.normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]),
            })
            .collect();

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Vertex Buffer", mesh.name)),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Index Buffer", mesh.name)),
            contents: bytemuck::cast_slice(&mesh.data.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let model_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Model Buffer", mesh.name)),
            contents: bytemuck::cast_slice(&[model_uniform(mesh)]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let model_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: model_buffer.as_entire_binding(),
            }],
            label: Some("model_bind_group"),
        });
        log::debug!("Uploaded mesh {:?} ({})", id, mesh.name);

        GpuMesh {
            vertex_buffer,
            index_buffer,
            num_elements: mesh.data.indices.len() as u32,
            model_buffer,
            model_bind_group,
        }
    }

    /// Upload new meshes, drop buffers of removed ones, refresh transforms.
    fn sync_meshes(&mut self, scene: &SceneData) {
        let Some(resources) = &self.resources else {
            return;
        };
        let mut fresh = Vec::new();
        for (id, mesh) in scene.meshes() {
            if mesh.data.indices.is_empty() {
                continue;
            }
            match self.meshes.get(&id) {
                Some(gpu_mesh) => self.gpu.queue.write_buffer(
                    &gpu_mesh.model_buffer,
                    0,
                    bytemuck::cast_slice(&[model_uniform(mesh)]),
                ),
                None => fresh.push((id, self.upload(id, mesh, &resources.model_layout))),
            }
        }
        self.meshes.extend(fresh);
        self.meshes.retain(|id, _| scene.mesh(*id).is_some());
    }

    fn write_scene_uniform(&self, scene: &SceneData) {
        let Some(resources) = &self.resources else {
            return;
        };
        let aspect = self.config.width as f32 / self.config.height.max(1) as f32;
        let view_proj = scene
            .camera
            .as_ref()
            .map(|camera| camera.view_proj(aspect))
            .unwrap_or_else(cgmath::Matrix4::identity);
        let (light, sky, ground) = match scene.lights.first() {
            Some(l) => (
                [l.direction.x, l.direction.y, l.direction.z, l.intensity],
                l.diffuse,
                l.ground_colour,
            ),
            None => ([0.0, 1.0, 0.0, 0.0], [0.0; 3], [0.0; 3]),
        };
        let debug = if scene.debug_layer.is_visible() { 1.0 } else { 0.0 };
        let uniform = SceneUniform {
            view_proj: view_proj.into(),
            light,
            sky: [sky[0], sky[1], sky[2], debug],
            ground: [ground[0], ground[1], ground[2], 1.0],
        };
        self.gpu
            .queue
            .write_buffer(&resources.uniform_buffer, 0, bytemuck::cast_slice(&[uniform]));
    }

    fn reconfigure(&self) {
        if let Some(surface) = &self.surface {
            surface.configure(&self.gpu.device, &self.config);
        }
    }
}

fn model_uniform(mesh: &Mesh) -> ModelUniform {
    let model = mesh.transform.to_matrix();
    let normal = model
        .invert()
        .map(|m| m.transpose())
        .unwrap_or_else(cgmath::Matrix4::identity);
    ModelUniform {
        model: model.into(),
        normal: normal.into(),
    }
}

impl GraphicsBackend for WgpuBackend {
    fn prepare_scene(&mut self) -> Result<(), InitializationError> {
        let device = &self.gpu.device;
        let scene_layout = pipeline::uniform_layout(device, "scene_bind_group_layout");
        let model_layout = pipeline::uniform_layout(device, "model_bind_group_layout");
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Scene Buffer"),
            contents: bytemuck::cast_slice(&[SceneUniform {
                view_proj: cgmath::Matrix4::identity().into(),
                light: [0.0, 1.0, 0.0, 0.0],
                sky: [0.0; 4],
                ground: [0.0; 4],
            }]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &scene_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
            label: Some("scene_bind_group"),
        });
        let pipeline = pipeline::mk_scene_pipeline(
            device,
            self.config.format,
            self.depth.format,
            &scene_layout,
            &model_layout,
        );
        self.meshes.clear();
        self.resources = Some(SceneResources {
            pipeline,
            uniform_buffer,
            bind_group,
            model_layout,
        });
        Ok(())
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        self.config.width = size.width;
        self.config.height = size.height;
        self.reconfigure();
        self.depth = DepthTexture::new(
            &self.gpu.device,
            [size.width, size.height],
            self.depth.has_stencil(),
            "depth_texture",
        );
    }

    fn render(&mut self, scene: &SceneData) -> Result<(), RenderError> {
        if self.resources.is_none() {
            return Err(RenderError::Surface("scene resources were not prepared".to_string()));
        }
        let Some(surface) = &self.surface else {
            return Err(RenderError::Disposed);
        };
        let output = match surface.get_current_texture() {
            wgpu::CurrentSurfaceTexture::Success(output)
            | wgpu::CurrentSurfaceTexture::Suboptimal(output) => output,
            // Reconfigure the surface if it's lost or outdated, skip this frame
            wgpu::CurrentSurfaceTexture::Lost | wgpu::CurrentSurfaceTexture::Outdated => {
                log::debug!("Surface lost or outdated, reconfiguring");
                self.reconfigure();
                return Ok(());
            }
            e => return Err(RenderError::Surface(format!("{e:?}"))),
        };

        self.sync_meshes(scene);
        self.write_scene_uniform(scene);
        let Some(resources) = &self.resources else {
            return Ok(());
        };

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_colour),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: self.depth.has_stencil().then_some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(0),
                        store: wgpu::StoreOp::Store,
                    }),
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
                multiview_mask: None,
            });

            render_pass.set_pipeline(&resources.pipeline);
            render_pass.set_bind_group(0, &resources.bind_group, &[]);
            for (id, mesh) in scene.meshes() {
                if !mesh.visible {
                    continue;
                }
                let Some(gpu_mesh) = self.meshes.get(&id) else {
                    continue;
                };
                render_pass.set_bind_group(1, &gpu_mesh.model_bind_group, &[]);
                render_pass.set_vertex_buffer(0, gpu_mesh.vertex_buffer.slice(..));
                render_pass.set_index_buffer(gpu_mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..gpu_mesh.num_elements, 0, 0..1);
            }
        }

        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    fn dispose(&mut self) {
        self.meshes.clear();
        self.resources = None;
        if let Some(surface) = self.surface.take() {
            self.gpu.return_surface(surface);
        }
        log::debug!("GPU resources released");
    }
}
