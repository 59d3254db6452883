//! wgpu surface that draws one vertex-coloured triangle mesh through a camera
//! uniform, with optional per-batch textures for artwork faces.
#![forbid(unsafe_code)]

use std::fmt;
use std::ops::Range;
use winit::dpi::PhysicalSize;
use winit::window::Window;

pub use mesh::{BoxPlacement, MeshBuilder};
pub use wgpu::SurfaceError as RenderError;

mod mesh;
mod scene_pass;

use scene_pass::{ScenePass, TextureBank};

/// Hall interior beyond the lit geometry.
const BACKGROUND: wgpu::Color = wgpu::Color::BLACK;

#[derive(Debug)]
pub enum RenderInitError {
    Surface(wgpu::CreateSurfaceError),
    NoAdapter,
    RequestDevice(wgpu::RequestDeviceError),
}

impl fmt::Display for RenderInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Surface(err) => write!(f, "cannot create window surface: {}", err),
            Self::NoAdapter => f.write_str("no GPU adapter can present to this window"),
            Self::RequestDevice(err) => write!(f, "GPU device request refused: {}", err),
        }
    }
}

impl std::error::Error for RenderInitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Surface(err) => Some(err),
            Self::RequestDevice(err) => Some(err),
            Self::NoAdapter => None,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum MeshError {
    Empty,
    DanglingIndex { index: u32, vertex_count: u32 },
    TooLarge,
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("no triangles to draw"),
            Self::DanglingIndex {
                index,
                vertex_count,
            } => write!(f, "index {} points past {} vertices", index, vertex_count),
            Self::TooLarge => f.write_str("vertex count exceeds u32 indexing"),
        }
    }
}

impl std::error::Error for MeshError {}

#[derive(Debug, PartialEq, Eq)]
pub enum TextureError {
    Empty,
    SizeMismatch { expected: usize, actual: usize },
    TooLarge { width: u32, height: u32, max: u32 },
}

impl fmt::Display for TextureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("texture has no pixels"),
            Self::SizeMismatch { expected, actual } => {
                write!(f, "expected {} bytes of RGBA, got {}", expected, actual)
            }
            Self::TooLarge { width, height, max } => {
                write!(f, "{}x{} texture exceeds the device limit of {}", width, height, max)
            }
        }
    }
}

impl std::error::Error for TextureError {}

/// Names an uploaded texture. Batches refer to textures by key so the mesh can
/// be rebuilt without re-uploading pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureKey(pub u32);

/// World-space position, linear RGB colour and texture coordinate. Untextured
/// vertices sample a white texel, so `uv` only matters inside textured batches.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub uv: [f32; 2],
}

/// Index range drawn with one texture bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawBatch {
    pub indices: Range<u32>,
    pub texture: Option<TextureKey>,
}

/// Triangle list; every index is checked against the vertex count on construction.
#[derive(Debug, Clone)]
pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
    pub batches: Vec<DrawBatch>,
}

impl MeshData {
    /// One untextured batch covering every index.
    pub fn new(vertices: Vec<MeshVertex>, indices: Vec<u32>) -> Result<Self, MeshError> {
        let count = u32::try_from(indices.len()).map_err(|_| MeshError::TooLarge)?;
        let batches = vec![DrawBatch {
            indices: 0..count,
            texture: None,
        }];
        Self::batched(vertices, indices, batches)
    }

    /// Batch ranges are clamped to the index list; empty ones are dropped.
    pub fn batched(
        vertices: Vec<MeshVertex>,
        indices: Vec<u32>,
        batches: Vec<DrawBatch>,
    ) -> Result<Self, MeshError> {
        let vertex_count = u32::try_from(vertices.len()).map_err(|_| MeshError::TooLarge)?;
        let index_count = u32::try_from(indices.len()).map_err(|_| MeshError::TooLarge)?;
        let Some(&highest) = indices.iter().max() else {
            return Err(MeshError::Empty);
        };
        if highest >= vertex_count {
            return Err(MeshError::DanglingIndex {
                index: highest,
                vertex_count,
            });
        }
        let batches = batches
            .into_iter()
            .map(|batch| DrawBatch {
                indices: batch.indices.start.min(index_count)..batch.indices.end.min(index_count),
                texture: batch.texture,
            })
            .filter(|batch| !batch.indices.is_empty())
            .collect();
        Ok(Self {
            vertices,
            indices,
            batches,
        })
    }
}

pub struct Renderer<'window> {
    window: &'window Window,
    surface: wgpu::Surface<'window>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    textures: TextureBank,
    scene: Option<ScenePass>,
}

impl<'window> Renderer<'window> {
    pub fn new(window: &'window Window) -> Result<Self, RenderInitError> {
        pollster::block_on(Self::init(window))
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        PhysicalSize::new(self.config.width, self.config.height)
    }

    /// Reconfigures the surface. Zero-sized requests (minimised windows) are ignored.
    pub fn resize(&mut self, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.config.width = size.width;
        self.config.height = size.height;
        self.surface.configure(&self.device, &self.config);
        if let Some(scene) = self.scene.as_mut() {
            scene.resize(&self.device, &self.config);
        }
    }

    /// Uploads `mesh`, replacing whatever was drawn before.
    pub fn set_scene(&mut self, mesh: &MeshData) -> Result<(), MeshError> {
        if let Some(scene) = self.scene.as_mut() {
            return scene.replace_mesh(&self.device, mesh);
        }
        self.scene = Some(ScenePass::new(
            &self.device,
            &self.config,
            self.textures.layout(),
            mesh,
        )?);
        Ok(())
    }

    /// Uploads tightly packed RGBA8 pixels under `key`, replacing any texture
    /// already stored there. Batches whose key was never uploaded draw untextured.
    pub fn upload_texture(
        &mut self,
        key: TextureKey,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<(), TextureError> {
        self.textures
            .upload(&self.device, &self.queue, key, width, height, rgba)
    }

    pub fn has_texture(&self, key: TextureKey) -> bool {
        self.textures.contains(key)
    }

    /// No-op until a mesh has been set.
    pub fn update_camera(&mut self, view_proj: [[f32; 4]; 4]) {
        if let Some(scene) = self.scene.as_ref() {
            scene.set_camera(&self.queue, view_proj);
        }
    }

    /// Draws the scene, then hands the encoder and target view to `overlay` so
    /// UI can be composited on top before submission.
    pub fn render_with_overlay<F>(&mut self, overlay: F) -> Result<(), RenderError>
    where
        F: FnOnce(&wgpu::Device, &wgpu::Queue, &mut wgpu::CommandEncoder, &wgpu::TextureView),
    {
        let frame = self.surface.get_current_texture()?;
        let target = frame.texture.create_view(&Default::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("gallery.frame.encoder"),
            });
        self.draw_scene(&mut encoder, &target);
        overlay(&self.device, &self.queue, &mut encoder, &target);
        self.queue.submit([encoder.finish()]);
        frame.present();
        Ok(())
    }

    fn draw_scene(&self, encoder: &mut wgpu::CommandEncoder, target: &wgpu::TextureView) {
        let color = wgpu::RenderPassColorAttachment {
            view: target,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(BACKGROUND),
                store: wgpu::StoreOp::Store,
            },
        };
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("gallery.frame.scene_pass"),
            color_attachments: &[Some(color)],
            depth_stencil_attachment: self.scene.as_ref().map(ScenePass::depth_attachment),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        if let Some(scene) = self.scene.as_ref() {
            scene.draw(&mut pass, &self.textures);
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    async fn init(window: &'window Window) -> Result<Self, RenderInitError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let surface = instance
            .create_surface(window)
            .map_err(RenderInitError::Surface)?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                force_fallback_adapter: false,
                compatible_surface: Some(&surface),
            })
            .await
            .ok_or(RenderInitError::NoAdapter)?;
        let limits = wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits());
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("gallery.device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits,
                },
                None,
            )
            .await
            .map_err(RenderInitError::RequestDevice)?;

        // Vertex colours are linear; an sRGB target does the encode.
        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(wgpu::TextureFormat::is_srgb)
            .or_else(|| caps.formats.first().copied())
            .unwrap_or(wgpu::TextureFormat::Bgra8UnormSrgb);
        let size = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: Vec::new(),
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        let textures = TextureBank::new(&device, &queue);
        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            textures,
            scene: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(x: f32) -> MeshVertex {
        MeshVertex {
            position: [x, 0.0, 0.0],
            color: [1.0, 0.5, 0.25],
            uv: [0.0, 0.0],
        }
    }

    #[test]
    fn mesh_rejects_out_of_range_indices() {
        let err = MeshData::new(vec![vertex(0.0), vertex(1.0)], vec![0, 1, 2]).unwrap_err();
        assert_eq!(
            err,
            MeshError::DanglingIndex {
                index: 2,
                vertex_count: 2
            }
        );
    }

    #[test]
    fn mesh_without_triangles_is_rejected() {
        assert_eq!(
            MeshData::new(vec![vertex(0.0)], Vec::new()).unwrap_err(),
            MeshError::Empty
        );
        assert_eq!(
            MeshData::new(Vec::new(), vec![0]).unwrap_err(),
            MeshError::DanglingIndex {
                index: 0,
                vertex_count: 0
            }
        );
    }

    #[test]
    fn plain_mesh_is_one_untextured_batch() {
        let mesh = MeshData::new(vec![vertex(0.0), vertex(1.0), vertex(2.0)], vec![0, 1, 2]).unwrap();
        assert_eq!(
            mesh.batches,
            vec![DrawBatch {
                indices: 0..3,
                texture: None
            }]
        );
    }

    #[test]
    fn batches_are_clamped_and_empty_ones_dropped() {
        let vertices = vec![vertex(0.0), vertex(1.0), vertex(2.0)];
        let batches = vec![
            DrawBatch {
                indices: 0..0,
                texture: None,
            },
            DrawBatch {
                indices: 0..3,
                texture: Some(TextureKey(4)),
            },
            DrawBatch {
                indices: 3..9,
                texture: None,
            },
        ];
        let mesh = MeshData::batched(vertices, vec![0, 1, 2], batches).unwrap();
        assert_eq!(mesh.batches.len(), 1);
        assert_eq!(mesh.batches[0].texture, Some(TextureKey(4)));
    }
}
