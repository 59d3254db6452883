//! GPU side of the gallery mesh: one pipeline, one camera uniform, one
//! vertex/index buffer pair that is swapped whenever the scene is rebaked, and
//! a bank of artwork textures bound per draw batch.

use std::borrow::Cow;
use std::collections::HashMap;

use wgpu::util::DeviceExt;

use crate::{DrawBatch, MeshData, MeshError, MeshVertex, TextureError, TextureKey};

pub(crate) const VERTEX_STRIDE: wgpu::BufferAddress = 32;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;
/// Decoded images are sRGB; sampling returns linear values.
const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

const SHADER: &str = r#"
struct Camera {
    view_proj: mat4x4<f32>,
}

@group(0) @binding(0)
var<uniform> camera: Camera;

@group(1) @binding(0)
var art: texture_2d<f32>;
@group(1) @binding(1)
var art_sampler: sampler;

struct VertexOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) color: vec3<f32>,
    @location(1) uv: vec2<f32>,
}

@vertex
fn vs_main(
    @location(0) position: vec3<f32>,
    @location(1) color: vec3<f32>,
    @location(2) uv: vec2<f32>,
) -> VertexOut {
    var out: VertexOut;
    out.clip = camera.view_proj * vec4<f32>(position, 1.0);
    out.color = color;
    out.uv = uv;
    return out;
}

// Colours arrive already lit and in linear space.
@fragment
fn fs_main(in: VertexOut) -> @location(0) vec4<f32> {
    let texel = textureSample(art, art_sampler, in.uv);
    return vec4<f32>(in.color * texel.rgb, 1.0);
}
"#;

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

struct MeshBuffers {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    batches: Vec<DrawBatch>,
}

impl MeshBuffers {
    fn upload(device: &wgpu::Device, mesh: &MeshData) -> Result<Self, MeshError> {
        if mesh.batches.is_empty() {
            return Err(MeshError::Empty);
        }
        let vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("gallery.scene.vertices"),
            contents: &vertex_bytes(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("gallery.scene.indices"),
            contents: &le_bytes(mesh.indices.iter().map(|index| index.to_le_bytes())),
            usage: wgpu::BufferUsages::INDEX,
        });
        Ok(Self {
            vertices,
            indices,
            batches: mesh.batches.clone(),
        })
    }
}

struct CameraUniform {
    buffer: wgpu::Buffer,
    layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
}

impl CameraUniform {
    fn new(device: &wgpu::Device) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("gallery.scene.camera_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(64),
                },
                count: None,
            }],
        });
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("gallery.scene.camera"),
            size: 64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("gallery.scene.camera_bind_group"),
            layout: &layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        Self {
            buffer,
            layout,
            bind_group,
        }
    }

    fn write(&self, queue: &wgpu::Queue, view_proj: [[f32; 4]; 4]) {
        queue.write_buffer(&self.buffer, 0, &matrix_bytes(view_proj));
    }
}

/// Artwork textures keyed by [`TextureKey`], plus a white texel bound for
/// untextured batches and for keys that were never uploaded.
pub(crate) struct TextureBank {
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    white: wgpu::BindGroup,
    uploaded: HashMap<TextureKey, wgpu::BindGroup>,
}

impl TextureBank {
    pub(crate) fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("gallery.scene.texture_layout"),
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
            ],
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("gallery.scene.sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let white_view = create_texture(device, queue, "gallery.scene.white", 1, 1, &[u8::MAX; 4]);
        let white = bind_texture(device, &layout, &sampler, &white_view);
        Self {
            layout,
            sampler,
            white,
            uploaded: HashMap::new(),
        }
    }

    pub(crate) fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    pub(crate) fn contains(&self, key: TextureKey) -> bool {
        self.uploaded.contains_key(&key)
    }

    pub(crate) fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        key: TextureKey,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<(), TextureError> {
        check_texture(width, height, rgba.len(), device.limits().max_texture_dimension_2d)?;
        let view = create_texture(device, queue, "gallery.scene.artwork", width, height, rgba);
        let bind_group = bind_texture(device, &self.layout, &self.sampler, &view);
        self.uploaded.insert(key, bind_group);
        Ok(())
    }

    fn bind_group(&self, key: Option<TextureKey>) -> &wgpu::BindGroup {
        key.and_then(|key| self.uploaded.get(&key))
            .unwrap_or(&self.white)
    }
}

/// Validates an RGBA8 upload against its dimensions and the device limit.
pub(crate) fn check_texture(
    width: u32,
    height: u32,
    len: usize,
    max_edge: u32,
) -> Result<(), TextureError> {
    if width == 0 || height == 0 {
        return Err(TextureError::Empty);
    }
    if width > max_edge || height > max_edge {
        return Err(TextureError::TooLarge {
            width,
            height,
            max: max_edge,
        });
    }
    let expected = width as usize * height as usize * 4;
    if len != expected {
        return Err(TextureError::SizeMismatch {
            expected,
            actual: len,
        });
    }
    Ok(())
}

fn create_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    width: u32,
    height: u32,
    rgba: &[u8],
) -> wgpu::TextureView {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TEXTURE_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        rgba,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        size,
    );
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn bind_texture(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    view: &wgpu::TextureView,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("gallery.scene.texture_bind_group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

pub(crate) struct ScenePass {
    pipeline: wgpu::RenderPipeline,
    camera: CameraUniform,
    mesh: MeshBuffers,
    depth: wgpu::TextureView,
}

impl ScenePass {
    pub(crate) fn new(
        device: &wgpu::Device,
        config: &wgpu::SurfaceConfiguration,
        texture_layout: &wgpu::BindGroupLayout,
        mesh: &MeshData,
    ) -> Result<Self, MeshError> {
        let mesh = MeshBuffers::upload(device, mesh)?;
        let camera = CameraUniform::new(device);
        let pipeline = build_pipeline(device, config.format, &camera.layout, texture_layout);
        Ok(Self {
            pipeline,
            camera,
            mesh,
            depth: depth_target(device, config),
        })
    }

    pub(crate) fn replace_mesh(
        &mut self,
        device: &wgpu::Device,
        mesh: &MeshData,
    ) -> Result<(), MeshError> {
        self.mesh = MeshBuffers::upload(device, mesh)?;
        Ok(())
    }

    pub(crate) fn set_camera(&self, queue: &wgpu::Queue, view_proj: [[f32; 4]; 4]) {
        self.camera.write(queue, view_proj);
    }

    pub(crate) fn resize(&mut self, device: &wgpu::Device, config: &wgpu::SurfaceConfiguration) {
        self.depth = depth_target(device, config);
    }

    pub(crate) fn depth_attachment(&self) -> wgpu::RenderPassDepthStencilAttachment<'_> {
        wgpu::RenderPassDepthStencilAttachment {
            view: &self.depth,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(1.0),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }
    }

    pub(crate) fn draw<'pass>(
        &'pass self,
        pass: &mut wgpu::RenderPass<'pass>,
        textures: &'pass TextureBank,
    ) {
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.camera.bind_group, &[]);
        pass.set_vertex_buffer(0, self.mesh.vertices.slice(..));
        pass.set_index_buffer(self.mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
        for batch in &self.mesh.batches {
            pass.set_bind_group(1, textures.bind_group(batch.texture), &[]);
            pass.draw_indexed(batch.indices.clone(), 0, 0..1);
        }
    }
}

fn build_pipeline(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    camera_layout: &wgpu::BindGroupLayout,
    texture_layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("gallery.scene.shader"),
        source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(SHADER)),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("gallery.scene.pipeline_layout"),
        bind_group_layouts: &[camera_layout, texture_layout],
        push_constant_ranges: &[],
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("gallery.scene.pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: "vs_main",
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: VERTEX_STRIDE,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &VERTEX_ATTRIBUTES,
            }],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: "fs_main",
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        // Walls are seen from inside and the ceiling from below; draw both sides.
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
    })
}

fn depth_target(device: &wgpu::Device, config: &wgpu::SurfaceConfiguration) -> wgpu::TextureView {
    device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some("gallery.scene.depth"),
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
        })
        .create_view(&wgpu::TextureViewDescriptor::default())
}

fn le_bytes<const N: usize>(chunks: impl Iterator<Item = [u8; N]>) -> Vec<u8> {
    chunks.flatten().collect()
}

pub(crate) fn vertex_bytes(vertices: &[MeshVertex]) -> Vec<u8> {
    le_bytes(
        vertices
            .iter()
            .flat_map(|vertex| {
                vertex
                    .position
                    .into_iter()
                    .chain(vertex.color)
                    .chain(vertex.uv)
            })
            .map(f32::to_le_bytes),
    )
}

/// Column-major, the layout WGSL expects for `mat4x4<f32>`.
pub(crate) fn matrix_bytes(matrix: [[f32; 4]; 4]) -> Vec<u8> {
    le_bytes(matrix.into_iter().flatten().map(f32::to_le_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_bytes_interleave_position_colour_and_uv() {
        let bytes = vertex_bytes(&[MeshVertex {
            position: [2.0, 0.0, 0.0],
            color: [1.0, 0.5, 0.25],
            uv: [0.75, 1.0],
        }]);
        assert_eq!(bytes.len(), VERTEX_STRIDE as usize);
        assert_eq!(&bytes[0..4], &2.0f32.to_le_bytes());
        assert_eq!(&bytes[12..16], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[20..24], &0.25f32.to_le_bytes());
        assert_eq!(&bytes[24..28], &0.75f32.to_le_bytes());
        assert_eq!(&bytes[28..32], &1.0f32.to_le_bytes());
    }

    #[test]
    fn texture_uploads_are_checked() {
        assert_eq!(check_texture(2, 2, 16, 2048), Ok(()));
        assert_eq!(
            check_texture(2, 2, 12, 2048),
            Err(TextureError::SizeMismatch {
                expected: 16,
                actual: 12
            })
        );
        assert_eq!(check_texture(0, 4, 0, 2048), Err(TextureError::Empty));
        assert_eq!(
            check_texture(4096, 1, 4096 * 4, 2048),
            Err(TextureError::TooLarge {
                width: 4096,
                height: 1,
                max: 2048
            })
        );
    }

    #[test]
    fn matrix_bytes_are_column_major() {
        let mut m = [[0.0; 4]; 4];
        m[3][0] = 5.0;
        let bytes = matrix_bytes(m);
        assert_eq!(bytes.len(), 64);
        assert_eq!(&bytes[48..52], &5.0f32.to_le_bytes());
    }
}
