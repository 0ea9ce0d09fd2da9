//! Headless wgpu backend.

use std::collections::HashMap;

use image::{Rgba32FImage, RgbaImage};

use super::{BackendError, RenderBackend};
use crate::binding::{UniformLayout, UniformScope};
use crate::compositor::Viewport;
use crate::ecs::{IdAllocator, ProgramId, TextureId};
use crate::gpu::GpuContext;
use crate::shader::ShaderProgram;

/// Format of every colour target and uploaded colour texture.
const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
/// Format of uploaded depth. Not filterable, so programs read it with `textureLoad`.
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl GpuTexture {
    fn size(&self) -> (u32, u32) {
        (self.texture.width(), self.texture.height())
    }
}

struct GpuProgram {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    layout: UniformLayout,
    scope: UniformScope,
}

/// Renders effect programs with wgpu into offscreen targets.
///
/// Each compiled program gets a pipeline whose bind group 0 holds the packed
/// uniform buffer at binding 0 and its texture uniforms at bindings 1.. in
/// declaration order. Draws use a full-screen triangle clipped to the stage
/// viewport; pixels outside the viewport keep their previous contents.
pub struct WgpuBackend {
    gpu: GpuContext,
    width: u32,
    height: u32,
    textures: HashMap<TextureId, GpuTexture>,
    programs: HashMap<ProgramId, GpuProgram>,
    texture_ids: IdAllocator,
    program_ids: IdAllocator,
}

impl WgpuBackend {
    /// Creates a backend on a fresh headless device.
    pub fn new(width: u32, height: u32) -> Result<Self, BackendError> {
        Ok(Self::with_context(GpuContext::new()?, width, height))
    }

    pub fn with_context(gpu: GpuContext, width: u32, height: u32) -> Self {
        Self {
            gpu,
            width,
            height,
            textures: HashMap::new(),
            programs: HashMap::new(),
            texture_ids: IdAllocator::default(),
            program_ids: IdAllocator::default(),
        }
    }

    /// Changes the output resolution. Ignores zero-sized dimensions to avoid
    /// wgpu validation errors.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.width = width;
            self.height = height;
        }
    }

    pub fn context(&self) -> &GpuContext {
        &self.gpu
    }

    fn allocate(
        &mut self,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
        label: &str,
    ) -> TextureId {
        let texture = self.gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = TextureId(self.texture_ids.next());
        self.textures.insert(id, GpuTexture { texture, view });
        id
    }

    fn texture(&self, id: TextureId) -> Result<&GpuTexture, BackendError> {
        self.textures.get(&id).ok_or(BackendError::UnknownTexture(id))
    }

    fn write(&self, texture: &wgpu::Texture, data: &[u8], bytes_per_pixel: u32) {
        let (width, height) = (texture.width(), texture.height());
        self.gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * bytes_per_pixel),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }
}

impl RenderBackend for WgpuBackend {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn create_target(&mut self, width: u32, height: u32, label: &str) -> Result<TextureId, BackendError> {
        if width == 0 || height == 0 {
            return Err(BackendError::Device(format!("'{label}' has zero size")));
        }
        let usage = wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST;
        let id = self.allocate(width, height, COLOR_FORMAT, usage, label);
        Ok(id)
    }

    fn upload_color(&mut self, image: &RgbaImage, label: &str) -> Result<TextureId, BackendError> {
        let usage = wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST;
        let id = self.allocate(image.width(), image.height(), COLOR_FORMAT, usage, label);
        let texture = &self.texture(id)?.texture;
        self.write(texture, image.as_raw(), 4);
        Ok(id)
    }

    fn upload_depth(
        &mut self,
        width: u32,
        height: u32,
        depth: &[f32],
        label: &str,
    ) -> Result<TextureId, BackendError> {
        if depth.len() != (width as usize) * (height as usize) {
            return Err(BackendError::SizeMismatch {
                expected: (width, height),
                actual: (depth.len() as u32, 1),
            });
        }
        let usage = wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST;
        let id = self.allocate(width, height, DEPTH_FORMAT, usage, label);
        let texture = &self.texture(id)?.texture;
        self.write(texture, bytemuck::cast_slice(depth), 4);
        Ok(id)
    }

    fn release_texture(&mut self, id: TextureId) {
        if let Some(entry) = self.textures.remove(&id) {
            entry.texture.destroy();
        }
    }

    fn texture_size(&self, id: TextureId) -> Option<(u32, u32)> {
        self.textures.get(&id).map(GpuTexture::size)
    }

    fn compile_program(&mut self, program: &'static ShaderProgram) -> Result<ProgramId, BackendError> {
        let device = &self.gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(program.label),
            source: wgpu::ShaderSource::Wgsl(program.source.into()),
        });

        let layout = UniformLayout::new(program.uniforms);
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(program.label),
            size: layout.size() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        for (i, _) in program.textures().enumerate() {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: i as u32 + 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(program.label),
            entries: &entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(program.label),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(program.label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: COLOR_FORMAT,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            log::error!("program '{}' failed to compile: {error}", program.label);
            return Err(BackendError::Compile {
                label: program.label,
                message: error.to_string(),
            });
        }

        let id = ProgramId(self.program_ids.next());
        self.programs.insert(
            id,
            GpuProgram {
                pipeline,
                bind_group_layout,
                uniform_buffer,
                layout,
                scope: UniformScope::new(program.uniforms),
            },
        );
        Ok(id)
    }

    fn release_program(&mut self, id: ProgramId) {
        if let Some(program) = self.programs.remove(&id) {
            program.uniform_buffer.destroy();
        }
    }

    fn uniforms(&mut self, program: ProgramId) -> Result<&mut UniformScope, BackendError> {
        self.programs
            .get_mut(&program)
            .map(|p| &mut p.scope)
            .ok_or(BackendError::UnknownProgram(program))
    }

    fn draw_fullscreen(
        &mut self,
        program: ProgramId,
        output: TextureId,
        viewport: Viewport,
    ) -> Result<(), BackendError> {
        let compiled = self
            .programs
            .get(&program)
            .ok_or(BackendError::UnknownProgram(program))?;

        let mut views = Vec::new();
        for (name, bound) in compiled.scope.textures() {
            let id = bound.ok_or(BackendError::UnboundTexture(name))?;
            views.push(&self.texture(id)?.view);
        }

        let target = self.texture(output)?;
        let (width, height) = target.size();
        if viewport.x + viewport.width > width || viewport.y + viewport.height > height {
            return Err(BackendError::SizeMismatch {
                expected: (width, height),
                actual: (viewport.x + viewport.width, viewport.y + viewport.height),
            });
        }

        self.gpu.queue.write_buffer(
            &compiled.uniform_buffer,
            0,
            &compiled.layout.pack(&compiled.scope),
        );

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: compiled.uniform_buffer.as_entire_binding(),
        }];
        for (i, view) in views.into_iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: i as u32 + 1,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        let bind_group = self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("effect bind group"),
            layout: &compiled.bind_group_layout,
            entries: &entries,
        });

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("effect encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("effect pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_viewport(
                viewport.x as f32,
                viewport.y as f32,
                viewport.width as f32,
                viewport.height as f32,
                0.0,
                1.0,
            );
            pass.set_pipeline(&compiled.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn copy_texture(&mut self, src: TextureId, dst: TextureId) -> Result<(), BackendError> {
        let source = self.texture(src)?;
        let target = self.texture(dst)?;
        if source.size() != target.size() {
            return Err(BackendError::SizeMismatch {
                expected: target.size(),
                actual: source.size(),
            });
        }
        if source.texture.format() != target.texture.format() {
            return Err(BackendError::Device(format!(
                "cannot copy {:?} into {:?}",
                source.texture.format(),
                target.texture.format()
            )));
        }

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("copy encoder"),
            });
        encoder.copy_texture_to_texture(
            source.texture.as_image_copy(),
            target.texture.as_image_copy(),
            source.texture.size(),
        );
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn read_pixels(&mut self, id: TextureId) -> Result<Rgba32FImage, BackendError> {
        let entry = self.texture(id)?;
        let (width, height) = entry.size();
        let bytes = self.gpu.read_texture(&entry.texture, 4)?;

        let pixels: Vec<f32> = if entry.texture.format() == DEPTH_FORMAT {
            bytes
                .chunks_exact(4)
                .flat_map(|c| [f32::from_ne_bytes([c[0], c[1], c[2], c[3]]), 0.0, 0.0, 1.0])
                .collect()
        } else {
            bytes.iter().map(|&b| f32::from(b) / 255.0).collect()
        };

        Rgba32FImage::from_raw(width, height, pixels)
            .ok_or_else(|| BackendError::Device("readback size mismatch".into()))
    }
}
