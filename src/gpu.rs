//! Headless GPU context and texture readback.
//!
//! [`GpuContext`] holds the wgpu device and queue the [`WgpuBackend`] renders
//! with. There is no surface: every frame ends in an offscreen target that is
//! read back with [`GpuContext::read_texture`].
//!
//! [`WgpuBackend`]: crate::WgpuBackend

use crate::backend::BackendError;

/// Core GPU context holding the wgpu device and queue.
pub struct GpuContext {
    /// The logical GPU device for creating resources and pipelines.
    pub device: wgpu::Device,
    /// The command queue for submitting work to the GPU.
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Create a headless GPU context.
    ///
    /// Picks an adapter from the primary backends (Vulkan, Metal, DX12) without
    /// a compatible surface and requests a default device.
    ///
    /// # Errors
    ///
    /// [`BackendError::Device`] when no adapter is available or device creation
    /// fails.
    pub fn new() -> Result<Self, BackendError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| BackendError::Device(format!("no suitable GPU adapter: {e}")))?;

        let info = adapter.get_info();
        log::info!("using adapter '{}' ({:?})", info.name, info.backend);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("screenfx device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
            experimental_features: Default::default(),
        }))
        .map_err(|e| BackendError::Device(format!("failed to create device: {e}")))?;

        Ok(Self { device, queue })
    }

    /// Copies a 2D texture into host memory with row padding removed.
    ///
    /// `bytes_per_pixel` must match the texture format. Blocks until the GPU
    /// has finished all submitted work.
    pub fn read_texture(
        &self,
        texture: &wgpu::Texture,
        bytes_per_pixel: u32,
    ) -> Result<Vec<u8>, BackendError> {
        let width = texture.width();
        let height = texture.height();
        let tight_bpr = width * bytes_per_pixel;
        let padded_bpr = tight_bpr.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback staging"),
            size: u64::from(padded_bpr) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bpr),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| BackendError::Device(format!("device poll failed: {e}")))?;
        receiver
            .recv()
            .map_err(|_| BackendError::Device("map_async callback dropped".into()))?
            .map_err(|e| BackendError::Device(format!("buffer map failed: {e}")))?;

        let data = slice.get_mapped_range();
        let tight = tight_bpr as usize;
        let mut pixels = Vec::with_capacity(tight * height as usize);
        for row in data.chunks(padded_bpr as usize).take(height as usize) {
            pixels.extend_from_slice(&row[..tight]);
        }
        drop(data);
        staging.unmap();

        Ok(pixels)
    }
}
