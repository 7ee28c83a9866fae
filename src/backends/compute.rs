use std::sync::mpsc;

use wgpu::util::DeviceExt;

use crate::buffer::PixelBuffer;
use crate::core::{BackendError, ComputeBackend};
use crate::params::{DownsampleParameters, PACKED_PARAMS_SIZE};
use crate::util::padded_bytes_per_row;

/// How level data lives on the device. Selected once at bootstrap; the
/// kernel variant and bind group layout are compiled to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Levels are structured storage buffers of packed RGBA8 words.
    StorageBuffer,
    /// Levels are `Rgba8Unorm` textures; the output is a storage texture.
    Texture,
}

/// Thread-group dimensions baked into both kernel variants.
const WORKGROUP_X: u32 = 8;
const WORKGROUP_Y: u32 = 8;

/// A device resource bound as the kernel's input or output view.
pub enum DeviceView {
    Buffer {
        buffer: wgpu::Buffer,
        width: u32,
        height: u32,
    },
    Texture {
        texture: wgpu::Texture,
        view: wgpu::TextureView,
        width: u32,
        height: u32,
    },
}

/// [`ComputeBackend`] implementation over a wgpu device.
///
/// `new` performs the whole bootstrap: adapter selection, device request,
/// kernel compilation and pipeline creation for the chosen
/// [`ResourceKind`]. A bootstrap failure is fatal to the caller; the
/// builder never sees a half-initialized backend.
pub struct WgpuComputeBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    kind: ResourceKind,
    /// Keeps the instance alive until the device and queue are dropped.
    _instance: wgpu::Instance,
}

impl WgpuComputeBackend {
    /// Creates a backend on the first compatible adapter, preferring
    /// discrete hardware.
    pub fn new(kind: ResourceKind) -> Result<Self, BackendError> {
        pollster::block_on(Self::new_async(kind))
    }

    async fn new_async(kind: ResourceKind) -> Result<Self, BackendError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError::Device("no compatible adapter found".into()))?;
        let info = adapter.get_info();
        log::info!("mip generation adapter: {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("mipgen"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::Device(format!("device request failed: {e}")))?;

        let source = match kind {
            ResourceKind::StorageBuffer => include_str!("../shaders/downsample_buffer.wgsl"),
            ResourceKind::Texture => include_str!("../shaders/downsample_texture.wgsl"),
        };
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("downsample"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let bind_group_layout = bind_group_layout_for_kind(&device, kind);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("downsample"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("downsample"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: "main",
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            kind,
            _instance: instance,
        })
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Runs `f` inside out-of-memory and validation error scopes, turning
    /// device faults into `BackendError` results.
    fn scoped<T>(&self, label: &str, f: impl FnOnce(&wgpu::Device) -> T) -> Result<T, BackendError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        if let Some(e) = oom {
            return Err(BackendError::OutOfMemory(format!("{label}: {e}")));
        }
        if let Some(e) = validation {
            return Err(BackendError::Device(format!("{label}: {e}")));
        }
        Ok(value)
    }

    fn map_to_host(&self, staging: &wgpu::Buffer) -> Result<Vec<u8>, BackendError> {
        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        // Blocking poll: forces the device to finish all outstanding work
        // before the map resolves. This is what serializes the pipeline.
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| BackendError::Device("readback callback never fired".into()))?
            .map_err(|e| BackendError::Device(format!("readback map failed: {e}")))?;
        let data = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(data)
    }

    fn read_back_buffer(
        &self,
        buffer: &wgpu::Buffer,
        expected_len: usize,
    ) -> Result<Vec<u8>, BackendError> {
        let staging = self.scoped("readback staging", |device| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("mip readback"),
                size: expected_len as u64,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        })?;
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("mip readback"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, expected_len as u64);
        self.queue.submit(std::iter::once(encoder.finish()));

        let data = self.map_to_host(&staging)?;
        if data.len() != expected_len {
            return Err(BackendError::ShortRead {
                expected: expected_len,
                actual: data.len(),
            });
        }
        Ok(data)
    }

    fn read_back_texture(
        &self,
        texture: &wgpu::Texture,
        width: u32,
        height: u32,
        expected_len: usize,
    ) -> Result<Vec<u8>, BackendError> {
        let unpadded = width * 4;
        let padded = padded_bytes_per_row(width, 4);
        let staging = self.scoped("readback staging", |device| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("mip readback"),
                size: padded as u64 * height as u64,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        })?;
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("mip readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
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

        let padded_data = self.map_to_host(&staging)?;
        // Strip the copy-alignment padding from each row.
        let mut data = Vec::with_capacity((unpadded * height) as usize);
        for row in 0..height as usize {
            let start = row * padded as usize;
            data.extend_from_slice(&padded_data[start..start + unpadded as usize]);
        }
        if data.len() != expected_len {
            return Err(BackendError::ShortRead {
                expected: expected_len,
                actual: data.len(),
            });
        }
        Ok(data)
    }

    fn binding<'a>(
        &self,
        view: &'a DeviceView,
    ) -> Result<wgpu::BindingResource<'a>, BackendError> {
        match (self.kind, view) {
            (ResourceKind::StorageBuffer, DeviceView::Buffer { buffer, .. }) => {
                Ok(buffer.as_entire_binding())
            }
            (ResourceKind::Texture, DeviceView::Texture { view, .. }) => {
                Ok(wgpu::BindingResource::TextureView(view))
            }
            _ => Err(BackendError::Device(
                "resource kind does not match the compiled kernel".into(),
            )),
        }
    }
}

impl ComputeBackend for WgpuComputeBackend {
    type InputView = DeviceView;
    type OutputView = DeviceView;
    type ParamsBlock = wgpu::Buffer;

    fn workgroup_size(&self) -> (u32, u32) {
        (WORKGROUP_X, WORKGROUP_Y)
    }

    fn alloc_input(&self, input: &PixelBuffer) -> Result<DeviceView, BackendError> {
        if input.channels() != 4 {
            return Err(BackendError::Device(format!(
                "unsupported channel count {}",
                input.channels()
            )));
        }
        let (width, height) = (input.width(), input.height());
        match self.kind {
            ResourceKind::StorageBuffer => {
                let buffer = self.scoped("input buffer", |device| {
                    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("mip input"),
                        contents: input.bytes(),
                        usage: wgpu::BufferUsages::STORAGE,
                    })
                })?;
                Ok(DeviceView::Buffer {
                    buffer,
                    width,
                    height,
                })
            }
            ResourceKind::Texture => {
                let texture = self.scoped("input texture", |device| {
                    device.create_texture(&wgpu::TextureDescriptor {
                        label: Some("mip input"),
                        size: wgpu::Extent3d {
                            width,
                            height,
                            depth_or_array_layers: 1,
                        },
                        mip_level_count: 1,
                        sample_count: 1,
                        dimension: wgpu::TextureDimension::D2,
                        format: wgpu::TextureFormat::Rgba8Unorm,
                        usage: wgpu::TextureUsages::TEXTURE_BINDING
                            | wgpu::TextureUsages::COPY_DST,
                        view_formats: &[],
                    })
                })?;
                self.queue.write_texture(
                    wgpu::ImageCopyTexture {
                        texture: &texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    input.bytes(),
                    wgpu::ImageDataLayout {
                        offset: 0,
                        bytes_per_row: Some(width * 4),
                        rows_per_image: Some(height),
                    },
                    wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                );
                let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                Ok(DeviceView::Texture {
                    texture,
                    view,
                    width,
                    height,
                })
            }
        }
    }

    fn alloc_output(
        &self,
        width: u32,
        height: u32,
        channels: u32,
    ) -> Result<DeviceView, BackendError> {
        if channels != 4 {
            return Err(BackendError::Device(format!(
                "unsupported channel count {channels}"
            )));
        }
        match self.kind {
            ResourceKind::StorageBuffer => {
                let buffer = self.scoped("output buffer", |device| {
                    device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some("mip output"),
                        size: width as u64 * height as u64 * channels as u64,
                        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
                        mapped_at_creation: false,
                    })
                })?;
                Ok(DeviceView::Buffer {
                    buffer,
                    width,
                    height,
                })
            }
            ResourceKind::Texture => {
                let texture = self.scoped("output texture", |device| {
                    device.create_texture(&wgpu::TextureDescriptor {
                        label: Some("mip output"),
                        size: wgpu::Extent3d {
                            width,
                            height,
                            depth_or_array_layers: 1,
                        },
                        mip_level_count: 1,
                        sample_count: 1,
                        dimension: wgpu::TextureDimension::D2,
                        format: wgpu::TextureFormat::Rgba8Unorm,
                        usage: wgpu::TextureUsages::STORAGE_BINDING
                            | wgpu::TextureUsages::COPY_SRC,
                        view_formats: &[],
                    })
                })?;
                let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                Ok(DeviceView::Texture {
                    texture,
                    view,
                    width,
                    height,
                })
            }
        }
    }

    fn alloc_params(&self, params: &DownsampleParameters) -> Result<wgpu::Buffer, BackendError> {
        let packed = params.packed();
        debug_assert_eq!(packed.len(), PACKED_PARAMS_SIZE);
        self.scoped("parameter block", |device| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("mip params"),
                contents: &packed,
                usage: wgpu::BufferUsages::UNIFORM,
            })
        })
    }

    fn dispatch(
        &self,
        input: &DeviceView,
        output: &DeviceView,
        params: &wgpu::Buffer,
        grid: [u32; 3],
    ) -> Result<(), BackendError> {
        let input_binding = self.binding(input)?;
        let output_binding = self.binding(output)?;
        self.scoped("dispatch", |device| {
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("downsample"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: input_binding,
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: output_binding,
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: params.as_entire_binding(),
                    },
                ],
            });
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("downsample"),
            });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("downsample"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(grid[0], grid[1], grid[2]);
            }
            self.queue.submit(std::iter::once(encoder.finish()));
        })
    }

    fn read_back(&self, output: &DeviceView, expected_len: usize) -> Result<Vec<u8>, BackendError> {
        match output {
            DeviceView::Buffer { buffer, .. } => self.read_back_buffer(buffer, expected_len),
            DeviceView::Texture {
                texture,
                width,
                height,
                ..
            } => self.read_back_texture(texture, *width, *height, expected_len),
        }
    }

    fn release_input(&self, view: DeviceView) {
        release_view(view);
    }

    fn release_output(&self, view: DeviceView) {
        release_view(view);
    }

    fn release_params(&self, block: wgpu::Buffer) {
        block.destroy();
    }
}

fn release_view(view: DeviceView) {
    match view {
        DeviceView::Buffer { buffer, .. } => buffer.destroy(),
        DeviceView::Texture { texture, .. } => texture.destroy(),
    }
}

fn bind_group_layout_for_kind(device: &wgpu::Device, kind: ResourceKind) -> wgpu::BindGroupLayout {
    let params_entry = wgpu::BindGroupLayoutEntry {
        binding: 2,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    };
    match kind {
        ResourceKind::StorageBuffer => {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("downsample (buffers)"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: true },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: false },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    params_entry,
                ],
            })
        }
        ResourceKind::Texture => {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("downsample (textures)"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Texture {
                            multisampled: false,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::StorageTexture {
                            access: wgpu::StorageTextureAccess::WriteOnly,
                            format: wgpu::TextureFormat::Rgba8Unorm,
                            view_dimension: wgpu::TextureViewDimension::D2,
                        },
                        count: None,
                    },
                    params_entry,
                ],
            })
        }
    }
}
