/*!
Generate mip pyramids for RGBA8 images with compute shaders.

The engine downsamples level by level: each step reads the previous
level, runs one compute dispatch applying a 2x2 box filter (degenerating
at odd edges), blocks on readback, and appends the result to the chain,
until the dimensions reach 1x1.

## Usage

```no_run
use mipgen::{MipPyramidBuilder, PixelBuffer, ResourceKind, WgpuComputeBackend};

fn example() -> Result<(), Box<dyn std::error::Error>> {
    let backend = WgpuComputeBackend::new(ResourceKind::StorageBuffer)?;
    let source = PixelBuffer::from_rgba8(256, 256, vec![255u8; 256 * 256 * 4]);
    let chain = MipPyramidBuilder::new(&backend).build(&source)?;
    assert_eq!(chain.level_count(), 9);
    assert_eq!(chain.level(8).width(), 1);
    Ok(())
}
```

The device sits behind the [`ComputeBackend`] trait;
[`WgpuComputeBackend`] implements it over wgpu and keeps level data
either in storage buffers or in textures, per [`ResourceKind`].
*/
mod backends;
mod buffer;
mod builder;
mod core;
mod level;
#[cfg(test)]
mod mock;
mod params;

#[doc(hidden)]
pub mod util;

#[doc(inline)]
pub use crate::backends::{DeviceView, ResourceKind, WgpuComputeBackend};

pub use crate::buffer::{mip_level_count, MipChain, PixelBuffer, CHANNELS};
pub use crate::builder::MipPyramidBuilder;
pub use crate::core::{AllocPhase, BackendError, ComputeBackend, Error};
pub use crate::level::LevelResourceSet;
pub use crate::params::{classify, DimensionParityCase, DownsampleParameters, PACKED_PARAMS_SIZE};
