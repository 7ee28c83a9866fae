//! The level-by-level mip pyramid loop.

use crate::buffer::{mip_level_count, MipChain, PixelBuffer};
use crate::core::{ComputeBackend, Error};
use crate::level::LevelResourceSet;
use crate::params::DownsampleParameters;

/// Drives a sequence of compute dispatches that each produce one
/// halved-resolution level, until the dimensions reach 1x1.
///
/// The pipeline is intentionally non-overlapped: each level's readback
/// blocks until the device finishes that level's work, then its resources
/// are released before the next level begins. No device resource is
/// shared or reused across levels.
pub struct MipPyramidBuilder<'a, B: ComputeBackend> {
    backend: &'a B,
}

impl<'a, B: ComputeBackend> MipPyramidBuilder<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Generates the full mip chain for `source`.
    ///
    /// The chain starts with a deep copy of `source`; the engine never
    /// aliases caller-owned memory across levels. A 1x1 source yields a
    /// chain of length 1 with no dispatch. On error no partial chain is
    /// returned and all transient device resources have been released.
    pub fn build(&self, source: &PixelBuffer) -> Result<MipChain, Error> {
        let (width, height) = (source.width(), source.height());
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimensions { width, height });
        }
        let levels = mip_level_count(width, height);
        log::debug!("generating {levels} mip levels for {width}x{height} source");

        let mut chain = MipChain::with_base(source.clone());
        let (group_x, group_y) = self.backend.workgroup_size();

        for level in 1..levels {
            let prev = chain.last();
            let dst_width = (prev.width() / 2).max(1);
            let dst_height = (prev.height() / 2).max(1);
            let channels = prev.channels();
            let dst_level = prev.level() + 1;

            // Parity is always classified against the source of this step.
            let params = DownsampleParameters::for_step(prev, dst_width, dst_height);
            log::trace!(
                "level {level}: {}x{} -> {dst_width}x{dst_height} ({:?})",
                prev.width(),
                prev.height(),
                params.dimension_case
            );

            let resources = LevelResourceSet::create(
                self.backend,
                prev,
                (dst_width, dst_height),
                &params,
            )
            .map_err(|(phase, source)| Error::ResourceExhausted {
                level,
                phase,
                source,
            })?;

            // One invocation per output pixel; ceiling division so the
            // grid never under-covers the destination.
            let grid = [
                (dst_width + group_x - 1) / group_x,
                (dst_height + group_y - 1) / group_y,
                1,
            ];
            resources
                .dispatch(grid)
                .map_err(|source| Error::DispatchFailed { level, source })?;

            let expected = dst_width as usize * dst_height as usize * channels as usize;
            let bytes = resources
                .read_back(expected)
                .map_err(|source| Error::ReadbackFailed { level, source })?;
            resources.dispose();

            let mut next = PixelBuffer::unpopulated(dst_width, dst_height, channels, dst_level);
            next.populate(bytes);
            chain.push(next);
        }

        Ok(chain)
    }
}
