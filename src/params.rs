//! Downsample kernel parameters: dimension parity classification and the
//! packed uniform block handed to the device.

use bytemuck::{Pod, Zeroable};

use crate::buffer::PixelBuffer;

/// Which boundary-handling branch the downsample kernel takes, derived
/// from the parity of the *source* level's dimensions. Odd dimensions
/// mean the last row or column has no sibling to average with and must
/// be handled as a degenerate single-sample case.
///
/// The discriminants are part of the kernel ABI.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionParityCase {
    EvenEven = 0,
    EvenOdd = 1,
    OddEven = 2,
    OddOdd = 3,
}

/// Classifies `(width mod 2, height mod 2)` of a source level.
pub fn classify(width: u32, height: u32) -> DimensionParityCase {
    match (width % 2 == 0, height % 2 == 0) {
        (true, true) => DimensionParityCase::EvenEven,
        (true, false) => DimensionParityCase::EvenOdd,
        (false, true) => DimensionParityCase::OddEven,
        (false, false) => DimensionParityCase::OddOdd,
    }
}

/// Size of the packed parameter block: 36 bytes of payload rounded up to
/// the next multiple of 16, a hard requirement of the uniform-buffer ABI.
pub const PACKED_PARAMS_SIZE: usize = 48;

/// Per-dispatch parameters for one downsample step.
///
/// `src_*` always describes the level being read, `dst_*` the level being
/// written; parity is classified against the source. `filter_option` is
/// reserved for alternative filters and currently always 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownsampleParameters {
    pub src_width: u32,
    pub src_height: u32,
    pub dst_width: u32,
    pub dst_height: u32,
    /// `(1 / src_width, 1 / src_height)`.
    pub texel_size: [f32; 2],
    pub src_mip_level: i32,
    pub dimension_case: DimensionParityCase,
    pub filter_option: i32,
}

impl DownsampleParameters {
    /// Builds the parameters for one step reading `src` and writing a
    /// `dst_width` x `dst_height` level.
    pub fn for_step(src: &PixelBuffer, dst_width: u32, dst_height: u32) -> Self {
        Self {
            src_width: src.width(),
            src_height: src.height(),
            dst_width,
            dst_height,
            texel_size: [1.0 / src.width() as f32, 1.0 / src.height() as f32],
            src_mip_level: 0,
            dimension_case: classify(src.width(), src.height()),
            filter_option: 0,
        }
    }

    /// Marshals the parameters into the kernel's uniform block layout.
    ///
    /// Field order matches the WGSL struct declaration exactly:
    /// `src_width, src_height, dst_width, dst_height, texel_size,
    /// src_mip_level, dimension_case, filter_option`, then zero padding
    /// to [`PACKED_PARAMS_SIZE`].
    pub fn packed(&self) -> [u8; PACKED_PARAMS_SIZE] {
        let packed = PackedParams {
            src_width: self.src_width as i32,
            src_height: self.src_height as i32,
            dst_width: self.dst_width as i32,
            dst_height: self.dst_height as i32,
            texel_size: self.texel_size,
            src_mip_level: self.src_mip_level,
            dimension_case: self.dimension_case as i32,
            filter_option: self.filter_option,
            _pad: [0; 3],
        };
        let mut out = [0u8; PACKED_PARAMS_SIZE];
        out.copy_from_slice(bytemuck::bytes_of(&packed));
        out
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct PackedParams {
    src_width: i32,
    src_height: i32,
    dst_width: i32,
    dst_height: i32,
    texel_size: [f32; 2],
    src_mip_level: i32,
    dimension_case: i32,
    filter_option: i32,
    _pad: [i32; 3],
}
