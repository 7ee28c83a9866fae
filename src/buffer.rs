//! Host-side image data: one `PixelBuffer` per mip level, collected into a
//! `MipChain`.

/// Number of channels in every buffer the engine handles. Sources are
/// decoded to RGBA before they reach the builder.
pub const CHANNELS: u32 = 4;

/// Host-side owned image data for a single mip level.
///
/// A buffer is *populated* when its byte storage holds exactly
/// `width * height * channels` bytes, and *unpopulated* (empty storage)
/// for a level whose readback has not happened yet. Once populated a
/// buffer is never mutated again; it is read as the input of the next
/// level and then retained in the output chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    channels: u32,
    level: i32,
    bytes: Vec<u8>,
}

impl PixelBuffer {
    /// Creates a populated level-0 buffer from tightly packed RGBA bytes.
    ///
    /// # Panics
    ///
    /// Panics if `bytes.len() != width * height * 4`.
    pub fn from_rgba8(width: u32, height: u32, bytes: Vec<u8>) -> Self {
        assert_eq!(
            bytes.len(),
            width as usize * height as usize * CHANNELS as usize,
            "pixel data does not match {}x{} RGBA",
            width,
            height
        );
        Self {
            width,
            height,
            channels: CHANNELS,
            level: 0,
            bytes,
        }
    }

    /// Creates an unpopulated buffer whose storage will be filled by a
    /// readback from the device.
    pub fn unpopulated(width: u32, height: u32, channels: u32, level: i32) -> Self {
        Self {
            width,
            height,
            channels,
            level,
            bytes: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// Mip level this buffer holds, 0 for the original image.
    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Byte count of a populated buffer of these dimensions. Widened
    /// before multiplying so dimensions past 32768x32768 do not wrap.
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }

    pub fn is_populated(&self) -> bool {
        !self.bytes.is_empty()
    }

    /// Fills the buffer with data read back from the device.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` does not match the buffer's dimensions.
    pub(crate) fn populate(&mut self, bytes: Vec<u8>) {
        assert_eq!(
            bytes.len(),
            self.byte_len(),
            "readback size does not match {}x{}x{}",
            self.width,
            self.height,
            self.channels
        );
        self.bytes = bytes;
    }
}

/// An ordered mip pyramid: index 0 is the original image, index `i` holds
/// the `i`-th halved-resolution level.
///
/// Invariants maintained by the builder:
/// `level(i).width() == max(1, level(i - 1).width() / 2)` (floor division,
/// same for height) and `level(i).level() == i`.
#[derive(Debug)]
pub struct MipChain {
    levels: Vec<PixelBuffer>,
}

impl MipChain {
    pub(crate) fn with_base(base: PixelBuffer) -> Self {
        Self { levels: vec![base] }
    }

    pub(crate) fn push(&mut self, level: PixelBuffer) {
        self.levels.push(level);
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, index: usize) -> &PixelBuffer {
        &self.levels[index]
    }

    pub fn levels(&self) -> &[PixelBuffer] {
        &self.levels
    }

    pub(crate) fn last(&self) -> &PixelBuffer {
        &self.levels[self.levels.len() - 1]
    }

    pub fn into_levels(self) -> Vec<PixelBuffer> {
        self.levels
    }
}

/// Number of levels in a full mip pyramid for a `width` x `height` image:
/// `floor(log2(max(width, height))) + 1`.
///
/// Both dimensions must be non-zero; the builder rejects zero dimensions
/// before calling this.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    debug_assert!(width > 0 && height > 0);
    u32::BITS - width.max(height).leading_zeros()
}
