//! Utilities used by demos and tests. Not part of the official API.

/// Tightly packed RGBA bytes filled with one color.
pub fn solid_rgba8(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let mut out = Vec::with_capacity(width as usize * height as usize * 4);
    for _ in 0..width as usize * height as usize {
        out.extend_from_slice(&rgba);
    }
    out
}

/// Gray checkerboard with `n` x `n` pixel squares, RGBA.
pub fn checkerboard_rgba8(width: u32, height: u32, n: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height {
        for x in 0..width {
            let v = (((x / n + y / n) % 2) * 255) as u8;
            out.extend_from_slice(&[v, v, v, 255]);
        }
    }
    out
}

/// Bytes per row padded up to wgpu's buffer-copy row alignment.
pub(crate) fn padded_bytes_per_row(width: u32, bytes_per_pixel: u32) -> u32 {
    let unpadded = width * bytes_per_pixel;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded + (align - unpadded % align) % align
}
