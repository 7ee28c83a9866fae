//! Builds the full mip pyramid for an image and writes every level to
//! disk as a JPEG.
//!
//! ```sh
//! cargo run --example pyramid -- input.png out/
//! cargo run --example pyramid -- --textures input.png out/
//! ```
//!
//! With no image argument a 512x512 checkerboard is generated instead.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use mipgen::{MipPyramidBuilder, PixelBuffer, ResourceKind, WgpuComputeBackend};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let kind = if args.first().map(String::as_str) == Some("--textures") {
        args.remove(0);
        ResourceKind::Texture
    } else {
        ResourceKind::StorageBuffer
    };

    let source = match args.first() {
        Some(path) => {
            let img = image::open(path)?.to_rgba8();
            let (width, height) = img.dimensions();
            PixelBuffer::from_rgba8(width, height, img.into_raw())
        }
        None => PixelBuffer::from_rgba8(512, 512, mipgen::util::checkerboard_rgba8(512, 512, 32)),
    };
    let out_dir = PathBuf::from(args.get(1).map(String::as_str).unwrap_or("."));
    std::fs::create_dir_all(&out_dir)?;

    let backend = WgpuComputeBackend::new(kind)?;
    let chain = MipPyramidBuilder::new(&backend).build(&source)?;
    println!(
        "generated {} levels from {}x{}",
        chain.level_count(),
        source.width(),
        source.height()
    );

    for level in chain.levels() {
        // JPEG has no alpha channel.
        let rgb: Vec<u8> = level
            .bytes()
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();
        let path = out_dir.join(format!("level_{}.jpg", level.level()));
        let file = File::create(&path)?;
        let mut encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(BufWriter::new(file), 100);
        encoder.encode(
            &rgb,
            level.width(),
            level.height(),
            image::ExtendedColorType::Rgb8,
        )?;
        println!("  {}x{} -> {}", level.width(), level.height(), path.display());
    }
    Ok(())
}
