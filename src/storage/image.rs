use std::io::Cursor;

use image::{ImageError, codecs::jpeg::JpegEncoder};

/// Decode `data`, shrink it so neither edge exceeds `max_edge`, and re-encode
/// it as JPEG at `quality`.
pub fn compress_thumbnail(data: &[u8], max_edge: u32, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut img = image::load_from_memory(data)?;
    if img.width() > max_edge || img.height() > max_edge {
        img = img.thumbnail(max_edge, max_edge);
    }

    let mut buffer = Vec::new();
    {
        let mut cursor = Cursor::new(&mut buffer);
        let encoder = JpegEncoder::new_with_quality(&mut cursor, quality);
        img.to_rgb8().write_with_encoder(encoder)?;
    }
    Ok(buffer)
}

#[cfg(test)]
pub(crate) fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 40, 90]));
    let mut buffer = Vec::new();
    img.write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
        .expect("encode png");
    buffer
}
