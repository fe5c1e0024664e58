use anyhow::Context;
use image::GrayImage;
use rqrr::PreparedImage;
use std::path::Path;

/// Decode every QR grid found in one captured camera frame. Grids that do
/// not decode cleanly are dropped; a frame with no QR yields an empty list.
pub fn decode_frame(frame: &GrayImage) -> Vec<String> {
    let (w, h) = frame.dimensions();
    let mut prepared = PreparedImage::prepare_from_greyscale(w as usize, h as usize, |x, y| {
        frame.get_pixel(x as u32, y as u32).0[0]
    });
    let mut payloads = Vec::new();
    for grid in prepared.detect_grids() {
        match grid.decode() {
            Ok((_meta, content)) => payloads.push(content),
            Err(e) => log::debug!("dropping undecodable grid: {}", e),
        }
    }
    payloads
}

pub fn decode_frame_file(path: &Path) -> anyhow::Result<Vec<String>> {
    let img = image::open(path)
        .with_context(|| format!("failed to read frame image {}", path.display()))?;
    Ok(decode_frame(&img.to_luma8()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_frame_yields_no_payloads() {
        let frame = GrayImage::from_pixel(160, 120, image::Luma([255u8]));
        assert!(decode_frame(&frame).is_empty());
    }

    #[test]
    fn noise_frame_yields_no_payloads() {
        // Deterministic speckle; nothing resembling a finder pattern.
        let frame = GrayImage::from_fn(96, 96, |x, y| {
            image::Luma([if (x * 31 + y * 17) % 5 == 0 { 0 } else { 255 }])
        });
        assert!(decode_frame(&frame).is_empty());
    }

    #[test]
    fn missing_frame_file_is_an_error() {
        let err = decode_frame_file(Path::new("/nonexistent/frame.png"))
            .expect_err("missing file must error");
        assert!(err.to_string().contains("frame image"));
    }
}
