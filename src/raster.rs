// ============================================================================
// RASTER SERVICE — decode, sub-rectangle extraction, PNG encode
// ============================================================================

use crate::geometry::Rect;
use base64::Engine as _;
use image::codecs::png::PngEncoder;
use image::{Rgba, RgbaImage, imageops};
use std::path::Path;

/// Errors from raster operations. Decode/encode failures are expected at
/// runtime (bad files, bad payloads) and are surfaced to the user; an
/// out-of-bounds extraction means the caller built a bad rectangle.
#[derive(Debug)]
pub enum RasterError {
    Decode(String),
    Encode(String),
    OutOfBounds {
        rect: Rect,
        image_w: u32,
        image_h: u32,
    },
}

impl std::fmt::Display for RasterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RasterError::Decode(e) => write!(f, "Could not decode image: {}", e),
            RasterError::Encode(e) => write!(f, "Could not encode image: {}", e),
            RasterError::OutOfBounds { rect, image_w, image_h } => write!(
                f,
                "Rectangle {:?} outside image bounds {}x{}",
                rect, image_w, image_h
            ),
        }
    }
}

impl std::error::Error for RasterError {}

/// Decode an image file from disk into an RGBA raster.
pub fn load_path(path: &Path) -> Result<RgbaImage, RasterError> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|e| RasterError::Decode(e.to_string()))
}

/// Decode an in-memory image (any supported container) into an RGBA raster.
pub fn load_bytes(bytes: &[u8]) -> Result<RgbaImage, RasterError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgba8())
        .map_err(|e| RasterError::Decode(e.to_string()))
}

/// Decode a `data:image/...;base64,` URI into an RGBA raster. Anything that
/// is not an image data-URI is rejected before the payload is touched.
pub fn load_data_uri(uri: &str) -> Result<RgbaImage, RasterError> {
    if !uri.starts_with("data:image/") {
        return Err(RasterError::Decode("not an image data-URI".into()));
    }
    let payload = uri
        .split_once(";base64,")
        .map(|(_, p)| p)
        .ok_or_else(|| RasterError::Decode("data-URI is not base64-encoded".into()))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| RasterError::Decode(format!("bad base64 payload: {}", e)))?;
    load_bytes(&bytes)
}

/// Copy a sub-rectangle of `image` into a fresh raster.
///
/// Fractional rectangles are resolved by rounding the cell *boundaries*
/// (`round(x) .. round(x + width)`), so the cells of a fractional grid share
/// exact pixel edges: no gaps, no double-covered columns. The output raster
/// is sized by those rounded boundaries.
pub fn extract(image: &RgbaImage, rect: &Rect) -> Result<RgbaImage, RasterError> {
    let (img_w, img_h) = image.dimensions();
    if !rect.contained_in(img_w as f32, img_h as f32) {
        return Err(RasterError::OutOfBounds {
            rect: *rect,
            image_w: img_w,
            image_h: img_h,
        });
    }

    let x0 = (rect.x.round().max(0.0) as u32).min(img_w.saturating_sub(1));
    let y0 = (rect.y.round().max(0.0) as u32).min(img_h.saturating_sub(1));
    let x1 = (rect.right().round() as u32).min(img_w);
    let y1 = (rect.bottom().round() as u32).min(img_h);
    // Sub-pixel cells still produce a 1px output.
    let w = x1.saturating_sub(x0).max(1).min(img_w - x0);
    let h = y1.saturating_sub(y0).max(1).min(img_h - y0);

    Ok(imageops::crop_imm(image, x0, y0, w, h).to_image())
}

/// Encode a raster as PNG bytes, alpha channel preserved.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, RasterError> {
    let mut out = Vec::new();
    let encoder = PngEncoder::new(&mut out);
    #[allow(deprecated)]
    encoder
        .encode(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ColorType::Rgba8,
        )
        .map_err(|e| RasterError::Encode(e.to_string()))?;
    Ok(out)
}

/// Center the image on a transparent square canvas of side `max(w, h)`.
/// Already-square input is returned as a plain copy.
pub fn pad_to_square(image: &RgbaImage) -> RgbaImage {
    let (w, h) = image.dimensions();
    if w == h {
        return image.clone();
    }
    let size = w.max(h);
    let mut canvas = RgbaImage::from_pixel(size, size, Rgba([0, 0, 0, 0]));
    let x = (size - w) / 2;
    let y = (size - h) / 2;
    imageops::overlay(&mut canvas, image, x as i64, y as i64);
    canvas
}

/// The screen→image scale factor: multiply a screen-pixel delta by this to
/// get an image-pixel delta. `displayed` is the on-screen size of the axis.
pub fn display_scale(natural: f32, displayed: f32) -> f32 {
    if displayed <= 0.0 { 1.0 } else { natural / displayed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::partition_grid;
    use base64::Engine as _;

    fn checker(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            let v = (((x + y) % 2) * 255) as u8;
            Rgba([v, v, 128, 255])
        })
    }

    #[test]
    fn extract_full_image_is_identity() {
        let img = checker(64, 48);
        let out = extract(&img, &Rect::new(0.0, 0.0, 64.0, 48.0)).unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn extract_rejects_out_of_bounds() {
        let img = checker(64, 48);
        assert!(extract(&img, &Rect::new(60.0, 0.0, 10.0, 10.0)).is_err());
        assert!(extract(&img, &Rect::new(-1.0, 0.0, 10.0, 10.0)).is_err());
        assert!(extract(&img, &Rect::new(0.0, 0.0, 0.0, 10.0)).is_err());
    }

    #[test]
    fn fractional_cells_tile_without_gaps() {
        // 1000/7 and 700/3 are both fractional; boundary rounding must hand
        // every pixel column/row to exactly one cell.
        let (w, h, rows, cols) = (1000u32, 700u32, 3u32, 7u32);
        let img = checker(w, h);
        let cells = partition_grid(w as f32, h as f32, rows, cols).unwrap();

        let mut covered_w = 0u32;
        for c in 0..cols {
            let cell = &cells[c as usize];
            let out = extract(&img, cell).unwrap();
            covered_w += out.width();
            // Adjacent cells share a boundary pixel column.
            assert_eq!(cell.x.round() as u32 + out.width(), cell.right().round() as u32);
        }
        assert_eq!(covered_w, w);

        let mut covered_h = 0u32;
        for r in 0..rows {
            let cell = &cells[(r * cols) as usize];
            covered_h += extract(&img, cell).unwrap().height();
        }
        assert_eq!(covered_h, h);
    }

    #[test]
    fn data_uri_round_trip() {
        let img = checker(8, 8);
        let png = encode_png(&img).unwrap();
        let uri = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&png)
        );
        let back = load_data_uri(&uri).unwrap();
        assert_eq!(back, img);

        assert!(load_data_uri("data:text/plain;base64,aGk=").is_err());
        assert!(load_data_uri("data:image/png,rawpayload").is_err());
    }

    #[test]
    fn pad_to_square_centers_on_transparent() {
        let img = checker(10, 4);
        let padded = pad_to_square(&img);
        assert_eq!(padded.dimensions(), (10, 10));
        // Rows above the centered band are fully transparent.
        assert_eq!(padded.get_pixel(0, 0)[3], 0);
        // The band itself carries the source pixels.
        assert_eq!(padded.get_pixel(0, 3), img.get_pixel(0, 0));
    }

    #[test]
    fn display_scale_converts_screen_deltas() {
        assert_eq!(display_scale(2000.0, 500.0), 4.0);
        assert_eq!(display_scale(100.0, 0.0), 1.0);
    }
}
