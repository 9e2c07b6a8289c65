//! Grayscale frame decode and pixel-level helpers — resize, crop.

use thiserror::Error;

/// A decoded grayscale frame.
#[derive(Debug, Clone)]
pub struct GrayFrame {
    /// Grayscale pixel data (width * height bytes), row-major.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("empty image payload")]
    Empty,
    #[error("undecodable image: {0}")]
    Undecodable(#[from] image::ImageError),
}

/// Decode encoded image bytes (JPEG, PNG, ...) into a grayscale frame.
///
/// Color input is converted via the standard luma weighting. Garbage
/// bytes are a typed error, never a panic.
pub fn decode_gray(bytes: &[u8]) -> Result<GrayFrame, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    let gray = image::load_from_memory(bytes)?.to_luma8();
    let (width, height) = gray.dimensions();
    Ok(GrayFrame {
        data: gray.into_raw(),
        width,
        height,
    })
}

/// Resize a grayscale buffer using bilinear interpolation.
///
/// Sub-pixel sampling at pixel centers preserves edge sharpness for the
/// small face crops this feeds.
pub fn resize_bilinear(src: &[u8], src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Vec<u8> {
    let (sw, sh) = (src_w as usize, src_h as usize);
    let (dw, dh) = (dst_w as usize, dst_h as usize);
    if sw == 0 || sh == 0 || dw == 0 || dh == 0 || src.len() < sw * sh {
        return vec![0u8; dw * dh];
    }

    let scale_x = sw as f32 / dw as f32;
    let scale_y = sh as f32 / dh as f32;

    let mut out = vec![0u8; dw * dh];
    for y in 0..dh {
        let src_y = (y as f32 + 0.5) * scale_y - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, sh as i32 - 1) as usize;
        let y1 = (y0 + 1).min(sh - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..dw {
            let src_x = (x as f32 + 0.5) * scale_x - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, sw as i32 - 1) as usize;
            let x1 = (x0 + 1).min(sw - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            let tl = src[y0 * sw + x0] as f32;
            let tr = src[y0 * sw + x1] as f32;
            let bl = src[y1 * sw + x0] as f32;
            let br = src[y1 * sw + x1] as f32;

            let val = tl * (1.0 - fx) * (1.0 - fy)
                + tr * fx * (1.0 - fy)
                + bl * (1.0 - fx) * fy
                + br * fx * fy;

            out[y * dw + x] = val.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Extract a rectangular region from a frame, clamped to the frame bounds.
///
/// Returns the cropped buffer and its actual dimensions; a region fully
/// outside the frame yields (empty, 0, 0).
pub fn crop_region(frame: &GrayFrame, x: i32, y: i32, width: u32, height: u32) -> (Vec<u8>, u32, u32) {
    let fw = frame.width as i64;
    let fh = frame.height as i64;

    let x0 = (x as i64).clamp(0, fw);
    let y0 = (y as i64).clamp(0, fh);
    let x1 = (x as i64 + width as i64).clamp(0, fw);
    let y1 = (y as i64 + height as i64).clamp(0, fh);

    let cw = (x1 - x0) as usize;
    let ch = (y1 - y0) as usize;
    if cw == 0 || ch == 0 {
        return (Vec::new(), 0, 0);
    }

    let stride = frame.width as usize;
    let mut out = Vec::with_capacity(cw * ch);
    for row in y0 as usize..y1 as usize {
        let start = row * stride + x0 as usize;
        out.extend_from_slice(&frame.data[start..start + cw]);
    }
    (out, cw as u32, ch as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn frame(width: u32, height: u32, fill: u8) -> GrayFrame {
        GrayFrame {
            data: vec![fill; (width * height) as usize],
            width,
            height,
        }
    }

    #[test]
    fn test_decode_gray_png() {
        let img = image::GrayImage::from_pixel(32, 24, image::Luma([77u8]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let frame = decode_gray(&bytes).unwrap();
        assert_eq!(frame.width, 32);
        assert_eq!(frame.height, 24);
        assert!(frame.data.iter().all(|&p| p == 77));
    }

    #[test]
    fn test_decode_gray_garbage() {
        let result = decode_gray(b"definitely not an image");
        assert!(matches!(result, Err(DecodeError::Undecodable(_))));
    }

    #[test]
    fn test_decode_gray_empty() {
        assert!(matches!(decode_gray(&[]), Err(DecodeError::Empty)));
    }

    #[test]
    fn test_resize_uniform_stays_uniform() {
        let src = vec![128u8; 100 * 100];
        let out = resize_bilinear(&src, 100, 100, 200, 200);
        assert_eq!(out.len(), 200 * 200);
        assert!(out.iter().all(|&p| p == 128), "uniform resize should stay uniform");
    }

    #[test]
    fn test_resize_identity_dims() {
        let src: Vec<u8> = (0..16).collect();
        let out = resize_bilinear(&src, 4, 4, 4, 4);
        assert_eq!(out, src);
    }

    #[test]
    fn test_resize_downscale_averages() {
        // 2x2 blocks of constant value downscale to those values.
        let mut src = vec![0u8; 4 * 4];
        for y in 0..4 {
            for x in 0..4 {
                src[y * 4 + x] = if x < 2 { 10 } else { 250 };
            }
        }
        let out = resize_bilinear(&src, 4, 4, 2, 2);
        assert_eq!(out[0], 10);
        assert_eq!(out[1], 250);
    }

    #[test]
    fn test_crop_inside() {
        let mut f = frame(10, 10, 0);
        f.data[3 * 10 + 4] = 255;
        let (crop, w, h) = crop_region(&f, 4, 3, 2, 2);
        assert_eq!((w, h), (2, 2));
        assert_eq!(crop[0], 255);
    }

    #[test]
    fn test_crop_clamps_to_frame() {
        let f = frame(10, 10, 9);
        let (crop, w, h) = crop_region(&f, 8, 8, 5, 5);
        assert_eq!((w, h), (2, 2));
        assert_eq!(crop.len(), 4);
    }

    #[test]
    fn test_crop_negative_origin() {
        let f = frame(10, 10, 9);
        let (crop, w, h) = crop_region(&f, -3, -3, 5, 5);
        assert_eq!((w, h), (2, 2));
        assert_eq!(crop.len(), 4);
    }

    #[test]
    fn test_crop_fully_outside() {
        let f = frame(10, 10, 9);
        let (crop, w, h) = crop_region(&f, 20, 20, 5, 5);
        assert!(crop.is_empty());
        assert_eq!((w, h), (0, 0));
    }
}
