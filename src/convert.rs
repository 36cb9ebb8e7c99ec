//! Conversions between 8-bit RGB images and the NCHW float tensors the
//! network consumes, plus the padding and encoding helpers built on them.

use std::io::Cursor;

use image::RgbImage;
use ndarray::{Array4, ArrayView4, s};

use crate::error::SrError;

/// Converts an RGB8 image into a `1x3xHxW` tensor with values in `[0, 1]`.
pub fn rgb_to_nchw(img: &RgbImage) -> Array4<f32> {
    let (width, height) = img.dimensions();
    let mut nchw = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
    for (x, y, pixel) in img.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        nchw[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
        nchw[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
        nchw[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
    }
    nchw
}

/// Converts a `1x3xHxW` tensor back into an RGB8 image, clamping to `[0, 1]`.
pub fn nchw_to_rgb(nchw: ArrayView4<'_, f32>) -> Result<RgbImage, SrError> {
    let shape = nchw.shape();
    if shape[0] != 1 || shape[1] != 3 {
        return Err(SrError::Model(format!(
            "expected a 1x3xHxW tensor, got {shape:?}"
        )));
    }
    let (height, width) = (shape[2], shape[3]);
    let mut img = RgbImage::new(width as u32, height as u32);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let (xu, yu) = (x as usize, y as usize);
        pixel[0] = (nchw[[0, 0, yu, xu]].clamp(0.0, 1.0) * 255.0).round() as u8;
        pixel[1] = (nchw[[0, 1, yu, xu]].clamp(0.0, 1.0) * 255.0).round() as u8;
        pixel[2] = (nchw[[0, 2, yu, xu]].clamp(0.0, 1.0) * 255.0).round() as u8;
    }
    Ok(img)
}

/// Pads the bottom and right edge by one row/column when a dimension is odd,
/// mirroring the second-to-last row/column (REFLECT_101). Single-pixel
/// dimensions fall back to replicating the edge.
pub fn pad_reflect_even(nchw: &Array4<f32>) -> Array4<f32> {
    let (height, width) = (nchw.shape()[2], nchw.shape()[3]);
    let pad_h = height % 2;
    let pad_w = width % 2;
    if pad_h == 0 && pad_w == 0 {
        return nchw.clone();
    }

    let mut padded = Array4::<f32>::zeros((1, 3, height + pad_h, width + pad_w));
    padded
        .slice_mut(s![.., .., ..height, ..width])
        .assign(nchw);

    if pad_h == 1 {
        let src_y = if height >= 2 { height - 2 } else { 0 };
        for c in 0..3 {
            for x in 0..width {
                padded[[0, c, height, x]] = nchw[[0, c, src_y, x]];
            }
        }
    }
    if pad_w == 1 {
        let src_x = if width >= 2 { width - 2 } else { 0 };
        for c in 0..3 {
            for y in 0..height + pad_h {
                let src_y = if y < height {
                    y
                } else if height >= 2 {
                    height - 2
                } else {
                    0
                };
                padded[[0, c, y, width]] = nchw[[0, c, src_y, src_x]];
            }
        }
    }
    padded
}

/// Encodes an RGB8 image as an in-memory PNG.
pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>, SrError> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
    Ok(bytes)
}
