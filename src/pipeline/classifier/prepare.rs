use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use rayon::prelude::*;

use crate::types::Frame;

pub const INPUT_SIZE: u32 = 224;

/// Letterbox the frame onto a square canvas and normalize into the [-1, 1]
/// range the classifier was trained with. Output is NHWC.
pub fn frame_tensor(frame: &Frame) -> Result<Array4<f32>> {
    let expected_len = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    if frame.rgba.len() != expected_len {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgba.len(),
            expected_len
        ));
    }

    let target = INPUT_SIZE as usize;
    let scale = INPUT_SIZE as f32 / (frame.width.max(frame.height) as f32);
    let new_w = (frame.width as f32 * scale).round().max(1.0) as u32;
    let new_h = (frame.height as f32 * scale).round().max(1.0) as u32;

    let src_image = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgba.clone(),
        fir::PixelType::U8x4,
    )?;
    let mut dst_image = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let mut resizer = fir::Resizer::new();
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    resizer
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;
    let resized = dst_image.into_vec();

    let pad_x = (target.saturating_sub(new_w as usize)) / 2;
    let pad_y = (target.saturating_sub(new_h as usize)) / 2;
    let mut canvas = vec![0u8; target * target * 4];
    let dst_stride = target * 4;
    let src_stride = new_w as usize * 4;
    for row in 0..(new_h as usize) {
        let dst_offset = (pad_y + row) * dst_stride + pad_x * 4;
        let src_offset = row * src_stride;
        canvas[dst_offset..dst_offset + src_stride]
            .copy_from_slice(&resized[src_offset..src_offset + src_stride]);
    }

    let normalized: Vec<f32> = canvas
        .par_chunks_exact(4)
        .flat_map_iter(|px| {
            [
                (px[0] as f32 - 127.5) / 127.5,
                (px[1] as f32 - 127.5) / 127.5,
                (px[2] as f32 - 127.5) / 127.5,
            ]
        })
        .collect();

    Array4::<f32>::from_shape_vec((1, target, target, 3), normalized)
        .map_err(|err| anyhow!("failed to build input tensor: {err}"))
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn solid_frame(width: u32, height: u32, value: u8) -> Frame {
        Frame {
            rgba: vec![value; (width as usize) * (height as usize) * 4],
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn tensor_has_classifier_input_shape() {
        let input = frame_tensor(&solid_frame(640, 480, 128)).unwrap();
        assert_eq!(input.shape(), [1, 224, 224, 3]);
    }

    #[test]
    fn letterbox_pads_with_black_and_centers_the_content() {
        // 2:1 frame scales to 224x112, leaving 56 rows of padding above and below.
        let input = frame_tensor(&solid_frame(448, 224, 255)).unwrap();

        let center = input[[0, 112, 112, 0]];
        assert!((center - 1.0).abs() < 1e-6, "content should be white: {center}");

        let corner = input[[0, 0, 0, 0]];
        assert!((corner + 1.0).abs() < 1e-6, "padding should be black: {corner}");
    }

    #[test]
    fn values_stay_in_the_normalized_range() {
        let input = frame_tensor(&solid_frame(320, 240, 37)).unwrap();
        assert!(input.iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn mismatched_buffer_is_rejected() {
        let mut frame = solid_frame(4, 4, 0);
        frame.rgba.pop();
        assert!(frame_tensor(&frame).is_err());
    }
}
