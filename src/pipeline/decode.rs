//! Decodes raw camera buffers into the RGBA frames the rest of the app
//! consumes. Covers every pixel format we request from the camera.

use std::time::Instant;

use anyhow::{Result, anyhow};
use nokhwa::{Buffer, utils::FrameFormat};
use rayon::prelude::*;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgba, yuyv422_to_rgba,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

use crate::types::Frame;

pub fn decode_frame(buffer: &Buffer, timestamp: Instant) -> Result<Frame> {
    let resolution = buffer.resolution();
    let mut width = resolution.width_x;
    let mut height = resolution.height_y;
    let data = buffer.buffer();

    let rgba = match buffer.source_frame_format() {
        FrameFormat::NV12 => from_nv12(data, width, height)?,
        FrameFormat::YUYV => from_yuyv(data, width, height)?,
        FrameFormat::MJPEG => {
            let (rgba, jpeg_w, jpeg_h) = from_mjpeg(data, width, height)?;
            width = jpeg_w;
            height = jpeg_h;
            rgba
        }
        FrameFormat::RAWRGB => from_rgb_like(data, width, height, false)?,
        FrameFormat::RAWBGR => from_rgb_like(data, width, height, true)?,
        FrameFormat::GRAY => from_gray(data, width, height)?,
    };

    Ok(Frame {
        rgba,
        width,
        height,
        timestamp,
    })
}

fn ensure_len(data: &[u8], expected: usize, what: &str) -> Result<()> {
    if data.len() < expected {
        return Err(anyhow!(
            "{what} buffer too small: got {}, expected {expected}",
            data.len()
        ));
    }
    Ok(())
}

fn from_nv12(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let y_plane_len = width as usize * height as usize;
    let uv_plane_len = y_plane_len / 2;
    ensure_len(data, y_plane_len + uv_plane_len, "NV12")?;

    let image = YuvBiPlanarImage {
        y_plane: &data[..y_plane_len],
        y_stride: width,
        uv_plane: &data[y_plane_len..y_plane_len + uv_plane_len],
        uv_stride: width,
        width,
        height,
    };

    let mut rgba = vec![0u8; y_plane_len * 4];
    yuv_nv12_to_rgba(
        &image,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| anyhow!("NV12→RGBA failed: {err:?}"))?;

    Ok(rgba)
}

fn from_yuyv(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let pixels = width as usize * height as usize;
    ensure_len(data, pixels * 2, "YUYV")?;

    let packed = YuvPackedImage {
        yuy: data,
        yuy_stride: width * 2,
        width,
        height,
    };

    let mut rgba = vec![0u8; pixels * 4];
    yuyv422_to_rgba(
        &packed,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| anyhow!("YUYV422→RGBA failed: {err:?}"))?;

    Ok(rgba)
}

fn from_mjpeg(data: &[u8], reported_w: u32, reported_h: u32) -> Result<(Vec<u8>, u32, u32)> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgba = decoder
        .decode()
        .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;

    // Trust the JPEG header over the driver-reported resolution.
    let (width, height) = match decoder.info() {
        Some(info) => {
            let w = u32::try_from(info.width).map_err(|_| anyhow!("MJPEG width out of range"))?;
            let h = u32::try_from(info.height).map_err(|_| anyhow!("MJPEG height out of range"))?;
            (w, h)
        }
        None => (reported_w, reported_h),
    };

    ensure_len(&rgba, width as usize * height as usize * 4, "MJPEG output")?;
    Ok((rgba, width, height))
}

fn from_rgb_like(data: &[u8], width: u32, height: u32, swap_rb: bool) -> Result<Vec<u8>> {
    let pixels = width as usize * height as usize;
    ensure_len(data, pixels * 3, "RGB")?;

    let mut rgba = vec![0u8; pixels * 4];
    rgba.par_chunks_mut(4)
        .zip(data.par_chunks_exact(3))
        .for_each(|(dst, src)| {
            if swap_rb {
                dst[0] = src[2];
                dst[1] = src[1];
                dst[2] = src[0];
            } else {
                dst[..3].copy_from_slice(src);
            }
            dst[3] = 255;
        });
    Ok(rgba)
}

fn from_gray(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let pixels = width as usize * height as usize;
    ensure_len(data, pixels, "GRAY")?;

    let mut rgba = vec![0u8; pixels * 4];
    rgba.par_chunks_mut(4)
        .zip(data.par_iter().copied())
        .for_each(|(dst, value)| {
            dst[0] = value;
            dst[1] = value;
            dst[2] = value;
            dst[3] = 255;
        });
    Ok(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_keeps_channel_order_and_fills_alpha() {
        let rgba = from_rgb_like(&[10, 20, 30, 40, 50, 60], 2, 1, false).unwrap();
        assert_eq!(rgba, [10, 20, 30, 255, 40, 50, 60, 255]);
    }

    #[test]
    fn bgr_swaps_red_and_blue() {
        let rgba = from_rgb_like(&[10, 20, 30], 1, 1, true).unwrap();
        assert_eq!(rgba, [30, 20, 10, 255]);
    }

    #[test]
    fn gray_expands_to_all_channels() {
        let rgba = from_gray(&[7, 200], 2, 1).unwrap();
        assert_eq!(rgba, [7, 7, 7, 255, 200, 200, 200, 255]);
    }

    #[test]
    fn every_pixel_of_a_wide_frame_is_expanded() {
        let width = 64u32;
        let height = 4u32;
        let pixels = (width * height) as usize;
        let data: Vec<u8> = (0..pixels * 3).map(|i| (i % 251) as u8).collect();

        let rgba = from_rgb_like(&data, width, height, false).unwrap();
        assert_eq!(rgba.len(), pixels * 4);
        for i in 0..pixels {
            assert_eq!(&rgba[i * 4..i * 4 + 3], &data[i * 3..i * 3 + 3]);
            assert_eq!(rgba[i * 4 + 3], 255);
        }
    }

    #[test]
    fn short_buffers_are_rejected() {
        assert!(from_rgb_like(&[1, 2], 2, 2, false).is_err());
        assert!(from_gray(&[1], 2, 2).is_err());
        assert!(from_nv12(&[0; 8], 4, 4).is_err());
        assert!(from_yuyv(&[0; 8], 4, 4).is_err());
    }
}
