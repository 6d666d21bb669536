use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::Sender;
use nokhwa::{
    Camera, NokhwaError,
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraIndex, CameraInfo, FrameFormat, RequestedFormat, RequestedFormatType,
    },
};
use thiserror::Error;

use super::decode;
use crate::types::Frame;

// Limit the frames handed to the classifier; the preview gets every frame.
const INFERENCE_TARGET_FPS: u64 = 10;
const INFERENCE_FRAME_INTERVAL: Duration = Duration::from_millis(1_000 / INFERENCE_TARGET_FPS);

// Prefer pixel formats that are widely supported on macOS (the built-in cameras
// often reject YUYV even though Nokhwa reports it).
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
    FrameFormat::GRAY,
    FrameFormat::YUYV,
    FrameFormat::NV12,
    FrameFormat::MJPEG,
];

fn requested_formats() -> [RequestedFormat<'static>; 4] {
    [
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestResolution,
            PREFERRED_PIXEL_FORMATS,
        ),
        // Fall back to any format Nokhwa can decode, but prefer higher FPS to
        // avoid very low default rates (e.g. 15 FPS) that some drivers reject.
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

/// Why a camera could not be acquired. The split matters to the session,
/// which shows different user copy for access problems than for everything
/// else.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum CameraError {
    #[error("no camera device found")]
    NoDevice,
    #[error("camera access denied or device unavailable: {0}")]
    AccessDenied(String),
    #[error("camera backend error: {0}")]
    Backend(String),
}

fn classify_nokhwa_error(err: &NokhwaError) -> CameraError {
    match err {
        NokhwaError::OpenDeviceError(device, reason) => {
            CameraError::AccessDenied(format!("{device}: {reason}"))
        }
        NokhwaError::OpenStreamError(reason) => CameraError::AccessDenied(reason.clone()),
        other => CameraError::Backend(other.to_string()),
    }
}

#[derive(Clone, Debug)]
pub struct CameraDevice {
    pub index: CameraIndex,
    pub label: String,
}

#[derive(Debug)]
pub struct CameraStream {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CameraStream {
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub fn available_cameras() -> Result<Vec<CameraDevice>, CameraError> {
    let cameras = query(ApiBackend::Auto).map_err(|err| classify_nokhwa_error(&err))?;
    Ok(cameras
        .into_iter()
        .map(|info| CameraDevice {
            index: info.index().clone(),
            label: format_camera_label(&info),
        })
        .collect())
}

fn format_camera_label(info: &CameraInfo) -> String {
    info.human_name()
}

/// Open the first enumerated device and start streaming into both channels.
pub fn open_default_camera(
    preview_tx: Sender<Frame>,
    inference_tx: Sender<Frame>,
) -> Result<CameraStream, CameraError> {
    let device = available_cameras()?
        .into_iter()
        .next()
        .ok_or(CameraError::NoDevice)?;
    log::info!("opening camera {}", device.label);
    start_camera_stream(device.index, preview_tx, inference_tx)
}

fn build_camera(index: CameraIndex) -> Result<Camera, CameraError> {
    let mut last_err = None;

    for requested in requested_formats() {
        match Camera::new(index.clone(), requested) {
            Ok(mut camera) => match camera.open_stream() {
                Ok(()) => return Ok(camera),
                Err(err) => last_err = Some(classify_nokhwa_error(&err)),
            },
            Err(err) => last_err = Some(classify_nokhwa_error(&err)),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        CameraError::Backend("failed to open camera with any supported format".into())
    }))
}

pub fn start_camera_stream(
    index: CameraIndex,
    preview_tx: Sender<Frame>,
    inference_tx: Sender<Frame>,
) -> Result<CameraStream, CameraError> {
    // Fail fast before spawning the capture thread.
    build_camera(index.clone())?;

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();

    let handle = thread::spawn(move || {
        let mut camera = match build_camera(index) {
            Ok(cam) => cam,
            Err(err) => {
                log::error!("failed to reopen camera in capture thread: {err}");
                return;
            }
        };

        let mut last_inference_frame = Instant::now() - INFERENCE_FRAME_INTERVAL;

        while !stop_flag.load(Ordering::Relaxed) {
            let buffer = match camera.frame() {
                Ok(buffer) => buffer,
                Err(err) => {
                    log::warn!("camera frame read failed: {err:?}");
                    continue;
                }
            };

            // Only decodable frames go downstream; anything else is skipped
            // and the next capture is awaited.
            let frame = match decode::decode_frame(&buffer, Instant::now()) {
                Ok(frame) => frame,
                Err(err) => {
                    log::warn!("failed to decode camera frame: {err:?}");
                    continue;
                }
            };

            // Throttle classifier input to ~10fps; drop whenever a queue is busy.
            if last_inference_frame.elapsed() >= INFERENCE_FRAME_INTERVAL {
                last_inference_frame = frame.timestamp;
                let _ = inference_tx.try_send(frame.clone());
            }
            let _ = preview_tx.try_send(frame);
        }
    });

    Ok(CameraStream {
        stop,
        handle: Some(handle),
    })
}
