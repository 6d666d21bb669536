use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Instant,
};

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use thiserror::Error;

use crate::{
    confirm::{ConfirmationPolicy, ConfirmationState},
    model_download::{ArtifactEvent, ModelSource},
    pipeline::{CameraError, CameraStream, ClassifierEvent, camera, classifier},
    types::{Frame, LivePrediction},
};

#[derive(Clone, Debug, PartialEq)]
pub enum SessionLifecycle {
    Initializing,
    Ready,
    Error(SessionError),
    Stopped,
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum SessionError {
    #[error("camera access denied or device unavailable: {0}")]
    PermissionDenied(String),
    #[error("no camera device found")]
    DeviceNotFound,
    #[error("classifier failed to load: {0}")]
    ModelLoad(String),
    #[error("initialization failed: {0}")]
    Init(String),
}

impl SessionError {
    /// User-facing copy. Camera access problems get their own wording,
    /// everything else shares the generic line.
    pub fn user_message(&self) -> &'static str {
        match self {
            SessionError::PermissionDenied(_) | SessionError::DeviceNotFound => {
                "Acceso a la cámara denegado o no se encontró. Por favor, otorga permiso y refresca."
            }
            SessionError::ModelLoad(_) | SessionError::Init(_) => {
                "Fallo al inicializar la cámara o el modelo."
            }
        }
    }
}

impl From<CameraError> for SessionError {
    fn from(err: CameraError) -> Self {
        match err {
            CameraError::NoDevice => SessionError::DeviceNotFound,
            CameraError::AccessDenied(reason) => SessionError::PermissionDenied(reason),
            CameraError::Backend(reason) => SessionError::Init(reason),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DownloadProgress {
    pub downloaded: u64,
    pub total: Option<u64>,
}

impl DownloadProgress {
    pub fn percent(&self) -> Option<f32> {
        let total = self.total.filter(|total| *total > 0)?;
        Some(((self.downloaded as f64 / total as f64) * 100.0).clamp(0.0, 100.0) as f32)
    }
}

struct ClassifierWorker {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ClassifierWorker {
    fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// One scan session: the camera stream, the classification worker and the
/// confirmation policy, owned together so they start and stop together.
/// UI code drives it by calling [`Session::pump`] once per repaint.
pub struct Session {
    lifecycle: SessionLifecycle,
    policy: ConfirmationPolicy,
    latest: Option<LivePrediction>,
    download: Option<DownloadProgress>,
    camera: Option<CameraStream>,
    worker: Option<ClassifierWorker>,
    events: Receiver<ClassifierEvent>,
}

impl Session {
    /// Acquire the camera and spawn the classification worker. The camera
    /// is opened synchronously so its errors surface immediately; when it
    /// cannot be acquired the worker is never started. Model download and
    /// load continue on the worker thread while frames already flow.
    pub fn start(source: &ModelSource, preview_tx: Sender<Frame>) -> Self {
        let (event_tx, event_rx) = unbounded();
        let (inference_tx, inference_rx) = bounded(1);

        let camera_stream = match camera::open_default_camera(preview_tx, inference_tx) {
            Ok(stream) => stream,
            Err(err) => {
                log::error!("camera acquisition failed: {err}");
                return Self::with_error(err.into(), event_rx);
            }
        };

        let stop = Arc::new(AtomicBool::new(false));
        let handle = classifier::start_classifier(source.clone(), stop.clone(), inference_rx, event_tx);
        log::info!("session starting: camera live, classifier loading");

        Self {
            lifecycle: SessionLifecycle::Initializing,
            policy: ConfirmationPolicy::new(),
            latest: None,
            download: None,
            camera: Some(camera_stream),
            worker: Some(ClassifierWorker {
                stop,
                handle: Some(handle),
            }),
            events: event_rx,
        }
    }

    fn with_error(error: SessionError, events: Receiver<ClassifierEvent>) -> Self {
        Self {
            lifecycle: SessionLifecycle::Error(error),
            policy: ConfirmationPolicy::new(),
            latest: None,
            download: None,
            camera: None,
            worker: None,
            events,
        }
    }

    #[cfg(test)]
    fn for_tests(events: Receiver<ClassifierEvent>) -> Self {
        Self {
            lifecycle: SessionLifecycle::Initializing,
            policy: ConfirmationPolicy::new(),
            latest: None,
            download: None,
            camera: None,
            worker: None,
            events,
        }
    }

    pub fn lifecycle(&self) -> &SessionLifecycle {
        &self.lifecycle
    }

    pub fn error(&self) -> Option<&SessionError> {
        match &self.lifecycle {
            SessionLifecycle::Error(error) => Some(error),
            _ => None,
        }
    }

    pub fn latest_prediction(&self) -> Option<&LivePrediction> {
        self.latest.as_ref()
    }

    pub fn download_progress(&self) -> Option<DownloadProgress> {
        self.download
    }

    /// Drain worker events and check the confirmation deadline. Returns the
    /// confirmed material the moment confirmation happens; capture stops in
    /// the same call.
    pub fn pump(&mut self, now: Instant) -> Option<String> {
        while let Ok(event) = self.events.try_recv() {
            self.apply(event);
            if matches!(self.lifecycle, SessionLifecycle::Error(_)) {
                return None;
            }
        }

        if self.lifecycle != SessionLifecycle::Ready {
            return None;
        }

        let confirmed = match self.policy.poll(now) {
            ConfirmationState::Confirmed { label } => Some(label.clone()),
            _ => None,
        };
        if let Some(label) = confirmed.as_ref() {
            log::info!("material confirmed: {label}");
            self.release_capture();
            self.lifecycle = SessionLifecycle::Stopped;
        }
        confirmed
    }

    fn apply(&mut self, event: ClassifierEvent) {
        match event {
            ClassifierEvent::Download(event) => self.track_download(event),
            ClassifierEvent::Ready { classes } => {
                log::info!("classifier serves: {}", classes.join(", "));
                if self.lifecycle == SessionLifecycle::Initializing {
                    self.lifecycle = SessionLifecycle::Ready;
                }
            }
            ClassifierEvent::Prediction(prediction) => {
                if self.lifecycle == SessionLifecycle::Ready {
                    self.policy
                        .observe(&prediction.label, prediction.confidence, prediction.at);
                    self.latest = Some(prediction);
                }
            }
            ClassifierEvent::Failed(reason) => {
                // Stale failures from a worker that was already told to
                // stop do not reopen a finished session.
                if self.lifecycle == SessionLifecycle::Stopped {
                    return;
                }
                let error = if self.lifecycle == SessionLifecycle::Initializing {
                    SessionError::ModelLoad(reason)
                } else {
                    SessionError::Init(reason)
                };
                self.fail(error);
            }
        }
    }

    fn track_download(&mut self, event: ArtifactEvent) {
        match event {
            ArtifactEvent::Started { total, .. } => {
                self.download = Some(DownloadProgress {
                    downloaded: 0,
                    total,
                });
            }
            ArtifactEvent::Progress {
                downloaded, total, ..
            } => {
                self.download = Some(DownloadProgress { downloaded, total });
            }
            ArtifactEvent::AlreadyPresent { .. } | ArtifactEvent::Finished { .. } => {
                self.download = None;
            }
        }
    }

    fn fail(&mut self, error: SessionError) {
        log::error!("session failed: {error}");
        self.release_capture();
        self.policy.reset();
        self.latest = None;
        self.download = None;
        self.lifecycle = SessionLifecycle::Error(error);
    }

    /// Stop the session regardless of where it is in its lifecycle. Safe to
    /// call more than once.
    pub fn shutdown(&mut self) {
        self.release_capture();
        if matches!(
            self.lifecycle,
            SessionLifecycle::Initializing | SessionLifecycle::Ready
        ) {
            self.lifecycle = SessionLifecycle::Stopped;
        }
    }

    fn release_capture(&mut self) {
        // Worker first so nothing publishes into a closing session, then
        // the camera thread and device. Each join runs at most once.
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
        if let Some(camera_stream) = self.camera.take() {
            camera_stream.stop();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release_capture();
    }
}
