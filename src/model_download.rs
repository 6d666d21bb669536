use std::{
    fs,
    io::{Read, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use anyhow::{Context, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;
use serde::Deserialize;
use thiserror::Error;

const MODEL_GRAPH_FILENAME: &str = "material_classifier.onnx";
const MODEL_GRAPH_URL: &str = "https://raw.githubusercontent.com/clasifica-plus/clasifica/refs/heads/main/models/material_classifier.onnx";
const CLASS_METADATA_FILENAME: &str = "metadata.json";
const CLASS_METADATA_URL: &str =
    "https://raw.githubusercontent.com/clasifica-plus/clasifica/refs/heads/main/models/metadata.json";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A raised stop flag surfaces as this error so callers can tell a
/// shutdown apart from a real download failure.
#[derive(Debug, Error)]
#[error("artifact download canceled")]
pub struct DownloadCanceled;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArtifactKind {
    ModelGraph,
    ClassMetadata,
}

impl ArtifactKind {
    fn label(&self) -> &'static str {
        match self {
            ArtifactKind::ModelGraph => "model graph",
            ArtifactKind::ClassMetadata => "class metadata",
        }
    }
}

/// Where the classifier artifacts live on disk. Both files are fetched from
/// the fixed published location on first run and cached here.
#[derive(Clone, Debug)]
pub struct ModelSource {
    model_dir: PathBuf,
}

impl ModelSource {
    pub fn with_dir(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
        }
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join(MODEL_GRAPH_FILENAME)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.model_dir.join(CLASS_METADATA_FILENAME)
    }
}

impl Default for ModelSource {
    fn default() -> Self {
        Self::with_dir("models")
    }
}

/// Class list published next to the model graph, in the layout Teachable
/// Machine exports. Extra fields in the file are ignored.
#[derive(Clone, Debug, Deserialize)]
pub struct ModelMetadata {
    pub labels: Vec<String>,
}

pub fn load_metadata(path: &Path) -> anyhow::Result<ModelMetadata> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read class metadata {}", path.display()))?;
    let metadata: ModelMetadata =
        serde_json::from_str(&raw).context("class metadata is not valid JSON")?;
    if metadata.labels.is_empty() {
        return Err(anyhow!("class metadata lists no labels"));
    }
    Ok(metadata)
}

#[derive(Clone, Debug)]
pub enum ArtifactEvent {
    AlreadyPresent {
        artifact: ArtifactKind,
    },
    Started {
        artifact: ArtifactKind,
        total: Option<u64>,
    },
    Progress {
        artifact: ArtifactKind,
        downloaded: u64,
        total: Option<u64>,
    },
    Finished {
        artifact: ArtifactKind,
    },
}

/// Make sure both classifier artifacts are present on disk, downloading
/// whatever is missing. Events fire for each artifact in order; cached
/// files report `AlreadyPresent` followed by `Finished`. Raising `cancel`
/// aborts between artifacts and mid-transfer with [`DownloadCanceled`].
pub fn ensure_model_artifacts<F>(
    source: &ModelSource,
    cancel: &AtomicBool,
    mut on_event: F,
) -> anyhow::Result<()>
where
    F: FnMut(ArtifactEvent),
{
    ensure_artifact(
        ArtifactKind::ModelGraph,
        MODEL_GRAPH_URL,
        &source.model_path(),
        cancel,
        &mut on_event,
    )?;
    ensure_artifact(
        ArtifactKind::ClassMetadata,
        CLASS_METADATA_URL,
        &source.metadata_path(),
        cancel,
        &mut on_event,
    )
}

fn ensure_artifact<F>(
    artifact: ArtifactKind,
    url: &str,
    dest: &Path,
    cancel: &AtomicBool,
    on_event: &mut F,
) -> anyhow::Result<()>
where
    F: FnMut(ArtifactEvent),
{
    if cancel.load(Ordering::Relaxed) {
        return Err(DownloadCanceled.into());
    }

    if dest.exists() {
        on_event(ArtifactEvent::AlreadyPresent { artifact });
        on_event(ArtifactEvent::Finished { artifact });
        return Ok(());
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create model directory {}", parent.display()))?;
    }

    let mut progress: Option<ProgressBar> = None;
    download_to_path(artifact, url, dest, cancel, &mut |event| {
        match &event {
            ArtifactEvent::Started { total, .. } => {
                progress = Some(create_progress_bar(*total));
            }
            ArtifactEvent::Progress { downloaded, .. } => {
                if let Some(pb) = progress.as_ref() {
                    pb.set_position(*downloaded);
                }
            }
            ArtifactEvent::Finished { .. } => {
                if let Some(pb) = progress.take() {
                    pb.finish_with_message(format!("{} ready", artifact.label()));
                }
            }
            ArtifactEvent::AlreadyPresent { .. } => {}
        }
        on_event(event);
    })
    .with_context(|| format!("failed to fetch {} to {}", artifact.label(), dest.display()))
}

fn download_to_path<F>(
    artifact: ArtifactKind,
    url: &str,
    dest: &Path,
    cancel: &AtomicBool,
    on_event: &mut F,
) -> anyhow::Result<()>
where
    F: FnMut(ArtifactEvent),
{
    log::info!(
        "downloading {} from {url} to {}",
        artifact.label(),
        dest.display()
    );

    let client = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .context("failed to build download client")?;
    let mut response = client
        .get(url)
        .send()
        .context("failed to start artifact download")?
        .error_for_status()
        .context("artifact download returned error status")?;

    let total_size = response.content_length();
    on_event(ArtifactEvent::Started {
        artifact,
        total: total_size,
    });

    let tmp_path = dest.with_extension("download");
    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;

    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; 16 * 1024];
    loop {
        // Shutdown must not wait out the rest of the transfer.
        if cancel.load(Ordering::Relaxed) {
            drop(file);
            let _ = fs::remove_file(&tmp_path);
            return Err(DownloadCanceled.into());
        }

        let bytes_read = response
            .read(&mut buffer)
            .context("failed while reading artifact bytes")?;
        if bytes_read == 0 {
            break;
        }

        file.write_all(&buffer[..bytes_read])
            .context("failed while writing artifact to disk")?;
        downloaded += bytes_read as u64;
        on_event(ArtifactEvent::Progress {
            artifact,
            downloaded,
            total: total_size,
        });
    }

    file.sync_all()
        .context("failed to flush downloaded artifact to disk")?;
    fs::rename(&tmp_path, dest).with_context(|| {
        format!(
            "failed to move temp file {} into place at {}",
            tmp_path.display(),
            dest.display()
        )
    })?;

    on_event(ArtifactEvent::Finished { artifact });
    Ok(())
}

fn create_progress_bar(total_size: Option<u64>) -> ProgressBar {
    match total_size {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            let style = ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )
            .unwrap()
            .progress_chars("=>-");
            pb.set_style(style);
            pb
        }
        _ => {
            let pb = ProgressBar::new_spinner();
            let style =
                ProgressStyle::with_template("{spinner:.green} downloading artifact").unwrap();
            pb.set_style(style);
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        }
    }
}
