mod ort;
mod prepare;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use anyhow::Result;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use self::ort::OrtClassifier;
use crate::{
    model_download::{
        ArtifactEvent, DownloadCanceled, ModelSource, ensure_model_artifacts, load_metadata,
    },
    types::{ClassScore, Frame, LivePrediction},
};

// How long the worker waits for a frame before rechecking the stop flag.
const FRAME_WAIT: Duration = Duration::from_millis(100);

pub(crate) trait ClassifierEngine: Send + 'static {
    fn predict(&mut self, frame: &Frame) -> Result<Vec<ClassScore>>;
}

#[derive(Clone, Debug)]
pub enum ClassifierEvent {
    Download(ArtifactEvent),
    Ready { classes: Vec<String> },
    Prediction(LivePrediction),
    Failed(String),
}

/// Spawn the classification worker. It fetches the model artifacts, loads
/// the session, announces `Ready`, then classifies the freshest frame until
/// the stop flag is raised, the frame channel closes, or a cycle fails.
/// The stop flag also cancels the preparation phase, so joining the worker
/// never waits out an in-flight download.
pub fn start_classifier(
    source: ModelSource,
    stop: Arc<AtomicBool>,
    frame_rx: Receiver<Frame>,
    event_tx: Sender<ClassifierEvent>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let engine = match prepare_engine(&source, &stop, &event_tx) {
            Ok(engine) => engine,
            Err(err) => {
                if stop.load(Ordering::Relaxed) || err.is::<DownloadCanceled>() {
                    log::info!("classifier preparation canceled");
                    return;
                }
                log::error!("classifier preparation failed: {err:?}");
                let _ = event_tx.send(ClassifierEvent::Failed(format!("{err:#}")));
                return;
            }
        };

        log::info!("classifier ready with {} classes", engine.labels().len());
        let _ = event_tx.send(ClassifierEvent::Ready {
            classes: engine.labels().to_vec(),
        });

        run_classifier_loop(engine, &stop, &frame_rx, &event_tx);
    })
}

fn prepare_engine(
    source: &ModelSource,
    stop: &AtomicBool,
    event_tx: &Sender<ClassifierEvent>,
) -> Result<OrtClassifier> {
    ensure_model_artifacts(source, stop, |event| {
        let _ = event_tx.send(ClassifierEvent::Download(event));
    })?;
    let metadata = load_metadata(&source.metadata_path())?;
    if stop.load(Ordering::Relaxed) {
        return Err(DownloadCanceled.into());
    }
    OrtClassifier::load(&source.model_path(), metadata.labels)
}

fn run_classifier_loop<E: ClassifierEngine>(
    mut engine: E,
    stop: &AtomicBool,
    frame_rx: &Receiver<Frame>,
    event_tx: &Sender<ClassifierEvent>,
) {
    while !stop.load(Ordering::Relaxed) {
        let mut frame = match frame_rx.recv_timeout(FRAME_WAIT) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        // Drop whatever queued up while the last cycle ran; only the
        // freshest frame is worth classifying.
        while let Ok(newer) = frame_rx.try_recv() {
            frame = newer;
        }

        let scores = match engine.predict(&frame) {
            Ok(scores) => scores,
            Err(err) => {
                // A failed cycle ends the stream; the session surfaces it.
                log::error!("classification cycle failed: {err:?}");
                let _ = event_tx.send(ClassifierEvent::Failed(format!("{err:#}")));
                return;
            }
        };

        let Some(best) = select_top(&scores) else {
            let _ = event_tx.send(ClassifierEvent::Failed(
                "classifier produced no scores".to_string(),
            ));
            return;
        };

        let prediction = LivePrediction {
            label: best.label.clone(),
            confidence: (best.probability * 100.0).clamp(0.0, 100.0),
            at: frame.timestamp,
        };
        if event_tx
            .send(ClassifierEvent::Prediction(prediction))
            .is_err()
        {
            break;
        }
    }
}

/// Highest-probability class; the first wins a tie, matching the order the
/// metadata lists the classes in.
fn select_top(scores: &[ClassScore]) -> Option<&ClassScore> {
    let mut best = scores.first()?;
    for score in &scores[1..] {
        if score.probability > best.probability {
            best = score;
        }
    }
    Some(best)
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use crossbeam_channel::unbounded;

    use super::*;

    fn score(label: &str, probability: f32) -> ClassScore {
        ClassScore {
            label: label.to_string(),
            probability,
        }
    }

    fn frame() -> Frame {
        Frame {
            rgba: vec![0; 16],
            width: 2,
            height: 2,
            timestamp: Instant::now(),
        }
    }

    struct ScriptedEngine {
        responses: Vec<Result<Vec<ClassScore>>>,
    }

    impl ClassifierEngine for ScriptedEngine {
        fn predict(&mut self, _frame: &Frame) -> Result<Vec<ClassScore>> {
            assert!(
                !self.responses.is_empty(),
                "predict called more times than scripted"
            );
            self.responses.remove(0)
        }
    }

    #[test]
    fn select_top_picks_the_highest_probability() {
        let scores = [
            score("PLÁSTICO", 0.05),
            score("METAL", 0.90),
            score("TETRA PAK", 0.05),
        ];
        assert_eq!(select_top(&scores).unwrap().label, "METAL");
    }

    #[test]
    fn select_top_breaks_ties_towards_the_first_class() {
        let scores = [
            score("PLÁSTICO", 0.5),
            score("METAL", 0.5),
        ];
        assert_eq!(select_top(&scores).unwrap().label, "PLÁSTICO");
    }

    #[test]
    fn select_top_of_nothing_is_none() {
        assert!(select_top(&[]).is_none());
    }

    #[test]
    fn loop_classifies_only_the_freshest_frame() {
        let (frame_tx, frame_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let stop = AtomicBool::new(false);

        let stale = frame();
        let fresh = frame();
        let fresh_at = fresh.timestamp;
        frame_tx.send(stale).unwrap();
        frame_tx.send(fresh).unwrap();
        drop(frame_tx);

        let engine = ScriptedEngine {
            responses: vec![Ok(vec![score("METAL", 0.934)])],
        };
        run_classifier_loop(engine, &stop, &frame_rx, &event_tx);

        let events: Vec<ClassifierEvent> = event_rx.try_iter().collect();
        assert_eq!(events.len(), 1, "stale frame must be skipped");
        match &events[0] {
            ClassifierEvent::Prediction(prediction) => {
                assert_eq!(prediction.label, "METAL");
                assert!((prediction.confidence - 93.4).abs() < 1e-3);
                assert_eq!(prediction.at, fresh_at);
            }
            other => panic!("expected a prediction, got {other:?}"),
        }
    }

    #[test]
    fn confidence_is_clamped_to_the_percent_scale() {
        let (frame_tx, frame_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let stop = AtomicBool::new(false);

        frame_tx.send(frame()).unwrap();
        drop(frame_tx);

        let engine = ScriptedEngine {
            responses: vec![Ok(vec![score("METAL", 1.2)])],
        };
        run_classifier_loop(engine, &stop, &frame_rx, &event_tx);

        match event_rx.try_recv().unwrap() {
            ClassifierEvent::Prediction(prediction) => {
                assert_eq!(prediction.confidence, 100.0);
            }
            other => panic!("expected a prediction, got {other:?}"),
        }
    }

    #[test]
    fn failed_cycle_stops_the_loop() {
        let (frame_tx, frame_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let stop = AtomicBool::new(false);

        frame_tx.send(frame()).unwrap();
        frame_tx.send(frame()).unwrap();

        let engine = ScriptedEngine {
            responses: vec![Err(anyhow::anyhow!("inference blew up"))],
        };
        run_classifier_loop(engine, &stop, &frame_rx, &event_tx);
        drop(frame_tx);

        let events: Vec<ClassifierEvent> = event_rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ClassifierEvent::Failed(reason) if reason.contains("blew up")));
    }

    #[test]
    fn raised_stop_flag_cancels_preparation_promptly() {
        let dir = tempfile::tempdir().unwrap();
        let source = ModelSource::with_dir(dir.path());
        let stop = Arc::new(AtomicBool::new(true));
        let (_frame_tx, frame_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();

        // Joining must not wait on any artifact fetch once the flag is up.
        let handle = start_classifier(source, stop, frame_rx, event_tx);
        handle.join().unwrap();

        assert!(
            event_rx.try_recv().is_err(),
            "a canceled worker must not report Ready or Failed"
        );
    }

    #[test]
    fn raised_stop_flag_prevents_any_work() {
        let (frame_tx, frame_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let stop = AtomicBool::new(true);

        frame_tx.send(frame()).unwrap();

        let engine = ScriptedEngine { responses: vec![] };
        run_classifier_loop(engine, &stop, &frame_rx, &event_tx);

        assert!(event_rx.try_recv().is_err());
    }
}
