use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{ClassifierEngine, prepare};
use crate::types::{ClassScore, Frame};

pub struct OrtClassifier {
    session: Session,
    labels: Vec<String>,
}

impl OrtClassifier {
    /// Load the ONNX graph; `labels` come from the class metadata and must
    /// be listed in the model's output order.
    pub fn load(model_path: &Path, labels: Vec<String>) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| {
                format!("failed to load ORT session from {}", model_path.display())
            })?;

        Ok(Self { session, labels })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl ClassifierEngine for OrtClassifier {
    fn predict(&mut self, frame: &Frame) -> Result<Vec<ClassScore>> {
        let input = prepare::frame_tensor(frame)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run ORT session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("model returned no outputs"));
        }

        let probabilities = outputs[0].try_extract_array::<f32>()?;
        let probabilities: Vec<f32> = probabilities.iter().copied().collect();
        if probabilities.len() != self.labels.len() {
            return Err(anyhow!(
                "model returned {} scores for {} labels",
                probabilities.len(),
                self.labels.len()
            ));
        }

        Ok(self
            .labels
            .iter()
            .zip(probabilities)
            .map(|(label, probability)| ClassScore {
                label: label.clone(),
                probability,
            })
            .collect())
    }
}
