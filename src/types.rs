use std::time::Instant;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

/// One class from the model output, probability on the 0..=1 scale.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassScore {
    pub label: String,
    pub probability: f32,
}

/// Best class of the latest classified frame, confidence on the 0..=100 scale.
#[derive(Clone, Debug, PartialEq)]
pub struct LivePrediction {
    pub label: String,
    pub confidence: f32,
    pub at: Instant,
}
