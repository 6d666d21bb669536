pub mod camera;
pub mod classifier;
pub mod decode;

// Re-exports for convenience
pub use camera::{CameraError, CameraStream};
pub use classifier::ClassifierEvent;
