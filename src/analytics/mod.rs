mod detector;
mod pipeline;
mod tracker;

pub use detector::{BoundingBox, DetectedObject, ObjectDetector, ObjectLabel};
pub use pipeline::{spawn_analyzer, PipelineStats};
