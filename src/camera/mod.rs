mod capture;

pub use capture::{CaptureError, Frame, FramePipeline};
