use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::{SyncSender, TrySendError};
use std::sync::Arc;

use thiserror::Error;

use crate::analytics::PipelineStats;
use crate::config::CameraConfig;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ffmpeg not found")]
    FfmpegNotFound,
    #[error("ffmpeg failed: {0}")]
    FfmpegFailed(String),
}

/// One raw BGR24 frame from the capture source
pub struct Frame {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

pub struct FramePipeline {
    camera_id: String,
    source: String,
    width: u32,
    height: u32,
    sample_fps: u32,
    frame_tx: SyncSender<Frame>,
    stats: Arc<PipelineStats>,
}

impl FramePipeline {
    pub fn new(
        config: &CameraConfig,
        frame_tx: SyncSender<Frame>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            camera_id: config.id.clone(),
            source: config.source.clone(),
            width: config.width,
            height: config.height,
            sample_fps: config.sample_fps,
            frame_tx,
            stats,
        }
    }

    /// Run the capture pipeline, blocking until stream end, error, or shutdown
    pub fn run(&self, shutdown: &AtomicBool) -> Result<(), CaptureError> {
        let mut child = self.spawn_ffmpeg()?;
        let stdout = child.stdout.take().ok_or(CaptureError::FfmpegFailed(
            "failed to capture stdout".to_string(),
        ))?;

        tracing::info!(camera = %self.camera_id, "capture pipeline started");

        let result = self.read_frames(stdout, shutdown);

        // Clean up child process
        let _ = child.kill();
        let _ = child.wait();

        result
    }

    fn spawn_ffmpeg(&self) -> Result<Child, CaptureError> {
        let mut command = Command::new("ffmpeg");
        command.args(["-hide_banner", "-loglevel", "warning"]);

        // Input flags depend on the source kind: V4L2 device node or network stream
        if self.source.starts_with("rtsp://") {
            command.args(["-rtsp_transport", "tcp"]);
        } else if self.source.starts_with('/') {
            command.args(["-f", "v4l2"]);
        }

        command
            .args(["-i", &self.source])
            .args([
                "-vf",
                &format!(
                    "fps={},scale={}:{}",
                    self.sample_fps, self.width, self.height
                ),
                "-an",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "bgr24",
                "pipe:1",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CaptureError::FfmpegNotFound
                } else {
                    CaptureError::Io(e)
                }
            })
    }

    fn read_frames<R: Read>(
        &self,
        mut reader: R,
        shutdown: &AtomicBool,
    ) -> Result<(), CaptureError> {
        let frame_size = (self.width * self.height * 3) as usize;
        let mut sequence = 0u64;

        while !shutdown.load(std::sync::atomic::Ordering::Relaxed) {
            let mut data = vec![0u8; frame_size];
            if let Err(e) = reader.read_exact(&mut data) {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    tracing::warn!(camera = %self.camera_id, "capture stream ended");
                    return Ok(());
                }
                return Err(CaptureError::Io(e));
            }

            let frame = Frame {
                sequence,
                width: self.width,
                height: self.height,
                data,
            };
            sequence += 1;

            // Never block on a slow analyzer; drop the frame instead
            match self.frame_tx.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.stats.record_dropped();
                    tracing::trace!(
                        camera = %self.camera_id,
                        sequence = sequence - 1,
                        "analyzer busy, frame dropped"
                    );
                }
                Err(TrySendError::Disconnected(_)) => {
                    tracing::warn!(camera = %self.camera_id, "frame channel closed");
                    return Ok(());
                }
            }
        }

        Ok(())
    }
}
