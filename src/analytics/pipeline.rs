use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use opencv::core::Mat;
use opencv::prelude::*;

use crate::camera::Frame;
use crate::display::{render_preview, LabelBoard, SharedPreview};

use super::detector::ObjectDetector;
use super::tracker::ObjectTracker;

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const STATS_INTERVAL: Duration = Duration::from_secs(30);

/// Counters shared between the capture side, the analyzer, and the API
#[derive(Default)]
pub struct PipelineStats {
    frames_analyzed: AtomicU64,
    frames_dropped: AtomicU64,
    objects_seen: AtomicU64,
}

impl PipelineStats {
    pub fn record_analyzed(&self) {
        self.frames_analyzed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_objects(&self, count: u64) {
        self.objects_seen.fetch_add(count, Ordering::Relaxed);
    }

    pub fn frames_analyzed(&self) -> u64 {
        self.frames_analyzed.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    pub fn objects_seen(&self) -> u64 {
        self.objects_seen.load(Ordering::Relaxed)
    }
}

pub struct FrameAnalyzer {
    camera_id: String,
    frame_rx: Receiver<Frame>,
    detector: ObjectDetector,
    tracker: ObjectTracker,
    board: Arc<RwLock<LabelBoard>>,
    preview: SharedPreview,
    stats: Arc<PipelineStats>,
}

impl FrameAnalyzer {
    fn new(
        camera_id: String,
        frame_rx: Receiver<Frame>,
        detector: ObjectDetector,
        board: Arc<RwLock<LabelBoard>>,
        preview: SharedPreview,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            camera_id,
            frame_rx,
            detector,
            tracker: ObjectTracker::new(),
            board,
            preview,
            stats,
        }
    }

    fn run(mut self, shutdown: Arc<AtomicBool>) {
        tracing::info!(camera = %self.camera_id, "frame analyzer started");

        let mut last_stats = Instant::now();

        while !shutdown.load(Ordering::Relaxed) {
            let frame = match self.frame_rx.recv_timeout(POLL_INTERVAL) {
                Ok(frame) => frame,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::warn!(camera = %self.camera_id, "frame channel closed");
                    break;
                }
            };

            if let Err(e) = self.analyze_frame(&frame) {
                tracing::error!(
                    camera = %self.camera_id,
                    sequence = frame.sequence,
                    error = %e,
                    "inference failed"
                );
                // Failed inference must not leave stale labels on display
                if let Ok(mut board) = self.board.write() {
                    board.clear();
                }
            }

            self.stats.record_analyzed();

            if last_stats.elapsed() >= STATS_INTERVAL {
                tracing::info!(
                    camera = %self.camera_id,
                    frames_analyzed = self.stats.frames_analyzed(),
                    frames_dropped = self.stats.frames_dropped(),
                    objects_seen = self.stats.objects_seen(),
                    "pipeline stats"
                );
                last_stats = Instant::now();
            }
        }

        tracing::info!(camera = %self.camera_id, "frame analyzer stopped");
    }

    fn analyze_frame(
        &mut self,
        frame: &Frame,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let expected = (frame.width * frame.height * 3) as usize;
        if frame.data.len() != expected {
            return Err(format!(
                "frame size mismatch: got {} bytes, expected {}",
                frame.data.len(),
                expected
            )
            .into());
        }

        let mat = Mat::from_slice(&frame.data)?;
        let mat = mat.reshape(3, frame.height as i32)?.try_clone()?;

        let mut objects = self.detector.detect(&mat)?;
        self.tracker.assign(&mut objects);
        self.stats.record_objects(objects.len() as u64);

        for obj in &objects {
            let Some(label) = obj.best_label() else {
                continue;
            };
            tracing::debug!(
                camera = %self.camera_id,
                sequence = frame.sequence,
                tracking_id = ?obj.tracking_id,
                label = %label.text,
                confidence = format!("{:.2}", label.confidence),
                labels = obj.labels.len(),
                "object detected"
            );
        }

        {
            let mut board = self.board.write().map_err(|_| "board lock poisoned")?;
            board.apply(&objects);
        }

        if let Some(jpeg) = render_preview(&mat, &objects) {
            if let Ok(mut preview) = self.preview.write() {
                *preview = Some(jpeg);
            }
        }

        Ok(())
    }
}

pub fn spawn_analyzer(
    camera_id: String,
    frame_rx: Receiver<Frame>,
    detector: ObjectDetector,
    board: Arc<RwLock<LabelBoard>>,
    preview: SharedPreview,
    stats: Arc<PipelineStats>,
    shutdown: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let analyzer = FrameAnalyzer::new(camera_id, frame_rx, detector, board, preview, stats);
        analyzer.run(shutdown);
    })
}
