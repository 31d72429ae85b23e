use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use tracing_subscriber::EnvFilter;

mod analytics;
mod api;
mod camera;
mod config;
mod display;

use analytics::{ObjectDetector, PipelineStats};
use camera::{Frame, FramePipeline};
use config::Config;
use display::LabelBoard;

// Analysis keeps up with fresh frames; anything beyond this is dropped
const FRAME_QUEUE_DEPTH: usize = 2;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("camtag=debug".parse()?))
        .init();

    let config = Config::load()?;
    tracing::info!(
        camera = %config.camera.id,
        source = %config.camera.source,
        model = %config.detector.model,
        "loaded configuration"
    );

    let detector = ObjectDetector::new(&config.detector)?;
    tracing::info!("object detector ready");

    let board = LabelBoard::new();
    let preview = display::new_shared_preview();
    let stats = Arc::new(PipelineStats::default());
    let shutdown = Arc::new(AtomicBool::new(false));

    let (frame_tx, frame_rx) = mpsc::sync_channel::<Frame>(FRAME_QUEUE_DEPTH);

    let analyzer_handle = analytics::spawn_analyzer(
        config.camera.id.clone(),
        frame_rx,
        detector,
        Arc::clone(&board),
        preview.clone(),
        Arc::clone(&stats),
        Arc::clone(&shutdown),
    );

    let capture_config = config.camera.clone();
    let capture_stats = Arc::clone(&stats);
    let capture_shutdown = Arc::clone(&shutdown);
    let capture_handle = tokio::task::spawn_blocking(move || {
        run_capture(capture_config, frame_tx, capture_stats, capture_shutdown);
    });

    let state = api::AppState::new(
        config.camera.id.clone(),
        board,
        preview,
        Arc::clone(&stats),
    );
    let server_handle = tokio::spawn(api::start_server(state, config.http.port));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    shutdown.store(true, Ordering::Relaxed);

    server_handle.abort();
    let _ = capture_handle.await;
    let _ = analyzer_handle.await;

    tracing::info!(
        frames_analyzed = stats.frames_analyzed(),
        frames_dropped = stats.frames_dropped(),
        objects_seen = stats.objects_seen(),
        "shutdown complete"
    );

    Ok(())
}

/// Blocking capture supervisor: restart the pipeline after errors until shutdown
fn run_capture(
    config: config::CameraConfig,
    frame_tx: mpsc::SyncSender<Frame>,
    stats: Arc<PipelineStats>,
    shutdown: Arc<AtomicBool>,
) {
    let camera_id = config.id.clone();

    while !shutdown.load(Ordering::Relaxed) {
        tracing::info!(camera = %camera_id, source = %config.source, "starting capture");

        let pipeline = FramePipeline::new(&config, frame_tx.clone(), Arc::clone(&stats));
        match pipeline.run(&shutdown) {
            Ok(()) => {
                tracing::warn!(camera = %camera_id, "capture pipeline exited");
            }
            Err(e) => {
                tracing::error!(camera = %camera_id, error = %e, "capture pipeline failed");
            }
        }

        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        tracing::info!(camera = %camera_id, "reconnecting in 5 seconds");
        sleep_interruptible(RECONNECT_DELAY, &shutdown);
    }

    tracing::info!(camera = %camera_id, "capture supervisor stopped");
}

fn sleep_interruptible(total: Duration, shutdown: &AtomicBool) {
    let step = Duration::from_millis(100);
    let mut slept = Duration::ZERO;
    while slept < total && !shutdown.load(Ordering::Relaxed) {
        std::thread::sleep(step);
        slept += step;
    }
}
