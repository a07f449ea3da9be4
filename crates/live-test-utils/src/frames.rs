//! Helpers for output sinks.

use live_runtime::render::{OutputSink, RenderedFrame};
use std::time::Duration;
use tokio::sync::mpsc;

/// Output sink and its receiving end, with room for 256 frames.
#[must_use]
pub fn frame_channel() -> (OutputSink, mpsc::Receiver<RenderedFrame>) {
    mpsc::channel(256)
}

/// Wait for the next frame, panicking after `timeout`.
pub async fn next_frame(rx: &mut mpsc::Receiver<RenderedFrame>, timeout: Duration) -> RenderedFrame {
    tokio::time::timeout(timeout, rx.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("output sink closed")
}

/// Take every frame already queued.
pub fn drain_frames(rx: &mut mpsc::Receiver<RenderedFrame>) -> Vec<RenderedFrame> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}
