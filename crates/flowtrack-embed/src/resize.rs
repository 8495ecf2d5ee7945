//! Iframe height reporting
//!
//! The embed cannot size its own iframe; only the host page can. The
//! bridge listens for layout signals from the host binding and posts
//! fresh height readings to the parent, batched so DOM churn cannot
//! flood the message channel:
//!
//! - Bridge start: one report after a short settle delay, so fonts and
//!   first-paint layout land before the host sizes the frame.
//! - Viewport resize: immediate report, reflow is certain.
//! - Content resize: coalesced to at most one report per frame interval.
//! - DOM mutation: one report per fixed debounce window, measured from
//!   the first signal of a burst.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::frame::{FrameMessage, WILDCARD_TARGET_ORIGIN};
use crate::ports::{FrameSink, LayoutProbe};

/// Delay before the first height report after the bridge starts.
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Coalescing window for content resize signals, one frame at 60Hz.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Debounce window for DOM mutation bursts.
pub const MUTATION_DEBOUNCE: Duration = Duration::from_millis(50);

/// A layout change observed by the host binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutSignal {
    /// The embed's own content box changed size.
    ContentResized,
    /// Something mutated the DOM. Catches height changes that resize
    /// observation misses, like images finishing or sections toggling.
    Mutated,
    /// The window was resized.
    ViewportResized,
}

/// Height-reporting loop for one mounted form.
///
/// Create with [`ResizeBridge::new`], then spawn [`ResizeBridge::run`].
/// The loop stops when every signal sender is dropped; a window still
/// pending at that point is discarded, not flushed.
pub struct ResizeBridge {
    probe: Arc<dyn LayoutProbe>,
    sink: Arc<dyn FrameSink>,
    signals: mpsc::Receiver<LayoutSignal>,
}

impl ResizeBridge {
    pub fn new(
        probe: Arc<dyn LayoutProbe>,
        sink: Arc<dyn FrameSink>,
        signals: mpsc::Receiver<LayoutSignal>,
    ) -> Self {
        Self {
            probe,
            sink,
            signals,
        }
    }

    /// Drive the bridge until the signal channel closes.
    pub async fn run(mut self) {
        let mut settle_deadline = Some(Instant::now() + SETTLE_DELAY);
        let mut frame_deadline: Option<Instant> = None;
        let mut mutation_deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                signal = self.signals.recv() => {
                    match signal {
                        Some(LayoutSignal::ViewportResized) => self.report(),
                        Some(LayoutSignal::ContentResized) => {
                            // Trailing edge: the first signal opens the
                            // window, later ones ride along
                            if frame_deadline.is_none() {
                                frame_deadline = Some(Instant::now() + FRAME_INTERVAL);
                            }
                        }
                        Some(LayoutSignal::Mutated) => {
                            if mutation_deadline.is_none() {
                                mutation_deadline = Some(Instant::now() + MUTATION_DEBOUNCE);
                            }
                        }
                        None => break,
                    }
                }
                _ = sleep_until(settle_deadline.unwrap_or_else(far_future)), if settle_deadline.is_some() => {
                    settle_deadline = None;
                    self.report();
                }
                _ = sleep_until(frame_deadline.unwrap_or_else(far_future)), if frame_deadline.is_some() => {
                    frame_deadline = None;
                    self.report();
                }
                _ = sleep_until(mutation_deadline.unwrap_or_else(far_future)), if mutation_deadline.is_some() => {
                    mutation_deadline = None;
                    self.report();
                }
            }
        }

        debug!("resize bridge stopped");
    }

    /// Read the height at send time, not signal time, so the parent
    /// always gets the latest layout.
    fn report(&self) {
        let height = self.probe.content_height();
        self.sink
            .post_to_parent(&FrameMessage::Resize { height }, WILDCARD_TARGET_ORIGIN);
    }
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(3600)
}

// ============================================================================
// Tests
// ============================================================================
