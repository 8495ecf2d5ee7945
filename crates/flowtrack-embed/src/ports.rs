//! Host page ports
//!
//! The embed touches its surrounding page in exactly three ways: posting
//! messages to the parent frame, navigating the top window after success,
//! and measuring its own rendered height. Each is a trait here, with an
//! in-memory adapter so the runtime behaves identically under a browser
//! binding and in tests.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::frame::FrameMessage;

/// Posts messages to the embedding parent frame.
pub trait FrameSink: Send + Sync {
    fn post_to_parent(&self, message: &FrameMessage, target_origin: &str);
}

/// Performs a top-level navigation (the post-success redirect).
pub trait Navigator: Send + Sync {
    fn navigate(&self, url: &str);
}

/// Measures the embed's rendered content height in CSS pixels.
pub trait LayoutProbe: Send + Sync {
    fn content_height(&self) -> u32;
}

/// Recording [`FrameSink`] adapter.
#[derive(Default)]
pub struct MemorySink {
    posts: Mutex<Vec<(FrameMessage, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages posted so far, oldest first.
    pub fn messages(&self) -> Vec<FrameMessage> {
        self.posts.lock().iter().map(|(m, _)| m.clone()).collect()
    }

    /// Messages with the target origin each was posted to.
    pub fn posts(&self) -> Vec<(FrameMessage, String)> {
        self.posts.lock().clone()
    }
}

impl FrameSink for MemorySink {
    fn post_to_parent(&self, message: &FrameMessage, target_origin: &str) {
        self.posts
            .lock()
            .push((message.clone(), target_origin.to_string()));
    }
}

/// Recording [`Navigator`] adapter.
#[derive(Default)]
pub struct MemoryNavigator {
    target: Mutex<Option<String>>,
}

impl MemoryNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Where the last `navigate` call pointed, if any.
    pub fn navigated_to(&self) -> Option<String> {
        self.target.lock().clone()
    }
}

impl Navigator for MemoryNavigator {
    fn navigate(&self, url: &str) {
        *self.target.lock() = Some(url.to_string());
    }
}

/// [`LayoutProbe`] adapter with a settable reading.
#[derive(Default)]
pub struct StaticProbe {
    height: AtomicU32,
}

impl StaticProbe {
    pub fn new(height: u32) -> Self {
        Self {
            height: AtomicU32::new(height),
        }
    }

    pub fn set_height(&self, height: u32) {
        self.height.store(height, Ordering::Relaxed);
    }
}

impl LayoutProbe for StaticProbe {
    fn content_height(&self) -> u32 {
        self.height.load(Ordering::Relaxed)
    }
}
