//! Static renderer - returns a fixed image path and counts calls.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use quake_core::{async_trait, MapRenderer};

#[derive(Debug, Default)]
pub struct StaticRenderer {
    output: Option<PathBuf>,
    delay: Duration,
    calls: AtomicUsize,
}

impl StaticRenderer {
    /// A renderer that always produces `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            output: Some(path.into()),
            ..Default::default()
        }
    }

    /// A renderer that always fails.
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MapRenderer for StaticRenderer {
    async fn render(&self, _html: &str, _selector: &str) -> Option<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.output.clone()
    }
}
