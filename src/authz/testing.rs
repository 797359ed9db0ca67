//! Test helpers for asserting on emitted log levels.

use std::sync::{Arc, Mutex};

use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

/// Records the level of every event emitted while installed on the current thread.
#[derive(Debug, Clone, Default)]
pub(crate) struct LevelRecorder {
    levels: Arc<Mutex<Vec<Level>>>,
}

impl LevelRecorder {
    pub(crate) fn install(&self) -> DefaultGuard {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }

    pub(crate) fn count(&self, level: Level) -> usize {
        self.levels
            .lock()
            .map(|levels| levels.iter().filter(|l| **l == level).count())
            .unwrap_or(0)
    }
}

impl<S: Subscriber> Layer<S> for LevelRecorder {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if let Ok(mut levels) = self.levels.lock() {
            levels.push(*event.metadata().level());
        }
    }
}
