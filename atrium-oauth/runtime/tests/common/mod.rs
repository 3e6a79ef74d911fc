use std::sync::{Arc, Mutex};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// Records the target of every `WARN` event.
#[derive(Clone, Default)]
pub struct WarningCounter(Arc<Mutex<Vec<String>>>);

impl WarningCounter {
    /// Warnings whose target starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|target| target.starts_with(prefix)).count()
    }
}

impl<S: Subscriber> Layer<S> for WarningCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() == Level::WARN {
            self.0.lock().unwrap().push(metadata.target().to_string());
        }
    }
}
