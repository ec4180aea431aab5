use std::sync::Arc;

/// Progress notifications emitted by the bundled workflows.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    PhaseStart { name: &'static str },
    PhaseFinish,

    /// Simulated time is split into `total_chunks` equal slices.
    RunStart { total_chunks: u64 },
    /// Another slice of simulated time has passed.
    RunAdvance { elapsed_time: f64, num_events: u64 },
    RunFinish,

    Message(String),
}

pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// Cheap to clone, so it can be moved into periodic actions.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: impl Fn(Progress) + Send + Sync + 'static) -> Self {
        Self {
            callback: Some(Arc::new(callback)),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }
}
