use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};
use kmcthinfilm::engine::progress::{Progress, ProgressReporter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::warn;

#[derive(Debug)]
pub enum UiEvent {
    Progress(Progress),
    Log(String),
}

pub struct UiManager {
    mp: Arc<MultiProgress>,
    state: BarState,
    event_receiver: mpsc::Receiver<UiEvent>,
    shutdown_receiver: watch::Receiver<bool>,
    _sentinel_bar: ProgressBar,
}

#[derive(Default)]
struct BarState {
    active_bar: Option<ProgressBar>,
    base_message: String,
    /// Chunk counts of the simulated time, kept across phases so that
    /// deposition and relaxation share one bar length.
    run: Option<RunChunks>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RunChunks {
    total: u64,
    done: u64,
}

impl UiManager {
    pub fn new() -> (Self, mpsc::Sender<UiEvent>, watch::Sender<bool>) {
        let (event_sender, event_receiver) = mpsc::channel(1024);
        let (shutdown_sender, shutdown_receiver) = watch::channel(false);
        let mp = Arc::new(MultiProgress::new());
        mp.set_draw_target(ProgressDrawTarget::stderr_with_hz(12));
        let _sentinel_bar = mp.add(ProgressBar::hidden());
        let manager = Self {
            mp,
            state: BarState::default(),
            event_receiver,
            shutdown_receiver,
            _sentinel_bar,
        };

        (manager, event_sender, shutdown_sender)
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(event) = self.event_receiver.recv() => {
                    self.handle_event(event);
                }
                result = self.shutdown_receiver.changed() => {
                    if result.is_err() || *self.shutdown_receiver.borrow() {
                        break;
                    }
                }
            }
        }
        while let Ok(event) = self.event_receiver.try_recv() {
            self.handle_event(event);
        }
        if let Some(bar) = self.state.active_bar.take() {
            bar.finish_and_clear();
        }
        self._sentinel_bar.finish_and_clear();
    }

    fn handle_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Log(msg) => {
                self.mp.println(msg).ok();
            }
            UiEvent::Progress(progress) => self.handle_progress(progress),
        }
    }

    fn handle_progress(&mut self, progress: Progress) {
        match progress {
            Progress::PhaseStart { name } => {
                if let Some(bar) = self.state.active_bar.take() {
                    bar.finish_and_clear();
                }

                let pb = self.mp.add(ProgressBar::new_spinner());
                pb.set_message(name.to_string());
                match self.state.run {
                    Some(chunks) => Self::show_chunks(&pb, chunks),
                    None => {
                        pb.enable_steady_tick(Duration::from_millis(80));
                        pb.set_style(Self::spinner_style());
                    }
                }

                self.state.active_bar = Some(pb);
                self.state.base_message = name.to_string();
            }
            Progress::PhaseFinish => {
                if let Some(bar) = self.state.active_bar.take() {
                    bar.finish_and_clear();
                }

                let final_message = format!("✓ {}", self.state.base_message);
                self.mp.println(final_message).ok();

                self.state.base_message.clear();
            }
            Progress::RunStart { total_chunks } => {
                let chunks = RunChunks {
                    total: total_chunks,
                    done: 0,
                };
                self.state.run = Some(chunks);
                if let Some(bar) = self.state.active_bar.as_ref() {
                    Self::show_chunks(bar, chunks);
                }
            }
            Progress::RunAdvance {
                elapsed_time,
                num_events,
            } => {
                let Some(chunks) = self.state.run.as_mut() else {
                    return;
                };
                chunks.done = (chunks.done + 1).min(chunks.total);
                if let Some(bar) = self.state.active_bar.as_ref() {
                    bar.set_position(chunks.done);
                    bar.set_message(format!(
                        "{} (t = {:.3}, {} events)",
                        self.state.base_message, elapsed_time, num_events
                    ));
                }
            }
            Progress::RunFinish => {
                if let Some(chunks) = self.state.run.take() {
                    if let Some(bar) = self.state.active_bar.as_ref() {
                        bar.set_position(chunks.total);
                        bar.finish();
                    }
                }
            }
            Progress::Message(msg) => {
                self.mp.println(format!("  {}", msg)).ok();
            }
        }
    }

    fn show_chunks(bar: &ProgressBar, chunks: RunChunks) {
        bar.disable_steady_tick();
        bar.set_style(Self::bar_style());
        bar.set_length(chunks.total);
        bar.set_position(chunks.done);
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template("{msg:<45} [{bar:40.cyan/blue}] {percent:>3}% ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .with_key(
                "eta",
                |state: &ProgressState, w: &mut dyn std::fmt::Write| {
                    let _ = write!(w, "{:.1}s", state.eta().as_secs_f64());
                },
            )
            .progress_chars("━╸ ")
    }
}

/// Forwards workflow progress to the [`UiManager`] task.
#[derive(Clone)]
pub struct CliProgressHandler {
    sender: mpsc::Sender<UiEvent>,
}

impl CliProgressHandler {
    pub fn new(sender: mpsc::Sender<UiEvent>) -> Self {
        Self { sender }
    }

    pub fn reporter(&self) -> ProgressReporter {
        let sender = self.sender.clone();
        ProgressReporter::with_callback(move |progress: Progress| {
            if let Err(e) = sender.try_send(UiEvent::Progress(progress)) {
                warn!("Failed to send progress update to UI channel: {}", e);
            }
        })
    }
}
