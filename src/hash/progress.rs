// Progress reporting module
// Periodic `processed/total` output that never blocks the workers

use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Sender};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};

/// How progress is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProgressMode {
    /// `processed/total` lines on stdout
    #[default]
    Lines,
    /// Progress bar on stderr
    Bar,
}

enum Renderer {
    Lines(Box<dyn Write + Send>),
    Bar(ProgressBar),
}

impl Renderer {
    fn emit(&mut self, processed: u64, total: u64) {
        match self {
            Renderer::Lines(out) => {
                // A closed stdout is not worth failing the run over
                let _ = writeln!(out, "{}/{}", processed, total);
                let _ = out.flush();
            }
            Renderer::Bar(pb) => pb.set_position(processed),
        }
    }

    fn finish(self, processed: u64, total: u64) {
        match self {
            mut lines @ Renderer::Lines(_) => lines.emit(processed, total),
            Renderer::Bar(pb) => {
                pb.set_position(processed);
                pb.finish();
            }
        }
    }
}

/// Background reporter for one run
pub struct ProgressReporter {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl ProgressReporter {
    pub const INTERVAL: Duration = Duration::from_secs(1);

    /// Start reporting, or return None when there is nothing to report
    pub fn start(counter: Arc<AtomicU64>, total: u64, mode: ProgressMode) -> Option<Self> {
        if total == 0 {
            return None;
        }

        let renderer = match mode {
            ProgressMode::Lines => Renderer::Lines(Box::new(io::stdout())),
            ProgressMode::Bar => {
                let pb = ProgressBar::new(total);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({percent}%) {per_sec}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("=>-"),
                );
                Renderer::Bar(pb)
            }
        };

        Some(Self::spawn(counter, total, renderer, Self::INTERVAL))
    }

    /// Line reporter writing to an arbitrary sink at a custom interval
    pub fn start_with_writer<W>(
        counter: Arc<AtomicU64>,
        total: u64,
        out: W,
        interval: Duration,
    ) -> Option<Self>
    where
        W: Write + Send + 'static,
    {
        if total == 0 {
            return None;
        }
        Some(Self::spawn(counter, total, Renderer::Lines(Box::new(out)), interval))
    }

    fn spawn(
        counter: Arc<AtomicU64>,
        total: u64,
        mut renderer: Renderer,
        interval: Duration,
    ) -> Self {
        let (stop, stopped) = bounded::<()>(1);
        let ticker = tick(interval);

        let handle = thread::spawn(move || {
            loop {
                select! {
                    recv(ticker) -> _ => renderer.emit(counter.load(Ordering::Relaxed), total),
                    recv(stopped) -> _ => break,
                }
            }
            renderer.finish(counter.load(Ordering::Relaxed), total);
        });

        Self { stop, handle }
    }

    /// Stop ticking and emit the final count; call after the pool drained
    pub fn finish(self) {
        let _ = self.stop.send(());
        if self.handle.join().is_err() {
            tracing::warn!("progress reporter thread panicked");
        }
    }
}
