use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, mpsc};
use std::time::Instant;

use crate::error::{Error, Result};
use crate::pass::PassReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Expand,
    Reconcile,
    Reconfigure,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Expand => "expand",
            Phase::Reconcile => "reconcile",
            Phase::Reconfigure => "reconfigure",
        })
    }
}

#[derive(Debug, Clone)]
pub enum PassEvent {
    PhaseStarted {
        phase: Phase,
        items: usize,
        workers: usize,
    },
    ItemFailed {
        phase: Phase,
        port: String,
        error: String,
    },
    PortDirty {
        port: String,
        added: Vec<String>,
        removed: Vec<String>,
    },
    ReconfigureStarted {
        port: String,
    },
    ReconfigureFinished {
        port: String,
        ok: bool,
        error: Option<String>,
        elapsed_ms: u128,
    },
    PassDone {
        report: PassReport,
    },
}

pub trait PassSink: Send + Sync {
    fn emit(&self, ev: PassEvent);
}

#[derive(Default)]
pub struct StdoutSink {
    started_at: Mutex<Option<Instant>>,
}

impl PassSink for StdoutSink {
    fn emit(&self, ev: PassEvent) {
        match ev {
            PassEvent::PhaseStarted {
                phase,
                items,
                workers,
            } => {
                if let Ok(mut s) = self.started_at.lock() {
                    s.get_or_insert_with(Instant::now);
                }
                println!("PHASE: {phase} ({items} ports, {workers} workers)");
            }
            PassEvent::ItemFailed { phase, port, error } => {
                println!("SKIP: [{phase}] {port}: {error}");
            }
            PassEvent::PortDirty {
                port,
                added,
                removed,
            } => {
                let mut changes: Vec<String> = added.iter().map(|o| format!("+{o}")).collect();
                changes.extend(removed.iter().map(|o| format!("-{o}")));
                println!("DIRTY: {port} ({})", changes.join(" "));
            }
            PassEvent::ReconfigureStarted { port } => {
                println!("RUN: make config {port}");
            }
            PassEvent::ReconfigureFinished {
                port,
                ok,
                error,
                elapsed_ms,
            } => {
                if ok {
                    println!("DONE: {port} ({elapsed_ms}ms)");
                } else {
                    println!("FAIL: {port} ({elapsed_ms}ms) {}", error.unwrap_or_default());
                }
            }
            PassEvent::PassDone { report } => {
                let wall = self
                    .started_at
                    .lock()
                    .ok()
                    .and_then(|mut s| s.take())
                    .map(|t| t.elapsed())
                    .unwrap_or_default();
                print!("{}", report.render_summary());
                println!("  elapsed: {}", format_elapsed_hms(wall.as_secs()));
            }
        }
    }
}

/// Sends events to the log only, leaving stdout free for machine-readable output.
#[derive(Default)]
pub struct TracingSink;

impl PassSink for TracingSink {
    fn emit(&self, ev: PassEvent) {
        match ev {
            PassEvent::PhaseStarted {
                phase,
                items,
                workers,
            } => tracing::info!(%phase, items, workers, "phase started"),
            PassEvent::ItemFailed { phase, port, error } => {
                tracing::warn!(%phase, port = %port, error = %error, "port skipped")
            }
            PassEvent::PortDirty { port, .. } => tracing::info!(port = %port, "options diverged"),
            PassEvent::ReconfigureStarted { port } => tracing::info!(port = %port, "make config"),
            PassEvent::ReconfigureFinished {
                port,
                ok,
                error,
                elapsed_ms,
            } => {
                if ok {
                    tracing::info!(port = %port, elapsed_ms = elapsed_ms as u64, "reconfigured");
                } else {
                    tracing::warn!(
                        port = %port,
                        elapsed_ms = elapsed_ms as u64,
                        error = error.as_deref().unwrap_or_default(),
                        "reconfiguration failed"
                    );
                }
            }
            PassEvent::PassDone { .. } => {}
        }
    }
}

#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<PassEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<PassEvent>) -> Self {
        Self { tx }
    }
}

impl PassSink for ChannelSink {
    fn emit(&self, ev: PassEvent) {
        let _ = self.tx.send(ev);
    }
}

/// Runs `work` over every item on at most `max_parallel` threads.
///
/// Results come back in item order. A panicking worker turns into an error for
/// its own item only.
pub fn fan_out<T, R, F>(items: &[T], max_parallel: usize, work: F) -> Vec<Result<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> Result<R> + Sync,
{
    let max_parallel = max_parallel.max(1);
    let mut results: Vec<Option<Result<R>>> = (0..items.len()).map(|_| None).collect();
    let work = &work;

    std::thread::scope(|scope| {
        let (tx, rx) = mpsc::channel::<(usize, Result<R>)>();
        let mut next = 0usize;
        let mut running = 0usize;

        while next < items.len() || running > 0 {
            // Fill worker slots.
            while running < max_parallel && next < items.len() {
                let idx = next;
                next += 1;
                let item = &items[idx];
                let tx = tx.clone();
                scope.spawn(move || {
                    let r = panic::catch_unwind(AssertUnwindSafe(|| work(item)))
                        .unwrap_or_else(|p| {
                            Err(Error::msg(format!("worker panicked: {}", panic_message(&*p))))
                        });
                    let _ = tx.send((idx, r));
                });
                running += 1;
            }

            let Ok((idx, r)) = rx.recv() else {
                break;
            };
            results[idx] = Some(r);
            running -= 1;
        }
    });

    results
        .into_iter()
        .map(|r| r.unwrap_or_else(|| Err(Error::msg("worker exited without a result"))))
        .collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic>".into()
    }
}

fn format_elapsed_hms(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}
