//! The options pass: expand the package lists, find ports whose stored options
//! no longer match their Makefile, and run `make config` for each of them.

use std::collections::BTreeSet;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::BuildConfig;
use crate::deps::expand;
use crate::error::{Error, ErrorKind};
use crate::executor::{PassEvent, PassSink, Phase, fan_out};
use crate::make::PortsMake;
use crate::port::PortRef;
use crate::reconcile::{Divergence, apply_options, reconcile};

#[derive(Debug, Clone, Serialize)]
pub struct SkippedPort {
    pub port: String,
    pub phase: String,
    pub kind: &'static str,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedPort {
    pub port: String,
    /// `None` when make never ran.
    pub status: Option<i32>,
    pub kind: &'static str,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PassReport {
    pub seeds: usize,
    /// Ports checked in the reconcile phase.
    pub attempted: usize,
    pub clean: Vec<String>,
    pub dirty: Vec<String>,
    pub reconfigured: Vec<String>,
    pub failed: Vec<FailedPort>,
    pub skipped: Vec<SkippedPort>,
    pub dry_run: bool,
}

impl PassReport {
    pub fn ok(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn render_summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str("SUMMARY:\n");
        summary.push_str(&format!(
            "  status: {}\n",
            if self.ok() { "ok" } else { "failed" }
        ));
        summary.push_str(&format!(
            "  ports: seeds={} attempted={} clean={} dirty={} skipped={}\n",
            self.seeds,
            self.attempted,
            self.clean.len(),
            self.dirty.len(),
            self.skipped.len()
        ));
        if self.dry_run {
            summary.push_str("  reconfigure: dry-run\n");
        } else {
            summary.push_str(&format!(
                "  reconfigure: ok={} failed={}\n",
                self.reconfigured.len(),
                self.failed.len()
            ));
        }
        if !self.dirty.is_empty() {
            summary.push_str(&format!("  dirty_ports: {}\n", self.dirty.join(", ")));
        }
        if !self.failed.is_empty() {
            let failed: Vec<&str> = self.failed.iter().map(|f| f.port.as_str()).collect();
            summary.push_str(&format!("  failed_ports: {}\n", failed.join(", ")));
        }
        if !self.skipped.is_empty() {
            summary.push_str("  skipped:\n");
            for s in &self.skipped {
                summary.push_str(&format!("    [{}] {}: {}\n", s.phase, s.port, s.error));
            }
        }
        summary
    }
}

pub struct OptionsPass<'a> {
    cfg: &'a BuildConfig,
    make: &'a dyn PortsMake,
    sink: &'a dyn PassSink,
    max_parallel: usize,
    include_seeds: bool,
    dry_run: bool,
}

impl<'a> OptionsPass<'a> {
    pub fn new(cfg: &'a BuildConfig, make: &'a dyn PortsMake, sink: &'a dyn PassSink) -> Self {
        Self {
            cfg,
            make,
            sink,
            max_parallel: cfg.max_parallel(),
            include_seeds: cfg.options.include_seeds,
            dry_run: false,
        }
    }

    pub fn max_parallel(mut self, n: usize) -> Self {
        self.max_parallel = n.max(1);
        self
    }

    pub fn include_seeds(mut self, yes: bool) -> Self {
        self.include_seeds = yes;
        self
    }

    pub fn dry_run(mut self, yes: bool) -> Self {
        self.dry_run = yes;
        self
    }

    pub fn run(&self, seeds: &BTreeSet<PortRef>) -> PassReport {
        let mut report = PassReport {
            seeds: seeds.len(),
            dry_run: self.dry_run,
            ..PassReport::default()
        };

        let universe = self.expand_all(seeds, &mut report);
        report.attempted = universe.len();
        let dirty = self.find_dirty(&universe, &mut report);
        self.reconfigure(&dirty, &mut report);

        info!(
            attempted = report.attempted,
            dirty = report.dirty.len(),
            reconfigured = report.reconfigured.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "options pass finished"
        );
        self.sink.emit(PassEvent::PassDone {
            report: report.clone(),
        });
        report
    }

    fn expand_all(&self, seeds: &BTreeSet<PortRef>, report: &mut PassReport) -> Vec<PortRef> {
        let seeds: Vec<PortRef> = seeds.iter().cloned().collect();
        self.sink.emit(PassEvent::PhaseStarted {
            phase: Phase::Expand,
            items: seeds.len(),
            workers: self.max_parallel,
        });

        let results = fan_out(&seeds, self.max_parallel, |port| {
            expand(port, self.cfg, self.make).map(|deps| deps.collect::<Vec<_>>())
        });

        // Fan-in: the universe is only assembled once every worker returned.
        let mut universe = BTreeSet::new();
        for (seed, result) in seeds.iter().zip(results) {
            let deps = match result {
                Ok(deps) => deps,
                Err(e) => {
                    self.skip(report, Phase::Expand, seed.to_string(), &e);
                    continue;
                }
            };
            for dep in deps {
                match dep {
                    Ok(dep) => {
                        universe.insert(dep);
                    }
                    Err(e) => self.skip(report, Phase::Expand, format!("{seed} (dependency)"), &e),
                }
            }
        }
        if self.include_seeds {
            universe.extend(seeds);
        }
        universe.into_iter().collect()
    }

    fn find_dirty(&self, universe: &[PortRef], report: &mut PassReport) -> Vec<PortRef> {
        self.sink.emit(PassEvent::PhaseStarted {
            phase: Phase::Reconcile,
            items: universe.len(),
            workers: self.max_parallel,
        });

        let results = fan_out(universe, self.max_parallel, |port| {
            reconcile(port, self.cfg, self.make)
        });

        let mut dirty = Vec::new();
        for (port, result) in universe.iter().zip(results) {
            match result {
                Ok(div) if div.is_dirty() => {
                    self.emit_dirty(port, &div);
                    report.dirty.push(port.to_string());
                    dirty.push(port.clone());
                }
                Ok(_) => report.clean.push(port.to_string()),
                Err(e) => self.skip(report, Phase::Reconcile, port.to_string(), &e),
            }
        }
        dirty
    }

    // `make config` may prompt on the terminal, so this stays on the calling thread.
    fn reconfigure(&self, dirty: &[PortRef], report: &mut PassReport) {
        if dirty.is_empty() {
            return;
        }
        self.sink.emit(PassEvent::PhaseStarted {
            phase: Phase::Reconfigure,
            items: dirty.len(),
            workers: 1,
        });

        for port in dirty {
            if self.dry_run {
                info!(%port, "dry-run: would run make config");
                continue;
            }
            self.sink.emit(PassEvent::ReconfigureStarted {
                port: port.to_string(),
            });
            let start = Instant::now();
            let (status, err) = match apply_options(port, self.cfg, self.make) {
                Ok(0) => (Some(0), None),
                Ok(status) => (
                    Some(status),
                    Some(Error::new(
                        ErrorKind::ReconfigurationFailed,
                        format!("{port}: make config exited with {status}"),
                    )),
                ),
                Err(e) => (
                    None,
                    Some(Error::new(
                        ErrorKind::ReconfigurationFailed,
                        format!("make config did not run: {e}"),
                    )),
                ),
            };
            let elapsed_ms = start.elapsed().as_millis();

            match err {
                None => {
                    report.reconfigured.push(port.to_string());
                    self.sink.emit(PassEvent::ReconfigureFinished {
                        port: port.to_string(),
                        ok: true,
                        error: None,
                        elapsed_ms,
                    });
                }
                Some(e) => {
                    warn!(%port, error = %e, "reconfiguration failed");
                    report.failed.push(FailedPort {
                        port: port.to_string(),
                        status,
                        kind: e.kind().as_str(),
                        error: e.to_string(),
                    });
                    self.sink.emit(PassEvent::ReconfigureFinished {
                        port: port.to_string(),
                        ok: false,
                        error: Some(e.to_string()),
                        elapsed_ms,
                    });
                }
            }
        }
    }

    fn emit_dirty(&self, port: &PortRef, div: &Divergence) {
        self.sink.emit(PassEvent::PortDirty {
            port: port.to_string(),
            added: div.added.iter().cloned().collect(),
            removed: div.removed.iter().cloned().collect(),
        });
    }

    fn skip(&self, report: &mut PassReport, phase: Phase, port: String, e: &Error) {
        warn!(%phase, port = %port, error = %e, "skipping port");
        self.sink.emit(PassEvent::ItemFailed {
            phase,
            port: port.clone(),
            error: e.to_string(),
        });
        report.skipped.push(SkippedPort {
            port,
            phase: phase.to_string(),
            kind: e.kind().as_str(),
            error: e.to_string(),
        });
    }
}
