//! Lifecycle owner of the supervised FRP child.
//!
//! # Control flow
//!
//! All state-changing operations (`start`, `stop`, the early-exit check and
//! the liveness tick) run under one async control lock, so they behave as if
//! driven from a single control thread. Timers are scheduled on an injected
//! [`Clock`] and hold only a weak reference to the supervisor.
//!
//! ```text
//! Idle ──start──► Starting ──check: alive──► Running ──tick: exited──► Restarting
//!   ▲               │  └──check: exited / error──► Failed                  │
//!   └────stop───────┴───────────────────────────────────────────◄──────────┘
//! ```
//!
//! Observers read a `watch` snapshot of [`SupervisorStatus`] and drain the
//! shared [`LogBuffer`]; neither takes the control lock.

use crate::clock::{Clock, TimerHandle, TokioClock};
use crate::config::SupervisorConfig;
use crate::config_store::ConfigStore;
use crate::drainer::Drainers;
use crate::error::SupervisorError;
use crate::host::{ChildStatus, ProcessHandle, ProcessHost, TokioProcessHost};
use crate::log_buffer::{LogBuffer, LogEntry};
use crate::mode::Mode;
use crate::provision::{is_executable, BinaryAssets, BinaryProvisioner};
use futures::future::join_all;
use futures::FutureExt;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

/// Lifecycle phase of the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// No child and nothing scheduled
    Idle,
    /// Child spawned, early-exit window still open
    Starting,
    /// Child survived the early-exit window
    Running,
    /// `stop()` in progress
    Stopping,
    /// Liveness check saw the child exit; a new start follows immediately
    Restarting,
    /// Last start attempt failed
    Failed,
}

/// Snapshot published to observers on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SupervisorStatus {
    pub mode: Mode,
    pub phase: Phase,
    /// Process id of the current child, if one is alive
    pub pid: Option<u32>,
}

impl Default for SupervisorStatus {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            phase: Phase::Idle,
            pid: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    /// Explicit `start()` call
    Manual,
    /// Liveness tick after an exit or a failed restart
    Restart,
}

/// The child of the current run and its drainers
struct Run {
    child: Box<dyn ProcessHandle>,
    drainers: Drainers,
}

struct Control {
    run: Option<Run>,
    /// Drainers of replaced children, still reading until EOF; stopped with the current run
    orphans: Vec<Drainers>,
    /// Bumped on every start and stop; stale checks compare against it
    generation: u64,
    early_exit: Option<TimerHandle>,
    liveness: Option<TimerHandle>,
    liveness_seq: u64,
    /// Set when a restart attempt failed before a child existed
    retry_on_tick: bool,
}

impl Control {
    /// Drop the handle of an exited child, keeping its drainers under supervision
    fn retire(&mut self, run: Run) {
        self.orphans.retain(|drainers| !drainers.is_finished());
        self.orphans.push(run.drainers);
    }
}

struct Inner {
    config: SupervisorConfig,
    provisioner: BinaryProvisioner,
    configs: ConfigStore,
    host: Arc<dyn ProcessHost>,
    clock: Arc<dyn Clock>,
    log: Arc<LogBuffer>,
    status_tx: watch::Sender<SupervisorStatus>,
    control: Mutex<Control>,
}

/// Builder for [`Supervisor`]
pub struct SupervisorBuilder {
    data_dir: PathBuf,
    assets: BinaryAssets,
    config: SupervisorConfig,
    host: Arc<dyn ProcessHost>,
    clock: Arc<dyn Clock>,
    log: Option<Arc<LogBuffer>>,
}

impl SupervisorBuilder {
    pub fn config(mut self, config: SupervisorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn host(mut self, host: Arc<dyn ProcessHost>) -> Self {
        self.host = host;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn log_buffer(mut self, log: Arc<LogBuffer>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn build(self) -> Supervisor {
        let log = self
            .log
            .unwrap_or_else(|| Arc::new(LogBuffer::with_capacity(self.config.log_capacity)));
        let (status_tx, _) = watch::channel(SupervisorStatus::default());

        Supervisor {
            inner: Arc::new(Inner {
                provisioner: BinaryProvisioner::new(&self.data_dir, self.assets),
                configs: ConfigStore::new(&self.data_dir),
                config: self.config,
                host: self.host,
                clock: self.clock,
                log,
                status_tx,
                control: Mutex::new(Control {
                    run: None,
                    orphans: Vec::new(),
                    generation: 0,
                    early_exit: None,
                    liveness: None,
                    liveness_seq: 0,
                    retry_on_tick: false,
                }),
            }),
        }
    }
}

/// Supervises one FRP child at a time.
///
/// Cloning is cheap and every clone refers to the same supervisor.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    /// Start building a supervisor that keeps its files in `data_dir`
    pub fn builder(data_dir: impl Into<PathBuf>, assets: BinaryAssets) -> SupervisorBuilder {
        SupervisorBuilder {
            data_dir: data_dir.into(),
            assets,
            config: SupervisorConfig::default(),
            host: Arc::new(TokioProcessHost::new()),
            clock: Arc::new(TokioClock::new()),
            log: None,
        }
    }

    /// Start the child for `mode`.
    ///
    /// Ignored unless the supervisor is idle or failed. Failures are
    /// reported through the log buffer and the `Failed` phase.
    pub async fn start(&self, mode: Mode) {
        let mut control = self.inner.control.lock().await;
        let phase = self.inner.phase();
        if !matches!(phase, Phase::Idle | Phase::Failed) {
            debug!(mode = %mode, ?phase, "Start ignored, supervisor is busy");
            return;
        }
        self.inner.launch(&mut control, mode, Trigger::Manual);
    }

    /// Stop the child and cancel all timers.
    ///
    /// Waits at most the configured stop timeout for the drainers.
    pub async fn stop(&self) {
        self.inner.stop().await;
    }

    pub fn current_mode(&self) -> Mode {
        self.inner.status_tx.borrow().mode
    }

    /// True while the phase is `Running`
    pub fn is_running(&self) -> bool {
        self.phase() == Phase::Running
    }

    pub fn phase(&self) -> Phase {
        self.inner.phase()
    }

    pub fn status(&self) -> SupervisorStatus {
        *self.inner.status_tx.borrow()
    }

    /// Receive every status transition
    pub fn subscribe(&self) -> watch::Receiver<SupervisorStatus> {
        self.inner.status_tx.subscribe()
    }

    pub fn log_buffer(&self) -> Arc<LogBuffer> {
        Arc::clone(&self.inner.log)
    }

    pub fn config_store(&self) -> &ConfigStore {
        &self.inner.configs
    }

    pub fn provisioner(&self) -> &BinaryProvisioner {
        &self.inner.provisioner
    }

    /// Read-only facade for observers
    pub fn view(&self) -> SupervisorView {
        SupervisorView {
            status_rx: self.subscribe(),
            log: self.log_buffer(),
        }
    }
}

impl Inner {
    fn phase(&self) -> Phase {
        self.status_tx.borrow().phase
    }

    fn current_mode(&self) -> Mode {
        self.status_tx.borrow().mode
    }

    fn set_phase(&self, phase: Phase) {
        self.status_tx.send_modify(|status| {
            if status.phase != phase {
                debug!(from = ?status.phase, to = ?phase, "Supervisor transition");
            }
            status.phase = phase;
            if !matches!(phase, Phase::Starting | Phase::Running) {
                status.pid = None;
            }
        });
    }

    /// Provision, spawn and arm the timers for one run
    fn launch(self: &Arc<Self>, control: &mut Control, mode: Mode, trigger: Trigger) {
        if let Some(previous) = control.run.take() {
            control.retire(previous);
        }
        if let Some(check) = control.early_exit.take() {
            check.cancel();
        }
        control.generation += 1;

        self.status_tx.send_modify(|status| status.mode = mode);
        self.set_phase(Phase::Starting);
        info!(mode = %mode, ?trigger, "Starting FRP");

        match self.spawn_child(mode) {
            Ok(run) => {
                let pid = run.child.id();
                control.run = Some(run);
                control.retry_on_tick = false;
                self.status_tx.send_modify(|status| status.pid = pid);
                info!(mode = %mode, pid, "FRP process started");

                self.schedule_early_exit_check(control);
                self.ensure_liveness(control);
            }
            Err(err) => {
                error!(mode = %mode, kind = err.kind().as_str(), error = %err, "Failed to start FRP");
                self.log.push(err.log_line());
                self.set_phase(Phase::Failed);

                match trigger {
                    Trigger::Restart => {
                        control.retry_on_tick = true;
                        self.ensure_liveness(control);
                    }
                    Trigger::Manual => {
                        control.retry_on_tick = false;
                        self.cancel_liveness(control);
                    }
                }
            }
        }
    }

    fn spawn_child(&self, mode: Mode) -> Result<Run, SupervisorError> {
        let binary = self.provisioner.ensure_present(mode)?;
        self.configs.ensure_default(mode)?;
        let config = self.configs.path_for(mode);

        if !binary.exists() {
            return Err(SupervisorError::BinaryMissing { path: binary });
        }
        if !config.exists() {
            return Err(SupervisorError::ConfigMissing { path: config });
        }
        if !is_executable(&binary) {
            return Err(SupervisorError::BinaryNotExecutable { path: binary });
        }

        let binary_arg = binary.to_string_lossy().into_owned();
        let config_arg = config.to_string_lossy().into_owned();
        debug!(binary = %binary_arg, config = %config_arg, "Resolved FRP paths");

        let command_line = shell_words::join([binary_arg.as_str(), "-c", config_arg.as_str()]);
        self.log
            .push(format!("Starting {} with command: {}", mode, command_line));

        let args = vec!["-c".to_string(), config_arg];
        let spawned = self.host.spawn(&binary, &args)?;
        let drainers = Drainers::spawn(spawned.stdout, spawned.stderr, Arc::clone(&self.log));

        Ok(Run {
            child: spawned.handle,
            drainers,
        })
    }

    fn schedule_early_exit_check(self: &Arc<Self>, control: &mut Control) {
        let weak: Weak<Inner> = Arc::downgrade(self);
        let generation = control.generation;
        let check = self.clock.schedule(
            self.config.early_exit_window(),
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.check_early_exit(generation).await;
                }
            }
            .boxed(),
        );
        control.early_exit = Some(check);
    }

    async fn check_early_exit(self: &Arc<Self>, generation: u64) {
        let mut control = self.control.lock().await;
        if control.generation != generation || self.phase() != Phase::Starting {
            debug!(generation, "Stale early-exit check ignored");
            return;
        }
        control.early_exit = None;

        let mode = self.current_mode();
        let Some(run) = control.run.as_mut() else {
            return;
        };
        let pid = run.child.id();

        match run.child.try_status() {
            ChildStatus::Exited(code) => {
                let err = SupervisorError::EarlyExit { mode, code };
                error!(mode = %mode, code, "FRP exited immediately");
                self.log.push(err.log_line());

                if let Some(run) = control.run.take() {
                    control.retire(run);
                }
                control.retry_on_tick = false;
                self.cancel_liveness(&mut control);
                self.set_phase(Phase::Failed);
            }
            ChildStatus::Running => {
                info!(mode = %mode, pid, "FRP started successfully");
                self.log.push(format!("{} started successfully", mode.upper()));
                self.set_phase(Phase::Running);
            }
        }
    }

    fn ensure_liveness(self: &Arc<Self>, control: &mut Control) {
        if control.liveness.is_some() {
            return;
        }
        control.liveness_seq += 1;
        let seq = control.liveness_seq;
        let weak: Weak<Inner> = Arc::downgrade(self);
        let tick = self.clock.schedule(
            self.config.liveness_interval(),
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.liveness_tick(seq).await;
                }
            }
            .boxed(),
        );
        control.liveness = Some(tick);
    }

    fn cancel_liveness(&self, control: &mut Control) {
        if let Some(tick) = control.liveness.take() {
            tick.cancel();
        }
    }

    async fn liveness_tick(self: &Arc<Self>, seq: u64) {
        let mut control = self.control.lock().await;
        if control.liveness_seq != seq {
            debug!(seq, "Stale liveness tick ignored");
            return;
        }
        control.liveness = None;

        let mode = self.current_mode();
        match self.phase() {
            Phase::Idle | Phase::Stopping => {
                debug!("Supervisor not active, liveness check disarmed");
                return;
            }
            Phase::Running => {
                let status = control.run.as_mut().map(|run| run.child.try_status());
                match status {
                    Some(ChildStatus::Running) => {
                        debug!(mode = %mode, "FRP process is still running");
                    }
                    Some(ChildStatus::Exited(code)) => {
                        let err = SupervisorError::UnexpectedExit { code };
                        warn!(mode = %mode, code, "FRP process exited, restarting");
                        self.log.push(err.log_line());
                        self.set_phase(Phase::Restarting);
                        self.launch(&mut control, mode, Trigger::Restart);
                    }
                    None => {
                        warn!(mode = %mode, "No FRP process while running, restarting");
                        self.set_phase(Phase::Restarting);
                        self.launch(&mut control, mode, Trigger::Restart);
                    }
                }
            }
            Phase::Failed if control.retry_on_tick => {
                info!(mode = %mode, "Retrying FRP start");
                self.launch(&mut control, mode, Trigger::Restart);
            }
            Phase::Failed => {
                debug!("Start failed without retry, liveness check disarmed");
                return;
            }
            Phase::Starting | Phase::Restarting => {
                debug!(mode = %mode, "Start in progress, checking again later");
            }
        }

        let rearm = match self.phase() {
            Phase::Idle | Phase::Stopping => false,
            Phase::Failed => control.retry_on_tick,
            _ => true,
        };
        if rearm {
            self.ensure_liveness(&mut control);
        }
    }

    async fn stop(self: &Arc<Self>) {
        let mut control = self.control.lock().await;
        let phase = self.phase();
        if matches!(phase, Phase::Idle | Phase::Stopping) {
            debug!(?phase, "Stop ignored");
            return;
        }

        let mode = self.current_mode();
        info!(mode = %mode, "Stopping FRP");
        self.set_phase(Phase::Stopping);

        control.generation += 1;
        control.retry_on_tick = false;
        if let Some(check) = control.early_exit.take() {
            check.cancel();
        }
        self.cancel_liveness(&mut control);

        let mut drainers: Vec<Drainers> = control.orphans.drain(..).collect();
        for orphan in &drainers {
            orphan.interrupt();
        }
        let had_child = match control.run.take() {
            Some(Run {
                mut child,
                drainers: current,
            }) => {
                current.interrupt();
                child.terminate();
                drainers.push(current);
                true
            }
            None => false,
        };

        if !drainers.is_empty() {
            let timeout = self.config.stop_timeout();
            let joined = join_all(drainers.into_iter().map(|d| d.join(timeout))).await;
            if joined.iter().any(|finished| !finished) {
                warn!(mode = %mode, "Drainers aborted after stop timeout");
            }
        }

        if had_child {
            self.log.push(format!("{} stopped", mode.upper()));
            info!(mode = %mode, "FRP stopped");
        }

        self.set_phase(Phase::Idle);
    }
}

/// Read-only facade handed to observers such as a log viewer
#[derive(Clone)]
pub struct SupervisorView {
    status_rx: watch::Receiver<SupervisorStatus>,
    log: Arc<LogBuffer>,
}

impl SupervisorView {
    pub fn current_mode(&self) -> Mode {
        self.status_rx.borrow().mode
    }

    pub fn is_running(&self) -> bool {
        self.status_rx.borrow().phase == Phase::Running
    }

    /// Remove and return all buffered log entries
    pub fn drain_log(&self) -> Vec<LogEntry> {
        self.log.drain()
    }
}
