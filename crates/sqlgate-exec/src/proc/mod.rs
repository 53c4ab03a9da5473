use std::{
    fmt,
    path::PathBuf,
    process::ExitStatus,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{
    process::Child,
    sync::{Notify, mpsc, watch},
};
use tracing::{debug, info, trace, warn};

use crate::{
    error::ExecError,
    util::{GroupSignal, cmd_program, group_alive, signal_group},
};

mod handoff;
mod output;
mod ready;

pub use handoff::supervise;
pub use output::{LineEvent, OutputLine, OutputStream};
pub use ready::{MarkerPredicate, ReadinessPredicate};

/// How long teardown waits for the group to disappear after SIGKILL.
const KILL_WAIT: Duration = Duration::from_secs(5);

type Signaller = fn(u32, GroupSignal) -> Result<(), ExecError>;

/// Proxy process configuration.
#[derive(Clone)]
pub struct ProxyConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Extra variables on top of the inherited parent environment.
    pub env: Vec<(String, String)>,
    pub ready_timeout: Duration,
    /// Time between SIGTERM and SIGKILL during teardown.
    pub kill_grace: Duration,
    pub scan_stdout: bool,
    pub scan_stderr: bool,
    pub ready: Arc<dyn ReadinessPredicate>,
    signal: Signaller,
}

impl ProxyConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            ready_timeout: Duration::from_secs(10),
            kill_grace: Duration::from_secs(3),
            scan_stdout: true,
            scan_stderr: true,
            ready: Arc::new(MarkerPredicate::default()),
            signal: signal_group,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn with_predicate(mut self, ready: Arc<dyn ReadinessPredicate>) -> Self {
        self.ready = ready;
        self
    }

    pub fn with_streams(mut self, stdout: bool, stderr: bool) -> Self {
        self.scan_stdout = stdout;
        self.scan_stderr = stderr;
        self
    }

    #[cfg(test)]
    fn with_signaller(mut self, signal: Signaller) -> Self {
        self.signal = signal;
        self
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &self.env.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .field("ready_timeout", &self.ready_timeout)
            .field("kill_grace", &self.kill_grace)
            .field("scan_stdout", &self.scan_stdout)
            .field("scan_stderr", &self.scan_stderr)
            .finish_non_exhaustive()
    }
}

/// How the proxy process ended, as seen by the exit watcher.
#[derive(Debug, Clone)]
pub enum ExitOutcome {
    Exited(ExitStatus),
    WaitFailed(String),
    /// Exit watcher vanished without reporting.
    Unknown,
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Exited(status) => write!(f, "{status}"),
            ExitOutcome::WaitFailed(reason) => write!(f, "wait failed: {reason}"),
            ExitOutcome::Unknown => f.write_str("unknown"),
        }
    }
}

struct Shared {
    pid: u32,
    kill_grace: Duration,
    signal: Signaller,
    /// Readiness flag: raised once by the detector, never lowered.
    ready: AtomicBool,
    /// Teardown latch.
    torn_down: AtomicBool,
    exit: watch::Receiver<Option<ExitOutcome>>,
    /// Leader kill request for platforms without process groups.
    kill: Notify,
}

/// Cloneable capability over the single proxy process.
///
/// Readiness, exit state and teardown are reachable from any task; only [`ProxyProcess`] reads
/// the output channel.
#[derive(Clone)]
pub struct ProxyHandle {
    shared: Arc<Shared>,
}

impl ProxyHandle {
    /// Process id; also the process group id.
    pub fn pid(&self) -> u32 {
        self.shared.pid
    }

    pub fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::Acquire)
    }

    pub fn is_torn_down(&self) -> bool {
        self.shared.torn_down.load(Ordering::Acquire)
    }

    /// Exit outcome if the leader has already been reaped.
    pub fn exit_outcome(&self) -> Option<ExitOutcome> {
        self.shared.exit.borrow().clone()
    }

    /// Resolves once the leader has exited.
    pub async fn exited(&self) -> ExitOutcome {
        let mut rx = self.shared.exit.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or(ExitOutcome::Unknown),
            Err(_) => ExitOutcome::Unknown,
        }
    }

    /// Terminate the proxy and everything in its process group.
    ///
    /// Idempotent: only the first call signals, later and concurrent calls return `Ok(())`
    /// immediately. SIGTERM goes to the group first; after `kill_grace`, or right away if the
    /// leader is gone but helpers remain or SIGTERM could not be sent, the group gets SIGKILL.
    /// The first signalling error is returned after the escalation has run.
    pub async fn shutdown(&self) -> Result<(), ExecError> {
        if self.shared.torn_down.swap(true, Ordering::AcqRel) {
            trace!(pid = self.pid(), "proxy already torn down");
            return Ok(());
        }
        let pid = self.pid();
        let signal = self.shared.signal;
        debug!(pid, "terminating proxy process group");

        let term = signal(pid, GroupSignal::Terminate);
        if let Err(e) = &term {
            warn!(pid, error = %e, "SIGTERM failed; escalating to SIGKILL");
        }
        self.shared.kill.notify_one();

        let leader_gone = term.is_ok()
            && tokio::time::timeout(self.shared.kill_grace, self.exited())
                .await
                .is_ok();

        let kill = if !leader_gone || group_alive(pid) {
            warn!(pid, leader_gone, "proxy group still alive; sending SIGKILL");
            signal(pid, GroupSignal::Kill)
        } else {
            Ok(())
        };

        let reaped = if leader_gone {
            Ok(())
        } else {
            tokio::time::timeout(KILL_WAIT, self.exited())
                .await
                .map(drop)
                .map_err(|_| ExecError::Teardown)
        };

        term.and(kill).and(reaped)?;
        info!(pid, "proxy stopped");
        Ok(())
    }

    fn kill_now(&self) {
        if self.shared.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.kill.notify_one();
        if let Err(e) = (self.shared.signal)(self.pid(), GroupSignal::Kill) {
            warn!(pid = self.pid(), error = %e, "proxy kill on drop failed");
        }
    }
}

/// The supervised proxy process.
///
/// Owns the readiness channel; lifecycle state lives behind [`ProxyHandle`]. Dropping it without
/// [`ProxyHandle::shutdown`] SIGKILLs the process group.
pub struct ProxyProcess {
    handle: ProxyHandle,
    lines: mpsc::Receiver<LineEvent>,
    ready_timeout: Duration,
    predicate: Arc<dyn ReadinessPredicate>,
}

impl ProxyProcess {
    /// Spawn the proxy, its output pumps and its exit watcher. No retry on failure.
    pub fn spawn(cfg: &ProxyConfig) -> Result<Self, ExecError> {
        trace!(program = %cfg.program.display(), args = ?cfg.args, "spawn");

        let mut cmd = cmd_program(&cfg.program, cfg.args.as_slice());
        for (k, v) in &cfg.env {
            cmd.env(k, v);
        }

        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            program: cfg.program.clone(),
            source,
        })?;
        let Some(pid) = child.id() else {
            return Err(ExecError::Spawn {
                program: cfg.program.clone(),
                source: std::io::Error::other("process exited before its pid was read"),
            });
        };

        let (tx, lines) = mpsc::channel(output::LINE_BUFFER);
        if let Some(stdout) = child.stdout.take() {
            output::pump(stdout, OutputStream::Stdout, cfg.scan_stdout.then(|| tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            output::pump(stderr, OutputStream::Stderr, cfg.scan_stderr.then(|| tx.clone()));
        }
        drop(tx);

        let (exit_tx, exit_rx) = watch::channel(None);
        let shared = Arc::new(Shared {
            pid,
            kill_grace: cfg.kill_grace,
            signal: cfg.signal,
            ready: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
            exit: exit_rx,
            kill: Notify::new(),
        });
        watch_exit(child, Arc::clone(&shared), exit_tx);

        info!(pid, program = %cfg.program.display(), "proxy started");
        Ok(Self {
            handle: ProxyHandle { shared },
            lines,
            ready_timeout: cfg.ready_timeout,
            predicate: Arc::clone(&cfg.ready),
        })
    }

    pub fn handle(&self) -> ProxyHandle {
        self.handle.clone()
    }

    /// Block until the readiness predicate matches.
    ///
    /// Fails with `ReadinessTimeout` once `ready_timeout` elapses without a match, `ProxyExited`
    /// if the leader dies first, or an output error. The process is not killed here; callers
    /// tear down through [`ProxyHandle::shutdown`].
    pub async fn wait_ready(&mut self) -> Result<(), ExecError> {
        let Self {
            handle,
            lines,
            ready_timeout,
            predicate,
        } = self;
        let timeout = *ready_timeout;

        let detect = async {
            tokio::select! {
                res = ready::detect_ready(lines, &**predicate, &handle.shared.ready) => res.map(drop),
                outcome = handle.exited() => Err(ExecError::ProxyExited { status: outcome.to_string() }),
            }
        };

        match tokio::time::timeout(timeout, detect).await {
            Ok(res) => res,
            // The flag and the deadline can race only inside a single poll; the flag wins.
            Err(_) if handle.is_ready() => Ok(()),
            Err(_) => {
                warn!(pid = handle.pid(), timeout_ms = timeout.as_millis() as u64, "proxy readiness timed out");
                Err(ExecError::ReadinessTimeout { after: timeout })
            }
        }
    }
}

impl Drop for ProxyProcess {
    fn drop(&mut self) {
        self.handle.kill_now();
    }
}

/// Exit watcher: owns the child, reaps it and publishes the outcome.
fn watch_exit(mut child: Child, shared: Arc<Shared>, exit_tx: watch::Sender<Option<ExitOutcome>>) {
    tokio::spawn(async move {
        let waited = tokio::select! {
            res = child.wait() => res,
            _ = shared.kill.notified() => {
                if !cfg!(unix) {
                    let _ = child.start_kill();
                }
                child.wait().await
            }
        };
        let outcome = match waited {
            Ok(status) => ExitOutcome::Exited(status),
            Err(e) => ExitOutcome::WaitFailed(e.to_string()),
        };
        if shared.torn_down.load(Ordering::Acquire) {
            debug!(pid = shared.pid, %outcome, "proxy exited");
        } else {
            warn!(pid = shared.pid, %outcome, "proxy exited unexpectedly");
        }
        let _ = exit_tx.send(Some(outcome));
    });
}
