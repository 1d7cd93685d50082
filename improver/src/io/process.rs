//! Helpers for running child processes with bounded waits and bounded output.
//!
//! Every spawned child is owned by a [`ChildGuard`], which kills and reaps the
//! process on drop unless it has already been waited on. A bounded wait that
//! errors or unwinds therefore never leaves an orphan behind, and output
//! collection is bounded by the same deadline as the wait.

use std::io::Read;
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn stdout_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        if self.stdout_truncated > 0 {
            text.push_str(&format!(
                "\n[stdout truncated {} bytes]\n",
                self.stdout_truncated
            ));
        }
        text
    }

    pub fn stderr_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stderr).into_owned();
        if self.stderr_truncated > 0 {
            text.push_str(&format!(
                "\n[stderr truncated {} bytes]\n",
                self.stderr_truncated
            ));
        }
        text
    }

    /// Stdout followed by stderr, exactly as captured.
    pub fn combined_text(&self) -> String {
        let mut text = self.stdout_text();
        text.push_str(&self.stderr_text());
        text
    }
}

/// Scoped ownership of a spawned child.
#[derive(Debug)]
pub struct ChildGuard {
    child: Child,
    reaped: bool,
}

impl ChildGuard {
    pub fn spawn(cmd: &mut Command) -> Result<Self> {
        debug!(program = ?cmd.get_program(), "spawning child process");
        let child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                error!(err = %e, program = ?cmd.get_program(), "failed to spawn command");
                return Err(e).with_context(|| format!("spawn {:?}", cmd.get_program()));
            }
        };
        Ok(Self {
            child,
            reaped: false,
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    fn take_pipes(&mut self) -> Result<(ChildStdout, ChildStderr)> {
        let stdout = self
            .child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("stdout was not piped"))?;
        let stderr = self
            .child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("stderr was not piped"))?;
        Ok((stdout, stderr))
    }

    /// Wait up to `timeout`. `None` means the child is still running.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<Option<ExitStatus>> {
        let status = self.child.wait_timeout(timeout).context("wait for command")?;
        if status.is_some() {
            self.reaped = true;
        }
        Ok(status)
    }

    pub fn wait(&mut self) -> Result<ExitStatus> {
        let status = self.child.wait().context("wait for command")?;
        self.reaped = true;
        Ok(status)
    }

    /// Kill the child and reap it.
    pub fn terminate(&mut self) -> Result<ExitStatus> {
        self.child.kill().context("kill command")?;
        let status = self.child.wait().context("wait command after kill")?;
        self.reaped = true;
        debug!(pid = self.child.id(), "child terminated");
        Ok(status)
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }
        warn!(pid = self.child.id(), "killing unreaped child");
        if let Err(err) = self.child.kill() {
            warn!(err = %err, "failed to kill child");
        }
        let _ = self.child.wait();
    }
}

/// How long readers may keep draining after the child is gone and the
/// caller's own deadline has passed.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Bytes captured from one stream so far.
#[derive(Debug, Default)]
struct Capture {
    buf: Vec<u8>,
    truncated: usize,
}

type SharedCapture = Arc<Mutex<Capture>>;

fn snapshot(capture: &SharedCapture) -> (Vec<u8>, usize) {
    let mut guard = capture.lock().unwrap_or_else(PoisonError::into_inner);
    let Capture { buf, truncated } = std::mem::take(&mut *guard);
    (buf, truncated)
}

/// Background readers for a child's stdout and stderr.
///
/// Readers report end of stream over a channel, so the caller can stop
/// waiting at a deadline. A descendant that inherited the pipes and outlives
/// the child would otherwise keep them open indefinitely.
struct OutputReaders {
    stdout: SharedCapture,
    stderr: SharedCapture,
    done: Receiver<Result<()>>,
}

impl OutputReaders {
    fn spawn(guard: &mut ChildGuard, limit: usize) -> Result<Self> {
        let (stdout_pipe, stderr_pipe) = guard.take_pipes()?;
        let stdout = SharedCapture::default();
        let stderr = SharedCapture::default();
        let (tx, done) = mpsc::channel();

        let (capture, sender) = (Arc::clone(&stdout), tx.clone());
        thread::spawn(move || {
            let _ = sender.send(read_stream_limited(stdout_pipe, &capture, limit));
        });
        let capture = Arc::clone(&stderr);
        thread::spawn(move || {
            let _ = tx.send(read_stream_limited(stderr_pipe, &capture, limit));
        });

        Ok(Self {
            stdout,
            stderr,
            done,
        })
    }

    /// Wait for both streams to close, but no later than `deadline` (or
    /// [`DRAIN_GRACE`] from now, whichever is later), then return whatever
    /// has been captured.
    fn collect(self, deadline: Option<Instant>) -> Result<((Vec<u8>, usize), (Vec<u8>, usize))> {
        let floor = Instant::now() + DRAIN_GRACE;
        let until = deadline.map_or(floor, |d| d.max(floor));

        let mut closed = 0;
        while closed < 2 {
            match self.done.recv_timeout(until.saturating_duration_since(Instant::now())) {
                Ok(result) => {
                    result?;
                    closed += 1;
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        open_streams = 2 - closed,
                        "output pipes still open after the child finished, keeping partial output"
                    );
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(anyhow!("output reader thread panicked"));
                }
            }
        }
        Ok((snapshot(&self.stdout), snapshot(&self.stderr)))
    }
}

fn piped(mut cmd: Command) -> Command {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

/// Run a command to completion, or until `timeout` when one is given, and
/// capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
/// Waiting for the pipes to close never extends past the timeout by more than [`DRAIN_GRACE`].
#[instrument(skip_all, fields(timeout_secs = timeout.map(|t| t.as_secs()), output_limit_bytes))]
pub fn run_command(
    cmd: Command,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    let mut cmd = piped(cmd);
    let deadline = timeout.map(|t| Instant::now() + t);
    let mut guard = ChildGuard::spawn(&mut cmd)?;
    let readers = OutputReaders::spawn(&mut guard, output_limit_bytes)?;

    let mut timed_out = false;
    let status = match timeout {
        Some(timeout) => match guard.wait_timeout(timeout)? {
            Some(status) => status,
            None => {
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "command timed out, killing"
                );
                timed_out = true;
                guard.terminate()?
            }
        },
        None => guard.wait()?,
    };

    let ((stdout, stdout_truncated), (stderr, stderr_truncated)) = readers.collect(deadline)?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

/// Result of watching a program through its startup window.
#[derive(Debug)]
pub enum StartupOutcome {
    /// The program exited inside the window.
    Exited(CommandOutput),
    /// The program outlived the window and was terminated.
    SurvivedWindow,
}

/// Launch a program and watch it for `window`.
///
/// A program still running when the window closes is killed and reaped
/// before this returns. When it exits early, its output is collected until
/// the window closes at the latest.
#[instrument(skip_all, fields(window_secs = window.as_secs()))]
pub fn watch_startup(
    cmd: Command,
    window: Duration,
    output_limit_bytes: usize,
) -> Result<StartupOutcome> {
    let mut cmd = piped(cmd);
    let deadline = Instant::now() + window;
    let mut guard = ChildGuard::spawn(&mut cmd)?;
    let readers = OutputReaders::spawn(&mut guard, output_limit_bytes)?;

    match guard.wait_timeout(window)? {
        Some(status) => {
            let ((stdout, stdout_truncated), (stderr, stderr_truncated)) =
                readers.collect(Some(deadline))?;
            debug!(exit_code = ?status.code(), "program exited inside startup window");
            Ok(StartupOutcome::Exited(CommandOutput {
                status,
                stdout,
                stderr,
                stdout_truncated,
                stderr_truncated,
                timed_out: false,
            }))
        }
        None => {
            debug!(pid = guard.id(), "program survived startup window, terminating");
            guard.terminate()?;
            // Readers finish on their own once the pipes close.
            drop(readers);
            Ok(StartupOutcome::SurvivedWindow)
        }
    }
}

fn read_stream_limited<R: Read>(mut reader: R, capture: &SharedCapture, limit: usize) -> Result<()> {
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let mut captured = capture.lock().unwrap_or_else(PoisonError::into_inner);
        let remaining = limit.saturating_sub(captured.buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            captured.buf.extend_from_slice(&chunk[..keep]);
            captured.truncated += n.saturating_sub(keep);
        } else {
            captured.truncated += n;
        }
    }

    Ok(())
}
