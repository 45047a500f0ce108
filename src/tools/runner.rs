//! External tool runner.
//!
//! Writes the input text to a temp file, invokes the tool on it with a
//! bounded timeout, and collects its output. The verifier, the reducer and
//! the triage pipeline all go through here.

use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(5);
const PIPE_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("cannot run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot stage input for {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} timed out after {}s", .timeout.as_secs_f64())]
    TimedOut { program: String, timeout: Duration },
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
}

/// Captured result of one tool invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Turn a non-zero exit into [`ToolError::Failed`].
    pub fn require_success(self, program: &str) -> Result<ToolOutput, ToolError> {
        if self.success {
            Ok(self)
        } else {
            Err(ToolError::Failed {
                program: program.to_string(),
                status: self
                    .code
                    .map(|c| format!("status {}", c))
                    .unwrap_or_else(|| "signal".to_string()),
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// A configured external command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Run the tool as `program <args> <extra_args> <input-file>`.
    pub fn run(&self, input: &str, extra_args: &[&str]) -> Result<ToolOutput, ToolError> {
        let io_err = |source| ToolError::Io {
            program: self.program.clone(),
            source,
        };

        let mut staged = tempfile::Builder::new()
            .prefix("rulesift-")
            .suffix(".opt")
            .tempfile()
            .map_err(io_err)?;
        staged.write_all(input.as_bytes()).map_err(io_err)?;
        staged.flush().map_err(io_err)?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .args(extra_args)
            .arg(staged.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        isolate(&mut command);
        let mut child = command.spawn().map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ToolError::NotFound(self.program.clone())
            } else {
                ToolError::Spawn {
                    program: self.program.clone(),
                    source,
                }
            }
        })?;

        let deadline = Instant::now().checked_add(self.timeout);
        let timed_out = || ToolError::TimedOut {
            program: self.program.clone(),
            timeout: self.timeout,
        };

        // Drain both pipes off-thread so a chatty tool cannot block on a
        // full pipe while we wait for it.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match wait_until(&mut child, deadline) {
            Ok(Some(status)) => status,
            Ok(None) => {
                kill_tree(&mut child);
                return Err(timed_out());
            }
            Err(source) => {
                kill_tree(&mut child);
                return Err(ToolError::Spawn {
                    program: self.program.clone(),
                    source,
                });
            }
        };

        // Anything the tool left running in the background may still hold
        // the pipes open.
        kill_tree(&mut child);
        let stdout = collect(&stdout, deadline).ok_or_else(timed_out)?;
        let stderr = collect(&stderr, deadline).ok_or_else(timed_out)?;

        Ok(ToolOutput {
            success: status.success(),
            code: status.code(),
            stdout,
            stderr,
        })
    }
}

/// Put the tool in its own process group so a timeout can reach every
/// process it starts.
#[cfg(unix)]
fn isolate(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn isolate(_command: &mut Command) {}

/// Kill the tool's whole process group and reap the tool itself.
#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // ESRCH just means the group is already gone.
        unsafe {
            libc::kill(-pgid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}

/// Wait for a drained pipe, but never past `deadline` plus a short grace
/// for the final read after the tool exits.
fn collect(rx: &mpsc::Receiver<String>, deadline: Option<Instant>) -> Option<String> {
    match deadline {
        Some(d) => {
            let remaining = d.saturating_duration_since(Instant::now()).max(PIPE_GRACE);
            rx.recv_timeout(remaining).ok()
        }
        None => rx.recv().ok(),
    }
}

/// Poll `child` until it exits or `deadline` passes. `Ok(None)` on timeout.
fn wait_until(
    child: &mut Child,
    deadline: Option<Instant>,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}
