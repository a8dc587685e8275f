//! Supervision of a running encoder process.
//!
//! Each spawned encoder is owned by a single waiter task. The task publishes
//! the exit exactly once through a watch channel, so any number of observers
//! (an explicit stop, the exit observer, a shutdown sweep) can await the same
//! [`ExitSignal`] without racing each other for the child handle.

use std::fmt;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin};
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// How an encoder process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit code, `None` when terminated by a signal or when waiting failed.
    pub code: Option<i32>,
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "terminated"),
        }
    }
}

/// One-shot exit notification shared by every observer of a process.
#[derive(Debug, Clone)]
pub struct ExitSignal {
    rx: watch::Receiver<Option<ExitOutcome>>,
}

impl ExitSignal {
    /// The outcome, if the process has already exited.
    pub fn peek(&self) -> Option<ExitOutcome> {
        *self.rx.borrow()
    }

    pub fn has_fired(&self) -> bool {
        self.peek().is_some()
    }

    /// Suspend until the process exits.
    pub async fn wait(&self) -> ExitOutcome {
        let mut rx = self.rx.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.unwrap_or(ExitOutcome { code: None }),
            // The waiter task is gone without publishing; treat as terminated.
            Err(_) => ExitOutcome { code: None },
        }
    }
}

/// How a stop request was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMethod {
    /// `q` written to the encoder's stdin.
    Quit,
    /// `SIGINT` delivered to the encoder.
    Interrupt,
    /// No graceful channel was available; the encoder was killed.
    Kill,
}

impl fmt::Display for StopMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Quit => "quit",
            Self::Interrupt => "interrupt",
            Self::Kill => "kill",
        };
        f.write_str(s)
    }
}

/// A running encoder.
pub struct EncoderProcess {
    label: String,
    pid: Option<u32>,
    stdin: Mutex<Option<ChildStdin>>,
    exit: ExitSignal,
    kill: CancellationToken,
}

impl fmt::Debug for EncoderProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncoderProcess")
            .field("label", &self.label)
            .field("pid", &self.pid)
            .field("exited", &self.exit.peek())
            .finish()
    }
}

impl EncoderProcess {
    /// Take ownership of `child` and start its waiter task.
    ///
    /// The child's stdin, if piped, is kept for graceful stop requests. Its
    /// stdout and stderr must already have been taken by the caller if needed.
    pub fn supervise(mut child: Child, label: impl Into<String>) -> Self {
        let label = label.into();
        let pid = child.id();
        let stdin = child.stdin.take();
        let (tx, rx) = watch::channel(None);
        let kill = CancellationToken::new();

        let token = kill.clone();
        let task_label = label.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = token.cancelled() => {
                    if let Err(e) = child.start_kill() {
                        warn!(process = %task_label, error = %e, "Failed to kill encoder");
                    }
                    child.wait().await
                }
            };

            let outcome = match status {
                Ok(status) => ExitOutcome {
                    code: status.code(),
                },
                Err(e) => {
                    error!(process = %task_label, error = %e, "Error waiting for encoder");
                    ExitOutcome { code: None }
                }
            };
            debug!(process = %task_label, %outcome, "Encoder exited");
            tx.send_replace(Some(outcome));
        });

        Self {
            label,
            pid,
            stdin: Mutex::new(stdin),
            exit: ExitSignal { rx },
            kill,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn exit_signal(&self) -> ExitSignal {
        self.exit.clone()
    }

    pub fn has_exited(&self) -> bool {
        self.exit.has_fired()
    }

    pub async fn wait(&self) -> ExitOutcome {
        self.exit.wait().await
    }

    /// Force the process down. Idempotent.
    pub fn kill(&self) {
        self.kill.cancel();
    }

    /// Ask the encoder to finish cleanly.
    ///
    /// Prefers `q` on stdin (ffmpeg finalizes the container), then `SIGINT`,
    /// and kills the process when neither channel is available.
    pub async fn request_stop(&self) -> StopMethod {
        {
            let mut stdin = self.stdin.lock().await;
            if let Some(pipe) = stdin.as_mut() {
                let sent = async {
                    pipe.write_all(b"q").await?;
                    pipe.flush().await
                }
                .await;
                match sent {
                    Ok(()) => return StopMethod::Quit,
                    Err(e) => {
                        debug!(process = %self.label, error = %e, "stdin closed, falling back to interrupt");
                        *stdin = None;
                    }
                }
            }
        }

        if let Some(pid) = self.pid
            && process_utils::supports_interrupt()
        {
            match process_utils::interrupt(pid) {
                Ok(()) => return StopMethod::Interrupt,
                Err(e) => {
                    warn!(process = %self.label, pid, error = %e, "Failed to interrupt encoder");
                }
            }
        }

        self.kill();
        StopMethod::Kill
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use std::time::Duration;

    fn sh(script: &str, stdin: Stdio) -> Child {
        process_utils::encoder_command("sh")
            .args(["-c", script])
            .stdin(stdin)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap()
    }

    #[tokio::test]
    async fn test_exit_signal_reports_code() {
        let process = EncoderProcess::supervise(sh("exit 3", Stdio::null()), "exit3");
        let outcome = process.wait().await;
        assert_eq!(outcome.code, Some(3));
        assert!(!outcome.success());
        assert!(process.has_exited());
    }

    #[tokio::test]
    async fn test_all_waiters_observe_the_same_exit() {
        let process = EncoderProcess::supervise(sh("sleep 0.1", Stdio::null()), "sleeper");
        let a = process.exit_signal();
        let b = process.exit_signal();

        let (first, second) = tokio::join!(a.wait(), b.wait());
        assert_eq!(first, second);
        assert!(first.success());
        // Waiting again after the fact returns immediately.
        assert_eq!(process.wait().await, first);
    }

    #[tokio::test]
    async fn test_request_stop_prefers_stdin_quit() {
        let process = EncoderProcess::supervise(
            sh("head -c 1 >/dev/null; exit 0", Stdio::piped()),
            "quit",
        );

        assert_eq!(process.request_stop().await, StopMethod::Quit);
        let outcome = tokio::time::timeout(Duration::from_secs(5), process.wait())
            .await
            .unwrap();
        assert!(outcome.success());
    }

    #[tokio::test]
    async fn test_request_stop_interrupts_without_stdin() {
        let process = EncoderProcess::supervise(sh("exec sleep 30", Stdio::null()), "interrupt");

        assert_eq!(process.request_stop().await, StopMethod::Interrupt);
        let outcome = tokio::time::timeout(Duration::from_secs(5), process.wait())
            .await
            .unwrap();
        assert_eq!(outcome.code, None);
    }

    #[tokio::test]
    async fn test_kill_is_idempotent() {
        let process = EncoderProcess::supervise(sh("exec sleep 30", Stdio::null()), "kill");
        process.kill();
        process.kill();
        let outcome = tokio::time::timeout(Duration::from_secs(5), process.wait())
            .await
            .unwrap();
        assert_eq!(outcome.code, None);
    }
}
