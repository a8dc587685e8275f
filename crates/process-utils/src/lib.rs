//! Small process-related helpers shared across the workspace.
//!
//! Two concerns live here: spawning encoder processes without flashing a console
//! window on Windows, and delivering an interrupt to a running child so it can
//! finalize its output before exiting.

use std::ffi::OsStr;
use std::io;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self) -> &mut Self;
}

impl NoWindowExt for std::process::Command {
    fn no_window(&mut self) -> &mut Self {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.creation_flags(CREATE_NO_WINDOW);
        }
        self
    }
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) -> &mut Self {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
        self
    }
}

/// Create a `tokio::process::Command` for an encoder binary.
///
/// The child is killed if its handle is dropped, so an abandoned encoder never
/// outlives the task that owns it.
#[cfg(feature = "tokio")]
pub fn encoder_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window().kill_on_drop(true);
    cmd
}

/// Whether [`interrupt`] can deliver a signal on this platform.
pub const fn supports_interrupt() -> bool {
    cfg!(unix)
}

/// Send an interrupt (`SIGINT`) to the process with the given pid.
///
/// Returns [`io::ErrorKind::Unsupported`] where console-less interrupt delivery is
/// not available (Windows); callers are expected to escalate to a kill instead.
pub fn interrupt(pid: u32) -> io::Result<()> {
    #[cfg(unix)]
    {
        let pid = libc::pid_t::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        // SAFETY: kill(2) has no memory-safety preconditions; an invalid pid is reported via errno.
        let rc = unsafe { libc::kill(pid, libc::SIGINT) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "interrupt signals are not supported on this platform",
        ))
    }
}
