use std::{ffi::OsStr, path::Path, process::Stdio};

use tokio::process::Command;

use crate::error::ExecError;

/// Proxy command: its own process group, no stdin, both output streams piped.
pub fn cmd_program<S: AsRef<OsStr>>(program: &Path, args: &[S]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    cmd
}

/// Group-wide signals used by teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSignal {
    Terminate,
    Kill,
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        use nix::{
            errno::Errno,
            sys::signal::{Signal, killpg},
            unistd::Pid,
        };

        impl GroupSignal {
            fn as_nix(self) -> Signal {
                match self {
                    GroupSignal::Terminate => Signal::SIGTERM,
                    GroupSignal::Kill => Signal::SIGKILL,
                }
            }
        }

        /// Deliver `signal` to every process in group `pgid`. A group that is already gone is not an error.
        pub fn signal_group(pgid: u32, signal: GroupSignal) -> Result<(), ExecError> {
            let sig = signal.as_nix();
            match killpg(Pid::from_raw(pgid as i32), sig) {
                Ok(()) | Err(Errno::ESRCH) => Ok(()),
                Err(e) => Err(ExecError::Signal {
                    signal: sig.as_str(),
                    pgid,
                    source: e.into(),
                }),
            }
        }

        /// Signal-0 probe: does any process (zombies included) remain in the group?
        pub fn group_alive(pgid: u32) -> bool {
            killpg(Pid::from_raw(pgid as i32), None).is_ok()
        }
    } else {
        /// Process groups are unix-only; teardown kills the leader through the exit watcher instead.
        pub fn signal_group(_pgid: u32, _signal: GroupSignal) -> Result<(), ExecError> {
            Ok(())
        }

        pub fn group_alive(_pgid: u32) -> bool {
            false
        }
    }
}
