// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process liveness capability for orphan recovery.
//!
//! The probe wraps signal-0 semantics; platforms without them report
//! `Unknown`, which the lifecycle manager treats as "do nothing".

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Dead,
    Unknown,
}

pub trait ProcessProbe: Send + Sync {
    fn probe(&self, pid: u32) -> Liveness;

    /// Forcibly terminate the process. Best effort; errors are ignored
    /// because the target may have exited between probe and kill.
    fn kill(&self, pid: u32);
}

/// The signal-backed probe used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalProbe;

#[cfg(unix)]
impl ProcessProbe for SignalProbe {
    fn probe(&self, pid: u32) -> Liveness {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        match kill(Pid::from_raw(pid as i32), None) {
            Ok(()) => Liveness::Alive,
            Err(Errno::ESRCH) => Liveness::Dead,
            // EPERM and friends: the pid exists but is not ours to touch.
            Err(_) => Liveness::Unknown,
        }
    }

    fn kill(&self, pid: u32) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }
}

#[cfg(not(unix))]
impl ProcessProbe for SignalProbe {
    fn probe(&self, _pid: u32) -> Liveness {
        Liveness::Unknown
    }

    fn kill(&self, _pid: u32) {}
}

#[cfg(test)]
#[path = "probe_tests.rs"]
mod tests;
