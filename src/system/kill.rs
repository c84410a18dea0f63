// src/system/kill.rs

//! Process-tree termination.
//!
//! A shell command rarely runs alone: `bash -c` forks the programs it runs, and those
//! may fork again. Signalling only the shell leaves the grandchildren behind, so the
//! tree is discovered from the OS process table (parent-PID links) and every member
//! is signalled individually, the root last.

use crate::{
    models::{CapturedStreams, ProcessOutput},
    system::promise::{Phase, ProcessPromise},
};
use nix::{
    errno::Errno,
    sys::signal::{self, Signal},
    unistd::Pid,
};
use std::collections::{HashMap, HashSet};
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

/// What happened while signalling a process tree. Failures are expected (processes
/// exit on their own all the time) and are reported here instead of raised.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KillReport {
    /// PIDs the signal was delivered to.
    pub signaled: Vec<u32>,
    /// PIDs that could not be signaled, with the reason.
    pub failed: Vec<(u32, Errno)>,
}

impl KillReport {
    fn record(&mut self, pid: u32, result: Result<(), Errno>) {
        match result {
            Ok(()) => self.signaled.push(pid),
            Err(errno) => {
                log::debug!("Could not signal process {pid}: {errno}");
                self.failed.push((pid, errno));
            }
        }
    }
}

impl ProcessPromise {
    /// Sends `signal` to the process and all of its descendants without waiting for
    /// them. A promise that never started resolves right away as killed; a resolved
    /// one is left alone.
    pub fn kill(&self, signal: Signal) -> KillReport {
        let (phase, pid) = {
            let control = self.control();
            (control.phase, control.pid)
        };
        match (phase, pid) {
            (Phase::Pending, _) => {
                let killed = ProcessOutput::new(
                    0,
                    Some(signal.as_str().to_string()),
                    CapturedStreams::default(),
                    self.command().origin(),
                );
                if !self.settle_pending(Ok(killed)) {
                    // Started in the meantime.
                    return self.kill(signal);
                }
                log::debug!("'{}' was killed before it started", self.command());
                KillReport::default()
            }
            (Phase::Running, Some(pid)) => kill_tree(pid, signal),
            _ => KillReport::default(),
        }
    }

    /// `kill(SIGTERM)`.
    pub fn terminate(&self) -> KillReport {
        self.kill(Signal::SIGTERM)
    }
}

/// Lists every transitive descendant of `root`, best effort.
pub fn descendants(root: u32) -> Vec<u32> {
    let mut system = System::new();
    system.refresh_processes_specifics(ProcessesToUpdate::All, true, ProcessRefreshKind::new());

    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for (pid, process) in system.processes() {
        if let Some(parent) = process.parent() {
            children.entry(parent.as_u32()).or_default().push(pid.as_u32());
        }
    }

    let mut found = Vec::new();
    let mut seen = HashSet::from([root]);
    let mut pending = vec![root];
    while let Some(current) = pending.pop() {
        for &child in children.get(&current).into_iter().flatten() {
            if seen.insert(child) {
                found.push(child);
                pending.push(child);
            }
        }
    }
    found
}

/// Signals every descendant of `root`, then `root` itself. Does not wait for them to exit.
pub fn kill_tree(root: u32, signal: Signal) -> KillReport {
    let mut report = KillReport::default();
    let tree = descendants(root);
    log::debug!("Sending {signal} to process {root} and {} descendant(s)", tree.len());

    for pid in tree {
        report.record(pid, send(pid, signal));
    }
    report.record(root, send(root, signal));
    report
}

fn send(pid: u32, signal: Signal) -> Result<(), Errno> {
    let raw = i32::try_from(pid).map_err(|_| Errno::ESRCH)?;
    signal::kill(Pid::from_raw(raw), signal)
}

/// The conventional name of a raw signal number (`9` → `"SIGKILL"`).
pub fn signal_name(raw: i32) -> String {
    Signal::try_from(raw)
        .map(|signal| signal.as_str().to_string())
        .unwrap_or_else(|_| format!("SIG{raw}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::core::{config::Config, template::CommandLine};
    use crate::system::executor::Executor;
    use std::path::PathBuf;
    use std::process::{Command, Stdio};
    use std::time::{Duration, Instant};

    fn executor() -> Executor {
        Executor::new(Config {
            shell: PathBuf::from("bash"),
            prefix: crate::constants::STRICT_PREFIX.to_string(),
            verbose: false,
        })
    }

    #[tokio::test]
    async fn test_killing_a_running_promise_records_the_signal() {
        let promise = executor().run(CommandLine::new("sleep 30"));
        drop(promise.stdin());
        assert!(promise.pid().is_some());

        let report = promise.kill(Signal::SIGKILL);
        assert_eq!(report.signaled.last().copied(), promise.pid());

        let error = promise.wait().await.unwrap_err();
        let output = error.output().unwrap();
        assert_eq!(output.signal(), Some("SIGKILL"));
        assert_eq!(output.exit_code(), 0);
        assert!(error.to_string().contains("signal: SIGKILL"));
    }

    #[tokio::test]
    async fn test_killing_a_pending_promise_never_spawns_it() {
        let promise = executor().run(CommandLine::new("echo never")).nothrow();
        let report = promise.terminate();
        assert!(report.signaled.is_empty());

        let output = promise.wait().await.unwrap();
        assert!(promise.pid().is_none());
        assert_eq!(output.signal(), Some("SIGTERM"));
        assert_eq!(output.stdout(), "");
    }

    #[tokio::test]
    async fn test_killing_a_resolved_promise_is_a_no_op() {
        let promise = executor().run(CommandLine::new("true"));
        promise.wait().await.unwrap();
        assert_eq!(promise.terminate(), KillReport::default());
        assert!(promise.wait().await.is_ok());
    }

    #[test]
    fn test_signal_name_of_known_and_unknown_numbers() {
        assert_eq!(signal_name(9), "SIGKILL");
        assert_eq!(signal_name(15), "SIGTERM");
        assert_eq!(signal_name(999), "SIG999");
    }

    #[test]
    fn test_descendants_of_a_shell_include_its_grandchildren() {
        let mut shell = Command::new("bash")
            .arg("-c")
            .arg("sleep 30 & sleep 30 & wait")
            .stdout(Stdio::null())
            .spawn()
            .unwrap();
        let root = shell.id();

        // Give bash a moment to fork.
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut tree = descendants(root);
        while tree.len() < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
            tree = descendants(root);
        }
        assert!(tree.len() >= 2, "expected two sleeps under bash, got {tree:?}");

        let report = kill_tree(root, Signal::SIGKILL);
        assert!(report.signaled.contains(&root));
        let status = shell.wait().unwrap();
        assert!(!status.success());
    }

    #[test]
    fn test_killing_a_missing_process_is_reported_not_raised() {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        let report = kill_tree(pid, Signal::SIGTERM);
        assert!(report.failed.iter().any(|(failed, _)| *failed == pid));
    }
}
