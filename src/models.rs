// src/models.rs

use std::fmt;
use std::panic::Location;

/// Where a command was built: a location in Rust code, or a script loaded by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallSite {
    /// A source location in Rust code.
    Code(&'static Location<'static>),
    /// A script, named by its path or URL.
    Script(&'static str),
}

impl CallSite {
    /// The location of the (tracked) caller.
    #[track_caller]
    pub fn here() -> Self {
        Self::Code(Location::caller())
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(location) => write!(f, "{location}"),
            Self::Script(source) => f.write_str(source),
        }
    }
}

/// The text captured from a finished child process.
///
/// `combined` holds both streams in the order their chunks arrived.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedStreams {
    pub stdout: String,
    pub stderr: String,
    pub combined: String,
}

/// The immutable record of one command execution.
///
/// A `ProcessOutput` is both the value of a successful command and the payload of a
/// failed one (see [`crate::system::executor::ExecutionError::Process`]), so a
/// failure can be inspected field by field instead of by parsing a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    exit_code: i32,
    stdout: String,
    stderr: String,
    combined: String,
    signal: Option<String>,
    message: String,
}

impl ProcessOutput {
    /// Builds the result of a finished command and renders its diagnostic message.
    ///
    /// A process killed by a signal has no exit code of its own; it is recorded as `0`
    /// together with the signal name, which still counts as a failure.
    pub fn new(
        exit_code: i32,
        signal: Option<String>,
        streams: CapturedStreams,
        origin: &CallSite,
    ) -> Self {
        let message = render_message(exit_code, signal.as_deref(), &streams.stderr, origin);
        Self {
            exit_code,
            stdout: streams.stdout,
            stderr: streams.stderr,
            combined: streams.combined,
            signal,
            message,
        }
    }

    /// The exit code, `0` when the process was killed by a signal.
    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Captured stdout.
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Captured stderr.
    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    /// Both streams, interleaved in arrival order.
    pub fn combined(&self) -> &str {
        &self.combined
    }

    /// The name of the signal that terminated the process (e.g. `"SIGKILL"`), if any.
    pub fn signal(&self) -> Option<&str> {
        self.signal.as_deref()
    }

    /// Human-readable diagnostic: stderr, call site, exit code meaning and signal.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Exit code `0` and no terminating signal.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0 && self.signal.is_none()
    }
}

impl fmt::Display for ProcessOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.combined)
    }
}

fn render_message(
    exit_code: i32,
    signal: Option<&str>,
    stderr: &str,
    origin: &CallSite,
) -> String {
    let mut message = if stderr.is_empty() {
        String::from("\n")
    } else {
        stderr.to_string()
    };
    message.push_str(&format!("    at {origin}"));
    message.push_str(&format!("\n    exit code: {exit_code}"));
    if let Some(info) = exit_code_info(exit_code) {
        message.push_str(&format!(" ({info})"));
    }
    if let Some(signal) = signal {
        message.push_str(&format!("\n    signal: {signal}"));
    }
    message
}

/// Describes the conventional meaning of well-known shell exit codes.
pub fn exit_code_info(exit_code: i32) -> Option<&'static str> {
    let info = match exit_code {
        2 => "Misuse of shell builtins",
        126 => "Invoked command cannot execute",
        127 => "Command not found",
        128 => "Invalid exit argument",
        129 => "Hangup",
        130 => "Interrupt",
        131 => "Quit and dump core",
        132 => "Illegal instruction",
        133 => "Trace/breakpoint trap",
        134 => "Process aborted",
        135 => "Bus error: \"access to undefined portion of memory object\"",
        136 => "Floating point exception: \"erroneous arithmetic operation\"",
        137 => "Kill (terminate immediately)",
        138 => "User-defined 1",
        139 => "Segmentation violation",
        140 => "User-defined 2",
        141 => "Write to pipe with no one reading",
        142 => "Signal raised by alarm",
        143 => "Termination (request to terminate)",
        145 => "Child process terminated, stopped (or continued*)",
        146 => "Continue if stopped",
        147 => "Stop executing temporarily",
        148 => "Terminal stop signal",
        149 => "Background process attempting to read from tty (\"in\")",
        150 => "Background process attempting to write to tty (\"out\")",
        151 => "Urgent data available on socket",
        152 => "CPU time limit exceeded",
        153 => "File size limit exceeded",
        154 => "Signal raised by timer counting virtual time: \"virtual timer expired\"",
        155 => "Profiling timer expired",
        157 => "Pollable event",
        159 => "Bad syscall",
        _ => return None,
    };
    Some(info)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn streams(stdout: &str, stderr: &str) -> CapturedStreams {
        CapturedStreams {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            combined: format!("{stdout}{stderr}"),
        }
    }

    #[test]
    fn test_success_requires_zero_code_and_no_signal() {
        let here = CallSite::here();
        assert!(ProcessOutput::new(0, None, streams("ok\n", ""), &here).is_success());
        assert!(!ProcessOutput::new(1, None, streams("", ""), &here).is_success());
        assert!(!ProcessOutput::new(0, Some("SIGKILL".into()), streams("", ""), &here).is_success());
    }

    #[test]
    fn test_message_embeds_stderr_call_site_and_code_meaning() {
        let here = Location::caller();
        let output = ProcessOutput::new(127, None, streams("", "wtf: not found\n"), &CallSite::Code(here));
        let message = output.message();

        assert!(message.starts_with("wtf: not found\n    at "));
        assert!(message.contains(&format!("{}:{}", here.file(), here.line())));
        assert!(message.ends_with("exit code: 127 (Command not found)"));
    }

    #[test]
    fn test_message_without_stderr_starts_with_newline_and_lists_signal() {
        let output = ProcessOutput::new(0, Some("SIGTERM".into()), streams("", ""), &CallSite::here());
        assert!(output.message().starts_with("\n    at "));
        assert!(output.message().contains("\n    exit code: 0\n"));
        assert!(output.message().ends_with("signal: SIGTERM"));
    }

    #[test]
    fn test_display_prints_combined_output() {
        let output = ProcessOutput::new(0, None, streams("out\n", "err\n"), &CallSite::here());
        assert_eq!(output.to_string(), "out\nerr\n");
        assert!(output.combined().len() >= output.stdout().len().max(output.stderr().len()));
    }

    #[test]
    fn test_script_call_site_is_shown_verbatim() {
        let output = ProcessOutput::new(1, None, streams("", "boom\n"), &CallSite::Script("deploy.sh"));
        assert_eq!(output.message(), "boom\n    at deploy.sh\n    exit code: 1");
    }

    #[test]
    fn test_exit_code_info_covers_known_codes_only() {
        assert_eq!(exit_code_info(2), Some("Misuse of shell builtins"));
        assert_eq!(exit_code_info(137), Some("Kill (terminate immediately)"));
        assert_eq!(exit_code_info(144), None);
        assert_eq!(exit_code_info(0), None);
        assert_eq!(exit_code_info(1), None);
    }
}
