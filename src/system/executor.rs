// src/system/executor.rs

use crate::{
    constants::MAX_SYNC_BUFFER,
    core::{config::Config, template::CommandLine},
    models::ProcessOutput,
    system::{
        buffer::{OutputBuffer, Stream},
        console, kill,
        promise::ProcessPromise,
    },
};
use nix::sys::signal::Signal;
use std::io::{self, ErrorKind, Read};
use std::os::unix::process::ExitStatusExt;
use std::process::{Command as StdCommand, Stdio};
use std::sync::Arc;
use std::thread;
use thiserror::Error;

/// Everything that can go wrong running a command.
#[derive(Error, Debug, Clone)]
pub enum ExecutionError {
    /// The command ran and failed. Carries everything it produced.
    #[error("{}", .0.message())]
    Process(Box<ProcessOutput>),
    /// The API was used in a way that cannot work, e.g. piping a resolved promise.
    #[error("{0}")]
    Usage(String),
    /// The shell could not be spawned.
    #[error("Command '{command}' could not be started: {source}")]
    Spawn {
        /// The command line that was to run.
        command: String,
        /// Why spawning failed.
        #[source]
        source: Arc<io::Error>,
    },
    /// `run_sync` captured more than `limit` bytes and killed the command.
    #[error("Command output exceeded the {limit} byte limit of synchronous execution.")]
    OutputLimitExceeded {
        /// The byte limit that was hit.
        limit: usize,
    },
    /// An I/O failure around the process, such as waiting on it.
    #[error("{context}: {source}")]
    Io {
        /// What was being done.
        context: String,
        /// The underlying error.
        #[source]
        source: Arc<io::Error>,
    },
}

impl ExecutionError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source: Arc::new(source),
        }
    }

    /// The result of the failed command, when the error is a command failure.
    pub fn output(&self) -> Option<&ProcessOutput> {
        match self {
            Self::Process(output) => Some(output),
            _ => None,
        }
    }

    /// Whether the command ran and failed, as opposed to not running at all.
    pub fn is_command_failure(&self) -> bool {
        matches!(self, Self::Process(_))
    }
}

/// Runs command lines through the configured shell.
///
/// Cheap to clone; all clones share one [`Config`].
#[derive(Debug, Clone)]
pub struct Executor {
    config: Arc<Config>,
}

impl Executor {
    /// An executor with its own config.
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// An executor over the current process-wide [`Config`].
    pub fn global() -> Self {
        Self {
            config: Config::global(),
        }
    }

    /// The config commands run with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Describes an asynchronous execution. The process starts when the promise is
    /// awaited or piped, or on the runtime's next turn, whichever comes first.
    pub fn run(&self, command: CommandLine) -> ProcessPromise {
        ProcessPromise::new(Arc::clone(&self.config), command)
    }

    /// Runs a command to completion, blocking the current thread.
    ///
    /// stdin is closed. stdout and stderr are captured (at most [`MAX_SYNC_BUFFER`]
    /// bytes together; beyond that the process tree is killed) and echoed after the
    /// command finishes when the config is verbose.
    pub fn run_sync(&self, command: CommandLine) -> Result<ProcessOutput, ExecutionError> {
        self.run_capped(command, MAX_SYNC_BUFFER)
    }

    fn run_capped(&self, command: CommandLine, limit: usize) -> Result<ProcessOutput, ExecutionError> {
        if self.config.verbose {
            console::print_command(command.as_str());
        }

        let cwd = std::env::current_dir()
            .map_err(|e| ExecutionError::io("Could not read the current directory", e))?;
        let mut child = StdCommand::new(&self.config.shell)
            .arg("-c")
            .arg(self.config.script_for(command.as_str()))
            .current_dir(dunce::simplified(&cwd))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ExecutionError::Spawn {
                command: command.to_string(),
                source: Arc::new(e),
            })?;

        let pid = child.id();
        let buffer = OutputBuffer::with_limit(limit);
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let drained = thread::scope(|scope| {
            let buffer = &buffer;
            let mut readers = Vec::with_capacity(2);
            if let Some(pipe) = stdout {
                readers.push(scope.spawn(move || drain(pipe, Stream::Stdout, buffer, pid)));
            }
            if let Some(pipe) = stderr {
                readers.push(scope.spawn(move || drain(pipe, Stream::Stderr, buffer, pid)));
            }
            readers.into_iter().try_for_each(|reader| {
                reader
                    .join()
                    .unwrap_or_else(|_| Err(ExecutionError::Usage("output reader thread panicked".into())))
            })
        });

        let status = child
            .wait()
            .map_err(|e| ExecutionError::io(format!("Failed waiting for '{command}'"), e))?;
        drained?;

        let streams = buffer.snapshot();
        if self.config.verbose {
            print!("{}", streams.stdout);
            eprint!("{}", streams.stderr);
        }

        let signal = status.signal().map(kill::signal_name);
        let output = ProcessOutput::new(status.code().unwrap_or(0), signal, streams, command.origin());
        log::debug!("'{}' finished with exit code {}", command, output.exit_code());

        if output.is_success() {
            Ok(output)
        } else {
            Err(ExecutionError::Process(Box::new(output)))
        }
    }
}

/// Reads one pipe to EOF. On overflow the whole process tree is killed so the
/// other reader reaches EOF too.
fn drain(mut pipe: impl Read, stream: Stream, buffer: &OutputBuffer, pid: u32) -> Result<(), ExecutionError> {
    let mut chunk = [0u8; 8192];
    loop {
        let read = match pipe.read(&mut chunk) {
            Ok(0) => return Ok(()),
            Ok(read) => read,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(ExecutionError::io("Failed reading command output", e)),
        };
        if let Err(e) = buffer.push(stream, chunk.get(..read).unwrap_or_default()) {
            log::warn!("Output limit reached, killing process {pid}");
            kill::kill_tree(pid, Signal::SIGKILL);
            return Err(e);
        }
    }
}
