// src/system/promise.rs

//! The lazily started, awaitable handle over one asynchronous command.
//!
//! A promise moves `Pending → Running → Resolved` and never back. It starts when it
//! is awaited, when a pipeline needs it, or when a handle is taken. On a
//! current-thread runtime it also starts on the runtime's next turn (the fallback
//! tick), so `quiet`, `nothrow` and the sink side of `pipe` belong in the same
//! synchronous stretch of code that created it. Multi-thread runtimes get no tick:
//! a worker could otherwise start a sink before it is wired.

use crate::{
    core::{config::Config, template::CommandLine},
    models::ProcessOutput,
    system::{
        buffer::{OutputBuffer, Stream},
        console,
        executor::ExecutionError,
        kill,
    },
};
use futures::future::BoxFuture;
use std::fmt;
use std::future::IntoFuture;
use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::watch;
use tokio::task::JoinHandle;

const CHUNK_SIZE: usize = 8192;

type Settled = Option<Result<ProcessOutput, ExecutionError>>;

pub(crate) type PipeWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Pending,
    Running,
    Resolved,
}

/// Mutable state of a promise. Only touched under the promise's lock, and the lock
/// is never held across an await.
pub(crate) struct Control {
    pub(crate) phase: Phase,
    pub(crate) pid: Option<u32>,
    pub(crate) quiet: bool,
    pub(crate) nothrow: bool,
    pub(crate) inherit_stdin: bool,
    /// stdout feeds a downstream promise or a writer instead of the buffer.
    pub(crate) piped: bool,
    /// The stdout pump is still reading.
    pub(crate) stdout_open: bool,
    pub(crate) stdout_claimed: bool,
    pub(crate) stderr_claimed: bool,
    pub(crate) stdin: Option<ChildStdin>,
    pub(crate) stdout: Option<ChildStdout>,
    pub(crate) stderr: Option<ChildStderr>,
    /// The promise whose stdout becomes this one's stdin.
    pub(crate) upstream: Option<ProcessPromise>,
    /// Where piped stdout goes. Picked up by the stdout pump on its next chunk.
    pub(crate) stdout_target: Option<PipeWriter>,
}

impl Default for Control {
    fn default() -> Self {
        Self {
            phase: Phase::Pending,
            pid: None,
            quiet: false,
            nothrow: false,
            inherit_stdin: true,
            piped: false,
            stdout_open: false,
            stdout_claimed: false,
            stderr_claimed: false,
            stdin: None,
            stdout: None,
            stderr: None,
            upstream: None,
            stdout_target: None,
        }
    }
}

struct Shared {
    config: Arc<Config>,
    command: CommandLine,
    control: Mutex<Control>,
    output: OutputBuffer,
    settled: watch::Sender<Settled>,
}

/// An asynchronous command execution. Cloning yields another handle to the same
/// process; awaiting any of them any number of times yields the same result.
#[derive(Clone)]
pub struct ProcessPromise {
    shared: Arc<Shared>,
}

impl ProcessPromise {
    pub(crate) fn new(config: Arc<Config>, command: CommandLine) -> Self {
        let (settled, _) = watch::channel(None);
        let promise = Self {
            shared: Arc::new(Shared {
                config,
                command,
                control: Mutex::new(Control::default()),
                output: OutputBuffer::unbounded(),
                settled,
            }),
        };

        // Fallback tick. Runs only once the creating task suspends.
        if let Ok(handle) = Handle::try_current() {
            if handle.runtime_flavor() == RuntimeFlavor::CurrentThread {
                let pending = promise.clone();
                handle.spawn(async move {
                    tokio::task::yield_now().await;
                    pending.ensure_started();
                });
            } else {
                log::trace!("No fallback tick for '{}' on a multi-thread runtime", promise.command());
            }
        }
        promise
    }

    pub(crate) fn control(&self) -> MutexGuard<'_, Control> {
        self.shared.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn phase(&self) -> Phase {
        self.control().phase
    }

    pub(crate) fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// The command line this promise runs.
    pub fn command(&self) -> &CommandLine {
        &self.shared.command
    }

    /// The PID of the shell, once it has been spawned.
    pub fn pid(&self) -> Option<u32> {
        self.control().pid
    }

    /// Whether the result is available.
    pub fn is_resolved(&self) -> bool {
        self.phase() == Phase::Resolved
    }

    /// Resolves successfully even when the command fails.
    pub fn nothrow(self) -> Self {
        self.configure("nothrow", |control| control.nothrow = true);
        self
    }

    /// Suppresses the command echo and the live output mirror.
    pub fn quiet(self) -> Self {
        self.configure("quiet", |control| control.quiet = true);
        self
    }

    fn configure(&self, name: &str, apply: impl FnOnce(&mut Control)) {
        let mut control = self.control();
        if control.phase == Phase::Resolved {
            log::warn!("{name}() has no effect on '{}': it has already resolved", self.shared.command);
        } else {
            apply(&mut control);
        }
    }

    /// Takes the write end of the process's stdin. Starts the process.
    pub fn stdin(&self) -> Option<ChildStdin> {
        self.claim(|_| {});
        self.control().stdin.take()
    }

    /// Takes the read end of the process's stdout. Starts the process; its stdout is
    /// no longer captured.
    pub fn stdout(&self) -> Option<ChildStdout> {
        self.claim(|control| control.stdout_claimed = true);
        self.control().stdout.take()
    }

    /// Takes the read end of the process's stderr. Starts the process; its stderr is
    /// no longer captured.
    pub fn stderr(&self) -> Option<ChildStderr> {
        self.claim(|control| control.stderr_claimed = true);
        self.control().stderr.take()
    }

    fn claim(&self, mark: impl FnOnce(&mut Control)) {
        {
            let mut control = self.control();
            if control.phase == Phase::Pending {
                control.inherit_stdin = false;
                mark(&mut control);
            }
        }
        self.ensure_started();
    }

    /// Waits for the process and returns its result. Starts it if needed.
    pub async fn wait(&self) -> Result<ProcessOutput, ExecutionError> {
        self.ensure_started();
        let mut settled = self.shared.settled.subscribe();
        let result = settled
            .wait_for(Option::is_some)
            .await
            .map(|value| (*value).clone());
        match result {
            Ok(Some(result)) => result,
            _ => Err(ExecutionError::Usage(format!(
                "'{}' was dropped before it resolved",
                self.shared.command
            ))),
        }
    }

    /// The exit code of the process, whether it succeeded or not. Only fails when
    /// the process could not be run at all.
    pub async fn exit_code(&self) -> Result<i32, ExecutionError> {
        match self.wait().await {
            Ok(output) => Ok(output.exit_code()),
            Err(ExecutionError::Process(output)) => Ok(output.exit_code()),
            Err(e) => Err(e),
        }
    }

    /// The single `Pending → Running` transition.
    pub(crate) fn ensure_started(&self) {
        let upstream = {
            let control = self.control();
            if control.phase != Phase::Pending {
                return;
            }
            control.upstream.clone()
        };
        if let Some(upstream) = &upstream {
            upstream.ensure_started();
        }

        let Ok(handle) = Handle::try_current() else {
            self.settle_pending(Err(ExecutionError::Usage(format!(
                "'{}' must be started inside a tokio runtime",
                self.shared.command
            ))));
            return;
        };
        let _runtime = handle.enter();

        let mut control = self.control();
        if control.phase != Phase::Pending {
            return;
        }
        let config = &self.shared.config;
        let echo = config.verbose && !control.quiet;
        if echo {
            console::print_command(self.shared.command.as_str());
        }

        let spawned = Command::new(&config.shell)
            .arg("-c")
            .arg(config.script_for(self.shared.command.as_str()))
            .stdin(if control.inherit_stdin { Stdio::inherit() } else { Stdio::piped() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                control.phase = Phase::Resolved;
                control.stdout_target = None;
                drop(control);
                self.shared.settled.send_replace(Some(Err(ExecutionError::Spawn {
                    command: self.shared.command.to_string(),
                    source: Arc::new(e),
                })));
                return;
            }
        };
        control.phase = Phase::Running;
        control.pid = child.id();
        log::debug!("Started '{}' as process {:?}", self.shared.command, control.pid);

        let mut readers: Vec<JoinHandle<()>> = Vec::with_capacity(2);

        if let Some(stdout) = child.stdout.take() {
            if control.stdout_claimed {
                control.stdout = Some(stdout);
            } else {
                control.stdout_open = true;
                readers.push(tokio::spawn(self.clone().pump_stdout(stdout, echo)));
            }
        }
        if let Some(stderr) = child.stderr.take() {
            if control.stderr_claimed {
                control.stderr = Some(stderr);
            } else {
                let buffer = self.shared.output.clone();
                readers.push(tokio::spawn(pump(stderr, Stream::Stderr, buffer, echo)));
            }
        }

        let stdin = child.stdin.take();
        let feed = match (control.upstream.is_some(), stdin) {
            (true, Some(stdin)) => Some(stdin),
            (false, stdin) => {
                control.stdin = stdin;
                None
            }
            (true, None) => None,
        };
        drop(control);

        if let (Some(upstream), Some(stdin)) = (upstream, feed) {
            upstream.attach_stdout(Box::new(stdin));
        }

        tokio::spawn(self.clone().supervise(child, readers));
    }

    /// Routes this promise's stdout into `writer` from now on. Whatever stdout was
    /// already read is written first, so attaching late loses nothing. The writer is
    /// shut down at EOF.
    pub(crate) fn attach_stdout(&self, writer: PipeWriter) {
        {
            let mut control = self.control();
            if control.phase == Phase::Pending || control.stdout_open {
                control.stdout_target = Some(writer);
                return;
            }
        }
        let replay = self.shared.output.replay();
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(finish_pipe(writer, replay));
            }
            Err(_) => log::debug!("'{}' has no runtime to flush its stdout", self.shared.command),
        }
    }

    /// Reads stdout to EOF. Each chunk goes to the attached pipe if there is one,
    /// is held back if a pipe is expected, or is captured (and echoed) otherwise.
    async fn pump_stdout(self, mut reader: ChildStdout, echo: bool) {
        let output = self.shared.output.clone();
        let mut target: Option<PipeWriter> = None;
        let mut broken = false;
        let mut chunk = vec![0u8; CHUNK_SIZE];
        loop {
            let read = match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) => {
                    log::debug!("Stopped reading stdout of '{}': {e}", self.shared.command);
                    break;
                }
            };
            let data = chunk.get(..read).unwrap_or_default();

            if target.is_none() {
                let (attached, piped) = {
                    let mut control = self.control();
                    (control.stdout_target.take(), control.piped)
                };
                match attached {
                    Some(mut writer) => {
                        if let Err(e) = writer.write_all(&output.replay()).await {
                            log::debug!("Pipe from '{}' closed: {e}", self.shared.command);
                            broken = true;
                            break;
                        }
                        target = Some(writer);
                    }
                    None if piped => {
                        output.hold(data);
                        continue;
                    }
                    None => {
                        if echo {
                            mirror(Stream::Stdout, data).await;
                        }
                        if let Err(e) = output.push(Stream::Stdout, data) {
                            log::warn!("{e}");
                        }
                        continue;
                    }
                }
            }
            if let Some(writer) = target.as_mut() {
                if let Err(e) = writer.write_all(data).await {
                    // Dropping the reader lets the process see the broken pipe too.
                    log::debug!("Pipe from '{}' closed: {e}", self.shared.command);
                    broken = true;
                    break;
                }
            }
        }
        drop(reader);

        let late = {
            let mut control = self.control();
            control.stdout_open = false;
            control.stdout_target.take()
        };
        if broken {
            return;
        }
        match (target, late) {
            (Some(writer), _) => finish_pipe(writer, Vec::new()).await,
            (None, Some(writer)) => finish_pipe(writer, output.replay()).await,
            (None, None) => {}
        }
    }

    async fn supervise(self, mut child: Child, readers: Vec<JoinHandle<()>>) {
        let status = child.wait().await;
        for reader in readers {
            if let Err(e) = reader.await {
                log::debug!("Output reader of '{}' failed: {e}", self.shared.command);
            }
        }
        match status {
            Ok(status) => {
                let signal = status.signal().map(kill::signal_name);
                let output = ProcessOutput::new(
                    status.code().unwrap_or(0),
                    signal,
                    self.shared.output.snapshot(),
                    self.shared.command.origin(),
                );
                log::debug!("'{}' finished with exit code {}", self.shared.command, output.exit_code());
                self.settle(output);
            }
            Err(e) => {
                self.control().phase = Phase::Resolved;
                self.shared.settled.send_replace(Some(Err(ExecutionError::io(
                    format!("Failed waiting for '{}'", self.shared.command),
                    e,
                ))));
            }
        }
    }

    /// Stores the final result, honoring `nothrow`.
    pub(crate) fn settle(&self, output: ProcessOutput) {
        let nothrow = {
            let mut control = self.control();
            control.phase = Phase::Resolved;
            control.nothrow
        };
        self.shared.settled.send_replace(Some(outcome(output, nothrow)));
    }

    /// Resolves a promise that never started. Returns `false` if it had already left
    /// `Pending`.
    pub(crate) fn settle_pending(&self, result: Result<ProcessOutput, ExecutionError>) -> bool {
        let nothrow = {
            let mut control = self.control();
            if control.phase != Phase::Pending {
                return false;
            }
            control.phase = Phase::Resolved;
            // Dropping a pipe writer closes it, so a waiting sink sees EOF.
            control.stdout_target = None;
            control.nothrow
        };
        let result = result.and_then(|output| outcome(output, nothrow));
        self.shared.settled.send_replace(Some(result));
        true
    }
}

fn outcome(output: ProcessOutput, nothrow: bool) -> Result<ProcessOutput, ExecutionError> {
    if output.is_success() || nothrow {
        Ok(output)
    } else {
        Err(ExecutionError::Process(Box::new(output)))
    }
}

async fn pump<R: AsyncRead + Unpin>(mut reader: R, stream: Stream, buffer: OutputBuffer, echo: bool) {
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        let read = match reader.read(&mut chunk).await {
            Ok(0) => return,
            Ok(read) => read,
            Err(e) => {
                log::debug!("Stopped reading {stream:?}: {e}");
                return;
            }
        };
        let data = chunk.get(..read).unwrap_or_default();
        if echo {
            mirror(stream, data).await;
        }
        if let Err(e) = buffer.push(stream, data) {
            log::warn!("{e}");
        }
    }
}

async fn mirror(stream: Stream, data: &[u8]) {
    let written = match stream {
        Stream::Stdout => write_flushed(tokio::io::stdout(), data).await,
        Stream::Stderr => write_flushed(tokio::io::stderr(), data).await,
    };
    if let Err(e) = written {
        log::debug!("Could not mirror {stream:?}: {e}");
    }
}

async fn write_flushed<W: AsyncWrite + Unpin>(mut writer: W, data: &[u8]) -> std::io::Result<()> {
    writer.write_all(data).await?;
    writer.flush().await
}

/// Writes the last bytes of a pipe, then closes it. Broken pipes are expected when
/// the reading side exits early.
async fn finish_pipe(mut writer: PipeWriter, rest: Vec<u8>) {
    if !rest.is_empty() {
        if let Err(e) = writer.write_all(&rest).await {
            log::debug!("Pipe closed early: {e}");
            return;
        }
    }
    if let Err(e) = writer.shutdown().await {
        log::debug!("Could not close pipe writer: {e}");
    }
}

impl IntoFuture for ProcessPromise {
    type Output = Result<ProcessOutput, ExecutionError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.wait().await })
    }
}

impl<'a> IntoFuture for &'a ProcessPromise {
    type Output = Result<ProcessOutput, ExecutionError>;
    type IntoFuture = BoxFuture<'a, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

impl fmt::Debug for ProcessPromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let control = self.control();
        f.debug_struct("ProcessPromise")
            .field("command", &self.shared.command.as_str())
            .field("phase", &control.phase)
            .field("pid", &control.pid)
            .finish()
    }
}
