// src/system/pipe.rs

use crate::system::{
    executor::ExecutionError,
    promise::{Control, Phase, ProcessPromise},
};
use tokio::io::AsyncWrite;

impl ProcessPromise {
    /// Connects this promise's stdout to `sink`'s stdin and returns `sink`, so chains
    /// read left to right: `a.pipe(&b)?.pipe(&c)?.await`.
    ///
    /// The source may already be running: stdout it has produced so far is handed
    /// to the sink first. A source that has resolved, is already piped, or whose
    /// stdout handle was taken cannot feed anything, so the sink is terminated and a
    /// usage error is returned. A sink that has already started is refused and left
    /// alone.
    pub fn pipe(&self, sink: &ProcessPromise) -> Result<ProcessPromise, ExecutionError> {
        if self.same_as(sink) {
            return Err(ExecutionError::Usage(format!(
                "'{}' cannot be piped into itself",
                self.command()
            )));
        }

        let refusal = {
            let mut source = self.control();
            let mut downstream = sink.control();
            if let Some(reason) = source_refusal(&source) {
                Some((reason, true))
            } else if downstream.phase != Phase::Pending {
                Some(("pipe() target has already started", false))
            } else {
                source.piped = true;
                downstream.inherit_stdin = false;
                downstream.upstream = Some(self.clone());
                None
            }
        };

        match refusal {
            Some((reason, starve_sink)) => {
                if starve_sink {
                    sink.terminate();
                }
                Err(ExecutionError::Usage(format!("{reason}: '{}'", self.command())))
            }
            None => {
                log::debug!("Piping '{}' into '{}'", self.command(), sink.command());
                Ok(sink.clone())
            }
        }
    }

    /// Streams this promise's stdout into `writer` (a file, a socket, any
    /// `AsyncWrite`). Stdout read before the call is written first. The writer is
    /// shut down at EOF, before the promise resolves.
    pub fn pipe_into<W>(&self, writer: W) -> Result<ProcessPromise, ExecutionError>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        {
            let mut source = self.control();
            if let Some(reason) = source_refusal(&source) {
                return Err(ExecutionError::Usage(format!("{reason}: '{}'", self.command())));
            }
            source.piped = true;
        }
        self.attach_stdout(Box::new(writer));
        Ok(self.clone())
    }
}

fn source_refusal(source: &Control) -> Option<&'static str> {
    if source.phase == Phase::Resolved {
        Some("pipe() called on a process promise that has already resolved")
    } else if source.piped {
        Some("pipe() called on a process promise that is already piped")
    } else if source.stdout_claimed {
        Some("pipe() called after the stdout handle was taken")
    } else {
        None
    }
}
