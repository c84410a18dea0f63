// src/system/buffer.rs

use crate::{models::CapturedStreams, system::executor::ExecutionError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Which output stream a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug, Default)]
struct Buffers {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    combined: Vec<u8>,
    /// stdout that arrived after the process was piped but before the pipe was wired.
    held: Vec<u8>,
}

/// Accumulates the output of one child process, shared between its readers.
///
/// Chunks are appended to their own stream and to `combined` under one lock, so
/// `combined` reflects arrival order across both streams.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    buffers: Arc<Mutex<Buffers>>,
    limit: Option<usize>,
}

impl OutputBuffer {
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// A buffer refusing to hold more than `limit` bytes of stdout and stderr together.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            buffers: Arc::default(),
            limit: Some(limit),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Buffers> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, stream: Stream, chunk: &[u8]) -> Result<(), ExecutionError> {
        let mut buffers = self.lock();
        if let Some(limit) = self.limit {
            let used = buffers.stdout.len() + buffers.stderr.len();
            if used + chunk.len() > limit {
                return Err(ExecutionError::OutputLimitExceeded { limit });
            }
        }
        match stream {
            Stream::Stdout => buffers.stdout.extend_from_slice(chunk),
            Stream::Stderr => buffers.stderr.extend_from_slice(chunk),
        }
        buffers.combined.extend_from_slice(chunk);
        Ok(())
    }

    /// Keeps stdout for a pipe that is not wired yet. Held bytes are not part of the
    /// captured output.
    pub fn hold(&self, chunk: &[u8]) {
        self.lock().held.extend_from_slice(chunk);
    }

    /// Everything a newly wired pipe has missed: the captured stdout followed by the
    /// held bytes. Held bytes are handed out once.
    pub fn replay(&self) -> Vec<u8> {
        let mut buffers = self.lock();
        let mut bytes = buffers.stdout.clone();
        bytes.append(&mut buffers.held);
        bytes
    }

    /// Decodes what has been captured so far (invalid UTF-8 is replaced).
    pub fn snapshot(&self) -> CapturedStreams {
        let buffers = self.lock();
        CapturedStreams {
            stdout: String::from_utf8_lossy(&buffers.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&buffers.stderr).into_owned(),
            combined: String::from_utf8_lossy(&buffers.combined).into_owned(),
        }
    }
}
