//! # System Interaction Layer
//!
//! Everything that touches child processes and the terminal.
//!
//! ## Modules
//!
//! - **`executor`**: the blocking executor and the error type shared by the whole layer.
//! - **`promise`**: the lazily started, awaitable process handle.
//! - **`pipe`**: connecting promises to each other and to writers.
//! - **`kill`**: process-tree discovery and signalling.
//! - **`buffer`**: output capture shared between reader threads or tasks.
//! - **`console`**: command echo.
//! - **`helpers`**: `cd`, `sleep` and `fetch` for scripts.

pub mod buffer;
pub mod console;
pub mod executor;
pub mod helpers;
pub mod kill;
pub mod pipe;
pub mod promise;
