// src/constants.rs

/// The shell `tx` looks for on `PATH` when no shell is configured.
pub const PREFERRED_SHELL: &str = "bash";

/// The shell used when `bash` cannot be found.
pub const FALLBACK_SHELL: &str = "/bin/sh";

/// Strict-mode preamble prepended to every command when `bash` is available.
pub const STRICT_PREFIX: &str = "set -euo pipefail;";

/// Attempts made by `retry!` when no count is given.
pub const DEFAULT_RETRY_COUNT: usize = 5;

/// Upper bound for the combined stdout+stderr captured by the blocking executor.
pub const MAX_SYNC_BUFFER: usize = 200 * 1024 * 1024; // 200 MiB

/// The name of the tx configuration directory (inside the system config dir).
pub const CONFIG_DIR_NAME: &str = "tx";

/// The name of the optional user configuration file (inside the config dir).
pub const CONFIG_FILENAME: &str = "config.toml";
