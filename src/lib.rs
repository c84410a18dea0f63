// src/lib.rs

//! # tx
//!
//! Shell scripting from Rust. Commands are written as templates whose `{}`
//! placeholders are filled with safely quoted values, then run either
//! synchronously ([`sh!`]) or as lazily started, awaitable [`ProcessPromise`]s
//! ([`tx!`]) that can be piped into each other and killed as a whole process tree.
//!
//! ```no_run
//! # async fn demo() -> Result<(), tx::ExecutionError> {
//! let branch = tx::sh!("git branch --show-current")?;
//! let files = vec!["a file.txt", "b.txt"];
//! tx::tx!("tar czf {}.tgz {}", branch, files).await?;
//!
//! let upper = tx::tx!("echo hello").pipe(&tx::tx!("tr a-z A-Z"))?.await?;
//! assert_eq!(upper.stdout(), "HELLO\n");
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
pub mod system;

pub use crate::core::{
    config::Config,
    quote::quote,
    template::{CommandLine, Substitution},
};
pub use models::{CallSite, ProcessOutput};
pub use nix::sys::signal::Signal;
pub use system::{
    executor::{ExecutionError, Executor},
    helpers::{sleep, sleep_async},
    kill::KillReport,
    promise::ProcessPromise,
};

/// Builds a [`CommandLine`] from a template literal and its substitutions.
///
/// Every `{}` in the template is replaced by the next argument, quoted for the
/// shell. The number of placeholders and arguments must match; a mismatch fails
/// to compile.
#[macro_export]
macro_rules! command {
    ($template:literal $(, $arg:expr)* $(,)?) => {{
        const _: () = ::core::assert!(
            $crate::core::template::count_placeholders($template) == $crate::__count!($($arg),*),
            "number of placeholders does not match the number of arguments"
        );
        $crate::core::template::format_command(
            $template,
            ::std::vec![$($crate::core::template::Substitution::from($arg)),*],
        )
    }};
}

#[doc(hidden)]
#[macro_export]
macro_rules! __count {
    () => { 0usize };
    ($head:expr $(, $tail:expr)*) => { 1usize + $crate::__count!($($tail),*) };
}

/// Runs a command template synchronously with the global config.
#[macro_export]
macro_rules! sh {
    ($($tokens:tt)*) => {
        $crate::system::executor::Executor::global().run_sync($crate::command!($($tokens)*))
    };
}

/// Describes an asynchronous command with the global config.
#[macro_export]
macro_rules! tx {
    ($($tokens:tt)*) => {
        $crate::system::executor::Executor::global().run($crate::command!($($tokens)*))
    };
}

/// Runs a command template asynchronously up to `count` times:
/// `retry!(3; "curl {}", url)`. Without a count it makes
/// [`DEFAULT_RETRY_COUNT`](crate::constants::DEFAULT_RETRY_COUNT) attempts.
#[macro_export]
macro_rules! retry {
    ($count:expr; $($tokens:tt)+) => {
        $crate::system::executor::Executor::global().retry($count, $crate::command!($($tokens)+))
    };
    ($($tokens:tt)+) => {
        $crate::system::executor::Executor::global()
            .retry($crate::constants::DEFAULT_RETRY_COUNT, $crate::command!($($tokens)+))
    };
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_command_macro_quotes_arguments() {
        let name = "my file";
        let command = command!("touch {} && ls {}", name, vec!["-l", "a b"]);
        assert_eq!(command.as_str(), "touch $'my file' && ls -l $'a b'");
        assert!(matches!(command.origin(), CallSite::Code(location) if location.file() == file!()));
    }

    #[test]
    fn test_command_macro_without_arguments() {
        assert_eq!(command!("echo hi").as_str(), "echo hi");
        assert_eq!(command!("pwd").to_string(), "pwd");
    }

    #[test]
    fn test_placeholder_count_is_known_at_compile_time() {
        const COUNT: usize = crate::core::template::count_placeholders("cp {} {}");
        assert_eq!(COUNT, __count!(1, 2));
    }

    #[test]
    fn test_sh_macro_runs_through_the_global_executor() {
        let output = sh!("printf %s {}", "a b").unwrap();
        assert_eq!(output.stdout(), "a b");

        let error = sh!("exit {}", 7).unwrap_err();
        assert_eq!(error.output().unwrap().exit_code(), 7);
    }

    #[tokio::test]
    async fn test_tx_and_retry_macros() {
        let hello = tx!("echo hello").quiet().await.unwrap();
        let count = tx!("printf %s {} | wc -c", hello).quiet().await.unwrap();
        assert_eq!(count.stdout().trim(), "5");

        let error = retry!(2; "exit 123").await.unwrap_err();
        assert_eq!(error.output().unwrap().exit_code(), 123);
    }

    #[tokio::test]
    async fn test_retry_macro_defaults_to_five_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("attempts");
        let error = retry!("echo x >> {}; exit 7", &log).await.unwrap_err();
        assert_eq!(error.output().unwrap().exit_code(), 7);

        let attempts = std::fs::read_to_string(&log).unwrap();
        assert_eq!(attempts.lines().count(), crate::constants::DEFAULT_RETRY_COUNT);
    }
}
