// src/core/retry.rs

use crate::{
    core::template::CommandLine,
    models::ProcessOutput,
    system::executor::{ExecutionError, Executor},
};
use futures::future::BoxFuture;

impl Executor {
    /// Runs `command` asynchronously until it succeeds, at most `count` times.
    ///
    /// Attempts follow each other immediately. The last failure is returned as is.
    /// A `count` of zero still makes one attempt.
    pub fn retry(
        &self,
        count: usize,
        command: CommandLine,
    ) -> BoxFuture<'static, Result<ProcessOutput, ExecutionError>> {
        let executor = self.clone();
        let attempts = count.max(1);
        Box::pin(async move {
            let mut attempt = 1;
            loop {
                match executor.run(command.clone()).await {
                    Ok(output) => return Ok(output),
                    Err(e) if attempt < attempts => {
                        log::debug!("Attempt {attempt}/{attempts} of '{command}' failed: {e}");
                        attempt += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::core::config::Config;
    use crate::core::template::{Substitution, format_command};
    use crate::system::executor::Executor;
    use std::path::{Path, PathBuf};

    fn executor() -> Executor {
        Executor::new(Config {
            shell: PathBuf::from("bash"),
            prefix: crate::constants::STRICT_PREFIX.to_string(),
            verbose: false,
        })
    }

    /// Bumps a counter file and succeeds from the `succeed_from`-th run on.
    fn counting(counter: &Path, succeed_from: u32) -> crate::core::template::CommandLine {
        format_command(
            "n=$(cat {} 2>/dev/null || echo 0); n=$((n + 1)); echo $n > {}; [ $n -ge {} ]",
            vec![
                Substitution::from(counter),
                Substitution::from(counter),
                Substitution::from(succeed_from),
            ],
        )
    }

    fn runs(counter: &Path) -> u32 {
        std::fs::read_to_string(counter).unwrap().trim().parse().unwrap()
    }

    #[tokio::test]
    async fn test_retry_returns_the_last_failure() {
        let error = executor()
            .retry(5, crate::core::template::CommandLine::new("exit 123"))
            .await
            .unwrap_err();
        assert_eq!(error.output().unwrap().exit_code(), 123);
    }

    #[tokio::test]
    async fn test_retry_stops_at_the_first_success() {
        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("runs");

        executor().retry(5, counting(&counter, 3)).await.unwrap();
        assert_eq!(runs(&counter), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_count_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("runs");

        assert!(executor().retry(2, counting(&counter, 10)).await.is_err());
        assert_eq!(runs(&counter), 2);
    }

    #[tokio::test]
    async fn test_zero_count_makes_one_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("runs");

        assert!(executor().retry(0, counting(&counter, 10)).await.is_err());
        assert_eq!(runs(&counter), 1);
    }
}
