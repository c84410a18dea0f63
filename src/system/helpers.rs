// src/system/helpers.rs

//! Small conveniences for scripts: changing directory, sleeping and fetching URLs.

use crate::system::{
    console,
    executor::{ExecutionError, Executor},
};
use std::time::Duration;

impl Executor {
    /// Changes the working directory of the whole process. `~` is expanded.
    pub fn cd(&self, path: &str) -> Result<(), ExecutionError> {
        if self.config().verbose {
            console::print_command(&format!("cd {path}"));
        }
        let target = shellexpand::tilde(path);
        std::env::set_current_dir(target.as_ref())
            .map_err(|e| ExecutionError::io(format!("Could not change directory to '{path}'"), e))
    }

    /// Issues a GET request.
    pub async fn fetch(&self, url: &str) -> reqwest::Result<reqwest::Response> {
        if self.config().verbose {
            console::print_command(&format!("fetch {url}"));
        }
        reqwest::get(url).await
    }
}

/// Blocks the current thread.
pub fn sleep(duration: Duration) {
    std::thread::sleep(duration);
}

/// Suspends the current task; running promises keep making progress.
pub async fn sleep_async(duration: Duration) {
    tokio::time::sleep(duration).await;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use std::path::PathBuf;
    use std::time::Instant;

    fn executor() -> Executor {
        Executor::new(Config {
            shell: PathBuf::from("bash"),
            prefix: String::new(),
            verbose: false,
        })
    }

    #[test]
    fn test_cd_expands_tilde_and_reports_missing_dirs() {
        let before = std::env::current_dir().unwrap();
        let exec = executor();

        exec.cd("~").unwrap();
        let home = dirs::home_dir().unwrap();
        assert_eq!(
            std::env::current_dir().unwrap().canonicalize().unwrap(),
            home.canonicalize().unwrap()
        );

        let error = exec.cd("/nonexistent/tx/dir").unwrap_err();
        assert!(error.to_string().starts_with("Could not change directory to '/nonexistent/tx/dir'"));

        exec.cd(&before.display().to_string()).unwrap();
        assert_eq!(std::env::current_dir().unwrap(), before);
    }

    #[test]
    fn test_sleep_blocks_for_the_duration() {
        let start = Instant::now();
        sleep(Duration::from_millis(20));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_sleep_async_lets_pending_promises_start() {
        let promise = executor().run(crate::core::template::CommandLine::new("true"));
        sleep_async(Duration::from_millis(20)).await;
        assert!(promise.pid().is_some());
        promise.await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_rejects_invalid_urls() {
        assert!(executor().fetch("not a url").await.is_err());
    }
}
