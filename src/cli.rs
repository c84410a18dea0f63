// src/cli.rs

use clap::Parser;
use reqwest::Url;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// tx: run a shell script in strict mode, echoing every command and its output.
///
/// The script runs as a single command through the configured shell. It is read
/// from a file, a `file:///` URL, an http(s) URL, or stdin (`-` or no argument).
#[derive(Parser, Debug)]
#[command(author, about, long_about = None)]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// Print the version and exit.
    #[arg(short = 'V', long, visible_short_alias = 'v')]
    pub version: bool,

    /// Do not echo commands or their output.
    #[arg(long)]
    pub quiet: bool,

    /// Shell binary used to run the script.
    #[arg(long, value_name = "PATH")]
    pub shell: Option<PathBuf>,

    /// Command prepended to the script (defaults to bash strict mode).
    #[arg(long, value_name = "COMMAND", allow_hyphen_values = true)]
    pub prefix: Option<String>,

    /// The script to run.
    pub script: Option<String>,
}

/// Failures while locating the script.
#[derive(Error, Debug)]
pub enum CliError {
    /// A remote script answered with a non-2xx status.
    #[error("Can't get {0}")]
    Fetch(String),
    /// A `file://` URL that does not point at a local path.
    #[error("Not a local file URL: {0}")]
    FileUrl(String),
}

/// Where the script comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    /// Read from standard input.
    Stdin,
    /// Downloaded over http(s).
    Url(String),
    /// A local file.
    File(PathBuf),
}

impl ScriptSource {
    /// Classifies the script argument. `None` and `-` mean stdin.
    pub fn resolve(script: Option<&str>) -> Result<Self, CliError> {
        match script {
            None | Some("-") => Ok(Self::Stdin),
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
                Ok(Self::Url(url.to_string()))
            }
            Some(url) if url.starts_with("file://") => Url::parse(url)
                .ok()
                .and_then(|parsed| parsed.to_file_path().ok())
                .map(Self::File)
                .ok_or_else(|| CliError::FileUrl(url.to_string())),
            Some(path) => Ok(Self::File(PathBuf::from(path))),
        }
    }
}

impl fmt::Display for ScriptSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdin => f.write_str("<stdin>"),
            Self::Url(url) => f.write_str(url),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Downloads a remote script. Any non-2xx answer is an error.
pub async fn fetch_script(url: &str) -> anyhow::Result<String> {
    let response = reqwest::get(url).await?;
    if !response.status().is_success() {
        log::debug!("{url} answered {}", response.status());
        return Err(CliError::Fetch(url.to_string()).into());
    }
    Ok(response.text().await?)
}

/// Shown when there is no script to run.
pub fn usage() -> &'static str {
    concat!(
        "usage: tx [options] <script>\n",
        "\n",
        "    --quiet              don't echo commands\n",
        "    --shell=<path>       custom shell binary\n",
        "    --prefix=<command>   prefix all commands\n",
        "    --version, -v        print current tx version\n",
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_script_sources() {
        assert_eq!(ScriptSource::resolve(None).unwrap(), ScriptSource::Stdin);
        assert_eq!(ScriptSource::resolve(Some("-")).unwrap(), ScriptSource::Stdin);
        assert_eq!(
            ScriptSource::resolve(Some("https://example.com/install.sh")).unwrap(),
            ScriptSource::Url("https://example.com/install.sh".into())
        );
        assert_eq!(
            ScriptSource::resolve(Some("./deploy.sh")).unwrap(),
            ScriptSource::File(PathBuf::from("./deploy.sh"))
        );
        assert_eq!(
            ScriptSource::resolve(Some("file:///tmp/my%20script.sh")).unwrap(),
            ScriptSource::File(PathBuf::from("/tmp/my script.sh"))
        );
    }

    #[test]
    fn test_remote_file_urls_are_rejected() {
        let error = ScriptSource::resolve(Some("file://host/script.sh")).unwrap_err();
        assert!(matches!(error, CliError::FileUrl(_)));
    }

    #[test]
    fn test_flags_parse() {
        let cli = Cli::try_parse_from(["tx", "--quiet", "--shell=/bin/zsh", "--prefix=-x;", "s.sh"]).unwrap();
        assert!(cli.quiet);
        assert_eq!(cli.shell, Some(PathBuf::from("/bin/zsh")));
        assert_eq!(cli.prefix.as_deref(), Some("-x;"));
        assert_eq!(cli.script.as_deref(), Some("s.sh"));
    }

    #[test]
    fn test_every_version_spelling_is_accepted() {
        for flag in ["--version", "-v", "-V"] {
            assert!(Cli::try_parse_from(["tx", flag]).unwrap().version, "flag: {flag}");
        }
    }

    #[test]
    fn test_usage_lists_all_options() {
        for option in ["--quiet", "--shell", "--prefix", "--version"] {
            assert!(usage().contains(option));
        }
    }
}
