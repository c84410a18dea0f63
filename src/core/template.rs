// src/core/template.rs

use crate::{core::quote::quote, models::{CallSite, ProcessOutput}};
use std::{borrow::Cow, fmt, path::{Path, PathBuf}};

/// The placeholder marking where a substitution goes in a command template.
pub const PLACEHOLDER: &str = "{}";

/// A value interpolated into a command template.
///
/// Each variant has one conversion rule:
/// - `Text` is quoted as-is,
/// - `Output` is the stdout of a previous command, with one trailing newline
///   stripped (command-substitution semantics),
/// - `Sequence` quotes every element on its own and joins them with spaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Substitution {
    /// A plain value, quoted as is.
    Text(String),
    /// The stdout of a finished command.
    Output(String),
    /// Several values, each quoted on its own.
    Sequence(Vec<Substitution>),
}

impl Substitution {
    /// Renders the value as one or more shell-safe tokens.
    pub fn render(&self) -> String {
        match self {
            Self::Text(text) => quote(text).into_owned(),
            Self::Output(stdout) => quote(stdout.strip_suffix('\n').unwrap_or(stdout)).into_owned(),
            Self::Sequence(items) => items
                .iter()
                .map(Self::render)
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

macro_rules! text_substitution {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Substitution {
                fn from(value: $ty) -> Self {
                    Self::Text(value.to_string())
                }
            }
        )*
    };
}

text_substitution!(
    &str, String, &String, char, bool, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128,
    usize, f32, f64,
);

impl From<Cow<'_, str>> for Substitution {
    fn from(value: Cow<'_, str>) -> Self {
        Self::Text(value.into_owned())
    }
}

impl From<&Path> for Substitution {
    fn from(value: &Path) -> Self {
        Self::Text(value.to_string_lossy().into_owned())
    }
}

impl From<PathBuf> for Substitution {
    fn from(value: PathBuf) -> Self {
        Self::from(value.as_path())
    }
}

impl From<&PathBuf> for Substitution {
    fn from(value: &PathBuf) -> Self {
        Self::from(value.as_path())
    }
}

impl From<&ProcessOutput> for Substitution {
    fn from(value: &ProcessOutput) -> Self {
        Self::Output(value.stdout().to_string())
    }
}

impl From<ProcessOutput> for Substitution {
    fn from(value: ProcessOutput) -> Self {
        Self::from(&value)
    }
}

impl<T: Into<Substitution>> From<Vec<T>> for Substitution {
    fn from(values: Vec<T>) -> Self {
        Self::Sequence(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Substitution> + Clone> From<&Vec<T>> for Substitution {
    fn from(values: &Vec<T>) -> Self {
        Self::from(values.as_slice())
    }
}

impl<T: Into<Substitution> + Clone> From<&[T]> for Substitution {
    fn from(values: &[T]) -> Self {
        Self::Sequence(values.iter().cloned().map(Into::into).collect())
    }
}

impl<T: Into<Substitution>, const N: usize> From<[T; N]> for Substitution {
    fn from(values: [T; N]) -> Self {
        Self::Sequence(values.into_iter().map(Into::into).collect())
    }
}

/// A fully assembled, shell-ready command line.
///
/// Built once, never mutated. Remembers where it was built so failures can point
/// back at the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    text: String,
    origin: CallSite,
}

impl CommandLine {
    /// Wraps already-final command text, recording the caller as its origin.
    #[track_caller]
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_origin(text, CallSite::here())
    }

    pub fn with_origin(text: impl Into<String>, origin: CallSite) -> Self {
        Self {
            text: text.into(),
            origin,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn origin(&self) -> &CallSite {
        &self.origin
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Splices literal fragments and quoted substitutions: `f0 s0 f1 s1 ... fn`.
///
/// Expects one more fragment than substitutions; the `command!` macro guarantees it
/// at compile time.
#[track_caller]
pub fn assemble(fragments: &[&str], substitutions: &[Substitution]) -> CommandLine {
    debug_assert_eq!(fragments.len(), substitutions.len() + 1);

    let mut text = String::with_capacity(fragments.iter().map(|f| f.len()).sum::<usize>() + substitutions.len() * 16);
    let mut fragments = fragments.iter();
    if let Some(first) = fragments.next() {
        text.push_str(first);
    }
    for (substitution, fragment) in substitutions.iter().zip(fragments) {
        text.push_str(&substitution.render());
        text.push_str(fragment);
    }
    CommandLine::new(text)
}

/// Splits a template at its `{}` placeholders and assembles it.
#[track_caller]
pub fn format_command(template: &str, substitutions: Vec<Substitution>) -> CommandLine {
    let fragments: Vec<&str> = template.split(PLACEHOLDER).collect();
    assemble(&fragments, &substitutions)
}

/// Counts the `{}` placeholders in a template, scanning left to right without overlap
/// (the same way `str::split` finds them). Usable in constant expressions.
#[allow(clippy::indexing_slicing)]
pub const fn count_placeholders(template: &str) -> usize {
    let bytes = template.as_bytes();
    let mut count = 0;
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'{' && bytes[i + 1] == b'}' {
            count += 1;
            i += 2;
        } else {
            i += 1;
        }
    }
    count
}
