// src/core/quote.rs

use lazy_static::lazy_static;
use regex::Regex;
use std::borrow::Cow;

lazy_static! {
    static ref SAFE_TOKEN: Regex = Regex::new(r"^[A-Za-z0-9/_.-]+$").expect("valid token regex");
}

/// Turns an arbitrary value into a token that a POSIX shell reads back verbatim.
///
/// Simple tokens (letters, digits, `/`, `_`, `.`, `-`) and the empty string are
/// returned untouched. Anything else is wrapped in an ANSI-C quoted string
/// (`$'...'`), so no globbing, word splitting or expansion can happen.
pub fn quote(arg: &str) -> Cow<'_, str> {
    if arg.is_empty() || SAFE_TOKEN.is_match(arg) {
        return Cow::Borrowed(arg);
    }

    let mut quoted = String::with_capacity(arg.len() + 3);
    quoted.push_str("$'");
    for c in arg.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            '\x0C' => quoted.push_str("\\f"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            '\x0B' => quoted.push_str("\\v"),
            '\0' => quoted.push_str("\\0"),
            other => quoted.push(other),
        }
    }
    quoted.push('\'');
    Cow::Owned(quoted)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn test_simple_tokens_are_left_alone() {
        assert_eq!(quote("ls"), "ls");
        assert_eq!(quote("./src/main.rs"), "./src/main.rs");
        assert_eq!(quote("a-b_c.D9"), "a-b_c.D9");
        assert!(matches!(quote("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_empty_string_is_returned_unescaped() {
        assert_eq!(quote(""), "");
    }

    #[test]
    fn test_special_characters_use_ansi_c_quoting() {
        assert_eq!(quote("foo bar"), "$'foo bar'");
        assert_eq!(quote("it's"), "$'it\\'s'");
        assert_eq!(quote("a\\b"), "$'a\\\\b'");
        assert_eq!(quote("l1\nl2\tx"), "$'l1\\nl2\\tx'");
        assert_eq!(quote("\r\x0B\x0C"), "$'\\r\\v\\f'");
        assert_eq!(quote("$HOME"), "$'$HOME'");
    }

    #[test]
    fn test_quoted_values_round_trip_through_bash() {
        let samples = [
            "",
            "plain",
            "foo bar",
            "bar\"\";baz!$#^$'&*~*%)({}||\\/",
            "tab\there",
            "multi\nline\n",
            "quote ' and backslash \\",
            "glob * ? [a-z]",
            "`uname` $(uname)",
            "ünïcödé",
        ];
        for sample in samples {
            let script = format!("printf '%s' {}", quote(sample));
            let output = Command::new("bash").arg("-c").arg(&script).output().unwrap();
            assert!(output.status.success(), "script failed: {script}");
            assert_eq!(String::from_utf8(output.stdout).unwrap(), sample, "script: {script}");
        }
    }
}
