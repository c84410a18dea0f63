// src/system/console.rs

use colored::Colorize;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref FIRST_TOKEN: Regex = Regex::new(r"^[\w_.-]+(\s|$)").expect("valid first-token regex");
}

/// Prints a command the way a shell transcript would show it.
pub fn print_command(command: &str) {
    println!("{}", format_command(command));
}

/// `$ cmd` for one-liners; multi-line commands continue with `> ` prompts.
pub fn format_command(command: &str) -> String {
    if command.contains('\n') {
        command
            .split('\n')
            .enumerate()
            .map(|(i, line)| format!("{} {}", if i == 0 { "$" } else { ">" }, colorize(line)))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        format!("$ {}", colorize(command))
    }
}

/// Highlights the program name (the first word) of a command line.
pub fn colorize(line: &str) -> String {
    match FIRST_TOKEN.find(line) {
        Some(token) => format!(
            "{}{}",
            token.as_str().bright_green(),
            line.get(token.end()..).unwrap_or_default()
        ),
        None => line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test: the color override is process-wide.
    #[test]
    fn test_format_command_and_colorize() {
        colored::control::set_override(false);
        assert_eq!(format_command("ls -la"), "$ ls -la");
        assert_eq!(format_command("cat <<EOF\nhi\nEOF"), "$ cat <<EOF\n> hi\n> EOF");
        assert_eq!(colorize("  indented"), "  indented");

        colored::control::set_override(true);
        let line = colorize("git status --short");
        assert!(line.starts_with("\x1b["));
        assert!(line.ends_with("status --short"));
        colored::control::unset_override();
    }
}
