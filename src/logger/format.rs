//! Console formatting with ANSI colors and word wrapping

use super::levels::LogLevel;
use super::tags::LogTag;
use chrono::Local;
use colored::*;
use std::io::{stdout, ErrorKind, Write};

/// Column widths for alignment
const TAG_WIDTH: usize = 8;
const LEVEL_WIDTH: usize = 7;

/// Maximum line length before wrapping
const MAX_LINE_LENGTH: usize = 140;

/// Format and print a log message
pub fn format_and_log(tag: &LogTag, level: LogLevel, message: &str) {
    let time = Local::now().format("%H:%M:%S").to_string();
    let prefix_width = time.len() + 1 + (TAG_WIDTH + 2) + 1 + (LEVEL_WIDTH + 2) + 1;

    let base_line = format!(
        "{} [{}] [{}] ",
        time.dimmed(),
        format_tag(tag),
        format_level(level)
    );

    let available = MAX_LINE_LENGTH.saturating_sub(prefix_width).max(40);
    let chunks = wrap_text(message, available);

    print_stdout_safe(&format!("{}{}", base_line, chunks[0]));

    let continuation = " ".repeat(prefix_width);
    for chunk in &chunks[1..] {
        print_stdout_safe(&format!("{}{}", continuation, chunk));
    }
}

/// Format a tag with appropriate color
fn format_tag(tag: &LogTag) -> ColoredString {
    let label = format!("{:<width$}", tag.to_plain_string(), width = TAG_WIDTH);
    match tag {
        LogTag::Cache => label.bright_cyan().bold(),
        LogTag::Rpc => label.bright_magenta().bold(),
        LogTag::System => label.bright_yellow().bold(),
        LogTag::Other(_) => label.white().bold(),
    }
}

fn format_level(level: LogLevel) -> ColoredString {
    let label = format!("{:<width$}", level.as_str(), width = LEVEL_WIDTH);
    match level {
        LogLevel::Error => label.bright_red().bold(),
        LogLevel::Warning => label.bright_yellow().bold(),
        LogLevel::Info => label.white().bold(),
        LogLevel::Debug | LogLevel::Verbose => label.dimmed(),
    }
}

/// Print to stdout but ignore broken pipe errors
fn print_stdout_safe(message: &str) {
    let mut out = stdout().lock();
    if let Err(e) = writeln!(out, "{}", message).and_then(|_| out.flush()) {
        if e.kind() != ErrorKind::BrokenPipe {
            let _ = writeln!(std::io::stderr(), "Logger stdout error: {}", e);
        }
    }
}

/// Wrap text at word boundaries, respecting existing newlines
///
/// Words longer than `max_width` (addresses, URLs) are split hard.
fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    let mut result = Vec::new();

    for line in text.split('\n') {
        if line.chars().count() <= max_width {
            result.push(line.to_string());
            continue;
        }

        let mut current = String::new();
        for word in line.split_whitespace() {
            let word_len = word.chars().count();
            let current_len = current.chars().count();

            if word_len > max_width {
                if !current.is_empty() {
                    result.push(std::mem::take(&mut current));
                }
                let chars: Vec<char> = word.chars().collect();
                for piece in chars.chunks(max_width) {
                    result.push(piece.iter().collect());
                }
            } else if current.is_empty() {
                current = word.to_string();
            } else if current_len + 1 + word_len <= max_width {
                current.push(' ');
                current.push_str(word);
            } else {
                result.push(std::mem::replace(&mut current, word.to_string()));
            }
        }

        if !current.is_empty() {
            result.push(current);
        }
    }

    if result.is_empty() {
        result.push(String::new());
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_short_line_untouched() {
        assert_eq!(wrap_text("cache hit", 40), vec!["cache hit".to_string()]);
    }

    #[test]
    fn test_wrap_splits_on_words_and_long_addresses() {
        let address = "0x".to_string() + &"ab".repeat(30);
        let text = format!("refresh failed for {}", address);
        let lines = wrap_text(&text, 20);

        assert_eq!(lines[0], "refresh failed for");
        assert!(lines.iter().all(|l| l.chars().count() <= 20));
        assert_eq!(lines[1..].concat(), address);
    }
}
