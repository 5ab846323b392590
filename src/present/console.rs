//! Terminal display sink

use std::io::Write;

use crossterm::style::Stylize;

/// Where model output and status messages are shown
pub trait DisplaySink: Send + Sync {
    /// Write text as-is, without a trailing newline
    fn write(&self, text: &str);

    /// Mark the end of one model response
    fn end_response(&self) {
        self.write("\n");
    }

    /// Write a full line
    fn line(&self, text: &str) {
        self.write(text);
        self.write("\n");
    }

    /// Report a failure to the user
    fn error(&self, text: &str) {
        self.line(text);
    }
}

/// Writes to stdout
///
/// Newlines are written as `\r\n` so output stays aligned while the terminal
/// is in raw mode for key listening.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl ConsoleSink {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl DisplaySink for ConsoleSink {
    fn write(&self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        let result = stdout
            .write_all(normalize_newlines(text).as_bytes())
            .and_then(|()| stdout.flush());
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to write to stdout");
        }
    }

    fn error(&self, text: &str) {
        self.line(&format!("{}", text.red()));
    }
}

fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newlines_become_crlf_once() {
        assert_eq!(normalize_newlines("a\nb"), "a\r\nb");
        assert_eq!(normalize_newlines("a\r\nb\n"), "a\r\nb\r\n");
        assert_eq!(normalize_newlines("plain"), "plain");
    }
}
