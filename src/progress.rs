use std::io::Write;
use std::sync::Mutex;

use colored::Colorize as _;

/// User-facing narration of a run: stage banners, status lines and streamed text.
///
/// Stage code reports through this instead of writing to stdout, so it runs
/// unchanged in tests and behind non-terminal front ends.
pub trait Progress: Send + Sync {
    fn header(&self, _text: &str) {}
    fn stage(&self, number: u32, name: &str);
    fn info(&self, message: &str);
    fn success(&self, message: &str);
    fn warning(&self, message: &str);
    /// An indented plain line under the previous status message.
    fn detail(&self, _message: &str) {}
    /// One incremental piece of streamed backend output.
    fn fragment(&self, text: &str);
    /// Called once a streamed reply is complete.
    fn stream_end(&self) {}
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentProgress;

impl Progress for SilentProgress {
    fn stage(&self, _number: u32, _name: &str) {}
    fn info(&self, _message: &str) {}
    fn success(&self, _message: &str) {}
    fn warning(&self, _message: &str) {}
    fn fragment(&self, _text: &str) {}
}

/// Colored narration on a terminal stream, stdout by default.
///
/// Write errors are dropped: a closed pipe must not abort generation.
#[derive(Debug)]
pub struct TerminalProgress<W = std::io::Stdout> {
    out: Mutex<W>,
}

const RULE_WIDTH: usize = 80;

impl TerminalProgress {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::stdout()
    }
}

impl<W: Write + Send> TerminalProgress<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_lines(&self, lines: &[String]) {
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        for line in lines {
            if writeln!(out, "{line}").is_err() {
                return;
            }
        }
        let _ = out.flush();
    }
}

impl<W: Write + Send> Progress for TerminalProgress<W> {
    fn header(&self, text: &str) {
        let rule = "=".repeat(RULE_WIDTH).magenta().bold().to_string();
        self.write_lines(&[
            String::new(),
            rule.clone(),
            format!("{text:^RULE_WIDTH$}").magenta().bold().to_string(),
            rule,
            String::new(),
        ]);
    }

    fn stage(&self, number: u32, name: &str) {
        self.write_lines(&[
            String::new(),
            format!("[Stage {number}] {name}").cyan().bold().to_string(),
            "─".repeat(RULE_WIDTH).cyan().to_string(),
            String::new(),
        ]);
    }

    fn info(&self, message: &str) {
        self.write_lines(&[format!("ℹ {message}").blue().to_string()]);
    }

    fn success(&self, message: &str) {
        self.write_lines(&[format!("✓ {message}").green().to_string()]);
    }

    fn warning(&self, message: &str) {
        self.write_lines(&[format!("⚠ {message}").yellow().to_string()]);
    }

    fn detail(&self, message: &str) {
        self.write_lines(&[format!("  {message}")]);
    }

    fn fragment(&self, text: &str) {
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }

    fn stream_end(&self) {
        self.write_lines(&[String::new(), String::new()]);
    }
}


#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    #[test]
    fn terminal_progress_ignores_a_closed_writer() {
        let progress = TerminalProgress::new(ClosedPipe);
        progress.header("Title");
        progress.stage(1, "SEO Query Generation");
        progress.info("info");
        progress.success("done");
        progress.warning("careful");
        progress.detail("1. Review your eBook");
        progress.fragment("partial");
        progress.stream_end();
    }

    #[test]
    fn terminal_progress_writes_lines_in_order() {
        let progress = TerminalProgress::new(Vec::new());
        progress.stage(3, "Table of Contents Generation");
        progress.fragment("abc");
        progress.fragment("def");
        progress.stream_end();
        progress.detail("Full generation metadata: out/generation_metadata.json");

        let text = String::from_utf8(progress.into_inner()).unwrap_or_default();
        let stage = text.find("[Stage 3] Table of Contents Generation");
        let streamed = text.find("abcdef\n\n");
        let detail = text.find("  Full generation metadata: out/generation_metadata.json\n");
        assert!(stage.is_some(), "{text}");
        assert!(stage < streamed && streamed < detail, "{text}");
    }
}
