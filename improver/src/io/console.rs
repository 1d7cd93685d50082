//! Operator console: interactive questions and progress panels.
//!
//! This is product output, separate from `tracing` diagnostics.

use std::cell::RefCell;
use std::io::{BufRead, Write};

use anyhow::{Context, Result};

/// Interactive surface the loop talks to.
pub trait Console {
    /// Print `question` and block for one line of input. End of input reads
    /// as an empty answer.
    fn ask(&self, question: &str) -> Result<String>;

    /// Show a titled block of text.
    fn show(&self, title: &str, body: &str);

    /// Show a single status line.
    fn note(&self, line: &str);
}

/// Whether an answer counts as "yes". Only `y` is affirmative.
pub fn is_affirmative(answer: &str) -> bool {
    answer.trim().to_lowercase() == "y"
}

/// Console bound to arbitrary reader/writer pairs; [`StdConsole`] wraps
/// stdin/stdout.
pub struct LineConsole<R, W> {
    input: RefCell<R>,
    output: RefCell<W>,
}

impl<R: BufRead, W: Write> LineConsole<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input: RefCell::new(input),
            output: RefCell::new(output),
        }
    }

    pub fn into_output(self) -> W {
        self.output.into_inner()
    }

    fn emit(&self, text: &str) {
        let mut out = self.output.borrow_mut();
        // Console output is best effort; a closed stdout must not abort a run.
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}

impl<R: BufRead, W: Write> Console for LineConsole<R, W> {
    fn ask(&self, question: &str) -> Result<String> {
        self.emit(question);
        self.emit(" ");
        let mut line = String::new();
        self.input
            .borrow_mut()
            .read_line(&mut line)
            .context("read answer")?;
        Ok(line.trim().to_string())
    }

    fn show(&self, title: &str, body: &str) {
        let rule = "-".repeat(title.chars().count().max(8) + 4);
        self.emit(&format!(
            "\n{rule}\n| {title} |\n{rule}\n{}\n{rule}\n",
            body.trim_end()
        ));
    }

    fn note(&self, line: &str) {
        self.emit(line);
        self.emit("\n");
    }
}

pub type StdConsole = LineConsole<std::io::StdinLock<'static>, std::io::Stdout>;

impl StdConsole {
    pub fn stdio() -> Self {
        LineConsole::new(std::io::stdin().lock(), std::io::stdout())
    }
}
