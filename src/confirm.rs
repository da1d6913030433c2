//! Operator confirmation.
//!
//! Every destructive or run-ending decision goes through a [`Confirmer`].
//! The implementation is chosen once at startup: `--yes` answers yes,
//! a terminal on stdin asks the operator, and anything else answers no so a
//! detached run can never block or destroy data.

use std::io::{self, BufRead, IsTerminal, Write};

use crate::signal;

pub trait Confirmer {
    /// Ask a yes/no question. `default` is used for an empty answer.
    fn confirm(&mut self, question: &str, default: bool) -> bool;

    /// Ask a question that only a person at the console may answer yes to.
    fn confirm_attended(&mut self, question: &str, default: bool) -> bool {
        self.confirm(question, default)
    }
}

/// Reads answers from an input stream, prompting on an output stream.
pub struct Prompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// One line of input, or `None` on EOF, a read error or Ctrl-C.
    ///
    /// SIGINT interrupts a blocked read, and `BufRead::read_line` would
    /// retry it, so lines are assembled here from `fill_buf`.
    fn read_answer(&mut self) -> Option<String> {
        let mut line = Vec::new();
        loop {
            let chunk = match self.input.fill_buf() {
                Ok(chunk) => chunk,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    if signal::cancel_requested() {
                        return None;
                    }
                    continue;
                }
                Err(_) => return None,
            };
            if chunk.is_empty() {
                break;
            }
            match chunk.iter().position(|&b| b == b'\n') {
                Some(end) => {
                    line.extend_from_slice(&chunk[..=end]);
                    self.input.consume(end + 1);
                    break;
                }
                None => {
                    let len = chunk.len();
                    line.extend_from_slice(chunk);
                    self.input.consume(len);
                }
            }
        }
        if line.is_empty() {
            return None;
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

impl<R: BufRead, W: Write> Confirmer for Prompt<R, W> {
    fn confirm(&mut self, question: &str, default: bool) -> bool {
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        loop {
            let _ = write!(self.output, "{} {} ", question, hint);
            let _ = self.output.flush();

            // EOF or a broken stream: nobody is there to say yes.
            let Some(line) = self.read_answer() else {
                let _ = writeln!(self.output);
                return false;
            };
            if signal::cancel_requested() {
                return false;
            }

            match line.trim().to_ascii_lowercase().as_str() {
                "" => return default,
                "y" | "yes" => return true,
                "n" | "no" => return false,
                _ => {
                    let _ = writeln!(self.output, "Please answer 'y' or 'n'.");
                }
            }
        }
    }
}

/// Fixed answer for unattended runs.
#[derive(Debug, Clone, Copy)]
pub struct Unattended {
    answer: bool,
}

impl Unattended {
    /// `--yes`: accept every prompt.
    pub fn assume_yes() -> Self {
        Self { answer: true }
    }

    /// No terminal attached: decline every prompt.
    pub fn decline_all() -> Self {
        Self { answer: false }
    }
}

impl Confirmer for Unattended {
    fn confirm(&mut self, question: &str, _default: bool) -> bool {
        let answer = if self.answer { "yes" } else { "no" };
        println!("{} [{} (non-interactive)]", question, answer);
        self.answer
    }

    fn confirm_attended(&mut self, question: &str, _default: bool) -> bool {
        println!("{} [no (needs an operator)]", question);
        false
    }
}

/// Pick the confirmer for this process.
pub fn select(assume_yes: bool) -> Box<dyn Confirmer> {
    if assume_yes {
        Box::new(Unattended::assume_yes())
    } else if io::stdin().is_terminal() {
        Box::new(Prompt::new(io::stdin().lock(), io::stdout()))
    } else {
        Box::new(Unattended::decline_all())
    }
}
