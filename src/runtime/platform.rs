use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::rc::Rc;

pub const SCRIPTED_INPUT_VAR: &str = "QUILL_TEST_INPUTS";

/// Console endpoint behind `in >>` and `out <<`. Lets tests and embedders
/// swap stdin/stdout for a script.
pub trait Console {
    /// Next whitespace separated token, or `None` at end of input.
    fn read_token(&mut self) -> Option<String>;
    fn write_line(&mut self, line: &str);
}

#[derive(Default)]
pub struct StdConsole {
    pending: VecDeque<String>,
}

impl Console for StdConsole {
    fn read_token(&mut self) -> Option<String> {
        while self.pending.is_empty() {
            let mut line = String::new();
            match io::stdin().lock().read_line(&mut line) {
                Ok(0) | Err(_) => return None,
                Ok(_) => self
                    .pending
                    .extend(line.split_whitespace().map(str::to_string)),
            }
        }
        self.pending.pop_front()
    }

    fn write_line(&mut self, line: &str) {
        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "{line}");
        let _ = stdout.flush();
    }
}

/// Fixed input tokens and captured output lines.
#[derive(Clone, Default)]
pub struct ScriptedConsole {
    inputs: VecDeque<String>,
    output: Rc<RefCell<Vec<String>>>,
}

impl ScriptedConsole {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: tokens.into_iter().map(Into::into).collect(),
            output: Rc::default(),
        }
    }

    /// Tokens from `QUILL_TEST_INPUTS`, separated by `|`.
    pub fn from_env() -> Option<Self> {
        let raw = std::env::var(SCRIPTED_INPUT_VAR).ok()?;
        Some(Self::new(
            raw.split('|')
                .map(str::trim)
                .filter(|token| !token.is_empty()),
        ))
    }

    /// Shared handle on the captured output; stays valid after the console
    /// is moved into a session.
    pub fn output(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.output)
    }
}

impl Console for ScriptedConsole {
    fn read_token(&mut self) -> Option<String> {
        self.inputs.pop_front()
    }

    fn write_line(&mut self, line: &str) {
        self.output.borrow_mut().push(line.to_string());
    }
}

pub fn default_console() -> Box<dyn Console> {
    match ScriptedConsole::from_env() {
        Some(console) => Box::new(console),
        None => Box::new(StdConsole::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_console_replays_tokens_and_captures_output() {
        let mut console = ScriptedConsole::new(["3", "x"]);
        let output = console.output();
        assert_eq!(console.read_token().as_deref(), Some("3"));
        assert_eq!(console.read_token().as_deref(), Some("x"));
        assert_eq!(console.read_token(), None);
        console.write_line("done");
        assert_eq!(output.borrow().as_slice(), ["done".to_string()]);
    }
}
