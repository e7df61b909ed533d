//! Terminal prompts: hidden secret entry and yes/no confirmation.

use anyhow::{Context, Result};
use passbridge_core::ConfirmationGate;
use std::io::{BufRead, Write};

/// Use `value` if given, otherwise ask for it without echo.
pub fn secret_or_prompt(value: Option<String>, prompt: &str) -> Result<String> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => rpassword::prompt_password(prompt).context("failed to read from terminal"),
    }
}

/// Confirmation gate backed by stdin.
pub struct TerminalGate {
    assume_yes: bool,
}

impl TerminalGate {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl ConfirmationGate for TerminalGate {
    fn confirm(&self, prompt: &str) -> bool {
        if self.assume_yes {
            println!("{} [y/N] y (--yes)", prompt);
            return true;
        }

        print!("{} [y/N] ", prompt);
        if std::io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        match std::io::stdin().lock().read_line(&mut answer) {
            Ok(_) => is_yes(&answer),
            Err(_) => false,
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
