//! Confirmation prompts for destructive commands (`clear`, `unlock`).

use anyhow::{Result, bail};
use std::io::{self, BufRead, IsTerminal, Write};

/// Asks a yes/no question on stderr. `force` answers yes without asking.
///
/// Fails when there is no terminal to ask on, so scripts must pass `--force`.
pub fn confirm(message: &str, force: bool) -> Result<bool> {
  if force {
    return Ok(true);
  }

  if !io::stdin().is_terminal() || !io::stderr().is_terminal() {
    bail!("Refusing to modify shared state without confirmation in non-interactive mode. Use --force to proceed.");
  }

  write!(io::stderr(), "{} [y/N] ", message)?;
  io::stderr().flush()?;

  read_answer(io::stdin().lock())
}

fn read_answer(mut input: impl BufRead) -> Result<bool> {
  let mut line = String::new();
  input.read_line(&mut line)?;
  Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
