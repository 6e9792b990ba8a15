//! Diagnostic collection.
//!
//! Warnings and errors raised while lexing, checking or optimizing a module
//! are both logged immediately (via the `log` facade, so the binary's
//! `env_logger` formats them alongside everything else) and accumulated
//! here, so a front end can report a final count and decide an exit code
//! without re-deriving it from the log stream.

use std::fmt;

use crate::lexer::Loc;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Severity { Warning, Error }

#[derive(Clone, Debug)]
pub struct Diagnostic {
  pub severity: Severity,
  pub message: String,
  pub loc: Option<Loc>,
}

impl fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.loc {
      Some(loc) => write!(f, "{}:{}: {}", loc.row, loc.col, self.message),
      None => write!(f, "{}", self.message),
    }
  }
}

/// Accumulates diagnostics for one compilation run.
#[derive(Default)]
pub struct Diagnostics {
  entries: Vec<Diagnostic>,
  errors: usize,
  warnings: usize,
}

impl Diagnostics {
  pub fn new() -> Self { Self::default() }

  pub fn warn(&mut self, message: impl Into<String>, loc: Option<Loc>) {
    let message = message.into();
    log::warn!("{message}");
    self.warnings += 1;
    self.entries.push(Diagnostic { severity: Severity::Warning, message, loc });
  }

  pub fn error(&mut self, message: impl Into<String>, loc: Option<Loc>) {
    let message = message.into();
    log::error!("{message}");
    self.errors += 1;
    self.entries.push(Diagnostic { severity: Severity::Error, message, loc });
  }

  pub fn error_count(&self) -> usize { self.errors }
  pub fn warning_count(&self) -> usize { self.warnings }
  pub fn has_errors(&self) -> bool { self.errors > 0 }
  pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> { self.entries.iter() }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn counts_track_severity() {
    let mut d = Diagnostics::new();
    d.warn("careful", None);
    d.error("nope", Some(Loc { row: 1, col: 2 }));
    assert_eq!(d.warning_count(), 1);
    assert_eq!(d.error_count(), 1);
    assert!(d.has_errors());
  }
}
