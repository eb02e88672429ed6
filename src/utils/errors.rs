use std::fmt;
use std::path::Path;

use colored::Colorize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

impl DiagnosticSeverity {
    fn label(self) -> &'static str {
        match self {
            DiagnosticSeverity::Error => "Error",
            DiagnosticSeverity::Warning => "Warning",
        }
    }
}

/// One `path:line:Error: <message>` diagnostic line. Validation and
/// header resolution accumulate these instead of failing fast, so a single
/// pass surfaces every problem in the unit.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    severity: DiagnosticSeverity,
    path: String,
    line: Option<usize>,
    message: String,
}

impl Diagnostic {
    pub fn error(path: &Path, line: Option<usize>, message: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Error, path, line, message)
    }

    pub fn warning(path: &Path, line: Option<usize>, message: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Warning, path, line, message)
    }

    pub fn new(
        severity: DiagnosticSeverity,
        path: &Path,
        line: Option<usize>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            path: path.display().to_string(),
            line,
            message: message.into(),
        }
    }

    pub fn severity(&self) -> DiagnosticSeverity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(
                f,
                "{}:{}:{}: {}",
                self.path,
                line,
                self.severity.label(),
                self.message
            ),
            None => write!(f, "{}:{}: {}", self.path, self.severity.label(), self.message),
        }
    }
}

/// Prints accumulated diagnostics to stderr, errors in red, warnings in
/// yellow. Returns `true` when at least one error was present.
pub fn emit_diagnostics(diagnostics: &[Diagnostic]) -> bool {
    let mut any_error = false;
    for diagnostic in diagnostics {
        let line = diagnostic.to_string();
        match diagnostic.severity {
            DiagnosticSeverity::Error => {
                any_error = true;
                eprintln!("{}", line.red());
            }
            DiagnosticSeverity::Warning => eprintln!("{}", line.yellow()),
        }
    }
    any_error
}
