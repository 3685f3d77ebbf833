//! Diagnostic sink for errors across all phases
//!
//! Every phase logs through one sink so the driver can decide exit codes and
//! whether codegen may run. Lex, parse, resolve and type errors accumulate;
//! none of them aborts its phase.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The pipeline phase a diagnostic originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Scanner
    Lex,
    /// Parser
    Parse,
    /// Resolver (binding + types)
    Resolve,
    /// Virtual machine or classic back-end
    Runtime,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Lex => write!(f, "lex"),
            Phase::Parse => write!(f, "parse"),
            Phase::Resolve => write!(f, "resolve"),
            Phase::Runtime => write!(f, "runtime"),
        }
    }
}

/// A single reported problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Originating phase
    pub phase: Phase,
    /// 1-based source line
    pub line: u32,
    /// Offending lexeme, when a token is at hand
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub lexeme: Option<String>,
    /// Human-readable message
    pub message: String,
}

impl Diagnostic {
    /// Format as the classic `[Line N] Error at 'x': msg` report
    pub fn to_report_string(&self) -> String {
        match &self.lexeme {
            Some(lexeme) if !lexeme.is_empty() => format!(
                "[Line {}] Error at '{}': {}",
                self.line, lexeme, self.message
            ),
            _ => format!("[Line {}] Error: {}", self.line, self.message),
        }
    }

    /// Format as compact JSON
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Collects diagnostics from every phase of one run
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
    runtime_errors: usize,
}

impl DiagnosticSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Log a scanner error
    pub fn lex_error(&mut self, line: u32, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            phase: Phase::Lex,
            line,
            lexeme: None,
            message: message.into(),
        });
    }

    /// Log a parser error at a token
    pub fn parse_error(&mut self, line: u32, lexeme: impl Into<String>, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            phase: Phase::Parse,
            line,
            lexeme: Some(lexeme.into()),
            message: message.into(),
        });
    }

    /// Log a resolver/type error at a token
    pub fn resolve_error(
        &mut self,
        line: u32,
        lexeme: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.diagnostics.push(Diagnostic {
            phase: Phase::Resolve,
            line,
            lexeme: Some(lexeme.into()),
            message: message.into(),
        });
    }

    /// Log a runtime error (already formatted by the VM)
    pub fn runtime_error(&mut self, line: u32, message: impl Into<String>) {
        self.runtime_errors += 1;
        self.diagnostics.push(Diagnostic {
            phase: Phase::Runtime,
            line,
            lexeme: None,
            message: message.into(),
        });
    }

    /// True when any compile-stage error was logged
    pub fn had_error(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.phase != Phase::Runtime)
    }

    /// True when a runtime error was logged
    pub fn had_runtime_error(&self) -> bool {
        self.runtime_errors > 0
    }

    /// All collected diagnostics, in log order
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Drop compile-stage diagnostics, keeping the sink reusable (REPL)
    pub fn clear(&mut self) {
        self.diagnostics.clear();
        self.runtime_errors = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_counting() {
        let mut sink = DiagnosticSink::new();
        assert!(!sink.had_error());

        sink.parse_error(3, ";", "Expect expression.");
        assert!(sink.had_error());
        assert!(!sink.had_runtime_error());

        sink.runtime_error(4, "Divide by zero.");
        assert!(sink.had_runtime_error());
    }

    #[test]
    fn test_report_format() {
        let mut sink = DiagnosticSink::new();
        sink.resolve_error(2, "x", "Name \"x\" is not exist.");
        assert_eq!(
            sink.diagnostics()[0].to_report_string(),
            "[Line 2] Error at 'x': Name \"x\" is not exist."
        );
    }

    #[test]
    fn test_json_roundtrip() {
        let diag = Diagnostic {
            phase: Phase::Resolve,
            line: 7,
            lexeme: Some("y".into()),
            message: "Name \"y\" is not exist.".into(),
        };
        let json = diag.to_json_string().unwrap();
        let back: Diagnostic = serde_json::from_str(&json).unwrap();
        assert_eq!(back, diag);
    }
}
