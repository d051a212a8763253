//! Generation-time diagnostics.
//!
//! The schema builder collects every problem in the input before giving up,
//! so a single run reports all of them.
use std::fmt;

use colored::Colorize;
use serde::Serialize;
use thiserror::Error;

use crate::decl::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticKind {
    UnsupportedType,
    NameCollision,
    InvalidReceiver,
    EmptyEnum,
    DuplicateDeclaration,
    InvalidIdentifier,
    InvalidTransfer,
}

impl DiagnosticKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticKind::UnsupportedType => "unsupported-type",
            DiagnosticKind::NameCollision => "name-collision",
            DiagnosticKind::InvalidReceiver => "invalid-receiver",
            DiagnosticKind::EmptyEnum => "empty-enum",
            DiagnosticKind::DuplicateDeclaration => "duplicate-declaration",
            DiagnosticKind::InvalidIdentifier => "invalid-identifier",
            DiagnosticKind::InvalidTransfer => "invalid-transfer",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    #[serde(rename = "type")]
    pub kind: DiagnosticKind,
    pub location: Location,
    /// Dotted path to the offending item, e.g. `Person.address`.
    pub subject: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        kind: DiagnosticKind,
        location: &Location,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            location: location.clone(),
            subject: subject.into(),
            message: message.into(),
        }
    }

    /// Multi-line, optionally colored rendering for terminals.
    pub fn render(&self) -> String {
        format!(
            "{}{}{}{} {}\n  {} {} ({})",
            "error".red().bold(),
            "[".bold(),
            self.kind.as_str().bold(),
            "]:".bold(),
            self.message,
            "-->".blue().bold(),
            self.location,
            self.subject,
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: [{}] {}: {}", self.location, self.kind, self.subject, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Error)]
#[serde(transparent)]
#[error("schema rejected with {} diagnostic(s)", .0.len())]
pub struct Diagnostics(pub Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        tracing::debug!(kind = %diagnostic.kind, subject = %diagnostic.subject, "diagnostic");
        self.0.push(diagnostic);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    pub fn has_kind(&self, kind: DiagnosticKind) -> bool {
        self.0.iter().any(|d| d.kind == kind)
    }

    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(move |d| d.kind == kind)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for diagnostic in &self.0 {
            out.push_str(&diagnostic.render());
            out.push('\n');
        }
        out.push_str(&format!("{}: {self}", "error".red().bold()));
        out
    }
}
