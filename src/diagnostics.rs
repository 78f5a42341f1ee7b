//! Append-only diagnostic sink shared by the resolution and synthesis steps.
//!
//! Diagnostics never abort a generation pass; they are collected, echoed as
//! tracing events, and handed back to the caller with the generated output.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Qualified name of the model or function the message is about
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        match &self.subject {
            Some(subject) => write!(f, "{}: [{}] {}", level, subject, self.message),
            None => write!(f, "{}: {}", level, self.message),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, subject: Option<&str>, message: impl Into<String>) {
        self.push(Severity::Error, subject, message.into());
    }

    pub fn warning(&mut self, subject: Option<&str>, message: impl Into<String>) {
        self.push(Severity::Warning, subject, message.into());
    }

    fn push(&mut self, severity: Severity, subject: Option<&str>, message: String) {
        match severity {
            Severity::Error => tracing::error!("{}", message),
            Severity::Warning => tracing::warn!("{}", message),
        }
        self.entries.push(Diagnostic {
            severity,
            message,
            subject: subject.map(str::to_string),
        });
    }

    /// Appends another sink's entries after this one's.
    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn count(&self, severity: Severity) -> usize {
        self.entries.iter().filter(|d| d.severity == severity).count()
    }

    /// Messages of every entry, in report order.
    pub fn messages(&self) -> Vec<&str> {
        self.entries.iter().map(|d| d.message.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let mut sink = Diagnostics::new();
        sink.error(Some("a.Model"), "broken");
        sink.warning(None, "odd");
        sink.error(None, "also broken");

        assert_eq!(sink.error_count(), 2);
        assert_eq!(sink.warning_count(), 1);
        assert!(sink.has_errors());
    }

    #[test]
    fn test_extend_keeps_order() {
        let mut first = Diagnostics::new();
        first.error(None, "one");
        let mut second = Diagnostics::new();
        second.warning(None, "two");
        second.error(None, "three");

        first.extend(second);
        assert_eq!(first.messages(), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_display() {
        let mut sink = Diagnostics::new();
        sink.error(Some("a.Counter"), "Init function not found.");
        assert_eq!(
            sink.entries()[0].to_string(),
            "error: [a.Counter] Init function not found."
        );
    }
}
