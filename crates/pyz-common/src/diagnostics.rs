//! Diagnostic primitives.
//!
//! The evaluator core itself never emits user-facing diagnostics; it yields
//! structured addenda (see `pyz_solver::diagnostics`) that the surrounding
//! checker maps onto `Diagnostic` values with a file, span, and rendered
//! message.

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticCategory {
    Warning,
    Error,
    Information,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticRelatedInformation {
    pub file: String,
    pub start: u32,
    pub length: u32,
    pub message_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub category: DiagnosticCategory,
    pub file: String,
    pub start: u32,
    pub length: u32,
    pub message_text: String,
    pub related_information: Vec<DiagnosticRelatedInformation>,
}

impl Diagnostic {
    pub fn error(
        file: impl Into<String>,
        start: u32,
        length: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category: DiagnosticCategory::Error,
            message_text: message.into(),
            file: file.into(),
            start,
            length,
            related_information: Vec::new(),
        }
    }

    pub fn with_related(
        mut self,
        file: impl Into<String>,
        start: u32,
        length: u32,
        message: impl Into<String>,
    ) -> Self {
        self.related_information.push(DiagnosticRelatedInformation {
            file: file.into(),
            start,
            length,
            message_text: message.into(),
        });
        self
    }
}

/// Substitute `{0}`, `{1}`, ... placeholders in a message template.
pub fn format_message(message: &str, args: &[&str]) -> String {
    let mut result = message.to_string();
    for (i, arg) in args.iter().enumerate() {
        result = result.replace(&format!("{{{i}}}"), arg);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_message_substitutes_in_order() {
        let rendered = format_message("type \"{0}\" is not assignable to \"{1}\"", &["int", "str"]);
        assert_eq!(rendered, "type \"int\" is not assignable to \"str\"");
    }

    #[test]
    fn related_information_accumulates() {
        let diag = Diagnostic::error("m.py", 0, 4, "mismatch")
            .with_related("m.py", 10, 2, "declared here");
        assert_eq!(diag.related_information.len(), 1);
        assert_eq!(diag.category, DiagnosticCategory::Error);
    }
}
