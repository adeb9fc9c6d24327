use crate::{GrammarError, GrammarErrorKind, LexError, ParseError, TranspileError};
use crate::{Code, Position};
use std::fmt::{Display, Formatter};
use std::path::Path;

impl GrammarError {
    pub fn new(kind: GrammarErrorKind, message: String) -> Self {
        Self {
            kind,
            message,
            file: None,
            rule: None,
        }
    }

    pub fn in_rule(kind: GrammarErrorKind, rule: &str, message: String) -> Self {
        Self {
            kind,
            message,
            file: None,
            rule: Some(rule.to_string()),
        }
    }

    pub fn with_file(mut self, file: &Path) -> Self {
        self.file = Some(file.to_path_buf());
        self
    }
}

impl Display for GrammarErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            GrammarErrorKind::UnknownRule => "UnknownRule",
            GrammarErrorKind::Unreachable => "Unreachable",
            GrammarErrorKind::BadStructure => "BadStructure",
            GrammarErrorKind::IncludeCycle => "IncludeCycle",
            GrammarErrorKind::SubgrammarNotFound => "SubgrammarNotFound",
            GrammarErrorKind::MalformedDirective => "MalformedDirective",
        };
        write!(f, "{}", label)
    }
}

impl Display for GrammarError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GrammarError[{}]: {}", self.kind, self.message)?;
        if let Some(rule) = &self.rule {
            write!(f, " (rule '{}')", rule)?;
        }
        if let Some(file) = &self.file {
            write!(f, " (file '{}')", file.display())?;
        }
        Ok(())
    }
}

impl std::error::Error for GrammarError {}

impl LexError {
    pub fn new(code: &Code, pointer: usize, message: String) -> Self {
        let position = code.obtain_position(pointer);
        Self {
            pointer: position.offset,
            line: position.line,
            col: position.column,
            message,
        }
    }
}

impl Display for LexError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "LexError: {} at line {} column {}",
            self.message, self.line, self.col
        )
    }
}

impl std::error::Error for LexError {}

impl ParseError {
    pub fn new(position: Position, message: String, rule_stack: Vec<String>) -> Self {
        Self {
            pointer: position.offset,
            line: position.line,
            col: position.column,
            message,
            rule_stack,
        }
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SyntaxError: {} at line {} column {}",
            self.message, self.line, self.col
        )?;
        if !self.rule_stack.is_empty() {
            write!(f, " (in {})", self.rule_stack.join(" > "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

impl TranspileError {
    pub fn new(node_tag: &str, line: usize, col: usize, message: String) -> Self {
        Self {
            node_tag: node_tag.to_string(),
            line,
            col,
            message,
        }
    }
}

impl Display for TranspileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TranspileError: {} (node '{}' at line {} column {})",
            self.message, self.node_tag, self.line, self.col
        )
    }
}

impl std::error::Error for TranspileError {}
