//! The raw, serde-deserialized form of grammar and transpiler data.
//!
//! Grammar files are nested maps and sequences; any format that deserializes through
//! serde works. The file loaders understand `.json` and `.toml`.

use crate::{GrammarError, GrammarErrorKind};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawGrammar {
    pub start_rule: Option<String>,
    #[serde(default)]
    pub rules: HashMap<String, RawExpr>,
    pub lexer: Option<Vec<RawTokenEntry>>,
    #[serde(default)]
    pub includes: Vec<String>,
}

/// A rule body node. Exactly one structural key must be set; `ast` rides alongside.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawExpr {
    pub literal: Option<String>,
    pub regex: Option<String>,
    pub token: Option<String>,
    pub rule: Option<String>,
    pub sequence: Option<Vec<RawExpr>>,
    pub choice: Option<Vec<RawExpr>>,
    pub zero_or_more: Option<Box<RawExpr>>,
    pub one_or_more: Option<Box<RawExpr>>,
    pub optional: Option<Box<RawExpr>>,
    pub positive_lookahead: Option<Box<RawExpr>>,
    pub negative_lookahead: Option<Box<RawExpr>>,
    pub subgrammar: Option<RawSubgrammar>,
    pub ast: Option<RawAst>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSubgrammar {
    pub file: String,
    pub rule: Option<String>,
    pub placeholder: Option<Box<RawExpr>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawAst {
    pub tag: Option<String>,
    pub discard: Option<bool>,
    pub promote: Option<bool>,
    pub leaf: Option<bool>,
    #[serde(rename = "type")]
    pub type_: Option<RawValueType>,
    pub name: Option<String>,
    pub structure: Option<RawStructure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawValueType {
    Number,
    Bool,
    Null,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawStructure {
    Named(String),
    Mapped {
        tag: String,
        map_children: HashMap<String, usize>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTokenEntry {
    pub regex: String,
    pub token: Option<String>,
    pub action: Option<RawLexAction>,
    pub ast: Option<RawAst>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawLexAction {
    Skip,
    HandleIndent,
}

impl RawGrammar {
    pub fn load_from_file(path: &Path) -> Result<RawGrammar, GrammarError> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            GrammarError::new(
                GrammarErrorKind::SubgrammarNotFound,
                format!("failed to read grammar file: {}", err),
            )
            .with_file(path)
        })?;
        let loaded = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::load_from_json(&text),
            _ => Self::load_from_toml(&text),
        };
        loaded.map_err(|err| err.with_file(path))
    }

    pub fn load_from_json(text: &str) -> Result<RawGrammar, GrammarError> {
        serde_json::from_str(text).map_err(|err| {
            GrammarError::new(
                GrammarErrorKind::MalformedDirective,
                format!("failed to deserialize grammar json: {}", err),
            )
        })
    }

    pub fn load_from_toml(text: &str) -> Result<RawGrammar, GrammarError> {
        toml::from_str(text).map_err(|err| {
            GrammarError::new(
                GrammarErrorKind::MalformedDirective,
                format!("failed to deserialize grammar toml: {}", err),
            )
        })
    }
}

/// The raw form of a transpiler rule set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTranspiler {
    pub transpiler: Option<RawTranspilerOptions>,
    #[serde(default)]
    pub rules: HashMap<String, RawTranspileRule>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTranspilerOptions {
    pub indent: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawTranspileRule {
    pub template: Option<String>,
    #[serde(rename = "use")]
    pub use_: Option<String>,
    pub value: Option<String>,
    pub cases: Option<Vec<RawCase>>,
    pub state_set: Option<HashMap<String, RawStateValue>>,
    pub join_children_with: Option<String>,
    pub indent: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawCase {
    #[serde(rename = "if")]
    pub if_: Option<RawCondition>,
    pub then: Option<String>,
    pub default: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCondition {
    pub path: String,
    pub equals: Option<String>,
    pub negate: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawStateValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl RawTranspiler {
    pub fn load_from_file(path: &Path) -> Result<RawTranspiler, GrammarError> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            GrammarError::new(
                GrammarErrorKind::SubgrammarNotFound,
                format!("failed to read transpiler file: {}", err),
            )
            .with_file(path)
        })?;
        let loaded = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&text).map_err(|err| {
                GrammarError::new(
                    GrammarErrorKind::MalformedDirective,
                    format!("failed to deserialize transpiler json: {}", err),
                )
            }),
            _ => toml::from_str(&text).map_err(|err| {
                GrammarError::new(
                    GrammarErrorKind::MalformedDirective,
                    format!("failed to deserialize transpiler toml: {}", err),
                )
            }),
        };
        loaded.map_err(|err| err.with_file(path))
    }
}
