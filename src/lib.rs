//! Koine is a data-driven language toolkit to parse text into an abstract syntax tree ([AST](AstNode))
//! and to transpile such trees back into text.
//!
//! # Overview
//! Parsers are usually produced either by writing custom code by hand or by running a parser
//! generator over a grammar written in the generator's DSL.
//! This library takes a third route: the grammar is plain data, nested maps and sequences
//! loadable from JSON or TOML files, and is compiled at runtime into an executable
//! [CompiledGrammar].
//! A [Parser] then recognizes input with PEG semantics (ordered choice, greedy quantifiers,
//! lookaheads), optionally driven by a token-producing lexer with layout-sensitive
//! `INDENT`/`DEDENT` emission, and shapes the raw parse into a semantic AST according to
//! per-rule `ast` directives.
//! A [Transpiler] walks such an AST under a second data-driven rule set of templates,
//! conditionals and a mutable traversal state and renders output text with automatic
//! indentation management.
//!
//! # Design
//!
//! Grammar data is deserialized into a [raw model](RawGrammar) and compiled in three phases:
//! include merging, subgrammar expansion with filename-derived namespacing, and validation
//! (reference resolution, reachability, structural lints).
//! The executable form is a closed [rule expression](grammar::RuleExpr) sum; the recognizer is a
//! single interpreter over either the character stream or the token stream.
//! Recognition failures are first-class values inside the engine; only the top level converts
//! the farthest recorded failure into a [ParseError].
//!
//! # Example
//!
//! ```
//! use koine::{compile_grammar, Parser, RawGrammar};
//! use serde_json::json;
//!
//! let raw: RawGrammar = serde_json::from_value(json!({
//!     "start_rule": "pair",
//!     "rules": {
//!         "pair": {
//!             "sequence": [
//!                 { "rule": "word", "ast": { "name": "key" } },
//!                 { "literal": "=", "ast": { "discard": true } },
//!                 { "rule": "word", "ast": { "name": "value" } }
//!             ]
//!         },
//!         "word": { "regex": "[a-z]+", "ast": { "leaf": true } }
//!     }
//! }))
//! .unwrap();
//!
//! let parser = Parser::new(compile_grammar(raw, None).unwrap());
//! let ast = parser.parse("left=right").unwrap();
//! assert_eq!(ast.tag, "pair");
//! assert_eq!(ast.get("key").unwrap().text, "left");
//! assert_eq!(ast.get("value").unwrap().text, "right");
//! ```
//!
//! # License
//! [koine](crate) is provided under the MIT license.

mod ast;
mod error;
pub mod examples;
pub mod grammar;
mod lexer;
mod parser;
pub mod transpiler;
mod util;

use once_cell::unsync::OnceCell;
use std::collections::HashMap;
use std::path::PathBuf;

pub use grammar::raw::{RawGrammar, RawTranspiler};
pub use grammar::{
    compile_grammar, compile_grammar_from_file, compile_grammar_placeholder, CompiledGrammar,
};
pub use transpiler::Transpiler;
pub use util::{Code, Log, Position};

#[derive(Debug, Clone, PartialEq)]
/// Element of the tokenized data, produced only in lexer mode.
pub struct Lex {
    pub token: String,
    pub start: usize,
    pub end: usize,
    pub value: Option<AstValue>,
}

#[derive(Debug, Clone, PartialEq)]
/// A coerced leaf value attached to an [AstNode] or [Lex] by a `type` directive.
pub enum AstValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
/// Children of an [AstNode]: none for leaves, an ordered list, or a map keyed by
/// the `name` directives of the producing sequence (or by structure keys).
pub enum Children {
    Leaf,
    List(Vec<AstNode>),
    Named(HashMap<String, AstNode>),
}

#[derive(Clone, PartialEq)]
/// Abstract syntax tree (AST) of the parsed input.
pub struct AstNode {
    pub tag: String,
    pub text: String,
    pub line: usize,
    pub col: usize,
    pub value: Option<AstValue>,
    pub children: Children,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Classification of grammar compilation failures.
pub enum GrammarErrorKind {
    UnknownRule,
    Unreachable,
    BadStructure,
    IncludeCycle,
    SubgrammarNotFound,
    MalformedDirective,
}

#[derive(Debug)]
/// An error returned when grammar data fails to compile into a [CompiledGrammar].
pub struct GrammarError {
    pub kind: GrammarErrorKind,
    pub message: String,
    pub file: Option<PathBuf>,
    pub rule: Option<String>,
}

#[derive(Debug)]
/// An error returned when the lexer cannot split the input into tokens.
pub struct LexError {
    pub pointer: usize,
    pub line: usize,
    pub col: usize,
    pub message: String,
}

#[derive(Debug)]
/// An error returned when the parser failed to recognize the input.
///
/// The reported position is the farthest failure across the entire parse, together with
/// the rule stack that was active when that failure was recorded.
pub struct ParseError {
    pub pointer: usize,
    pub line: usize,
    pub col: usize,
    pub message: String,
    pub rule_stack: Vec<String>,
}

#[derive(Debug)]
/// An error returned when the transpiler cannot render an AST node.
pub struct TranspileError {
    pub node_tag: String,
    pub line: usize,
    pub col: usize,
    pub message: String,
}

/// A parser structure holding a compiled grammar, reusable across parse calls.
pub struct Parser {
    grammar: CompiledGrammar,
    debug: OnceCell<Log<&'static str>>,
}
