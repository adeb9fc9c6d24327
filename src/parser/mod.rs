//! The PEG recognizer and the parse session plumbing around it.
//!
//! Recognition failure is a first-class value ([ProductionError]) threaded up the
//! combinator stack; only the top-level [Parser::parse] converts the farthest
//! recorded failure into a user-visible [ParseError].

mod recognizer;
mod shaper;

#[cfg(test)]
mod __tests__;

use crate::grammar::CompiledGrammar;
use crate::lexer::Tokenizer;
use crate::util::{Code, Log};
use crate::{AstNode, Children, Lex, LexError, ParseError, Parser};
use recognizer::Session;
use std::collections::HashMap;

/// A shaped child together with the `name` its producing part carried, consumed by
/// the enclosing sequence when it builds keyed children.
#[derive(Debug, Clone)]
pub(crate) struct Shaped {
    pub name: Option<String>,
    pub node: AstNode,
}

impl Shaped {
    pub fn anonymous(node: AstNode) -> Self {
        Self { name: None, node }
    }
}

#[derive(Debug, Clone)]
/// An `Ok` result value returned from a combinator when it consumed a derivation.
pub(crate) struct SuccessData {
    pub consumed_index: usize,
    pub children: Vec<Shaped>,
}

impl SuccessData {
    pub fn new(consumed_index: usize, children: Vec<Shaped>) -> Self {
        Self {
            consumed_index,
            children,
        }
    }

    pub fn hidden(consumed_index: usize) -> Self {
        Self {
            consumed_index,
            children: Vec::with_capacity(0),
        }
    }
}

#[derive(Debug, Clone)]
/// A failure inside the recognizer.
///
/// `Unparsed` is an ordinary PEG failure and backtracks; `Validation` carries a byte
/// pointer and message and aborts the parse without backtracking (shape violations).
pub(crate) enum ProductionError {
    Unparsed,
    Validation(usize, String),
}

pub(crate) type ParsedResult = Result<SuccessData, ProductionError>;

/// Per-parse memo of rule results (packrat) that doubles as the farthest-failure
/// tracker for error reporting.
pub(crate) struct Cache {
    parsed_result_cache: HashMap<(String, usize), ParsedResult>,
    max_failed_pointer: usize,
    expected: Vec<String>,
    failed_rule_stack: Vec<String>,
    any_failure: bool,
}

impl Cache {
    pub fn root() -> Self {
        Self {
            parsed_result_cache: HashMap::new(),
            max_failed_pointer: 0,
            expected: Vec::new(),
            failed_rule_stack: Vec::new(),
            any_failure: false,
        }
    }

    pub fn find(&self, rule: &str, index: usize) -> Option<&ParsedResult> {
        self.parsed_result_cache.get(&(rule.to_string(), index))
    }

    pub fn insert(&mut self, rule: &str, index: usize, result: ParsedResult) {
        self.parsed_result_cache
            .insert((rule.to_string(), index), result);
    }

    /// Record a terminal failure; the farthest position wins, ties merge their
    /// expected sets.
    pub fn record_failure(&mut self, pointer: usize, expected: String, rule_stack: &[&str]) {
        if !self.any_failure || pointer > self.max_failed_pointer {
            self.any_failure = true;
            self.max_failed_pointer = pointer;
            self.expected.clear();
            self.expected.push(expected);
            self.failed_rule_stack = rule_stack.iter().map(|s| s.to_string()).collect();
        } else if pointer == self.max_failed_pointer && !self.expected.contains(&expected) {
            self.expected.push(expected);
        }
    }

    pub fn create_error(&self, code: &Code, tokens: Option<&[Lex]>) -> ParseError {
        if !self.any_failure {
            return ParseError::new(
                code.obtain_position(0),
                "Failed to parse.".to_string(),
                Vec::new(),
            );
        }
        let pointer = self.max_failed_pointer;
        let mut message = if pointer >= code.value.len() {
            "Unexpected end of file.".to_string()
        } else {
            let snippet = tokens
                .and_then(|stream| {
                    stream
                        .iter()
                        .find(|lex| lex.start == pointer && lex.end > lex.start)
                        .map(|lex| code.slice(lex.start, lex.end).to_string())
                })
                .or_else(|| code.value[pointer..].chars().next().map(|c| c.to_string()))
                .unwrap_or_default();
            format!("Unexpected '{}'.", snippet)
        };
        if !self.expected.is_empty() {
            message.push_str(&format!(" Expected {}.", self.expected.join(" | ")));
        }
        ParseError::new(
            code.obtain_position(pointer),
            message,
            self.failed_rule_stack.clone(),
        )
    }
}

impl Parser {
    /// Create a parser over a compiled grammar. The grammar is immutable and the
    /// parser is reusable; each parse call carries its own cursor and cache.
    pub fn new(grammar: CompiledGrammar) -> Self {
        Self {
            grammar,
            debug: once_cell::unsync::OnceCell::new(),
        }
    }

    pub fn grammar(&self) -> &CompiledGrammar {
        &self.grammar
    }

    /// Set a log label to debug rule derivations based on the level of [Log].
    pub fn set_log(&self, log: Log<&'static str>) -> Result<(), String> {
        self.debug
            .set(log)
            .map_err(|err| format!("Log label {} is already assigned.", err))
    }

    /// Run only the lexer over the input. Fails when the grammar has no lexer block.
    pub fn tokenize(&self, source: &str) -> Result<Vec<Lex>, LexError> {
        let code = Code::new(source);
        match &self.grammar.lexer {
            Some(spec) => Tokenizer::new(spec).tokenize(&code),
            None => Err(LexError::new(
                &code,
                0,
                "grammar has no lexer block".to_string(),
            )),
        }
    }

    /// Parse the input from the grammar's start rule.
    pub fn parse(&self, source: &str) -> Result<AstNode, ParseError> {
        self.parse_from(source, &self.grammar.start)
    }

    /// Parse the input from an explicit start rule. The whole input must be consumed.
    pub fn parse_from(&self, source: &str, start_rule: &str) -> Result<AstNode, ParseError> {
        let code = Code::new(source);
        if !self.grammar.rules.contains_key(start_rule) {
            return Err(ParseError::new(
                code.obtain_position(0),
                format!("start rule '{}' is not defined", start_rule),
                Vec::new(),
            ));
        }

        let tokens: Option<Vec<Lex>> = match &self.grammar.lexer {
            Some(spec) => Some(Tokenizer::new(spec).tokenize(&code).map_err(|err| {
                ParseError {
                    pointer: err.pointer,
                    line: err.line,
                    col: err.col,
                    message: format!("Failed to tokenize input: {}", err.message),
                    rule_stack: Vec::new(),
                }
            })?),
            None => None,
        };

        let debug = self.debug.get().copied().unwrap_or(Log::None);
        let mut session = Session::new(&self.grammar, &code, tokens.as_deref(), debug);

        match session.eat_rule(start_rule, 0) {
            Ok(data) => {
                let end = data.consumed_index;
                let consumed_all = match &tokens {
                    Some(stream) => end == stream.len(),
                    None => end == code.value.len(),
                };
                if !consumed_all {
                    let pointer = session.pointer_at(end);
                    session
                        .cache
                        .record_failure(pointer, "end of input".to_string(), &[]);
                    return Err(session.cache.create_error(&code, tokens.as_deref()));
                }
                let mut nodes: Vec<AstNode> =
                    data.children.into_iter().map(|shaped| shaped.node).collect();
                match nodes.len() {
                    1 => Ok(nodes.remove(0)),
                    0 => Err(ParseError::new(
                        code.obtain_position(0),
                        format!("start rule '{}' produced no syntax tree", start_rule),
                        Vec::new(),
                    )),
                    _ => {
                        let (line, col) = (nodes[0].line, nodes[0].col);
                        Ok(AstNode::new(
                            start_rule.to_string(),
                            source.to_string(),
                            line,
                            col,
                            Children::List(nodes),
                        ))
                    }
                }
            }
            Err(ProductionError::Unparsed) => {
                Err(session.cache.create_error(&code, tokens.as_deref()))
            }
            Err(ProductionError::Validation(pointer, message)) => Err(ParseError::new(
                code.obtain_position(pointer),
                message,
                Vec::new(),
            )),
        }
    }
}
