//! Grammar compilation: raw nested-map grammar data is merged (includes), composed
//! (subgrammars with filename-derived namespacing), validated and compiled into the
//! executable [RuleExpr] form consumed by the parser.

mod composer;
pub mod raw;
mod validate;

#[cfg(test)]
mod __tests__;

use crate::{GrammarError, GrammarErrorKind};
use regex::Regex;
use std::collections::HashMap;
use std::fmt::{Display, Write};
use std::path::{Path, PathBuf};

/// Lexical value coercion applied when a matched slice becomes an AST leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Number,
    Bool,
    Null,
}

/// A structure directive rewriting the shape of a rule's node into a canonical form.
#[derive(Debug, Clone, PartialEq)]
pub enum Structure {
    LeftAssociativeOp,
    RightAssociativeOp,
    Mapped {
        tag: String,
        map_children: Vec<(String, usize)>,
    },
}

/// The `ast` directive of a rule or of a single occurrence inside a rule body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AstDirective {
    pub tag: Option<String>,
    pub discard: bool,
    pub promote: bool,
    pub leaf: bool,
    pub coerce: Option<ValueType>,
    pub name: Option<String>,
    pub structure: Option<Structure>,
}

impl AstDirective {
    pub fn is_default(&self) -> bool {
        self == &AstDirective::default()
    }
}

/// A rule body expression together with its per-occurrence `ast` directive.
#[derive(Debug, Clone)]
pub struct RulePart {
    pub expr: RuleExpr,
    pub ast: AstDirective,
}

/// The executable form of a grammar rule body.
#[derive(Debug, Clone)]
pub enum RuleExpr {
    Literal(String),
    Regex(GrammarRegex),
    Token(String),
    Ref(String),
    Sequence(Vec<RulePart>),
    Choice(Vec<RulePart>),
    ZeroOrMore(Box<RulePart>),
    OneOrMore(Box<RulePart>),
    Optional(Box<RulePart>),
    PosLookahead(Box<RulePart>),
    NegLookahead(Box<RulePart>),
}

/// A regular expression atom, compiled anchored at the cursor.
///
/// The supported syntax is the `regex` crate's: character classes (`\d`, `\s`, `\w`),
/// alternation, greedy and lazy quantifiers, and `\A`/`\z` anchors. `\Z` is accepted
/// as an end-of-input anchor and rewritten to `\z`. Backreferences and in-pattern
/// lookaround are not supported; the grammar-level lookahead combinators cover that.
#[derive(Debug, Clone)]
pub struct GrammarRegex {
    pattern: String,
    regexp: Regex,
}

impl GrammarRegex {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let rewritten = rewrite_end_anchor(pattern);
        let regexp = Regex::new(&format!(r"\A(?:{})", rewritten))?;
        Ok(Self {
            pattern: pattern.to_string(),
            regexp,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Length in bytes of the anchored match at the start of `input`, if any.
    pub fn match_len(&self, input: &str) -> Option<usize> {
        self.regexp.find(input).map(|m| m.end())
    }

    pub fn matches_empty(&self) -> bool {
        self.match_len("") == Some(0)
    }
}

/// Rewrite unescaped `\Z` to the regex crate's `\z` end-of-text anchor.
fn rewrite_end_anchor(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut escaped = false;
    for c in pattern.chars() {
        if escaped {
            out.push(if c == 'Z' { 'z' } else { c });
            escaped = false;
        } else {
            if c == '\\' {
                escaped = true;
            }
            out.push(c);
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexAction {
    Skip,
    HandleIndent,
}

/// One entry of the ordered lexer token table.
#[derive(Debug, Clone)]
pub struct TokenEntry {
    pub regexp: GrammarRegex,
    pub token: Option<String>,
    pub action: Option<LexAction>,
    pub coerce: Option<ValueType>,
}

#[derive(Debug, Clone)]
pub struct LexerSpec {
    pub entries: Vec<TokenEntry>,
}

pub const INDENT_TOKEN: &str = "INDENT";
pub const DEDENT_TOKEN: &str = "DEDENT";

impl LexerSpec {
    /// The token name emitted for a same-level line break, when layout handling is on.
    pub fn newline_token(&self) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.action == Some(LexAction::HandleIndent))
            .and_then(|e| e.token.as_deref())
    }

    pub fn has_layout(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.action == Some(LexAction::HandleIndent))
    }

    /// All token names rules may reference, including the synthetic layout tokens.
    pub fn token_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .entries
            .iter()
            .filter_map(|e| e.token.as_deref())
            .collect();
        if self.has_layout() {
            names.push(INDENT_TOKEN);
            names.push(DEDENT_TOKEN);
        }
        names
    }
}

/// A validated, linked and namespaced grammar, immutable after compilation.
#[derive(Debug)]
pub struct CompiledGrammar {
    pub start: String,
    pub rules: HashMap<String, RulePart>,
    pub lexer: Option<LexerSpec>,
    pub origin_file: Option<PathBuf>,
}

impl CompiledGrammar {
    /// Write a human readable listing of the compiled rule set.
    pub fn describe(&self) -> Result<String, std::fmt::Error> {
        let mut writer = String::new();
        let mut names: Vec<&String> = self.rules.keys().collect();
        names.sort();
        for name in names {
            writeln!(writer, "{}", name)?;
            writeln!(writer, "{:>6} {} ;", ":", self.rules[name])?;
        }
        if let Some(lexer) = &self.lexer {
            writeln!(writer, "lexer {{")?;
            for entry in &lexer.entries {
                let label = match (&entry.token, entry.action) {
                    (_, Some(LexAction::Skip)) => "(skip)".to_string(),
                    (Some(token), _) => token.clone(),
                    (None, _) => "?".to_string(),
                };
                writeln!(
                    writer,
                    "{:>6}{} : /{}/ ,",
                    "",
                    label,
                    entry.regexp.as_str().replace('/', "\\/")
                )?;
            }
            writeln!(writer, "}}")?;
        }
        Ok(writer)
    }
}

impl Display for RulePart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.expr)
    }
}

impl Display for RuleExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleExpr::Literal(s) => write!(f, "'{}'", s),
            RuleExpr::Regex(r) => write!(f, "/{}/", r.as_str().replace('/', "\\/")),
            RuleExpr::Token(name) => write!(f, "{}", name),
            RuleExpr::Ref(name) => write!(f, "{}", name),
            RuleExpr::Sequence(parts) => {
                for (index, part) in parts.iter().enumerate() {
                    if index != 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", part)?;
                }
                Ok(())
            }
            RuleExpr::Choice(parts) => {
                write!(f, "(")?;
                for (index, part) in parts.iter().enumerate() {
                    if index != 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{}", part)?;
                }
                write!(f, ")")
            }
            RuleExpr::ZeroOrMore(part) => write!(f, "({})*", part),
            RuleExpr::OneOrMore(part) => write!(f, "({})+", part),
            RuleExpr::Optional(part) => write!(f, "({})?", part),
            RuleExpr::PosLookahead(part) => write!(f, "&({})", part),
            RuleExpr::NegLookahead(part) => write!(f, "!({})", part),
        }
    }
}

/// Compile grammar data into a [CompiledGrammar]. Include and subgrammar paths are
/// resolved relative to `base_path`.
pub fn compile_grammar(
    raw: raw::RawGrammar,
    base_path: Option<&Path>,
) -> Result<CompiledGrammar, GrammarError> {
    composer::Composer::new(false).compile(raw, base_path, None)
}

/// Load a grammar file (`.json` or `.toml`) and compile it, resolving relative
/// include and subgrammar paths against the file's directory.
pub fn compile_grammar_from_file(path: &Path) -> Result<CompiledGrammar, GrammarError> {
    let raw = raw::RawGrammar::load_from_file(path)?;
    let base = path.parent().map(|p| p.to_path_buf());
    composer::Composer::new(false).compile(raw, base.as_deref(), Some(path.to_path_buf()))
}

/// Like [compile_grammar], but every `subgrammar` reference is replaced by its inline
/// `placeholder` expression and no external files are loaded.
pub fn compile_grammar_placeholder(
    raw: raw::RawGrammar,
    base_path: Option<&Path>,
) -> Result<CompiledGrammar, GrammarError> {
    composer::Composer::new(true).compile(raw, base_path, None)
}

pub(crate) fn malformed(rule: &str, message: String) -> GrammarError {
    GrammarError::in_rule(GrammarErrorKind::MalformedDirective, rule, message)
}
