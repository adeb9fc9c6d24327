use super::raw::{
    RawAst, RawExpr, RawGrammar, RawLexAction, RawStructure, RawSubgrammar, RawTokenEntry,
    RawValueType,
};
use super::{
    malformed, validate, AstDirective, CompiledGrammar, GrammarRegex, LexAction, LexerSpec,
    RuleExpr, RulePart, Structure, TokenEntry, ValueType, DEDENT_TOKEN, INDENT_TOKEN,
};
use crate::{GrammarError, GrammarErrorKind};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Turns a root grammar map plus a base path into a single [CompiledGrammar].
///
/// Composition runs in three phases: include merging (the including file's rules win),
/// subgrammar expansion under filename-derived PascalCase prefixes, and compilation of
/// the raw map form into [RuleExpr] followed by validation.
pub(super) struct Composer {
    placeholder_mode: bool,
    loaded_subgrammars: HashMap<PathBuf, SubgrammarEntry>,
    merged_includes: HashSet<PathBuf>,
}

struct SubgrammarEntry {
    prefix: String,
    start: String,
}

#[derive(Clone)]
struct ScopeFrame {
    prefix: String,
    names: HashSet<String>,
}

/// Rules of one grammar unit after include merging, each with the directory its
/// defining file lives in (subgrammar paths resolve relative to that directory).
type UnitRules = HashMap<String, (RawExpr, PathBuf)>;

impl Composer {
    pub fn new(placeholder_mode: bool) -> Self {
        Self {
            placeholder_mode,
            loaded_subgrammars: HashMap::new(),
            merged_includes: HashSet::new(),
        }
    }

    pub fn compile(
        mut self,
        raw: RawGrammar,
        base_path: Option<&Path>,
        origin_file: Option<PathBuf>,
    ) -> Result<CompiledGrammar, GrammarError> {
        let RawGrammar {
            start_rule,
            rules,
            lexer,
            includes,
        } = raw;
        let start = start_rule.ok_or_else(|| {
            GrammarError::new(
                GrammarErrorKind::MalformedDirective,
                "grammar is missing start_rule".to_string(),
            )
        })?;
        let base_dir = base_path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let mut chain = HashSet::new();
        if let Some(origin) = &origin_file {
            if let Ok(canon) = origin.canonicalize() {
                chain.insert(canon);
            }
        }
        let unit = self.merge_unit(rules, includes, &base_dir, &mut chain)?;

        let root_names: HashSet<String> = unit.keys().cloned().collect();
        let scope = vec![ScopeFrame {
            prefix: String::new(),
            names: root_names,
        }];
        let mut expanded: HashMap<String, RawExpr> = HashMap::new();
        self.expand_unit(&mut expanded, unit, &scope)?;

        let mut compiled_rules: HashMap<String, RulePart> = HashMap::new();
        for (name, expr) in &expanded {
            compiled_rules.insert(name.clone(), compile_expr(name, expr)?);
        }

        let lexer = match lexer {
            Some(entries) => Some(compile_lexer(entries)?),
            None => None,
        };

        let compiled = CompiledGrammar {
            start,
            rules: compiled_rules,
            lexer,
            origin_file,
        };
        validate::validate(&compiled)?;
        Ok(compiled)
    }

    /// Merge a grammar's transitive includes into its own rule table.
    ///
    /// The including file's rules win on conflict, and among siblings the earlier
    /// include wins. `chain` holds the canonical paths currently being merged;
    /// re-entering one of them is an include cycle.
    fn merge_unit(
        &mut self,
        rules: HashMap<String, RawExpr>,
        includes: Vec<String>,
        dir: &Path,
        chain: &mut HashSet<PathBuf>,
    ) -> Result<UnitRules, GrammarError> {
        let mut merged: UnitRules = rules
            .into_iter()
            .map(|(name, expr)| (name, (expr, dir.to_path_buf())))
            .collect();

        for include in includes {
            let full = dir.join(&include);
            let canon = full.canonicalize().map_err(|err| {
                GrammarError::new(
                    GrammarErrorKind::MalformedDirective,
                    format!("failed to load include '{}': {}", include, err),
                )
            })?;
            if chain.contains(&canon) {
                return Err(GrammarError::new(
                    GrammarErrorKind::IncludeCycle,
                    format!("include cycle through '{}'", canon.display()),
                )
                .with_file(&canon));
            }
            if !self.merged_includes.insert(canon.clone()) {
                continue;
            }
            let included = RawGrammar::load_from_file(&canon)?;
            let include_dir = canon
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."));
            chain.insert(canon.clone());
            let include_rules =
                self.merge_unit(included.rules, included.includes, &include_dir, chain)?;
            chain.remove(&canon);
            for (name, entry) in include_rules {
                merged.entry(name).or_insert(entry);
            }
        }
        Ok(merged)
    }

    /// Qualify one unit's rules under its scope prefix and add them to the global table.
    fn expand_unit(
        &mut self,
        out: &mut HashMap<String, RawExpr>,
        unit: UnitRules,
        scope: &[ScopeFrame],
    ) -> Result<(), GrammarError> {
        let prefix = scope.last().expect("scope is never empty").prefix.clone();
        for (name, (mut expr, dir)) in unit {
            self.rewrite_expr(out, &mut expr, &name, &dir, scope)?;
            let qualified = format!("{}{}", prefix, name);
            if out.insert(qualified.clone(), expr).is_some() {
                return Err(GrammarError::in_rule(
                    GrammarErrorKind::BadStructure,
                    &qualified,
                    "duplicate rule name after namespacing".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Qualify rule references and replace subgrammar directives inside one body.
    fn rewrite_expr(
        &mut self,
        out: &mut HashMap<String, RawExpr>,
        expr: &mut RawExpr,
        rule: &str,
        dir: &Path,
        scope: &[ScopeFrame],
    ) -> Result<(), GrammarError> {
        if let Some(sub) = expr.subgrammar.take() {
            if self.placeholder_mode {
                let placeholder = sub.placeholder.ok_or_else(|| {
                    malformed(
                        rule,
                        format!(
                            "subgrammar '{}' has no placeholder for placeholder compilation",
                            sub.file
                        ),
                    )
                })?;
                let site_ast = expr.ast.take();
                *expr = *placeholder;
                if site_ast.is_some() {
                    expr.ast = site_ast;
                }
                return self.rewrite_expr(out, expr, rule, dir, scope);
            }
            let target = self.expand_subgrammar(out, &sub, dir, scope)?;
            expr.rule = Some(target);
            return Ok(());
        }

        if let Some(name) = expr.rule.take() {
            expr.rule = Some(qualify(&name, scope));
        }
        if let Some(parts) = &mut expr.sequence {
            for part in parts {
                self.rewrite_expr(out, part, rule, dir, scope)?;
            }
        }
        if let Some(parts) = &mut expr.choice {
            for part in parts {
                self.rewrite_expr(out, part, rule, dir, scope)?;
            }
        }
        for boxed in [
            &mut expr.zero_or_more,
            &mut expr.one_or_more,
            &mut expr.optional,
            &mut expr.positive_lookahead,
            &mut expr.negative_lookahead,
        ] {
            if let Some(part) = boxed {
                self.rewrite_expr(out, &mut **part, rule, dir, scope)?;
            }
        }
        Ok(())
    }

    /// Load a subgrammar file, merge its prefixed rules into the global table and
    /// return the qualified name the reference site should point at.
    ///
    /// Visited paths are cached, so repeated references load each file at most once
    /// and circular file references terminate.
    fn expand_subgrammar(
        &mut self,
        out: &mut HashMap<String, RawExpr>,
        sub: &RawSubgrammar,
        dir: &Path,
        scope: &[ScopeFrame],
    ) -> Result<String, GrammarError> {
        let full = dir.join(&sub.file);
        let canon = full.canonicalize().map_err(|err| {
            GrammarError::new(
                GrammarErrorKind::SubgrammarNotFound,
                format!("failed to resolve subgrammar '{}': {}", sub.file, err),
            )
        })?;

        if let Some(entry) = self.loaded_subgrammars.get(&canon) {
            return Ok(match &sub.rule {
                Some(rule) => format!("{}{}", entry.prefix, rule),
                None => entry.start.clone(),
            });
        }

        let raw = RawGrammar::load_from_file(&canon)?;
        let sub_start = raw.start_rule.clone().ok_or_else(|| {
            GrammarError::new(
                GrammarErrorKind::MalformedDirective,
                format!("subgrammar '{}' is missing start_rule", sub.file),
            )
            .with_file(&canon)
        })?;
        let prefix = format!(
            "{}{}",
            scope.last().expect("scope is never empty").prefix,
            pascal_prefix(&canon)
        );
        self.loaded_subgrammars.insert(
            canon.clone(),
            SubgrammarEntry {
                prefix: prefix.clone(),
                start: format!("{}{}", prefix, sub_start),
            },
        );

        let sub_dir = canon
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        let mut chain = HashSet::new();
        chain.insert(canon.clone());
        let unit = self.merge_unit(raw.rules, raw.includes, &sub_dir, &mut chain)?;

        let mut child_scope = scope.to_vec();
        child_scope.push(ScopeFrame {
            prefix: prefix.clone(),
            names: unit.keys().cloned().collect(),
        });
        self.expand_unit(out, unit, &child_scope)?;

        Ok(match &sub.rule {
            Some(rule) => format!("{}{}", prefix, rule),
            None => format!("{}{}", prefix, sub_start),
        })
    }
}

/// Resolve a rule name against the scope chain, innermost unit first.
/// A name defined nowhere stays bare; validation reports it later.
fn qualify(name: &str, scope: &[ScopeFrame]) -> String {
    for frame in scope.iter().rev() {
        if frame.names.contains(name) {
            return format!("{}{}", frame.prefix, name);
        }
    }
    name.to_string()
}

/// Derive the namespace prefix of a subgrammar from its filename,
/// e.g. `path_parser.toml` becomes `PathParser_`.
fn pascal_prefix(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("subgrammar");
    let mut prefix = String::with_capacity(stem.len() + 1);
    for word in stem.split(|c| c == '_' || c == '-' || c == '.') {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            prefix.extend(first.to_uppercase());
            prefix.push_str(chars.as_str());
        }
    }
    prefix.push('_');
    prefix
}

fn compile_expr(rule: &str, raw: &RawExpr) -> Result<RulePart, GrammarError> {
    let ast = compile_ast(rule, raw.ast.as_ref())?;

    let mut present: Vec<&str> = Vec::new();
    macro_rules! key {
        ($field:ident) => {
            if raw.$field.is_some() {
                present.push(stringify!($field));
            }
        };
    }
    key!(literal);
    key!(regex);
    key!(token);
    key!(rule);
    key!(sequence);
    key!(choice);
    key!(zero_or_more);
    key!(one_or_more);
    key!(optional);
    key!(positive_lookahead);
    key!(negative_lookahead);
    key!(subgrammar);
    if present.len() != 1 {
        return Err(malformed(
            rule,
            format!(
                "rule body must set exactly one structural key, found [{}]",
                present.join(", ")
            ),
        ));
    }

    let expr = match present[0] {
        "literal" => RuleExpr::Literal(raw.literal.clone().unwrap()),
        "regex" => {
            let pattern = raw.regex.as_ref().unwrap();
            let regexp = GrammarRegex::new(pattern).map_err(|err| {
                malformed(rule, format!("invalid regex /{}/: {}", pattern, err))
            })?;
            RuleExpr::Regex(regexp)
        }
        "token" => RuleExpr::Token(raw.token.clone().unwrap()),
        "rule" => RuleExpr::Ref(raw.rule.clone().unwrap()),
        "sequence" => RuleExpr::Sequence(compile_parts(rule, raw.sequence.as_ref().unwrap())?),
        "choice" => RuleExpr::Choice(compile_parts(rule, raw.choice.as_ref().unwrap())?),
        "zero_or_more" => {
            RuleExpr::ZeroOrMore(Box::new(compile_expr(rule, raw.zero_or_more.as_ref().unwrap())?))
        }
        "one_or_more" => {
            RuleExpr::OneOrMore(Box::new(compile_expr(rule, raw.one_or_more.as_ref().unwrap())?))
        }
        "optional" => {
            RuleExpr::Optional(Box::new(compile_expr(rule, raw.optional.as_ref().unwrap())?))
        }
        "positive_lookahead" => RuleExpr::PosLookahead(Box::new(compile_expr(
            rule,
            raw.positive_lookahead.as_ref().unwrap(),
        )?)),
        "negative_lookahead" => RuleExpr::NegLookahead(Box::new(compile_expr(
            rule,
            raw.negative_lookahead.as_ref().unwrap(),
        )?)),
        _ => {
            return Err(malformed(
                rule,
                "subgrammar reference survived expansion".to_string(),
            ))
        }
    };
    Ok(RulePart { expr, ast })
}

fn compile_parts(rule: &str, parts: &[RawExpr]) -> Result<Vec<RulePart>, GrammarError> {
    parts.iter().map(|part| compile_expr(rule, part)).collect()
}

fn compile_ast(rule: &str, raw: Option<&RawAst>) -> Result<AstDirective, GrammarError> {
    let Some(ast) = raw else {
        return Ok(AstDirective::default());
    };
    let structure = match &ast.structure {
        None => None,
        Some(RawStructure::Named(name)) => match name.as_str() {
            "left_associative_op" => Some(Structure::LeftAssociativeOp),
            "right_associative_op" => Some(Structure::RightAssociativeOp),
            other => {
                return Err(malformed(rule, format!("unknown structure '{}'", other)));
            }
        },
        Some(RawStructure::Mapped { tag, map_children }) => {
            let mut mapped: Vec<(String, usize)> = map_children
                .iter()
                .map(|(key, index)| (key.clone(), *index))
                .collect();
            mapped.sort_by(|a, b| a.1.cmp(&b.1));
            Some(Structure::Mapped {
                tag: tag.clone(),
                map_children: mapped,
            })
        }
    };
    Ok(AstDirective {
        tag: ast.tag.clone(),
        discard: ast.discard.unwrap_or(false),
        promote: ast.promote.unwrap_or(false),
        leaf: ast.leaf.unwrap_or(false),
        coerce: ast.type_.map(ValueType::from),
        name: ast.name.clone(),
        structure,
    })
}

impl From<RawValueType> for ValueType {
    fn from(raw: RawValueType) -> Self {
        match raw {
            RawValueType::Number => ValueType::Number,
            RawValueType::Bool => ValueType::Bool,
            RawValueType::Null => ValueType::Null,
        }
    }
}

fn compile_lexer(entries: Vec<RawTokenEntry>) -> Result<LexerSpec, GrammarError> {
    let mut compiled = Vec::with_capacity(entries.len());
    let mut handle_indent_seen = false;
    for (index, entry) in entries.iter().enumerate() {
        let label = format!("lexer[{}]", index);
        let regexp = GrammarRegex::new(&entry.regex)
            .map_err(|err| malformed(&label, format!("invalid regex /{}/: {}", entry.regex, err)))?;
        if regexp.matches_empty() {
            return Err(malformed(
                &label,
                format!("lexer pattern /{}/ must not match the empty string", entry.regex),
            ));
        }
        let action = entry.action.map(|a| match a {
            RawLexAction::Skip => LexAction::Skip,
            RawLexAction::HandleIndent => LexAction::HandleIndent,
        });
        match (action, &entry.token) {
            (Some(LexAction::Skip), Some(_)) => {
                return Err(malformed(&label, "a skip entry must not carry a token".to_string()));
            }
            (Some(LexAction::Skip), None) => {}
            (Some(LexAction::HandleIndent), None) => {
                return Err(malformed(
                    &label,
                    "a handle_indent entry must name its line-break token".to_string(),
                ));
            }
            (Some(LexAction::HandleIndent), Some(_)) => {
                if handle_indent_seen {
                    return Err(malformed(
                        &label,
                        "at most one handle_indent entry is allowed".to_string(),
                    ));
                }
                handle_indent_seen = true;
            }
            (None, Some(_)) => {}
            (None, None) => {
                return Err(malformed(
                    &label,
                    "a lexer entry must set a token or a skipping action".to_string(),
                ));
            }
        }
        let coerce = entry.ast.as_ref().and_then(|a| a.type_).map(ValueType::from);
        compiled.push(TokenEntry {
            regexp,
            token: entry.token.clone(),
            action,
            coerce,
        });
    }

    let spec = LexerSpec { entries: compiled };
    if let Some(newline) = spec.newline_token().map(|s| s.to_string()) {
        for (index, entry) in spec.entries.iter().enumerate() {
            if entry.action == Some(LexAction::HandleIndent) {
                continue;
            }
            if let Some(token) = &entry.token {
                if token == INDENT_TOKEN || token == DEDENT_TOKEN || *token == newline {
                    return Err(malformed(
                        &format!("lexer[{}]", index),
                        format!("token name '{}' is reserved for layout handling", token),
                    ));
                }
            }
        }
    }
    Ok(spec)
}
