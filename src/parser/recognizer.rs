use super::shaper::{self, Span};
use super::{Cache, ParsedResult, ProductionError, SuccessData};
use crate::grammar::{CompiledGrammar, RuleExpr, RulePart, Structure};
use crate::util::{Code, Log};
use crate::Lex;

/// One parse call's walk over either the raw character stream or the token stream.
///
/// One interpreter handles both modes: literal and regex atoms operate on characters,
/// token atoms on tokens; validation guarantees the two never mix within a grammar.
/// The cursor is a byte index in character mode and a token index in lexer mode.
pub(super) struct Session<'p> {
    grammar: &'p CompiledGrammar,
    code: &'p Code<'p>,
    tokens: Option<&'p [Lex]>,
    pub cache: Cache,
    rule_stack: Vec<&'p str>,
    lookahead_depth: usize,
    debug: Log<&'static str>,
}

impl<'p> Session<'p> {
    pub fn new(
        grammar: &'p CompiledGrammar,
        code: &'p Code<'p>,
        tokens: Option<&'p [Lex]>,
        debug: Log<&'static str>,
    ) -> Self {
        Self {
            grammar,
            code,
            tokens,
            cache: Cache::root(),
            rule_stack: Vec::new(),
            lookahead_depth: 0,
            debug,
        }
    }

    /// The source byte pointer of a cursor position.
    pub fn pointer_at(&self, index: usize) -> usize {
        match self.tokens {
            Some(stream) => stream
                .get(index)
                .map(|lex| lex.start)
                .unwrap_or(self.code.value.len()),
            None => index,
        }
    }

    fn span(&self, start_index: usize, end_index: usize) -> Span<'p> {
        let start_ptr = self.pointer_at(start_index);
        let end_ptr = match self.tokens {
            Some(stream) => {
                if end_index == start_index {
                    start_ptr
                } else {
                    stream[end_index - 1].end
                }
            }
            None => end_index,
        };
        Span {
            start_ptr,
            end_ptr,
            code: self.code,
        }
    }

    /// Derive a named rule at a cursor position, memoizing the result.
    pub fn eat_rule(&mut self, name: &str, index: usize) -> ParsedResult {
        if let Some(result) = self.cache.find(name, index) {
            return result.clone();
        }
        let grammar = self.grammar;
        let (rule_name, part) = grammar
            .rules
            .get_key_value(name)
            .expect("rule resolution should have been caught in validation");
        self.rule_stack.push(rule_name.as_str());

        #[cfg(debug_assertions)]
        if self.debug.order() >= Log::Verbose(()).order() {
            println!(
                "[{}] Entering '{}' at {}",
                self.debug,
                rule_name,
                self.code.obtain_position(self.pointer_at(index))
            );
        }

        let result = self.eat_part_tagged(part, index, Some(rule_name.as_str()));

        #[cfg(debug_assertions)]
        match &result {
            Ok(data) => {
                if self.debug.order() >= Log::Success(()).order() {
                    println!(
                        "[{}] Parsed '{}' up to {}",
                        self.debug,
                        rule_name,
                        self.code.obtain_position(self.pointer_at(data.consumed_index))
                    );
                }
            }
            Err(_) => {
                if self.debug.order() >= Log::Result(()).order() {
                    println!(
                        "[{}] Unparsed '{}' at {}",
                        self.debug,
                        rule_name,
                        self.code.obtain_position(self.pointer_at(index))
                    );
                }
            }
        }

        self.rule_stack.pop();
        // Results derived inside a lookahead probe are not memoized: their terminal
        // failures were not recorded, and reusing them outside the probe would skip
        // the recording a real derivation should do.
        if self.lookahead_depth == 0 {
            self.cache.insert(name, index, result.clone());
        }
        result
    }

    fn eat_part(&mut self, part: &'p RulePart, index: usize) -> ParsedResult {
        self.eat_part_tagged(part, index, None)
    }

    /// Derive one body part. `default_tag` is the rule name when this part is a rule
    /// body, so default shaping can tag the node after the rule.
    fn eat_part_tagged(
        &mut self,
        part: &'p RulePart,
        index: usize,
        default_tag: Option<&str>,
    ) -> ParsedResult {
        if let Some(Structure::Mapped { tag, map_children }) = &part.ast.structure {
            return self.eat_mapped(part, index, tag, map_children);
        }

        match &part.expr {
            RuleExpr::Literal(literal) => self.eat_literal(part, literal, index, default_tag),
            RuleExpr::Regex(regexp) => self.eat_regex(part, regexp, index, default_tag),
            RuleExpr::Token(name) => self.eat_token(part, name, index, default_tag),
            RuleExpr::Ref(name) => {
                let data = self.eat_rule(name, index)?;
                let span = self.span(index, data.consumed_index);
                // A reference as a whole rule body takes the default rule shaping
                // (wrap under the rule name); an occurrence inside a body only
                // applies its site directives.
                let children = match default_tag {
                    Some(_) => shaper::apply_composite(
                        &part.ast,
                        default_tag,
                        data.children,
                        &span,
                        false,
                    )?,
                    None => shaper::apply_site(&part.ast, data.children, &span)?,
                };
                Ok(SuccessData::new(data.consumed_index, children))
            }
            RuleExpr::Sequence(parts) => {
                let mut children = Vec::new();
                let mut moved = index;
                for inner in parts {
                    let data = self.eat_part(inner, moved)?;
                    moved = data.consumed_index;
                    children.extend(data.children);
                }
                self.finish_composite(part, index, moved, children, default_tag, false)
            }
            RuleExpr::Choice(alternatives) => {
                for alternative in alternatives {
                    match self.eat_part(alternative, index) {
                        Ok(data) => {
                            return self.finish_composite(
                                part,
                                index,
                                data.consumed_index,
                                data.children,
                                default_tag,
                                true,
                            );
                        }
                        Err(ProductionError::Unparsed) => continue,
                        Err(err) => return Err(err),
                    }
                }
                Err(ProductionError::Unparsed)
            }
            RuleExpr::ZeroOrMore(inner) => {
                let mut children = Vec::new();
                let mut moved = index;
                self.eat_repeats(inner, &mut moved, &mut children)?;
                self.finish_composite(part, index, moved, children, default_tag, false)
            }
            RuleExpr::OneOrMore(inner) => {
                let first = self.eat_part(inner, index)?;
                let mut children = first.children;
                let mut moved = first.consumed_index;
                if moved > index {
                    self.eat_repeats(inner, &mut moved, &mut children)?;
                }
                self.finish_composite(part, index, moved, children, default_tag, false)
            }
            RuleExpr::Optional(inner) => match self.eat_part(inner, index) {
                Ok(data) => self.finish_composite(
                    part,
                    index,
                    data.consumed_index,
                    data.children,
                    default_tag,
                    false,
                ),
                Err(ProductionError::Unparsed) => {
                    self.finish_composite(part, index, index, Vec::new(), default_tag, false)
                }
                Err(err) => Err(err),
            },
            RuleExpr::PosLookahead(inner) => match self.probe(inner, index) {
                Ok(_) => Ok(SuccessData::hidden(index)),
                Err(err) => Err(err),
            },
            RuleExpr::NegLookahead(inner) => match self.probe(inner, index) {
                Ok(_) => Err(ProductionError::Unparsed),
                Err(ProductionError::Unparsed) => Ok(SuccessData::hidden(index)),
                Err(err) => Err(err),
            },
        }
    }

    /// Attempt a lookahead's inner expression. The cursor always rewinds, and
    /// failures inside the probe are not user errors, so they stay out of the
    /// farthest-failure record.
    fn probe(&mut self, inner: &'p RulePart, index: usize) -> ParsedResult {
        self.lookahead_depth += 1;
        let result = self.eat_part(inner, index);
        self.lookahead_depth -= 1;
        result
    }

    /// Greedy repetition; an iteration that succeeds without consuming input stops
    /// the loop instead of spinning forever.
    fn eat_repeats(
        &mut self,
        inner: &'p RulePart,
        moved: &mut usize,
        children: &mut Vec<super::Shaped>,
    ) -> Result<(), ProductionError> {
        loop {
            match self.eat_part(inner, *moved) {
                Ok(data) => {
                    if data.consumed_index == *moved {
                        break;
                    }
                    *moved = data.consumed_index;
                    children.extend(data.children);
                }
                Err(ProductionError::Unparsed) => break,
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn finish_composite(
        &mut self,
        part: &'p RulePart,
        start_index: usize,
        end_index: usize,
        children: Vec<super::Shaped>,
        default_tag: Option<&str>,
        from_choice: bool,
    ) -> ParsedResult {
        let span = self.span(start_index, end_index);
        let shaped =
            shaper::apply_composite(&part.ast, default_tag, children, &span, from_choice)?;
        Ok(SuccessData::new(end_index, shaped))
    }

    fn eat_literal(
        &mut self,
        part: &'p RulePart,
        literal: &str,
        index: usize,
        default_tag: Option<&str>,
    ) -> ParsedResult {
        if self.tokens.is_some() {
            return Err(ProductionError::Validation(
                self.pointer_at(index),
                "literal atoms cannot be derived in lexer mode".to_string(),
            ));
        }
        if self.code.value[index..].starts_with(literal) {
            let end = index + literal.len();
            let span = self.span(index, end);
            let children = shaper::apply_terminal(&part.ast, default_tag, &span, None)?;
            Ok(SuccessData::new(end, children))
        } else {
            if self.lookahead_depth == 0 {
                self.cache
                    .record_failure(index, format!("'{}'", literal), &self.rule_stack);
            }
            Err(ProductionError::Unparsed)
        }
    }

    fn eat_regex(
        &mut self,
        part: &'p RulePart,
        regexp: &crate::grammar::GrammarRegex,
        index: usize,
        default_tag: Option<&str>,
    ) -> ParsedResult {
        if self.tokens.is_some() {
            return Err(ProductionError::Validation(
                self.pointer_at(index),
                "regex atoms cannot be derived in lexer mode".to_string(),
            ));
        }
        match regexp.match_len(&self.code.value[index..]) {
            Some(length) => {
                let end = index + length;
                let span = self.span(index, end);
                let children = shaper::apply_terminal(&part.ast, default_tag, &span, None)?;
                Ok(SuccessData::new(end, children))
            }
            None => {
                if self.lookahead_depth == 0 {
                    self.cache.record_failure(
                        index,
                        format!("/{}/", regexp.as_str()),
                        &self.rule_stack,
                    );
                }
                Err(ProductionError::Unparsed)
            }
        }
    }

    fn eat_token(
        &mut self,
        part: &'p RulePart,
        name: &str,
        index: usize,
        default_tag: Option<&str>,
    ) -> ParsedResult {
        let Some(stream) = self.tokens else {
            return Err(ProductionError::Validation(
                self.pointer_at(index),
                format!("token '{}' cannot be derived without a lexer", name),
            ));
        };
        match stream.get(index) {
            Some(lex) if lex.token == name => {
                let span = self.span(index, index + 1);
                let tag = default_tag.or(Some(name));
                let children = shaper::apply_terminal(&part.ast, tag, &span, lex.value.clone())?;
                Ok(SuccessData::new(index + 1, children))
            }
            _ => {
                if self.lookahead_depth == 0 {
                    self.cache.record_failure(
                        self.pointer_at(index),
                        name.to_string(),
                        &self.rule_stack,
                    );
                }
                Err(ProductionError::Unparsed)
            }
        }
    }

    /// Derive a sequence body under a `map_children` structure directive, keeping
    /// per-slot results so indices address sequence positions.
    fn eat_mapped(
        &mut self,
        part: &'p RulePart,
        index: usize,
        tag: &str,
        map_children: &[(String, usize)],
    ) -> ParsedResult {
        let RuleExpr::Sequence(parts) = &part.expr else {
            return Err(ProductionError::Validation(
                self.pointer_at(index),
                "map_children requires a sequence body".to_string(),
            ));
        };
        let mut slots: Vec<Vec<super::Shaped>> = Vec::with_capacity(parts.len());
        let mut moved = index;
        for inner in parts {
            let data = self.eat_part(inner, moved)?;
            moved = data.consumed_index;
            slots.push(data.children);
        }
        if part.ast.discard {
            return Ok(SuccessData::hidden(moved));
        }
        let span = self.span(index, moved);
        let shaped = shaper::build_mapped(&part.ast, tag, map_children, slots, &span)?;
        Ok(SuccessData::new(moved, vec![shaped]))
    }
}
