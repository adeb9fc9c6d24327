use crate::grammar::{LexAction, LexerSpec, TokenEntry, DEDENT_TOKEN, INDENT_TOKEN};
use crate::util::Code;
use crate::{AstValue, Lex, LexError};
use std::fmt::{Display, Formatter};

impl Display for Lex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("")
            .field(&self.token)
            .field(&self.start)
            .field(&self.end)
            .finish()
    }
}

impl Lex {
    pub fn new(token: String, start: usize, end: usize) -> Self {
        Self {
            token,
            start,
            end,
            value: None,
        }
    }
}

/// Drives a longest-match scan of the input over the ordered token table.
///
/// At each position every definition is tried and the longest match is selected;
/// ties are broken by list order. `skip` entries advance without emitting, and the
/// `handle_indent` entry compares the indentation after a line break against an
/// indentation stack to emit the line-break token, `INDENT` or `DEDENT`.
pub(crate) struct Tokenizer<'g> {
    spec: &'g LexerSpec,
}

impl<'g> Tokenizer<'g> {
    pub fn new(spec: &'g LexerSpec) -> Self {
        Self { spec }
    }

    pub fn tokenize(&self, code: &Code) -> Result<Vec<Lex>, LexError> {
        let mut stream: Vec<Lex> = Vec::new();
        let mut pointer: usize = 0;
        let eof_pointer: usize = code.value.len();
        let mut indent_stack: Vec<String> = vec![String::new()];

        while pointer < eof_pointer {
            let rest = &code.value[pointer..];
            let mut best: Option<(usize, usize)> = None;
            for (index, entry) in self.spec.entries.iter().enumerate() {
                if let Some(length) = entry.regexp.match_len(rest) {
                    if length == 0 {
                        return Err(LexError::new(
                            code,
                            pointer,
                            format!(
                                "token pattern /{}/ matched an empty string",
                                entry.regexp.as_str()
                            ),
                        ));
                    }
                    if best.map_or(true, |(_, best_length)| length > best_length) {
                        best = Some((index, length));
                    }
                }
            }
            let Some((index, length)) = best else {
                return Err(LexError::new(
                    code,
                    pointer,
                    "no token definition matches".to_string(),
                ));
            };

            let entry = &self.spec.entries[index];
            let end = pointer + length;
            match entry.action {
                Some(LexAction::Skip) => {}
                Some(LexAction::HandleIndent) => {
                    emit_layout(code, &mut stream, &mut indent_stack, entry, pointer, end)?;
                }
                None => {
                    let token = entry
                        .token
                        .clone()
                        .expect("entry shape should have been caught in lexer compilation");
                    let text = code.slice(pointer, end);
                    let value = match entry.coerce {
                        Some(value_type) => Some(
                            AstValue::coerce(value_type, text)
                                .map_err(|message| LexError::new(code, pointer, message))?,
                        ),
                        None => None,
                    };
                    stream.push(Lex {
                        token,
                        start: pointer,
                        end,
                        value,
                    });
                }
            }
            pointer = end;
        }

        // Close every open indentation level at end of input.
        while let Some(level) = indent_stack.pop() {
            if !level.is_empty() {
                stream.push(Lex::new(DEDENT_TOKEN.to_string(), eof_pointer, eof_pointer));
            }
        }
        Ok(stream)
    }
}

/// Compare the indentation after a matched line break against the indentation stack.
fn emit_layout(
    code: &Code,
    stream: &mut Vec<Lex>,
    stack: &mut Vec<String>,
    entry: &TokenEntry,
    start: usize,
    end: usize,
) -> Result<(), LexError> {
    let matched = code.slice(start, end);
    let indent_start = matched.rfind('\n').map_or(0, |at| at + 1);
    let indent = &matched[indent_start..];
    let top = stack.last().map_or("", |s| s.as_str());

    if indent == top {
        let token = entry
            .token
            .clone()
            .expect("entry shape should have been caught in lexer compilation");
        stream.push(Lex::new(token, start, end));
    } else if indent.starts_with(top) {
        stack.push(indent.to_string());
        stream.push(Lex::new(INDENT_TOKEN.to_string(), start, end));
    } else if top.starts_with(indent) {
        loop {
            match stack.last() {
                Some(level) if level == indent => break,
                Some(_) => {
                    stack.pop();
                    stream.push(Lex::new(DEDENT_TOKEN.to_string(), end, end));
                }
                None => {
                    return Err(LexError::new(
                        code,
                        end,
                        "unindent does not match any outer indentation level".to_string(),
                    ));
                }
            }
        }
    } else {
        return Err(LexError::new(
            code,
            end,
            "inconsistent use of tabs and spaces in indentation".to_string(),
        ));
    }
    Ok(())
}
