use crate::grammar::{compile_grammar, compile_grammar_from_file, compile_grammar_placeholder};
use crate::{GrammarErrorKind, Parser, RawGrammar};
use serde_json::json;
use std::fs;

fn raw(value: serde_json::Value) -> RawGrammar {
    serde_json::from_value(value).unwrap()
}

#[test]
fn missing_start_rule_is_malformed() {
    let err = compile_grammar(raw(json!({ "rules": {} })), None).unwrap_err();
    assert_eq!(err.kind, GrammarErrorKind::MalformedDirective);
}

#[test]
fn unknown_reference_is_reported_with_the_referencing_rule() {
    let err = compile_grammar(
        raw(json!({
            "start_rule": "main",
            "rules": { "main": { "rule": "missing" } }
        })),
        None,
    )
    .unwrap_err();
    assert_eq!(err.kind, GrammarErrorKind::UnknownRule);
    assert_eq!(err.rule.as_deref(), Some("main"));
}

#[test]
fn unreachable_rules_are_rejected() {
    let err = compile_grammar(
        raw(json!({
            "start_rule": "main",
            "rules": {
                "main": { "literal": "a" },
                "orphan": { "literal": "b" }
            }
        })),
        None,
    )
    .unwrap_err();
    assert_eq!(err.kind, GrammarErrorKind::Unreachable);
    assert!(err.message.contains("orphan"));
}

#[test]
fn a_body_needs_exactly_one_structural_key() {
    let err = compile_grammar(
        raw(json!({
            "start_rule": "main",
            "rules": { "main": { "literal": "a", "regex": "b" } }
        })),
        None,
    )
    .unwrap_err();
    assert_eq!(err.kind, GrammarErrorKind::MalformedDirective);

    let err = compile_grammar(
        raw(json!({
            "start_rule": "main",
            "rules": { "main": { "ast": { "tag": "x" } } }
        })),
        None,
    )
    .unwrap_err();
    assert_eq!(err.kind, GrammarErrorKind::MalformedDirective);
}

#[test]
fn token_atoms_require_a_lexer() {
    let err = compile_grammar(
        raw(json!({
            "start_rule": "main",
            "rules": { "main": { "token": "WORD" } }
        })),
        None,
    )
    .unwrap_err();
    assert_eq!(err.kind, GrammarErrorKind::BadStructure);
}

#[test]
fn character_atoms_are_rejected_in_lexer_mode() {
    let err = compile_grammar(
        raw(json!({
            "start_rule": "main",
            "rules": { "main": { "literal": "a" } },
            "lexer": [ { "regex": "[a-z]+", "token": "WORD" } ]
        })),
        None,
    )
    .unwrap_err();
    assert_eq!(err.kind, GrammarErrorKind::BadStructure);
}

#[test]
fn structure_lints_check_the_body_shape() {
    let err = compile_grammar(
        raw(json!({
            "start_rule": "main",
            "rules": {
                "main": { "literal": "a", "ast": { "structure": "left_associative_op" } }
            }
        })),
        None,
    )
    .unwrap_err();
    assert_eq!(err.kind, GrammarErrorKind::BadStructure);

    let err = compile_grammar(
        raw(json!({
            "start_rule": "main",
            "rules": {
                "main": {
                    "sequence": [ { "literal": "a" } ],
                    "ast": { "structure": { "tag": "pair", "map_children": { "key": 3 } } }
                }
            }
        })),
        None,
    )
    .unwrap_err();
    assert_eq!(err.kind, GrammarErrorKind::BadStructure);
    assert!(err.message.contains("out of range"));
}

#[test]
fn lexer_entries_must_pick_token_or_skip() {
    let err = compile_grammar(
        raw(json!({
            "start_rule": "main",
            "rules": { "main": { "token": "WORD" } },
            "lexer": [
                { "regex": "[a-z]+", "token": "WORD" },
                { "regex": "[0-9]+" }
            ]
        })),
        None,
    )
    .unwrap_err();
    assert_eq!(err.kind, GrammarErrorKind::MalformedDirective);
}

#[test]
fn nullable_lexer_patterns_are_rejected() {
    let err = compile_grammar(
        raw(json!({
            "start_rule": "main",
            "rules": { "main": { "token": "WORD" } },
            "lexer": [ { "regex": "[a-z]*", "token": "WORD" } ]
        })),
        None,
    )
    .unwrap_err();
    assert_eq!(err.kind, GrammarErrorKind::MalformedDirective);
    assert!(err.message.contains("empty"));
}

#[test]
fn layout_token_names_are_reserved() {
    let err = compile_grammar(
        raw(json!({
            "start_rule": "main",
            "rules": { "main": { "token": "WORD" } },
            "lexer": [
                { "regex": "\\n[ \\t]*", "action": "handle_indent", "token": "NEWLINE" },
                { "regex": "[a-z]+", "token": "INDENT" }
            ]
        })),
        None,
    )
    .unwrap_err();
    assert_eq!(err.kind, GrammarErrorKind::MalformedDirective);
    assert!(err.message.contains("reserved"));
}

#[test]
fn includes_merge_with_the_including_file_winning() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("base.json"),
        serde_json::to_string(&json!({
            "start_rule": "word",
            "rules": {
                "word": { "regex": "[a-z]+", "ast": { "leaf": true } },
                "extra": { "regex": "[0-9]+", "ast": { "leaf": true } }
            }
        }))
        .unwrap(),
    )
    .unwrap();
    fs::write(
        dir.path().join("main.json"),
        serde_json::to_string(&json!({
            "start_rule": "main",
            "includes": ["base.json"],
            "rules": {
                "main": { "sequence": [ { "rule": "word" }, { "rule": "extra" } ] },
                "word": { "regex": "[A-Z]+", "ast": { "leaf": true } }
            }
        }))
        .unwrap(),
    )
    .unwrap();

    let grammar = compile_grammar_from_file(&dir.path().join("main.json")).unwrap();
    let parser = Parser::new(grammar);
    // The including file's upper-case `word` wins over the included lower-case one.
    assert!(parser.parse("AB12").is_ok());
    assert!(parser.parse("ab12").is_err());
}

#[test]
fn include_cycles_are_detected() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("a.json"),
        serde_json::to_string(&json!({
            "start_rule": "main",
            "includes": ["b.json"],
            "rules": { "main": { "literal": "a" } }
        }))
        .unwrap(),
    )
    .unwrap();
    fs::write(
        dir.path().join("b.json"),
        serde_json::to_string(&json!({
            "start_rule": "other",
            "includes": ["a.json"],
            "rules": { "other": { "literal": "b" } }
        }))
        .unwrap(),
    )
    .unwrap();

    let err = compile_grammar_from_file(&dir.path().join("a.json")).unwrap_err();
    assert_eq!(err.kind, GrammarErrorKind::IncludeCycle);
}

#[test]
fn missing_subgrammar_file_is_reported() {
    let err = compile_grammar(
        raw(json!({
            "start_rule": "main",
            "rules": {
                "main": { "subgrammar": { "file": "nowhere.json" } }
            }
        })),
        None,
    )
    .unwrap_err();
    assert_eq!(err.kind, GrammarErrorKind::SubgrammarNotFound);
}

#[test]
fn subgrammar_rules_are_namespaced_by_filename() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("path_parser.json"),
        serde_json::to_string(&json!({
            "start_rule": "path",
            "rules": {
                "path": { "one_or_more": { "rule": "segment" } },
                "segment": { "regex": "/[a-z]+", "ast": { "leaf": true } }
            }
        }))
        .unwrap(),
    )
    .unwrap();
    let grammar = compile_grammar(
        raw(json!({
            "start_rule": "main",
            "rules": {
                "main": { "subgrammar": { "file": "path_parser.json" } }
            }
        })),
        Some(dir.path()),
    )
    .unwrap();

    assert!(grammar.rules.contains_key("PathParser_path"));
    assert!(grammar.rules.contains_key("PathParser_segment"));

    let ast = Parser::new(grammar).parse("/a/b").unwrap();
    assert_eq!(ast.tag, "main");
    assert_eq!(ast.list()[0].tag, "PathParser_path");
}

#[test]
fn repeated_subgrammar_references_load_the_file_once() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("word.json"),
        serde_json::to_string(&json!({
            "start_rule": "word",
            "rules": { "word": { "regex": "[a-z]+", "ast": { "leaf": true } } }
        }))
        .unwrap(),
    )
    .unwrap();
    let grammar = compile_grammar(
        raw(json!({
            "start_rule": "main",
            "rules": {
                "main": { "sequence": [
                    { "subgrammar": { "file": "word.json" } },
                    { "literal": "-", "ast": { "discard": true } },
                    { "subgrammar": { "file": "word.json" } }
                ] }
            }
        })),
        Some(dir.path()),
    )
    .unwrap();

    let ast = Parser::new(grammar).parse("ab-cd").unwrap();
    assert_eq!(ast.list().len(), 2);
    assert_eq!(ast.list()[0].tag, "Word_word");
    assert_eq!(ast.list()[1].tag, "Word_word");
}

#[test]
fn placeholder_compilation_needs_no_files() {
    let grammar = compile_grammar_placeholder(
        raw(json!({
            "start_rule": "main",
            "rules": {
                "main": { "sequence": [
                    { "subgrammar": {
                        "file": "nowhere.json",
                        "placeholder": { "regex": "[a-z]+", "ast": { "leaf": true, "tag": "stub" } }
                    } },
                    { "literal": "!", "ast": { "discard": true } }
                ] }
            }
        })),
        None,
    )
    .unwrap();

    let ast = Parser::new(grammar).parse("abc!").unwrap();
    assert_eq!(ast.list()[0].tag, "stub");
}

#[test]
fn placeholder_compilation_requires_a_placeholder() {
    let err = compile_grammar_placeholder(
        raw(json!({
            "start_rule": "main",
            "rules": {
                "main": { "subgrammar": { "file": "nowhere.json" } }
            }
        })),
        None,
    )
    .unwrap_err();
    assert_eq!(err.kind, GrammarErrorKind::MalformedDirective);
}

#[test]
fn toml_grammars_load_like_json_ones() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("words.toml"),
        r#"
start_rule = "main"

[rules.main]
one_or_more = { rule = "word" }

[rules.word]
regex = "[a-z]+ ?"
ast = { leaf = true, tag = "word" }
"#,
    )
    .unwrap();
    let grammar = compile_grammar_from_file(&dir.path().join("words.toml")).unwrap();
    let ast = Parser::new(grammar).parse("ab cd").unwrap();
    assert_eq!(ast.tag, "main");
    assert_eq!(ast.list().len(), 2);
}

#[test]
fn describe_lists_every_rule() {
    let grammar = compile_grammar(
        raw(json!({
            "start_rule": "main",
            "rules": {
                "main": { "sequence": [ { "rule": "word" }, { "literal": "!" } ] },
                "word": { "regex": "[a-z]+" }
            }
        })),
        None,
    )
    .unwrap();
    let listing = grammar.describe().unwrap();
    assert!(listing.contains("main"));
    assert!(listing.contains("word"));
    assert!(listing.contains("'!'"));
}
