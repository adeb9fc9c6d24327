use crate::{compile_grammar, AstValue, Children, Parser, RawGrammar};
use serde_json::json;

fn parser_for(value: serde_json::Value) -> Parser {
    let raw: RawGrammar = serde_json::from_value(value).unwrap();
    Parser::new(compile_grammar(raw, None).unwrap())
}

#[test]
fn ordered_choice_commits_to_the_first_matching_alternative() {
    let parser = parser_for(json!({
        "start_rule": "main",
        "rules": {
            "main": { "choice": [ { "regex": "a" }, { "regex": "ab" } ] }
        }
    }));
    assert!(parser.parse("a").is_ok());
    // The first alternative matches "a" and commits, leaving "b" unconsumed.
    assert!(parser.parse("ab").is_err());
}

#[test]
fn a_failed_sequence_rewinds_for_the_next_alternative() {
    let parser = parser_for(json!({
        "start_rule": "main",
        "rules": {
            "main": { "choice": [
                { "sequence": [ { "literal": "a" }, { "literal": "b" } ] },
                { "sequence": [ { "literal": "a" }, { "literal": "c" } ] }
            ] }
        }
    }));
    let ast = parser.parse("ac").unwrap();
    assert_eq!(ast.text, "ac");
}

#[test]
fn zero_or_more_is_greedy_but_never_spins_on_empty_matches() {
    let parser = parser_for(json!({
        "start_rule": "main",
        "rules": {
            "main": { "zero_or_more": { "regex": "a*" } }
        }
    }));
    assert!(parser.parse("aaa").is_ok());
    assert!(parser.parse("").is_ok());
}

#[test]
fn one_or_more_requires_a_first_repeat() {
    let parser = parser_for(json!({
        "start_rule": "main",
        "rules": {
            "main": { "one_or_more": { "literal": "a" } }
        }
    }));
    assert!(parser.parse("").is_err());
    let ast = parser.parse("aaa").unwrap();
    assert_eq!(ast.list().len(), 3);
}

#[test]
fn optional_swallows_failure() {
    let parser = parser_for(json!({
        "start_rule": "main",
        "rules": {
            "main": { "sequence": [
                { "optional": { "literal": "a" } },
                { "literal": "b" }
            ] }
        }
    }));
    assert!(parser.parse("b").is_ok());
    assert!(parser.parse("ab").is_ok());
}

#[test]
fn lookaheads_check_without_consuming() {
    let parser = parser_for(json!({
        "start_rule": "main",
        "rules": {
            "main": { "sequence": [
                { "positive_lookahead": { "literal": "ab" } },
                { "regex": "[a-z]+", "ast": { "leaf": true, "tag": "word" } }
            ] }
        }
    }));
    let ast = parser.parse("ab").unwrap();
    assert_eq!(ast.list()[0].text, "ab");

    let parser = parser_for(json!({
        "start_rule": "main",
        "rules": {
            "main": { "sequence": [
                { "negative_lookahead": { "literal": "x" } },
                { "regex": "[a-z]+", "ast": { "leaf": true, "tag": "word" } }
            ] }
        }
    }));
    assert!(parser.parse("ab").is_ok());
    assert!(parser.parse("xy").is_err());
}

#[test]
fn discarded_parts_never_reach_the_tree() {
    let parser = parser_for(json!({
        "start_rule": "main",
        "rules": {
            "main": { "sequence": [
                { "regex": "\\s*", "ast": { "discard": true } },
                { "regex": "[a-z]+", "ast": { "leaf": true, "tag": "word" } },
                { "regex": "\\s*", "ast": { "discard": true } }
            ] }
        }
    }));
    let ast = parser.parse("  hello ").unwrap();
    assert_eq!(ast.list().len(), 1);
    assert_eq!(ast.list()[0].tag, "word");
}

#[test]
fn promoted_sequences_splice_into_the_parent() {
    let parser = parser_for(json!({
        "start_rule": "main",
        "rules": {
            "main": { "sequence": [
                { "rule": "pair" },
                { "regex": "c", "ast": { "leaf": true, "tag": "c" } }
            ] },
            "pair": {
                "sequence": [
                    { "regex": "a", "ast": { "leaf": true, "tag": "a" } },
                    { "regex": "b", "ast": { "leaf": true, "tag": "b" } }
                ],
                "ast": { "promote": true }
            }
        }
    }));
    let ast = parser.parse("abc").unwrap();
    let tags: Vec<&str> = ast.list().iter().map(|node| node.tag.as_str()).collect();
    assert_eq!(tags, vec!["a", "b", "c"]);
}

#[test]
fn a_promoted_choice_collapses_a_splicing_alternative_to_one_node() {
    let parser = parser_for(json!({
        "start_rule": "main",
        "rules": {
            "main": {
                "choice": [
                    { "sequence": [
                        { "regex": "a", "ast": { "leaf": true, "tag": "a" } },
                        { "regex": "b", "ast": { "leaf": true, "tag": "b" } }
                    ] }
                ],
                "ast": { "promote": true }
            }
        }
    }));
    // The anonymous sequence alternative splices two children, but a promoted
    // choice still produces exactly one node.
    let ast = parser.parse("ab").unwrap();
    assert_eq!(ast.tag, "main");
    assert_eq!(ast.list().len(), 2);
    assert_eq!(ast.list()[0].tag, "a");
    assert_eq!(ast.list()[1].tag, "b");
}

#[test]
fn a_parent_rule_may_retag_a_promoted_child() {
    let parser = parser_for(json!({
        "start_rule": "main",
        "rules": {
            "main": {
                "choice": [ { "rule": "word" } ],
                "ast": { "promote": true, "tag": "renamed" }
            },
            "word": { "regex": "[a-z]+", "ast": { "leaf": true } }
        }
    }));
    let ast = parser.parse("abc").unwrap();
    assert_eq!(ast.tag, "renamed");
    assert_eq!(ast.text, "abc");
}

#[test]
fn map_children_keys_slots_by_sequence_index() {
    let parser = parser_for(json!({
        "start_rule": "main",
        "rules": {
            "main": {
                "sequence": [
                    { "regex": "[a-z]+", "ast": { "leaf": true } },
                    { "literal": "=", "ast": { "discard": true } },
                    { "regex": "[0-9]+", "ast": { "leaf": true, "type": "number" } }
                ],
                "ast": { "structure": {
                    "tag": "pair",
                    "map_children": { "key": 0, "sep": 1, "value": 2 }
                } }
            }
        }
    }));
    let ast = parser.parse("a=1").unwrap();
    assert_eq!(ast.tag, "pair");
    assert_eq!(ast.get("key").unwrap().text, "a");
    assert_eq!(ast.get("value").unwrap().value, Some(AstValue::Int(1)));
    // The separator slot was discarded, so its entry is skipped.
    assert!(ast.get("sep").is_none());
}

#[test]
fn named_children_build_a_keyed_map() {
    let parser = parser_for(json!({
        "start_rule": "main",
        "rules": {
            "main": { "sequence": [
                { "regex": "[a-z]+", "ast": { "leaf": true, "name": "left" } },
                { "literal": "-", "ast": { "discard": true } },
                { "regex": "[a-z]+", "ast": { "leaf": true, "name": "right" } }
            ] }
        }
    }));
    let ast = parser.parse("ab-cd").unwrap();
    assert!(matches!(ast.children, Children::Named(_)));
    assert_eq!(ast.get("left").unwrap().text, "ab");
    assert_eq!(ast.get("right").unwrap().text, "cd");
}

#[test]
fn an_unnamed_survivor_in_a_named_sequence_is_an_error() {
    let parser = parser_for(json!({
        "start_rule": "main",
        "rules": {
            "main": { "sequence": [
                { "regex": "a", "ast": { "leaf": true, "name": "x" } },
                { "regex": "b", "ast": { "leaf": true } }
            ] }
        }
    }));
    let err = parser.parse("ab").unwrap_err();
    assert!(err.message.contains("unnamed"));
}

#[test]
fn leaf_text_is_the_exact_source_slice() {
    let parser = parser_for(json!({
        "start_rule": "main",
        "rules": {
            "main": { "sequence": [
                { "regex": "\\s+", "ast": { "discard": true } },
                { "regex": "[a-z]+", "ast": { "leaf": true, "tag": "word" } }
            ] }
        }
    }));
    let source = "\n  hello";
    let ast = parser.parse(source).unwrap();
    let word = &ast.list()[0];
    assert_eq!(word.text, "hello");
    assert_eq!((word.line, word.col), (2, 3));
}

#[test]
fn the_end_of_input_anchor_is_supported() {
    let parser = parser_for(json!({
        "start_rule": "main",
        "rules": {
            "main": { "regex": "a+\\Z" }
        }
    }));
    assert!(parser.parse("aaa").is_ok());
    assert!(parser.parse("aab").is_err());
}

#[test]
fn token_mode_consumes_the_token_stream() {
    let parser = parser_for(json!({
        "start_rule": "main",
        "rules": {
            "main": { "sequence": [
                { "token": "BOOL", "ast": { "leaf": true } },
                { "token": "NULL", "ast": { "leaf": true } }
            ] }
        },
        "lexer": [
            { "regex": "\\s+", "action": "skip" },
            { "regex": "true|false", "token": "BOOL", "ast": { "type": "bool" } },
            { "regex": "null", "token": "NULL", "ast": { "type": "null" } }
        ]
    }));
    let ast = parser.parse("true null").unwrap();
    assert_eq!(ast.list()[0].value, Some(AstValue::Bool(true)));
    assert_eq!(ast.list()[1].value, Some(AstValue::Null));
    assert_eq!(ast.list()[1].tag, "NULL");
}

#[test]
fn errors_carry_the_rule_stack_of_the_farthest_failure() {
    let parser = parser_for(json!({
        "start_rule": "main",
        "rules": {
            "main": { "rule": "inner" },
            "inner": { "literal": "x" }
        }
    }));
    let err = parser.parse("y").unwrap_err();
    assert_eq!(err.rule_stack, vec!["main".to_string(), "inner".to_string()]);
    assert!(err.message.contains("'x'"));
}

#[test]
fn parsing_may_start_from_any_rule() {
    let parser = parser_for(json!({
        "start_rule": "main",
        "rules": {
            "main": { "sequence": [ { "rule": "word" }, { "literal": "!" } ] },
            "word": { "regex": "[a-z]+", "ast": { "leaf": true } }
        }
    }));
    assert!(parser.parse("hi!").is_ok());
    let ast = parser.parse_from("hi", "word").unwrap();
    assert_eq!(ast.tag, "word");
}

#[test]
fn trailing_input_is_a_parse_error() {
    let parser = parser_for(json!({
        "start_rule": "main",
        "rules": { "main": { "regex": "[a-z]+" } }
    }));
    let err = parser.parse("abc123").unwrap_err();
    assert_eq!(err.col, 4);
}
