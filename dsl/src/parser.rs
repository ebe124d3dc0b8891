//! Recursive-descent parser for the `.cloche` grammar (spec §4.1).
//!
//! Builds a `cloche_common::workflow::Workflow` directly; there is no
//! separate AST stage. Nested step blocks are flattened into dotted config
//! keys as they are parsed.

use std::collections::HashMap;

use cloche_common::workflow::{Collect, CollectMode, Step, StepKind, Target, Wire, Workflow};

use crate::error::ParseError;
use crate::lexer::{lex, Token, TokenKind};

pub fn parse(source: &str) -> Result<Workflow, ParseError> {
    let tokens = lex(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_workflow()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn error(&self, expected: &str) -> ParseError {
        let tok = self.peek();
        ParseError {
            line: tok.line,
            column: tok.column,
            found: tok.kind.to_string(),
            expected: expected.to_string(),
        }
    }

    fn expect_kind(&mut self, expected: &TokenKind, label: &str) -> Result<(), ParseError> {
        if self.peek().kind == *expected {
            self.bump();
            Ok(())
        } else {
            Err(self.error(label))
        }
    }

    fn expect_ident(&mut self, label: &str) -> Result<String, ParseError> {
        match self.peek().kind.clone() {
            TokenKind::Ident(name) => {
                self.bump();
                Ok(name)
            }
            _ => Err(self.error(label)),
        }
    }

    fn expect_string(&mut self, label: &str) -> Result<String, ParseError> {
        match self.peek().kind.clone() {
            TokenKind::Str(value) => {
                self.bump();
                Ok(value)
            }
            _ => Err(self.error(label)),
        }
    }

    fn peek_ident_is(&self, name: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(id) if id == name)
    }

    fn parse_workflow(&mut self) -> Result<Workflow, ParseError> {
        if !self.peek_ident_is("workflow") {
            return Err(self.error("'workflow'"));
        }
        self.bump();
        let name = self.expect_string("workflow name string")?;
        self.expect_kind(&TokenKind::LBrace, "'{'")?;

        let mut steps = Vec::new();
        let mut wires = Vec::new();
        let mut collects = Vec::new();
        let mut config = HashMap::new();
        let mut entry: Option<String> = None;

        while self.peek().kind != TokenKind::RBrace {
            if self.peek().kind == TokenKind::Eof {
                return Err(self.error("'}'"));
            }
            if self.peek_ident_is("step") {
                let step = self.parse_step()?;
                if entry.is_none() {
                    entry = Some(step.name.clone());
                }
                steps.push(step);
            } else if self.peek_ident_is("collect") {
                collects.push(self.parse_collect()?);
            } else {
                // Either `IDENT { ... }` (a workflow-level config block) or
                // `IDENT : IDENT -> IDENT` (a wire).
                let name = self.expect_ident("identifier")?;
                if self.peek().kind == TokenKind::LBrace {
                    self.parse_config_block_into(&name, &mut config)?;
                } else {
                    wires.push(self.parse_wire_rest(name)?);
                }
            }
        }
        self.expect_kind(&TokenKind::RBrace, "'}'")?;

        let entry = entry.unwrap_or_default();
        Ok(Workflow {
            name,
            entry,
            steps,
            wires,
            collects,
            config,
        })
    }

    fn parse_step(&mut self) -> Result<Step, ParseError> {
        self.bump(); // "step"
        let name = self.expect_ident("step name")?;
        self.expect_kind(&TokenKind::LBrace, "'{'")?;

        let mut config = HashMap::new();
        let mut results: Vec<String> = Vec::new();

        while self.peek().kind != TokenKind::RBrace {
            if self.peek().kind == TokenKind::Eof {
                return Err(self.error("'}'"));
            }
            self.parse_step_field("", &mut config, &mut results)?;
        }
        self.expect_kind(&TokenKind::RBrace, "'}'")?;

        let has_run = config.contains_key("run");
        let has_prompt = config.contains_key("prompt");
        let kind = if has_run && has_prompt {
            let tok = self.peek();
            return Err(ParseError {
                line: tok.line,
                column: tok.column,
                found: format!("step '{name}' declaring both 'run' and 'prompt'"),
                expected: "exactly one of 'run' or 'prompt'".to_string(),
            });
        } else if has_run {
            StepKind::Script
        } else if has_prompt {
            StepKind::Agent
        } else {
            let tok = self.peek();
            return Err(ParseError {
                line: tok.line,
                column: tok.column,
                found: format!("step '{name}' declaring neither 'run' nor 'prompt'"),
                expected: "one of 'run' or 'prompt'".to_string(),
            });
        };

        Ok(Step {
            name,
            kind,
            results,
            config,
        })
    }

    fn parse_step_field(
        &mut self,
        prefix: &str,
        config: &mut HashMap<String, String>,
        results: &mut Vec<String>,
    ) -> Result<(), ParseError> {
        let key = self.expect_ident("field name")?;
        let full_key = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };

        if self.peek().kind == TokenKind::LBrace {
            self.bump();
            while self.peek().kind != TokenKind::RBrace {
                if self.peek().kind == TokenKind::Eof {
                    return Err(self.error("'}'"));
                }
                self.parse_step_field(&full_key, config, results)?;
            }
            self.expect_kind(&TokenKind::RBrace, "'}'")?;
            return Ok(());
        }

        self.expect_kind(&TokenKind::Equals, "'='")?;

        if self.peek().kind == TokenKind::LBracket {
            let items = self.parse_list()?;
            if key == "results" {
                *results = items;
            } else {
                config.insert(full_key, items.join(","));
            }
            return Ok(());
        }

        let value = self.parse_value()?;
        config.insert(full_key, value);
        Ok(())
    }

    /// Flattens a nested `IDENT { field* }` block (workflow-level config,
    /// e.g. `container { image = "foo" }`) into dotted keys.
    fn parse_config_block_into(
        &mut self,
        prefix: &str,
        config: &mut HashMap<String, String>,
    ) -> Result<(), ParseError> {
        self.expect_kind(&TokenKind::LBrace, "'{'")?;
        while self.peek().kind != TokenKind::RBrace {
            if self.peek().kind == TokenKind::Eof {
                return Err(self.error("'}'"));
            }
            let key = self.expect_ident("field name")?;
            self.expect_kind(&TokenKind::Equals, "'='")?;
            let value = self.parse_value()?;
            config.insert(format!("{prefix}.{key}"), value);
        }
        self.expect_kind(&TokenKind::RBrace, "'}'")?;
        Ok(())
    }

    fn parse_list(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect_kind(&TokenKind::LBracket, "'['")?;
        let mut items = Vec::new();
        if self.peek().kind != TokenKind::RBracket {
            loop {
                match self.peek().kind.clone() {
                    TokenKind::Ident(name) => {
                        self.bump();
                        items.push(name);
                    }
                    TokenKind::Str(value) => {
                        self.bump();
                        items.push(value);
                    }
                    _ => return Err(self.error("identifier or string")),
                }
                if self.peek().kind == TokenKind::Comma {
                    self.bump();
                    continue;
                }
                break;
            }
        }
        self.expect_kind(&TokenKind::RBracket, "']'")?;
        Ok(items)
    }

    /// `value := STRING | IDENT ("(" STRING ")")? ("." IDENT)*`
    fn parse_value(&mut self) -> Result<String, ParseError> {
        match self.peek().kind.clone() {
            TokenKind::Str(value) => {
                self.bump();
                Ok(value)
            }
            TokenKind::Ident(head) => {
                self.bump();
                let mut rendered = head;
                if self.peek().kind == TokenKind::LParen {
                    self.bump();
                    let arg = self.expect_string("string argument")?;
                    self.expect_kind(&TokenKind::RParen, "')'")?;
                    rendered = format!("{rendered}(\"{arg}\")");
                }
                while self.peek().kind == TokenKind::Dot {
                    self.bump();
                    let part = self.expect_ident("identifier after '.'")?;
                    rendered = format!("{rendered}.{part}");
                }
                Ok(rendered)
            }
            _ => Err(self.error("a value")),
        }
    }

    fn parse_collect(&mut self) -> Result<Collect, ParseError> {
        self.bump(); // "collect"
        let mode_name = self.expect_ident("'all' or 'any'")?;
        let mode = match mode_name.as_str() {
            "all" => CollectMode::All,
            "any" => CollectMode::Any,
            _ => {
                let tok = self.peek();
                return Err(ParseError {
                    line: tok.line,
                    column: tok.column,
                    found: format!("identifier '{mode_name}'"),
                    expected: "'all' or 'any'".to_string(),
                });
            }
        };
        self.expect_kind(&TokenKind::LParen, "'('")?;
        let mut conditions = Vec::new();
        loop {
            let step = self.expect_ident("step name")?;
            self.expect_kind(&TokenKind::Colon, "':'")?;
            let result = self.expect_ident("result name")?;
            conditions.push((step, result));
            if self.peek().kind == TokenKind::Comma {
                self.bump();
                continue;
            }
            break;
        }
        self.expect_kind(&TokenKind::RParen, "')'")?;
        self.expect_kind(&TokenKind::Arrow, "'->'")?;
        let target_name = self.expect_ident("target")?;
        Ok(Collect {
            mode,
            conditions,
            target: Target::from_name(&target_name),
        })
    }

    /// Parses the remainder of a wire whose `from_step` identifier has
    /// already been consumed by the caller.
    fn parse_wire_rest(&mut self, from_step: String) -> Result<Wire, ParseError> {
        self.expect_kind(&TokenKind::Colon, "':'")?;
        let result_name = self.expect_ident("result name")?;
        self.expect_kind(&TokenKind::Arrow, "'->'")?;
        let target_name = self.expect_ident("target")?;
        Ok(Wire {
            from_step,
            result_name,
            to_target: Target::from_name(&target_name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_linear_success_workflow() {
        let src = r#"
            workflow "demo" {
                step build {
                    run = "echo ok"
                    results = [success, fail]
                }
                build:success -> done
                build:fail -> abort
            }
        "#;
        let wf = parse(src).unwrap();
        assert_eq!(wf.name, "demo");
        assert_eq!(wf.entry, "build");
        assert_eq!(wf.steps.len(), 1);
        assert_eq!(wf.steps[0].kind, StepKind::Script);
        assert_eq!(wf.wires.len(), 2);
    }

    #[test]
    fn flattens_nested_container_block() {
        let src = r#"
            workflow "demo" {
                step build {
                    run = "echo ok"
                    results = [success]
                    container {
                        image = "rust:1"
                    }
                }
                build:success -> done
            }
        "#;
        let wf = parse(src).unwrap();
        assert_eq!(
            wf.steps[0].config_get("container.image"),
            Some("rust:1")
        );
    }

    #[test]
    fn parses_a_collect_barrier() {
        let src = r#"
            workflow "fanout" {
                step code { run = "echo" results = [success] }
                step test { run = "echo" results = [pass] }
                step lint { run = "echo" results = [pass] }
                step merge { run = "echo" results = [ok] }
                code:success -> test
                code:success -> lint
                collect all(test:pass, lint:pass) -> merge
                merge:ok -> done
            }
        "#;
        let wf = parse(src).unwrap();
        assert_eq!(wf.collects.len(), 1);
        assert_eq!(wf.collects[0].mode, CollectMode::All);
        assert_eq!(wf.collects[0].conditions.len(), 2);
    }

    #[test]
    fn preserves_file_call_value_verbatim() {
        let src = r#"
            workflow "demo" {
                step plan {
                    prompt = file("prompts/plan.txt")
                    results = [success]
                }
                plan:success -> done
            }
        "#;
        let wf = parse(src).unwrap();
        assert_eq!(
            wf.steps[0].config_get("prompt"),
            Some("file(\"prompts/plan.txt\")")
        );
    }

    #[test]
    fn rejects_a_step_with_both_run_and_prompt() {
        let src = r#"
            workflow "demo" {
                step both {
                    run = "echo"
                    prompt = "do it"
                    results = [success]
                }
            }
        "#;
        assert!(parse(src).is_err());
    }

    #[test]
    fn reports_line_and_column_on_syntax_error() {
        let src = "workflow \"demo\" {\n  step build {\n";
        let err = parse(src).unwrap_err();
        assert!(err.line >= 1);
    }
}
