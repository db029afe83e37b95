//! Statement parser for assembly source.
//!
//! A program is a sequence of statements separated by newlines: either a
//! label definition (binding a name to the next instruction) or an
//! instruction with an optional operand. Operands are numeric literals
//! (parsed as int first, float on fallback) or identifiers referencing
//! labels.

use super::lexer::{Token, TokenKind};
use super::AsmError;

/// A parsed instruction operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Int(i64),
    Float(f64),
    Label(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    /// Binds a label to the address of the next instruction.
    Label(String),
    /// One instruction, operand optional.
    Instruction {
        mnemonic: String,
        operand: Option<Operand>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub line: usize,
    pub column: usize,
}

pub struct Parser<'a> {
    tokens: &'a [Token],
    current: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, current: 0 }
    }

    pub fn parse(mut self) -> Result<Vec<Statement>, AsmError> {
        let mut statements = Vec::new();

        loop {
            self.skip_newlines();
            let token = self.peek();
            match token.kind {
                TokenKind::Eof => break,
                TokenKind::Label => {
                    statements.push(Statement {
                        kind: StatementKind::Label(token.text.clone()),
                        line: token.line,
                        column: token.column,
                    });
                    self.advance();
                }
                TokenKind::Ident => statements.push(self.parse_instruction()?),
                _ => {
                    return Err(AsmError::at(
                        token.line,
                        token.column,
                        format!("unexpected token '{}'", token.text.escape_default()),
                    ));
                }
            }
        }

        Ok(statements)
    }

    fn parse_instruction(&mut self) -> Result<Statement, AsmError> {
        let token = self.peek().clone();
        self.advance();

        let operand = match self.peek().kind {
            TokenKind::Newline | TokenKind::Eof => None,
            TokenKind::Number => {
                let text = self.peek().text.clone();
                let (line, column) = (self.peek().line, self.peek().column);
                self.advance();
                Some(parse_number(&text, line, column)?)
            }
            TokenKind::Ident => {
                let label = self.peek().text.clone();
                self.advance();
                Some(Operand::Label(label))
            }
            _ => {
                let bad = self.peek();
                return Err(AsmError::at(
                    bad.line,
                    bad.column,
                    format!("unexpected operand '{}'", bad.text.escape_default()),
                ));
            }
        };

        // A statement ends at the newline (or end of input).
        match self.peek().kind {
            TokenKind::Newline => self.advance(),
            TokenKind::Eof => {}
            _ => {
                let bad = self.peek();
                return Err(AsmError::at(
                    bad.line,
                    bad.column,
                    format!("expected end of statement, found '{}'", bad.text),
                ));
            }
        }

        Ok(Statement {
            kind: StatementKind::Instruction {
                mnemonic: token.text,
                operand,
            },
            line: token.line,
            column: token.column,
        })
    }

    fn skip_newlines(&mut self) {
        while self.peek().kind == TokenKind::Newline {
            self.advance();
        }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.current < self.tokens.len() - 1 {
            self.current += 1;
        }
    }
}

/// Parses a numeric literal: integer first, float on fallback.
fn parse_number(text: &str, line: usize, column: usize) -> Result<Operand, AsmError> {
    if let Ok(value) = text.parse::<i64>() {
        return Ok(Operand::Int(value));
    }
    text.parse::<f64>()
        .map(Operand::Float)
        .map_err(|_| AsmError::at(line, column, format!("invalid number '{text}'")))
}

#[cfg(test)]
mod tests {
    use super::super::lexer::Lexer;
    use super::*;

    fn parse(source: &str) -> Vec<Statement> {
        let tokens = Lexer::new(source).tokenize().unwrap();
        Parser::new(&tokens).parse().unwrap()
    }

    #[test]
    fn parses_labels_and_instructions() {
        let statements = parse("start:\n  PUSH 1\n  JMP start\n");
        assert_eq!(statements.len(), 3);
        assert_eq!(
            statements[0].kind,
            StatementKind::Label("start".to_string())
        );
        assert_eq!(
            statements[1].kind,
            StatementKind::Instruction {
                mnemonic: "PUSH".to_string(),
                operand: Some(Operand::Int(1)),
            }
        );
        assert_eq!(
            statements[2].kind,
            StatementKind::Instruction {
                mnemonic: "JMP".to_string(),
                operand: Some(Operand::Label("start".to_string())),
            }
        );
    }

    #[test]
    fn numbers_parse_int_first_then_float() {
        let statements = parse("PUSH 5\nPUSH 5.5\nPUSH -2");
        let operands: Vec<_> = statements
            .iter()
            .map(|s| match &s.kind {
                StatementKind::Instruction { operand, .. } => operand.clone().unwrap(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(
            operands,
            vec![Operand::Int(5), Operand::Float(5.5), Operand::Int(-2)]
        );
    }

    #[test]
    fn repeated_newlines_collapse() {
        let statements = parse("\n\nNOP\n\n\nHALT\n\n");
        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn label_and_instruction_share_a_line() {
        let statements = parse("here: NOP");
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].kind, StatementKind::Label("here".to_string()));
    }

    #[test]
    fn rejects_two_operands() {
        let tokens = Lexer::new("PUSH 1 2").tokenize().unwrap();
        let err = Parser::new(&tokens).parse().unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("expected end of statement"));
    }

    #[test]
    fn empty_source_parses_to_nothing() {
        assert!(parse("").is_empty());
        assert!(parse("\n; only a comment\n").is_empty());
    }
}
