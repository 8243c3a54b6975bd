//! Pratt parser turning a [`crate::lexer`] token stream into an
//! [`crate::ast`] program.
//!
//! Binding powers below implement the precedence table from the
//! specification (lowest to highest): assign, lambda, join (`,`), or, and,
//! bit-or, bit-and, equals, compare, sum, product, exp, prefix, index/call.
//! `,` and the assignment operators are right-associative; everything else,
//! including the lambda arrow, is left-associative.

use crate::ast::{Expr, InfixOp, MatchArm, PrefixOp, Program, Stmt};
use crate::lexer::{self, LexError, Token, TokenKind};

const ASSIGN_BP: u8 = 10;
const LAMBDA_BP: u8 = 20;
const COMMA_BP: u8 = 30;
const OR_BP: u8 = 40;
const AND_BP: u8 = 50;
const BITOR_BP: u8 = 60;
const BITAND_BP: u8 = 70;
const EQ_BP: u8 = 80;
const CMP_BP: u8 = 90;
const SUM_BP: u8 = 100;
const PRODUCT_BP: u8 = 110;
const EXP_BP: u8 = 120;
const PREFIX_BP: u8 = 130;
const POSTFIX_BP: u8 = 140;

#[derive(Debug, thiserror::Error, miette::Diagnostic, Clone, PartialEq)]
pub enum ParseError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Lex(#[from] LexError),
    #[error("expected {expected}, found {found:?} at line {line}, column {column}")]
    Unexpected {
        expected: String,
        found: TokenKind,
        line: u32,
        column: u32,
    },
    #[error("model/lambda parameter list may only contain identifiers (at line {line}, column {column})")]
    BadParameterList { line: u32, column: u32 },
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_kind(&self) -> TokenKind {
        self.tokens[self.pos].kind
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn err_unexpected(&self, expected: &str) -> ParseError {
        let tok = self.peek();
        ParseError::Unexpected {
            expected: expected.to_string(),
            found: tok.kind,
            line: tok.start.line,
            column: tok.start.column,
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token, ParseError> {
        if self.peek_kind() == kind {
            Ok(self.bump())
        } else {
            Err(self.err_unexpected(expected))
        }
    }

    fn skip_semis(&mut self) {
        while self.peek_kind() == TokenKind::Semi {
            self.bump();
        }
    }

    fn eat_semi_if_present(&mut self) {
        if self.peek_kind() == TokenKind::Semi {
            self.bump();
        }
    }

    fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut stmts = Vec::new();
        self.skip_semis();
        while self.peek_kind() != TokenKind::Eof {
            stmts.push(self.parse_stmt()?);
            self.eat_semi_if_present();
            self.skip_semis();
        }
        Ok(stmts)
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        self.skip_semis();
        while self.peek_kind() != TokenKind::RBrace {
            stmts.push(self.parse_stmt()?);
            self.eat_semi_if_present();
            self.skip_semis();
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        match self.peek_kind() {
            TokenKind::Return => {
                self.bump();
                if matches!(
                    self.peek_kind(),
                    TokenKind::Semi | TokenKind::RBrace | TokenKind::Eof
                ) {
                    Ok(Stmt::Return(None))
                } else {
                    Ok(Stmt::Return(Some(self.parse_expr(0)?)))
                }
            }
            TokenKind::Break => {
                self.bump();
                Ok(Stmt::Break)
            }
            TokenKind::Next => {
                self.bump();
                Ok(Stmt::Next)
            }
            _ => Ok(Stmt::Expr(self.parse_expr(0)?)),
        }
    }

    /// Parses a comma-and-assign-free expression, suitable for list
    /// elements, map keys/values, and model/call parameter lists where `,`
    /// must act as a delimiter rather than the tuple operator.
    fn parse_element(&mut self) -> Result<Expr, ParseError> {
        self.parse_expr(COMMA_BP + 1)
    }

    fn parse_expr(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_prefix()?;

        loop {
            let kind = self.peek_kind();
            macro_rules! left_assoc {
                ($bp:expr, $op:expr) => {{
                    if $bp < min_bp {
                        break;
                    }
                    self.bump();
                    let rhs = self.parse_expr($bp + 1)?;
                    lhs = Expr::Infix {
                        op: $op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    };
                    continue;
                }};
            }
            macro_rules! right_assoc {
                ($bp:expr, $op:expr) => {{
                    if $bp < min_bp {
                        break;
                    }
                    self.bump();
                    let rhs = self.parse_expr($bp)?;
                    lhs = Expr::Infix {
                        op: $op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    };
                    continue;
                }};
            }

            match kind {
                TokenKind::Assign => right_assoc!(ASSIGN_BP, InfixOp::Assign),
                TokenKind::Declare => right_assoc!(ASSIGN_BP, InfixOp::Declare),
                TokenKind::FatArrow => {
                    if LAMBDA_BP < min_bp {
                        break;
                    }
                    self.bump();
                    let body = self.parse_expr(LAMBDA_BP + 1)?;
                    lhs = Expr::Lambda {
                        params: Box::new(lhs),
                        body: Box::new(body),
                    };
                }
                TokenKind::Comma => right_assoc!(COMMA_BP, InfixOp::Comma),
                TokenKind::Or => left_assoc!(OR_BP, InfixOp::Or),
                TokenKind::And => left_assoc!(AND_BP, InfixOp::And),
                TokenKind::Pipe => left_assoc!(BITOR_BP, InfixOp::BitOr),
                TokenKind::Amp => left_assoc!(BITAND_BP, InfixOp::BitAnd),
                TokenKind::Eq => left_assoc!(EQ_BP, InfixOp::Eq),
                TokenKind::NotEq => left_assoc!(EQ_BP, InfixOp::NotEq),
                TokenKind::Lt => left_assoc!(CMP_BP, InfixOp::Lt),
                TokenKind::Gt => left_assoc!(CMP_BP, InfixOp::Gt),
                TokenKind::LtEq => left_assoc!(CMP_BP, InfixOp::LtEq),
                TokenKind::GtEq => left_assoc!(CMP_BP, InfixOp::GtEq),
                TokenKind::Plus => left_assoc!(SUM_BP, InfixOp::Add),
                TokenKind::Minus => left_assoc!(SUM_BP, InfixOp::Sub),
                TokenKind::Star => left_assoc!(PRODUCT_BP, InfixOp::Mul),
                TokenKind::Slash => left_assoc!(PRODUCT_BP, InfixOp::Div),
                TokenKind::Percent => left_assoc!(PRODUCT_BP, InfixOp::Mod),
                TokenKind::Caret => left_assoc!(EXP_BP, InfixOp::Exp),
                TokenKind::FloorDiv => left_assoc!(EXP_BP, InfixOp::FloorDiv),
                TokenKind::Dot => {
                    if POSTFIX_BP < min_bp {
                        break;
                    }
                    self.bump();
                    let name_tok = self.expect(TokenKind::Ident, "identifier after '.'")?;
                    lhs = Expr::Infix {
                        op: InfixOp::Dot,
                        lhs: Box::new(lhs),
                        rhs: Box::new(Expr::Ident(name_tok.literal)),
                    };
                }
                TokenKind::LParen => {
                    if POSTFIX_BP < min_bp {
                        break;
                    }
                    self.bump();
                    let arg = if self.peek_kind() == TokenKind::RParen {
                        None
                    } else {
                        Some(Box::new(self.parse_expr(0)?))
                    };
                    self.expect(TokenKind::RParen, "')'")?;
                    lhs = Expr::Call {
                        callee: Box::new(lhs),
                        arg,
                    };
                }
                TokenKind::LSquare => {
                    // `a[b]` is sugar for a call whose argument is the
                    // bracketed expressions wrapped in a list literal; the
                    // compiler recognises a length-1 list argument as a
                    // subscript rather than a real invocation.
                    if POSTFIX_BP < min_bp {
                        break;
                    }
                    self.bump();
                    let mut items = vec![self.parse_element()?];
                    while self.peek_kind() == TokenKind::Comma {
                        self.bump();
                        if self.peek_kind() == TokenKind::RSquare {
                            break;
                        }
                        items.push(self.parse_element()?);
                    }
                    self.expect(TokenKind::RSquare, "']'")?;
                    lhs = Expr::Call {
                        callee: Box::new(lhs),
                        arg: Some(Box::new(Expr::List(items))),
                    };
                }
                _ => break,
            }
        }

        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ParseError> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Number => {
                self.bump();
                Ok(Expr::Number(tok.number))
            }
            TokenKind::String => {
                self.bump();
                Ok(Expr::Str(tok.literal))
            }
            TokenKind::True => {
                self.bump();
                Ok(Expr::Bool(true))
            }
            TokenKind::False => {
                self.bump();
                Ok(Expr::Bool(false))
            }
            TokenKind::Nil => {
                self.bump();
                Ok(Expr::Nil)
            }
            TokenKind::Ident => {
                self.bump();
                Ok(Expr::Ident(tok.literal))
            }
            TokenKind::Minus => {
                self.bump();
                let rhs = self.parse_expr(PREFIX_BP)?;
                Ok(Expr::Prefix {
                    op: PrefixOp::Neg,
                    rhs: Box::new(rhs),
                })
            }
            TokenKind::Plus => {
                self.bump();
                let rhs = self.parse_expr(PREFIX_BP)?;
                Ok(Expr::Prefix {
                    op: PrefixOp::Pos,
                    rhs: Box::new(rhs),
                })
            }
            TokenKind::Bang => {
                self.bump();
                let rhs = self.parse_expr(PREFIX_BP)?;
                Ok(Expr::Prefix {
                    op: PrefixOp::Not,
                    rhs: Box::new(rhs),
                })
            }
            TokenKind::Comma => {
                self.bump();
                let rhs = self.parse_expr(PREFIX_BP)?;
                Ok(Expr::Prefix {
                    op: PrefixOp::Tuple,
                    rhs: Box::new(rhs),
                })
            }
            TokenKind::LParen => {
                self.bump();
                if self.peek_kind() == TokenKind::RParen {
                    self.bump();
                    return Ok(Expr::Unit);
                }
                let inner = self.parse_expr(0)?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::LSquare => self.parse_list(),
            TokenKind::Map => self.parse_map_literal(),
            TokenKind::Model => self.parse_model_literal(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Loop => self.parse_loop(),
            TokenKind::For => self.parse_for(),
            TokenKind::Match => self.parse_match(),
            TokenKind::LBrace => Ok(Expr::Block(self.parse_block()?)),
            TokenKind::Import => self.parse_import(),
            _ => Err(self.err_unexpected("an expression")),
        }
    }

    fn parse_list(&mut self) -> Result<Expr, ParseError> {
        self.expect(TokenKind::LSquare, "'['")?;
        let mut elems = Vec::new();
        if self.peek_kind() != TokenKind::RSquare {
            elems.push(self.parse_element()?);
            while self.peek_kind() == TokenKind::Comma {
                self.bump();
                if self.peek_kind() == TokenKind::RSquare {
                    break;
                }
                elems.push(self.parse_element()?);
            }
        }
        self.expect(TokenKind::RSquare, "']'")?;
        Ok(Expr::List(elems))
    }

    fn parse_map_literal(&mut self) -> Result<Expr, ParseError> {
        self.expect(TokenKind::Map, "'map'")?;
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut pairs = Vec::new();
        if self.peek_kind() != TokenKind::RBrace {
            loop {
                let key = self.parse_element()?;
                self.expect(TokenKind::Colon, "':'")?;
                let val = self.parse_element()?;
                pairs.push((key, val));
                if self.peek_kind() == TokenKind::Comma {
                    self.bump();
                    if self.peek_kind() == TokenKind::RBrace {
                        break;
                    }
                    continue;
                }
                break;
            }
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(Expr::Map(pairs))
    }

    fn parse_model_literal(&mut self) -> Result<Expr, ParseError> {
        self.expect(TokenKind::Model, "'model'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if self.peek_kind() != TokenKind::RParen {
            loop {
                let tok = self.expect(TokenKind::Ident, "parameter name")?;
                params.push(Expr::Ident(tok.literal));
                if self.peek_kind() == TokenKind::Comma {
                    self.bump();
                    continue;
                }
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(Expr::Model(params))
    }

    fn parse_if(&mut self) -> Result<Expr, ParseError> {
        self.expect(TokenKind::If, "'if'")?;
        let cond = self.parse_expr(0)?;
        self.expect(TokenKind::Then, "'then'")?;
        let then_branch = self.parse_expr(0)?;
        self.expect(TokenKind::Else, "'else'")?;
        let else_branch = self.parse_expr(0)?;
        Ok(Expr::If {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    fn parse_while(&mut self) -> Result<Expr, ParseError> {
        self.expect(TokenKind::While, "'while'")?;
        let cond = self.parse_expr(0)?;
        self.expect(TokenKind::Do, "'do'")?;
        let body = self.parse_block()?;
        Ok(Expr::While {
            cond: Box::new(cond),
            body,
        })
    }

    fn parse_loop(&mut self) -> Result<Expr, ParseError> {
        self.expect(TokenKind::Loop, "'loop'")?;
        self.expect(TokenKind::Do, "'do'")?;
        let body = self.parse_block()?;
        Ok(Expr::Loop { body })
    }

    fn parse_for(&mut self) -> Result<Expr, ParseError> {
        self.expect(TokenKind::For, "'for'")?;
        let name = self.expect(TokenKind::Ident, "loop variable")?.literal;
        self.expect(TokenKind::In, "'in'")?;
        let iter = self.parse_expr(0)?;
        self.expect(TokenKind::Do, "'do'")?;
        let body = self.parse_block()?;
        Ok(Expr::For {
            name,
            iter: Box::new(iter),
            body,
        })
    }

    fn parse_match(&mut self) -> Result<Expr, ParseError> {
        self.expect(TokenKind::Match, "'match'")?;
        let subject = self.parse_expr(0)?;
        self.expect(TokenKind::Where, "'where'")?;
        let mut arms = Vec::new();
        while self.peek_kind() == TokenKind::Pipe {
            self.bump();
            let pattern = if self.peek_kind() == TokenKind::Ident && self.peek().literal == "_" {
                self.bump();
                None
            } else {
                Some(self.parse_element()?)
            };
            self.expect(TokenKind::RightArrow, "'->'")?;
            let body = self.parse_element()?;
            arms.push(MatchArm { pattern, body });
            if self.peek_kind() == TokenKind::Comma {
                self.bump();
            } else {
                break;
            }
        }
        Ok(Expr::Match {
            subject: Box::new(subject),
            arms,
        })
    }

    fn parse_import(&mut self) -> Result<Expr, ParseError> {
        self.expect(TokenKind::Import, "'import'")?;
        let path = self.expect(TokenKind::String, "import path string")?.literal;
        let alias = if self.peek_kind() == TokenKind::In {
            self.bump();
            Some(self.expect(TokenKind::Ident, "import alias")?.literal)
        } else {
            None
        };
        Ok(Expr::Import { path, alias })
    }
}

/// Parses a complete program from source text.
pub fn parse(source: &str) -> Result<Program, ParseError> {
    let tokens = lexer::lex(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_program()
}

/// Parses a single expression (used by the REPL, which evaluates one line
/// at a time and does not require a trailing `SEMI`).
pub fn parse_expr_standalone(source: &str) -> Result<Expr, ParseError> {
    let tokens = lexer::lex(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr(0)?;
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, InfixOp, Stmt};

    fn expr_of(src: &str) -> Expr {
        let prog = parse(src).unwrap();
        match &prog[0] {
            Stmt::Expr(e) => e.clone(),
            other => panic!("expected expr statement, got {other:?}"),
        }
    }

    #[test]
    fn precedence_product_before_sum() {
        let e = expr_of("1 + 2 * 3;");
        assert_eq!(
            e,
            Expr::Infix {
                op: InfixOp::Add,
                lhs: Box::new(Expr::Number(1.0)),
                rhs: Box::new(Expr::Infix {
                    op: InfixOp::Mul,
                    lhs: Box::new(Expr::Number(2.0)),
                    rhs: Box::new(Expr::Number(3.0)),
                }),
            }
        );
    }

    #[test]
    fn assignment_is_right_associative() {
        let e = expr_of("a = b = 1;");
        match e {
            Expr::Infix {
                op: InfixOp::Assign,
                rhs,
                ..
            } => assert!(matches!(*rhs, Expr::Infix { op: InfixOp::Assign, .. })),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn call_with_parameter_list_parses_as_call() {
        let e = expr_of("f(a, b) = a + b;");
        match e {
            Expr::Infix {
                op: InfixOp::Assign,
                lhs,
                ..
            } => match *lhs {
                Expr::Call { callee, arg } => {
                    assert_eq!(*callee, Expr::Ident("f".into()));
                    assert!(matches!(*arg.unwrap(), Expr::Infix { op: InfixOp::Comma, .. }));
                }
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn dot_is_subscript_sugar() {
        let e = expr_of("p.x;");
        assert_eq!(
            e,
            Expr::Infix {
                op: InfixOp::Dot,
                lhs: Box::new(Expr::Ident("p".into())),
                rhs: Box::new(Expr::Ident("x".into())),
            }
        );
    }

    #[test]
    fn if_then_else_chaining() {
        let e = expr_of("if false then 1 else if true then 2 else 3;");
        match e {
            Expr::If { else_branch, .. } => {
                assert!(matches!(*else_branch, Expr::If { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn match_with_wildcard() {
        let e = expr_of(r#"match 2 where | 1 -> "one" , | 2 -> "two" , | _ -> "many";"#);
        match e {
            Expr::Match { arms, .. } => {
                assert_eq!(arms.len(), 3);
                assert!(arms[2].pattern.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn model_literal() {
        let e = expr_of("model(x, y);");
        assert_eq!(
            e,
            Expr::Model(vec![Expr::Ident("x".into()), Expr::Ident("y".into())])
        );
    }

    #[test]
    fn lambda_literal() {
        let e = expr_of("(x, y) => x + y;");
        match e {
            Expr::Lambda { params, body } => {
                assert!(matches!(*params, Expr::Infix { op: InfixOp::Comma, .. }));
                assert!(matches!(*body, Expr::Infix { op: InfixOp::Add, .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bracket_index_desugars_to_call_with_length_one_list() {
        let e = expr_of("a[0];");
        assert_eq!(
            e,
            Expr::Call {
                callee: Box::new(Expr::Ident("a".into())),
                arg: Some(Box::new(Expr::List(vec![Expr::Number(0.0)]))),
            }
        );
    }

    #[test]
    fn list_commas_do_not_build_tuple() {
        let e = expr_of("[1, 2, 3];");
        assert_eq!(
            e,
            Expr::List(vec![Expr::Number(1.0), Expr::Number(2.0), Expr::Number(3.0)])
        );
    }
}
