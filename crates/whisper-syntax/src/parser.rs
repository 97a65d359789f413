//! Recursive-descent parser targeting `whisper_core::pst::Builder`
//! directly, skipping an intermediate free-standing AST — the same
//! single-pass shape `build_packed_syntax_tree`'s signature implies.
//!
//! Expression precedence, low to high: additive (`+`/`-`), multiplicative
//! (`*`/`/`), unary (`+`/`-` prefix), postfix (`.name`, `(args)`),
//! primary (integer, name, `(expr)`, `(params) => expr`).

use std::fmt;

use whisper_core::{Builder, NodeBuilder};

use crate::lexer::{tokenize, LexError, Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub line: u32,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

impl From<LexError> for ParseError {
    fn from(error: LexError) -> ParseError {
        ParseError { message: error.message, line: error.line }
    }
}

pub fn parse_program(source: &str) -> Result<NodeBuilder<'static>, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let statements = parser.parse_statements_until_eof()?;
    Ok(Builder::file(statements))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn line(&self) -> u32 {
        self.tokens[self.pos].line
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.tokens[self.pos].kind.clone();
        if !matches!(kind, TokenKind::Eof) {
            self.pos += 1;
        }
        kind
    }

    fn expect(&mut self, expected: &TokenKind, what: &str) -> Result<(), ParseError> {
        if self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected {what}, found {:?}", self.peek())))
        }
    }

    fn error(&self, message: String) -> ParseError {
        ParseError { message, line: self.line() }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, ParseError> {
        match self.advance() {
            TokenKind::Ident(name) => Ok(name),
            other => Err(self.error(format!("expected {what}, found {other:?}"))),
        }
    }

    fn parse_statements_until_eof(&mut self) -> Result<Vec<NodeBuilder<'static>>, ParseError> {
        let mut statements = Vec::new();
        while *self.peek() != TokenKind::Eof {
            statements.push(self.parse_statement()?);
        }
        Ok(statements)
    }

    fn parse_block(&mut self) -> Result<NodeBuilder<'static>, ParseError> {
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut statements = Vec::new();
        while *self.peek() != TokenKind::RBrace {
            if *self.peek() == TokenKind::Eof {
                return Err(self.error("unterminated block: expected '}'".to_string()));
            }
            statements.push(self.parse_statement()?);
        }
        self.advance();
        Ok(Builder::block(statements))
    }

    fn parse_statement(&mut self) -> Result<NodeBuilder<'static>, ParseError> {
        match self.peek() {
            TokenKind::Semicolon => {
                self.advance();
                Ok(Builder::empty_stmt())
            }
            TokenKind::Return => self.parse_return_stmt(),
            TokenKind::If => self.parse_if_stmt(),
            TokenKind::Def => self.parse_def_stmt(),
            TokenKind::Var => self.parse_binding_stmt(false),
            TokenKind::Const => self.parse_binding_stmt(true),
            TokenKind::Loop => self.parse_loop_stmt(),
            _ => {
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::Semicolon, "';' after expression statement")?;
                Ok(Builder::expr_stmt(expr))
            }
        }
    }

    fn parse_return_stmt(&mut self) -> Result<NodeBuilder<'static>, ParseError> {
        self.advance();
        let expr = if *self.peek() == TokenKind::Semicolon {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&TokenKind::Semicolon, "';' after return statement")?;
        Ok(Builder::return_stmt(expr))
    }

    fn parse_if_stmt(&mut self) -> Result<NodeBuilder<'static>, ParseError> {
        self.advance();
        let mut arms = vec![self.parse_if_arm()?];
        let mut else_body = None;
        loop {
            if *self.peek() != TokenKind::Else {
                break;
            }
            self.advance();
            if *self.peek() == TokenKind::If {
                self.advance();
                arms.push(self.parse_if_arm()?);
            } else {
                else_body = Some(self.parse_block()?);
                break;
            }
        }
        Ok(Builder::if_stmt(arms, else_body))
    }

    fn parse_if_arm(&mut self) -> Result<(NodeBuilder<'static>, NodeBuilder<'static>), ParseError> {
        self.expect(&TokenKind::LParen, "'(' after 'if'")?;
        let cond = self.parse_expr()?;
        self.expect(&TokenKind::RParen, "')' after if condition")?;
        let body = self.parse_block()?;
        Ok((cond, body))
    }

    fn parse_def_stmt(&mut self) -> Result<NodeBuilder<'static>, ParseError> {
        self.advance();
        let name = self.expect_ident("a function name after 'def'")?;
        self.expect(&TokenKind::LParen, "'(' after function name")?;
        let params = self.parse_param_names()?;
        self.expect(&TokenKind::RParen, "')' after parameter list")?;
        let body = self.parse_block()?;
        let param_refs: Vec<&str> = params.iter().map(String::as_str).collect();
        Ok(Builder::def_stmt(&name, &param_refs, body))
    }

    fn parse_param_names(&mut self) -> Result<Vec<String>, ParseError> {
        let mut params = Vec::new();
        if *self.peek() == TokenKind::RParen {
            return Ok(params);
        }
        loop {
            params.push(self.expect_ident("a parameter name")?);
            if *self.peek() == TokenKind::Comma {
                self.advance();
            } else {
                break;
            }
        }
        Ok(params)
    }

    fn parse_binding_stmt(&mut self, is_const: bool) -> Result<NodeBuilder<'static>, ParseError> {
        self.advance();
        let mut bindings = Vec::new();
        loop {
            let name = self.expect_ident("a binding name")?;
            let init = if *self.peek() == TokenKind::Equals {
                self.advance();
                Some(self.parse_expr()?)
            } else {
                None
            };
            bindings.push((name, init));
            if *self.peek() == TokenKind::Comma {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&TokenKind::Semicolon, "';' after binding statement")?;
        let names: Vec<String> = bindings.iter().map(|(n, _)| n.clone()).collect();
        let inits: Vec<Option<NodeBuilder<'static>>> = bindings.into_iter().map(|(_, init)| init).collect();
        let binding_refs: Vec<(&str, Option<NodeBuilder<'static>>)> = names.iter().map(String::as_str).zip(inits).collect();
        Ok(Builder::binding_stmt(is_const, binding_refs))
    }

    fn parse_loop_stmt(&mut self) -> Result<NodeBuilder<'static>, ParseError> {
        self.advance();
        self.expect(&TokenKind::LParen, "'(' after 'loop'")?;
        let cond = self.parse_expr()?;
        self.expect(&TokenKind::RParen, "')' after loop condition")?;
        let body = self.parse_block()?;
        Ok(Builder::loop_stmt(cond, body))
    }

    fn parse_expr(&mut self) -> Result<NodeBuilder<'static>, ParseError> {
        self.parse_additive()
    }

    fn parse_additive(&mut self) -> Result<NodeBuilder<'static>, ParseError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            match self.peek() {
                TokenKind::Plus => {
                    self.advance();
                    let rhs = self.parse_multiplicative()?;
                    lhs = Builder::add_expr(lhs, rhs);
                }
                TokenKind::Minus => {
                    self.advance();
                    let rhs = self.parse_multiplicative()?;
                    lhs = Builder::sub_expr(lhs, rhs);
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<NodeBuilder<'static>, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            match self.peek() {
                TokenKind::Star => {
                    self.advance();
                    let rhs = self.parse_unary()?;
                    lhs = Builder::mul_expr(lhs, rhs);
                }
                TokenKind::Slash => {
                    self.advance();
                    let rhs = self.parse_unary()?;
                    lhs = Builder::div_expr(lhs, rhs);
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<NodeBuilder<'static>, ParseError> {
        match self.peek() {
            TokenKind::Plus => {
                self.advance();
                Ok(Builder::pos_expr(self.parse_unary()?))
            }
            TokenKind::Minus => {
                self.advance();
                Ok(Builder::neg_expr(self.parse_unary()?))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<NodeBuilder<'static>, ParseError> {
        let mut node = self.parse_primary()?;
        loop {
            match self.peek() {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect_ident("a field name after '.'")?;
                    node = Builder::dot_expr(node, &name);
                }
                TokenKind::LParen => {
                    self.advance();
                    let args = self.parse_arg_list()?;
                    self.expect(&TokenKind::RParen, "')' after call arguments")?;
                    node = Builder::call_expr(node, args);
                }
                _ => break,
            }
        }
        Ok(node)
    }

    fn parse_arg_list(&mut self) -> Result<Vec<NodeBuilder<'static>>, ParseError> {
        let mut args = Vec::new();
        if *self.peek() == TokenKind::RParen {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if *self.peek() == TokenKind::Comma {
                self.advance();
            } else {
                break;
            }
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<NodeBuilder<'static>, ParseError> {
        match self.peek().clone() {
            TokenKind::Integer(value) => {
                self.advance();
                Ok(Builder::integer_expr(value))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Builder::name_expr(&name))
            }
            TokenKind::LParen => self.parse_paren_or_arrow(),
            other => Err(self.error(format!("expected an expression, found {other:?}"))),
        }
    }

    /// `(` starts either a parenthesized expression or an arrow function's
    /// parameter list — both begin identically, so this speculatively
    /// parses a parameter list first and only commits to it if a `=>`
    /// actually follows the closing `)`; otherwise it rewinds and parses
    /// an ordinary parenthesized expression.
    fn parse_paren_or_arrow(&mut self) -> Result<NodeBuilder<'static>, ParseError> {
        let checkpoint = self.pos;
        if let Some(params) = self.try_parse_arrow_header() {
            let param_refs: Vec<&str> = params.iter().map(String::as_str).collect();
            let body = self.parse_expr()?;
            return Ok(Builder::arrow_expr(&param_refs, body));
        }
        self.pos = checkpoint;
        self.advance();
        let inner = self.parse_expr()?;
        self.expect(&TokenKind::RParen, "')' to close parenthesized expression")?;
        Ok(Builder::paren_expr(inner))
    }

    /// Tries to consume `(` ident-list `)` `=>`, returning the parameter
    /// names on success. Leaves `self.pos` positioned just after `=>` on
    /// success; the caller must restore `self.pos` itself on failure.
    fn try_parse_arrow_header(&mut self) -> Option<Vec<String>> {
        debug_assert_eq!(*self.peek(), TokenKind::LParen);
        self.advance();
        let mut params = Vec::new();
        if *self.peek() != TokenKind::RParen {
            loop {
                match self.peek().clone() {
                    TokenKind::Ident(name) => {
                        self.advance();
                        params.push(name);
                    }
                    _ => return None,
                }
                if *self.peek() == TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        if *self.peek() != TokenKind::RParen {
            return None;
        }
        self.advance();
        if *self.peek() != TokenKind::FatArrow {
            return None;
        }
        self.advance();
        Some(params)
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use whisper_core::NodeType;

    use super::*;

    fn build(source: &str) -> whisper_core::PackedSyntaxTree {
        Builder::new().build(parse_program(source).unwrap())
    }

    #[test]
    fn parses_a_binding_and_name_reference() {
        let tree = Rc::new(build("var x = 3; x;"));
        let file = tree.root();
        assert_eq!(file.child_count(), 2);
        assert_eq!(file.child(0).node_type(), NodeType::VarStmt);
        assert_eq!(file.child(1).node_type(), NodeType::ExprStmt);
    }

    #[test]
    fn parses_operator_precedence() {
        let tree = Rc::new(build("(1 + 2) * 10;"));
        let mul = tree.root().child(0).child(0);
        assert_eq!(mul.node_type(), NodeType::MulExpr);
        assert_eq!(mul.child(0).node_type(), NodeType::ParenExpr);
    }

    #[test]
    fn parses_call_and_dot_chains() {
        let tree = Rc::new(build("f(1, 2).g();"));
        let call = tree.root().child(0).child(0);
        assert_eq!(call.node_type(), NodeType::CallExpr);
        assert_eq!(call.call_expr_callee().node_type(), NodeType::DotExpr);
    }

    #[test]
    fn parses_arrow_expression_distinct_from_parens() {
        let tree = Rc::new(build("(a, b) => a + b;"));
        let arrow = tree.root().child(0).child(0);
        assert_eq!(arrow.node_type(), NodeType::ArrowExpr);
    }

    #[test]
    fn parses_if_elsif_else_chain() {
        let tree = Rc::new(build("if (0) { 1; } else if (1) { 2; } else { 3; }"));
        let if_stmt = tree.root().child(0);
        assert_eq!(if_stmt.node_type(), NodeType::IfStmt);
        assert_eq!(if_stmt.if_arm_count(), 2);
        assert!(if_stmt.if_has_else());
    }

    #[test]
    fn unterminated_block_is_a_parse_error() {
        let err = parse_program("def f() { return 1;");
        assert!(err.is_err());
    }
}
