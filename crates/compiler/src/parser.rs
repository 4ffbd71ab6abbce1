//! Recursive-descent parser over the lexer's token stream (spec §4.2
//! "Module form", "Statements", "Expressions").
//!
//! `if`, `while`, `return` are not reserved words in the lexer — they are
//! plain identifiers that this parser recognises by name at statement
//! position, the same way the teacher's parser special-cased its few
//! control keywords on top of a keyword-free tokeniser.
//!
//! Expressions have no precedence: `parse_expr` folds strictly left to
//! right, consuming one binary operator and one unary-or-primary operand
//! per step, exactly mirroring the grammar note in spec §4.2.

use crate::ast::{BinOp, Expr, FunctionDef, GlobalDecl, Program, Stmt, UnaryOp};
use crate::lexer::{decode_string_escapes, Token, TokenKind};
use ria_core::ValueType;

#[derive(Debug, Clone)]
pub struct ParseError {
    pub pos: usize,
    pub message: String,
}

type PResult<T> = Result<T, ParseError>;

pub fn parse(tokens: Vec<Token>) -> PResult<Program> {
    let mut p = Parser { tokens, pos: 0 };
    p.parse_program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn at_pos(&self) -> usize {
        self.peek().pos
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        ParseError { pos: self.at_pos(), message: message.into() }
    }

    fn expect(&mut self, kind: &TokenKind) -> PResult<Token> {
        if std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(kind) {
            Ok(self.advance())
        } else {
            Err(self.err(format!("expected {kind:?}, found {:?}", self.peek_kind())))
        }
    }

    fn expect_ident(&mut self, text: &str) -> PResult<()> {
        match self.peek_kind().clone() {
            TokenKind::Ident(s) if s == text => {
                self.advance();
                Ok(())
            }
            other => Err(self.err(format!("expected '{text}', found {other:?}"))),
        }
    }

    fn at_ident(&self, text: &str) -> bool {
        matches!(self.peek_kind(), TokenKind::Ident(s) if s == text)
    }

    fn parse_program(&mut self) -> PResult<Program> {
        let mut program = Program::new();
        while !matches!(self.peek_kind(), TokenKind::Eof) {
            if self.at_ident("global") {
                program.globals.push(self.parse_global()?);
            } else {
                program.functions.push(self.parse_function()?);
            }
        }
        Ok(program)
    }

    fn parse_global(&mut self) -> PResult<GlobalDecl> {
        let pos = self.at_pos();
        self.expect_ident("global")?;
        self.expect(&TokenKind::LParen)?;
        let name = match self.advance().kind {
            TokenKind::Var(n) => n,
            other => return Err(self.err(format!("expected $variable, found {other:?}"))),
        };
        let declared_type = if matches!(self.peek_kind(), TokenKind::Colon) {
            self.advance();
            let type_pos = self.at_pos();
            match self.advance().kind {
                TokenKind::Ident(t) => Some(parse_type(&t, type_pos)?),
                other => return Err(self.err(format!("expected type name, found {other:?}"))),
            }
        } else {
            None
        };
        self.expect(&TokenKind::RParen)?;
        self.expect(&TokenKind::Semi)?;
        Ok(GlobalDecl { name, declared_type, pos })
    }

    fn parse_function(&mut self) -> PResult<FunctionDef> {
        let pos = self.at_pos();
        let name = match self.advance().kind {
            TokenKind::Ident(n) => n,
            other => return Err(self.err(format!("expected function name, found {other:?}"))),
        };
        self.expect(&TokenKind::LParen)?;
        let arity_pos = self.at_pos();
        let arity = match self.advance().kind {
            TokenKind::Int(n) => {
                if n > 255 {
                    return Err(ParseError { pos: arity_pos, message: "arity must be <= 255".into() });
                }
                n as u8
            }
            other => return Err(self.err(format!("expected arity literal, found {other:?}"))),
        };
        self.expect(&TokenKind::RParen)?;
        self.expect(&TokenKind::LBrace)?;
        let body = self.parse_stmts()?;
        self.expect(&TokenKind::RBrace)?;
        Ok(FunctionDef { name, arity, body, pos })
    }

    fn parse_stmts(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while !matches!(self.peek_kind(), TokenKind::RBrace | TokenKind::Eof) {
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        let pos = self.at_pos();
        if let TokenKind::Var(name) = self.peek_kind().clone() {
            self.advance();
            self.expect(&TokenKind::Assign)?;
            let expr = self.parse_expr()?;
            self.expect(&TokenKind::Semi)?;
            return Ok(Stmt::Assign { name, expr, pos });
        }
        if self.at_ident("return") {
            self.advance();
            self.expect(&TokenKind::LParen)?;
            let expr = self.parse_expr()?;
            self.expect(&TokenKind::RParen)?;
            self.expect(&TokenKind::Semi)?;
            return Ok(Stmt::Return { expr, pos });
        }
        if self.at_ident("if") {
            self.advance();
            self.expect(&TokenKind::LParen)?;
            let cond = self.parse_expr()?;
            self.expect(&TokenKind::RParen)?;
            self.expect(&TokenKind::LBrace)?;
            let then_body = self.parse_stmts()?;
            self.expect(&TokenKind::RBrace)?;
            let else_body = if self.at_ident("else") {
                self.advance();
                self.expect(&TokenKind::LBrace)?;
                let body = self.parse_stmts()?;
                self.expect(&TokenKind::RBrace)?;
                Some(body)
            } else {
                None
            };
            return Ok(Stmt::If { cond, then_body, else_body, pos });
        }
        if self.at_ident("while") {
            self.advance();
            self.expect(&TokenKind::LParen)?;
            let cond = self.parse_expr()?;
            self.expect(&TokenKind::RParen)?;
            self.expect(&TokenKind::LBrace)?;
            let body = self.parse_stmts()?;
            self.expect(&TokenKind::RBrace)?;
            return Ok(Stmt::While { cond, body, pos });
        }
        // Remaining option: `builtin(args);` as a statement.
        if let TokenKind::Ident(name) = self.peek_kind().clone() {
            self.advance();
            self.expect(&TokenKind::LParen)?;
            let args = self.parse_args()?;
            self.expect(&TokenKind::RParen)?;
            self.expect(&TokenKind::Semi)?;
            return Ok(Stmt::CallStmt { name, args, pos });
        }
        Err(self.err(format!("expected statement, found {:?}", self.peek_kind())))
    }

    fn parse_args(&mut self) -> PResult<Vec<Expr>> {
        let mut args = Vec::new();
        if matches!(self.peek_kind(), TokenKind::RParen) {
            return Ok(args);
        }
        args.push(self.parse_expr()?);
        while matches!(self.peek_kind(), TokenKind::Comma) {
            self.advance();
            args.push(self.parse_expr()?);
        }
        Ok(args)
    }

    /// No operator precedence: fold left to right, one binary operator and
    /// one unary-or-primary operand per step (spec §4.2).
    fn parse_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_unary_or_primary()?;
        loop {
            let pos = self.at_pos();
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Rem,
                TokenKind::Amp => BinOp::BAnd,
                TokenKind::Pipe => BinOp::BOr,
                TokenKind::Caret => BinOp::Xor,
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Le => BinOp::Le,
                TokenKind::Ge => BinOp::Ge,
                TokenKind::EqEq => BinOp::Eq,
                TokenKind::NotEq => BinOp::NotEq,
                TokenKind::AndAnd => BinOp::And,
                TokenKind::OrOr => BinOp::Or,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary_or_primary()?;
            lhs = Expr::Binary { lhs: Box::new(lhs), op, rhs: Box::new(rhs), pos };
        }
        Ok(lhs)
    }

    fn parse_unary_or_primary(&mut self) -> PResult<Expr> {
        let pos = self.at_pos();
        let op = match self.peek_kind() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Bang => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_primary()?;
            return Ok(Expr::Unary { op, operand: Box::new(operand), pos });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let pos = self.at_pos();
        match self.peek_kind().clone() {
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Var(name) => {
                self.advance();
                Ok(Expr::Var { name, pos })
            }
            TokenKind::Param(n) => {
                self.advance();
                Ok(Expr::Param { index: n, pos })
            }
            TokenKind::Str(raw) => {
                self.advance();
                Ok(Expr::Str { value: decode_string_escapes(&raw), pos })
            }
            TokenKind::Int(n) => {
                self.advance();
                Ok(Expr::Int { value: n, pos })
            }
            TokenKind::Ident(name) => {
                self.advance();
                self.expect(&TokenKind::LParen)?;
                let args = self.parse_args()?;
                self.expect(&TokenKind::RParen)?;
                Ok(Expr::Call { name, args, pos })
            }
            other => Err(self.err(format!("expected operand, found {other:?}"))),
        }
    }
}

fn parse_type(text: &str, pos: usize) -> PResult<ValueType> {
    match text {
        "int" => Ok(ValueType::Int),
        "string" => Ok(ValueType::Str),
        "boolean" => Ok(ValueType::Bool),
        other => Err(ParseError { pos, message: format!("unknown type '{other}'") }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_src(src: &str) -> Program {
        parse(lex(src).unwrap()).unwrap()
    }

    #[test]
    fn parses_global_with_type() {
        let p = parse_src("global($count:int);main(0){return(0);}");
        assert_eq!(p.globals.len(), 1);
        assert_eq!(p.globals[0].name, "count");
        assert_eq!(p.globals[0].declared_type, Some(ValueType::Int));
    }

    #[test]
    fn left_to_right_fold_has_no_precedence() {
        let p = parse_src("calc(0){return(2+3*4);}");
        let f = &p.functions[0];
        match &f.body[0] {
            Stmt::Return { expr, .. } => match expr {
                Expr::Binary { lhs, op: BinOp::Mul, .. } => {
                    assert!(matches!(**lhs, Expr::Binary { op: BinOp::Add, .. }));
                }
                other => panic!("unexpected shape: {other:?}"),
            },
            other => panic!("expected return stmt, got {other:?}"),
        }
    }

    #[test]
    fn if_else_parses() {
        let p = parse_src("test(0){$a=10;if($a>5){return(\"big\");}else{return(\"small\");}}");
        let f = &p.functions[0];
        assert!(matches!(f.body[1], Stmt::If { else_body: Some(_), .. }));
    }

    #[test]
    fn builtin_call_statement() {
        let p = parse_src("run(0){set_header(\"a\",\"b\");return(0);}");
        let f = &p.functions[0];
        assert!(matches!(&f.body[0], Stmt::CallStmt { name, .. } if name == "set_header"));
    }
}
