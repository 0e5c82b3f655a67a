use std::rc::Rc;

use super::ast::{BinOp, CmpOp, Expr, LambdaDef, Program, Stmt, StmtKind, Target, UnaryOp};
use super::lexer::{Spanned, Token, tokenize};
use super::{FutureFlags, Result, ScriptError};

static EOF: Token = Token::Eof;

/// Deepest expression nesting accepted before a syntax error.
const MAX_NESTING: usize = 100;

const KEYWORDS: &[&str] = &[
    "and", "or", "not", "in", "is", "if", "else", "lambda", "None", "True", "False", "from",
    "import", "del", "pass", "as",
];

/// Parse console source into a [`Program`].
///
/// `flags` are the compatibility flags already in effect; any
/// `from __future__ import` statements add to them from that point on and the
/// combined set is returned in [`Program::flags`].
pub fn parse_program(source: &str, file: &str, flags: FutureFlags) -> Result<Program> {
    let tokens = tokenize(source, file)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        file,
        flags,
        depth: 0,
    };

    let mut stmts = Vec::new();
    loop {
        parser.skip_separators();
        if parser.at_eof() {
            break;
        }
        stmts.push(parser.statement()?);
        if !parser.at_eof() && !parser.eat_separator() {
            return Err(parser.error("invalid syntax"));
        }
    }

    Ok(Program {
        stmts,
        flags: parser.flags,
    })
}

struct Parser<'a> {
    tokens: Vec<Spanned>,
    pos: usize,
    file: &'a str,
    flags: FutureFlags,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .or_else(|| self.tokens.last())
            .map(|s| &s.token)
            .unwrap_or(&EOF)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.line)
            .unwrap_or(1)
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn is_op(&self, op: &str) -> bool {
        matches!(self.peek(), Token::Op(current) if *current == op)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.is_op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", op)))
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Token::Name(name) if name == keyword)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", keyword)))
        }
    }

    fn expect_name(&mut self) -> Result<String> {
        match self.peek().clone() {
            Token::Name(name) if !KEYWORDS.contains(&name.as_str()) => {
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error("expected a name")),
        }
    }

    fn skip_separators(&mut self) {
        while self.eat_separator() {}
    }

    fn eat_separator(&mut self) -> bool {
        if matches!(self.peek(), Token::Newline) {
            self.pos += 1;
            true
        } else {
            self.eat_op(";")
        }
    }

    fn statement(&mut self) -> Result<Stmt> {
        let line = self.line();
        let kind = if self.eat_keyword("from") {
            self.future_import()?
        } else if self.eat_keyword("import") {
            let module = self.dotted_name()?;
            let bind_as = if self.eat_keyword("as") {
                self.expect_name()?
            } else {
                module.rsplit('.').next().unwrap_or(module.as_str()).to_string()
            };
            StmtKind::Import { module, bind_as }
        } else if self.eat_keyword("del") {
            let mut names = vec![self.expect_name()?];
            while self.eat_op(",") {
                names.push(self.expect_name()?);
            }
            StmtKind::Delete(names)
        } else if self.eat_keyword("pass") {
            StmtKind::Pass
        } else {
            let expr = self.expression()?;
            if self.eat_op("=") {
                let target = self.target(expr)?;
                let value = self.expression()?;
                StmtKind::Assign { target, value }
            } else if let Some(op) = self.augmented_op() {
                let target = self.target(expr)?;
                let value = self.expression()?;
                StmtKind::AugAssign { target, op, value }
            } else {
                StmtKind::Expr(expr)
            }
        };
        Ok(Stmt { line, kind })
    }

    fn future_import(&mut self) -> Result<StmtKind> {
        let module = self.dotted_name()?;
        if module != "__future__" {
            return Err(self.error("only 'from __future__ import ...' is supported"));
        }
        self.expect_keyword("import")?;
        let mut names = vec![self.expect_name()?];
        while self.eat_op(",") {
            names.push(self.expect_name()?);
        }
        for name in &names {
            let flag = FutureFlags::from_feature(name)
                .ok_or_else(|| self.error(&format!("future feature {} is not defined", name)))?;
            self.flags |= flag;
        }
        Ok(StmtKind::Future(names))
    }

    fn dotted_name(&mut self) -> Result<String> {
        let mut name = self.expect_name()?;
        while self.eat_op(".") {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    fn augmented_op(&mut self) -> Option<BinOp> {
        let op = match self.peek() {
            Token::Op("+=") => BinOp::Add,
            Token::Op("-=") => BinOp::Sub,
            Token::Op("*=") => BinOp::Mul,
            Token::Op("/=") => BinOp::Div,
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    fn target(&self, expr: Expr) -> Result<Target> {
        match expr {
            Expr::Name(name) => Ok(Target::Name(name)),
            Expr::Attribute { object, name } => Ok(Target::Attribute {
                object: *object,
                name,
            }),
            Expr::Index { object, index } => Ok(Target::Index {
                object: *object,
                index: *index,
            }),
            _ => Err(self.error("cannot assign to expression")),
        }
    }

    fn expression(&mut self) -> Result<Expr> {
        self.nested(Self::conditional)
    }

    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_NESTING {
            return Err(self.error("too many nested parentheses"));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn conditional(&mut self) -> Result<Expr> {
        if self.eat_keyword("lambda") {
            return self.lambda();
        }
        let body = self.or_expr()?;
        if self.eat_keyword("if") {
            let test = self.or_expr()?;
            self.expect_keyword("else")?;
            let orelse = self.expression()?;
            return Ok(Expr::Conditional {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            });
        }
        Ok(body)
    }

    fn lambda(&mut self) -> Result<Expr> {
        let line = self.line();
        let mut params = Vec::new();
        if !self.is_op(":") {
            loop {
                let param = self.expect_name()?;
                if params.contains(&param) {
                    return Err(self.error(&format!(
                        "duplicate argument '{}' in function definition",
                        param
                    )));
                }
                params.push(param);
                if !self.eat_op(",") {
                    break;
                }
            }
        }
        self.expect_op(":")?;
        let body = self.expression()?;
        Ok(Expr::Lambda(Rc::new(LambdaDef { params, body, line })))
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut left = self.and_expr()?;
        while self.eat_keyword("or") {
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut left = self.not_expr()?;
        while self.eat_keyword("and") {
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr> {
        if self.eat_keyword("not") {
            let operand = self.nested(Self::not_expr)?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr> {
        let left = self.arith()?;
        let token = self.peek().clone();
        let op = match &token {
            Token::Op("==") => CmpOp::Eq,
            Token::Op("!=") => {
                if self.flags.contains(FutureFlags::BARRY_AS_FLUFL) {
                    return Err(self.error("invalid syntax"));
                }
                CmpOp::NotEq
            }
            Token::Op("<>") => {
                if !self.flags.contains(FutureFlags::BARRY_AS_FLUFL) {
                    return Err(self.error("invalid syntax"));
                }
                CmpOp::NotEq
            }
            Token::Op("<") => CmpOp::Lt,
            Token::Op("<=") => CmpOp::LtE,
            Token::Op(">") => CmpOp::Gt,
            Token::Op(">=") => CmpOp::GtE,
            Token::Name(name) if name == "in" => CmpOp::In,
            Token::Name(name) if name == "is" => {
                if matches!(self.peek_at(1), Token::Name(next) if next == "not") {
                    self.pos += 1;
                    CmpOp::IsNot
                } else {
                    CmpOp::Is
                }
            }
            Token::Name(name)
                if name == "not" && matches!(self.peek_at(1), Token::Name(next) if next == "in") =>
            {
                self.pos += 1;
                CmpOp::NotIn
            }
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.arith()?;
        Ok(Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn arith(&mut self) -> Result<Expr> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Token::Op("+") => BinOp::Add,
                Token::Op("-") => BinOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.term()?;
            left = binary(op, left, right);
        }
    }

    fn term(&mut self) -> Result<Expr> {
        let mut left = self.factor()?;
        loop {
            let op = match self.peek() {
                Token::Op("*") => BinOp::Mul,
                Token::Op("/") => BinOp::Div,
                Token::Op("//") => BinOp::FloorDiv,
                Token::Op("%") => BinOp::Mod,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.factor()?;
            left = binary(op, left, right);
        }
    }

    fn factor(&mut self) -> Result<Expr> {
        let op = match self.peek() {
            Token::Op("-") => UnaryOp::Neg,
            Token::Op("+") => UnaryOp::Pos,
            _ => return self.power(),
        };
        self.pos += 1;
        let operand = self.nested(Self::factor)?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.postfix()?;
        if self.eat_op("**") {
            let exponent = self.nested(Self::factor)?;
            return Ok(binary(BinOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.atom()?;
        loop {
            if self.eat_op("(") {
                expr = self.call(expr)?;
            } else if self.eat_op("[") {
                let index = self.expression()?;
                self.expect_op("]")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.eat_op(".") {
                let name = self.expect_name()?;
                expr = Expr::Attribute {
                    object: Box::new(expr),
                    name,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn call(&mut self, callee: Expr) -> Result<Expr> {
        let mut args = Vec::new();
        let mut keywords = Vec::new();
        while !self.eat_op(")") {
            let is_keyword = matches!(self.peek(), Token::Name(_))
                && matches!(self.peek_at(1), Token::Op("="));
            if is_keyword {
                let name = self.expect_name()?;
                self.pos += 1;
                keywords.push((name, self.expression()?));
            } else {
                if !keywords.is_empty() {
                    return Err(self.error("positional argument follows keyword argument"));
                }
                args.push(self.expression()?);
            }
            if !self.eat_op(",") {
                self.expect_op(")")?;
                break;
            }
        }
        Ok(Expr::Call {
            callee: Box::new(callee),
            args,
            keywords,
        })
    }

    fn atom(&mut self) -> Result<Expr> {
        let line_error = self.error("invalid syntax");
        match self.bump() {
            Token::Int(value) => Ok(Expr::Int(value)),
            Token::Float(value) => Ok(Expr::Float(value)),
            Token::Str(mut text) => {
                while let Token::Str(next) = self.peek() {
                    text.push_str(next);
                    self.pos += 1;
                }
                Ok(Expr::Str(text))
            }
            Token::Name(name) => match name.as_str() {
                "None" => Ok(Expr::None),
                "True" => Ok(Expr::Bool(true)),
                "False" => Ok(Expr::Bool(false)),
                other if KEYWORDS.contains(&other) => Err(line_error),
                _ => Ok(Expr::Name(name)),
            },
            Token::Op("(") => {
                let inner = self.expression()?;
                self.expect_op(")")?;
                Ok(inner)
            }
            Token::Op("[") => {
                let mut items = Vec::new();
                while !self.eat_op("]") {
                    items.push(self.expression()?);
                    if !self.eat_op(",") {
                        self.expect_op("]")?;
                        break;
                    }
                }
                Ok(Expr::List(items))
            }
            Token::Op("{") => {
                let mut entries = Vec::new();
                while !self.eat_op("}") {
                    let key = self.expression()?;
                    self.expect_op(":")?;
                    let value = self.expression()?;
                    entries.push((key, value));
                    if !self.eat_op(",") {
                        self.expect_op("}")?;
                        break;
                    }
                }
                Ok(Expr::Dict(entries))
            }
            _ => Err(line_error),
        }
    }

    fn error(&self, message: &str) -> ScriptError {
        ScriptError::syntax(message).with_frame(self.file, self.line(), "<module>")
    }
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}
