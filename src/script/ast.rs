use std::rc::Rc;

use super::FutureFlags;

/// Parsed console program.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// Statements in source order.
    pub stmts: Vec<Stmt>,
    /// Flags in effect once the whole program has been parsed.
    pub flags: FutureFlags,
}

/// A statement tagged with the line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    /// 1-based source line.
    pub line: usize,
    /// Statement payload.
    pub kind: StmtKind,
}

/// Statement forms.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Bare expression; its value is "produced" unless it is `None`.
    Expr(Expr),
    /// `target = value`
    Assign {
        /// Assignment target.
        target: Target,
        /// Right-hand side.
        value: Expr,
    },
    /// `target op= value`
    AugAssign {
        /// Assignment target.
        target: Target,
        /// Arithmetic operator applied to the current value.
        op: BinOp,
        /// Right-hand side.
        value: Expr,
    },
    /// `del a, b`
    Delete(Vec<String>),
    /// `import a.b [as c]`
    Import {
        /// Dotted module name.
        module: String,
        /// Name bound in the current namespace.
        bind_as: String,
    },
    /// `from __future__ import ...`
    Future(Vec<String>),
    /// `pass`
    Pass,
}

/// Assignment targets.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Plain name.
    Name(String),
    /// `object.name`
    Attribute {
        /// Object expression.
        object: Expr,
        /// Attribute name.
        name: String,
    },
    /// `object[index]`
    Index {
        /// Container expression.
        object: Expr,
        /// Index or key expression.
        index: Expr,
    },
}

/// Expression nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `None`
    None,
    /// `True` / `False`
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Floating-point literal.
    Float(f64),
    /// String literal.
    Str(String),
    /// Name lookup.
    Name(String),
    /// `[a, b]`
    List(Vec<Expr>),
    /// `{k: v}`
    Dict(Vec<(Expr, Expr)>),
    /// `object.name`
    Attribute {
        /// Object expression.
        object: Box<Expr>,
        /// Attribute name.
        name: String,
    },
    /// `object[index]`
    Index {
        /// Container expression.
        object: Box<Expr>,
        /// Index or key expression.
        index: Box<Expr>,
    },
    /// `callee(args, key=value)`
    Call {
        /// Callee expression.
        callee: Box<Expr>,
        /// Positional arguments.
        args: Vec<Expr>,
        /// Keyword arguments in source order.
        keywords: Vec<(String, Expr)>,
    },
    /// Prefix operator.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expr>,
    },
    /// Arithmetic operator.
    Binary {
        /// Operator.
        op: BinOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Comparison operator.
    Compare {
        /// Operator.
        op: CmpOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Short-circuit `and`.
    And(Box<Expr>, Box<Expr>),
    /// Short-circuit `or`.
    Or(Box<Expr>, Box<Expr>),
    /// `body if test else orelse`
    Conditional {
        /// Condition.
        test: Box<Expr>,
        /// Value when the condition holds.
        body: Box<Expr>,
        /// Value otherwise.
        orelse: Box<Expr>,
    },
    /// `lambda params: body`
    Lambda(Rc<LambdaDef>),
}

/// Body of a lambda expression, shared by every function value created from it.
#[derive(Debug, Clone, PartialEq)]
pub struct LambdaDef {
    /// Parameter names.
    pub params: Vec<String>,
    /// Body expression.
    pub body: Expr,
    /// Line the lambda was defined on.
    pub line: usize,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinOp {
    /// Operator spelling used in error messages.
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}
