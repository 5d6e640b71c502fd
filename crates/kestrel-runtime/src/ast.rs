//! Abstract Syntax Tree (AST) definitions.
//!
//! Function literals are shared behind `Rc` so that compiled functions can
//! keep their bodies alive independently of the script that produced them.

use crate::span::Span;
use std::rc::Rc;

/// Name of a binding or property.
pub type Name = Rc<str>;

/// A parsed script: the body of its top-level function.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
    /// Length of the source in characters; the implicit return sits here.
    pub end: u32,
}

/// A function literal (declaration or expression).
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionLiteral {
    pub name: Option<Name>,
    pub params: Vec<Name>,
    pub body: Vec<Stmt>,
    /// From the `function` keyword through the closing brace.
    pub span: Span,
    /// Position of the closing brace.
    pub body_end: u32,
    pub is_expression: bool,
}

/// Statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr, Span),
    Var(Vec<VarDeclarator>, Span),
    /// Function declaration; `index` is the literal's slot in the enclosing function.
    FunctionDecl {
        literal: Rc<FunctionLiteral>,
        index: usize,
    },
    Return(Option<Expr>, Span),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        span: Span,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
        span: Span,
    },
    For {
        init: Option<ForInit>,
        cond: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
        span: Span,
    },
    Block(Vec<Stmt>, Span),
    Try {
        block: Vec<Stmt>,
        handler: Option<CatchClause>,
        finalizer: Option<Vec<Stmt>>,
        span: Span,
    },
    Throw(Expr, Span),
    Break(Option<Name>, Span),
    Continue(Option<Name>, Span),
    Labeled {
        label: Name,
        body: Box<Stmt>,
        span: Span,
    },
    Debugger(Span),
    Empty(Span),
}

impl Stmt {
    /// Position where the statement begins.
    pub fn start(&self) -> u32 {
        match self {
            Stmt::Expr(_, span)
            | Stmt::Var(_, span)
            | Stmt::Return(_, span)
            | Stmt::If { span, .. }
            | Stmt::While { span, .. }
            | Stmt::DoWhile { span, .. }
            | Stmt::For { span, .. }
            | Stmt::Block(_, span)
            | Stmt::Try { span, .. }
            | Stmt::Throw(_, span)
            | Stmt::Break(_, span)
            | Stmt::Continue(_, span)
            | Stmt::Labeled { span, .. }
            | Stmt::Debugger(span)
            | Stmt::Empty(span) => span.start,
            Stmt::FunctionDecl { literal, .. } => literal.span.start,
        }
    }
}

/// `name = init` inside a `var` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDeclarator {
    pub name: Name,
    pub init: Option<Expr>,
    pub span: Span,
}

/// Initializer clause of a `for` statement.
#[derive(Debug, Clone, PartialEq)]
pub enum ForInit {
    Var(Vec<VarDeclarator>, Span),
    Expr(Expr),
}

impl ForInit {
    /// Position where the clause begins.
    pub fn start(&self) -> u32 {
        match self {
            ForInit::Var(_, span) => span.start,
            ForInit::Expr(expr) => expr.span().start,
        }
    }
}

/// `catch (param) { body }`.
#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub param: Name,
    pub body: Vec<Stmt>,
}

/// Expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64, Span),
    String(Rc<str>, Span),
    Bool(bool, Span),
    Null(Span),
    Undefined(Span),
    Identifier(Name, Span),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        span: Span,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    Assign {
        op: AssignOp,
        target: AssignTarget,
        value: Box<Expr>,
        span: Span,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        target: AssignTarget,
        span: Span,
    },
    /// Call; `paren` is the position of the opening parenthesis.
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        paren: u32,
        span: Span,
    },
    Member {
        object: Box<Expr>,
        property: Name,
        span: Span,
    },
    Object(Vec<(Name, Expr)>, Span),
    Function {
        literal: Rc<FunctionLiteral>,
        index: usize,
    },
}

impl Expr {
    /// Source span of the expression.
    pub fn span(&self) -> Span {
        match self {
            Expr::Number(_, span)
            | Expr::String(_, span)
            | Expr::Bool(_, span)
            | Expr::Null(span)
            | Expr::Undefined(span)
            | Expr::Identifier(_, span)
            | Expr::Object(_, span)
            | Expr::Unary { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Logical { span, .. }
            | Expr::Assign { span, .. }
            | Expr::Update { span, .. }
            | Expr::Call { span, .. }
            | Expr::Member { span, .. } => *span,
            Expr::Function { literal, .. } => literal.span,
        }
    }
}

/// Left-hand side of an assignment or update.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    Identifier(Name),
    Member { object: Box<Expr>, property: Name },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Increment,
    Decrement,
}
