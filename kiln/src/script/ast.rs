//! Script syntax tree.

use std::rc::Rc;

use super::lexer::Loc;

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub loc: Loc,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Number(f64),
    Str(Rc<str>),
    Template(Vec<TemplatePiece>),
    Bool(bool),
    Null,
    Ident(Rc<str>),
    This,
    Array(Vec<ArrayItem>),
    Object(Vec<Property>),
    Function(Rc<FunctionDef>),
    Member {
        object: Box<Expr>,
        property: MemberKey,
        optional: bool,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Argument>,
        optional: bool,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Argument>,
    },
    /// Boundary of an optional chain; a short-circuit inside yields `undefined`
    OptionalChain(Box<Expr>),
    Unary {
        op: UnaryOp,
        arg: Box<Expr>,
    },
    Update {
        increment: bool,
        prefix: bool,
        target: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Sequence(Vec<Expr>),
}

#[derive(Debug, Clone)]
pub enum TemplatePiece {
    Text(Rc<str>),
    Expr(Expr),
}

#[derive(Debug, Clone)]
pub enum ArrayItem {
    Item(Expr),
    Spread(Expr),
    Hole,
}

#[derive(Debug, Clone)]
pub enum Argument {
    Plain(Expr),
    Spread(Expr),
}

#[derive(Debug, Clone)]
pub enum PropertyKey {
    Static(Rc<str>),
    Computed(Expr),
}

#[derive(Debug, Clone)]
pub enum Property {
    Entry { key: PropertyKey, value: Expr },
    Spread(Expr),
}

#[derive(Debug, Clone)]
pub enum MemberKey {
    Static(Rc<str>),
    Computed(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Minus,
    Plus,
    BitNot,
    TypeOf,
    Void,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Exp,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    In,
    InstanceOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Compound(BinaryOp),
    Logical(LogicalOp),
}

/// A binding target in declarations and parameter lists.
#[derive(Debug, Clone)]
pub enum Pattern {
    Ident(Rc<str>),
    Object {
        props: Vec<ObjectPatternProp>,
        rest: Option<Rc<str>>,
    },
    Array {
        items: Vec<Option<PatternItem>>,
        rest: Option<Box<Pattern>>,
    },
}

#[derive(Debug, Clone)]
pub struct ObjectPatternProp {
    pub key: PropertyKey,
    pub item: PatternItem,
}

/// A pattern with an optional default value.
#[derive(Debug, Clone)]
pub struct PatternItem {
    pub pattern: Pattern,
    pub default: Option<Expr>,
}

impl Pattern {
    /// Every name the pattern binds.
    pub fn names(&self, out: &mut Vec<Rc<str>>) {
        match self {
            Pattern::Ident(name) => out.push(name.clone()),
            Pattern::Object { props, rest } => {
                for prop in props {
                    prop.item.pattern.names(out);
                }
                out.extend(rest.iter().cloned());
            }
            Pattern::Array { items, rest } => {
                for item in items.iter().flatten() {
                    item.pattern.names(out);
                }
                if let Some(rest) = rest {
                    rest.names(out);
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum FunctionBody {
    /// Concise arrow body
    Expr(Expr),
    Block(Vec<Stmt>),
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: Option<Rc<str>>,
    pub params: Vec<PatternItem>,
    pub rest: Option<Pattern>,
    pub body: FunctionBody,
    /// Arrows capture `this` from where they are defined
    pub arrow: bool,
    pub loc: Loc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone)]
pub struct Declarator {
    pub pattern: Pattern,
    pub init: Option<Expr>,
}

/// Left side of `for…of` / `for…in`.
#[derive(Debug, Clone)]
pub enum ForBinding {
    Decl(DeclKind, Pattern),
    Target(Expr),
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    /// `None` for `default:`
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub loc: Loc,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    VarDecl(DeclKind, Vec<Declarator>),
    FunctionDecl(Rc<FunctionDef>),
    Expr(Expr),
    If {
        test: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    For {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    ForOf {
        binding: ForBinding,
        iterable: Expr,
        body: Box<Stmt>,
    },
    ForIn {
        binding: ForBinding,
        object: Expr,
        body: Box<Stmt>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        test: Expr,
    },
    Switch {
        discriminant: Expr,
        cases: Vec<SwitchCase>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    Throw(Expr),
    Try {
        block: Vec<Stmt>,
        param: Option<Pattern>,
        handler: Option<Vec<Stmt>>,
        finalizer: Option<Vec<Stmt>>,
    },
    Block(Vec<Stmt>),
    Empty,
    /// Append the text of a literal instruction
    EmitLiteral(usize),
    /// Append the value of an output tag
    EmitValue { value: Option<Expr>, escape: bool },
}
