use bigdecimal::BigDecimal;
use num_bigint::BigInt;

/// A parsed source file: the untyped tree produced by the parser.
///
/// The analyzer maps this into the typed [`crate::ir`]; the evaluator
/// walks it directly.
#[derive(Clone, Debug, PartialEq)]
pub struct Source {
    pub statements: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Let(Let),
    Def(Def),
    If(If),
    For(For),
    Return(Return),
    Expression(Expression),
    Assignment(Assignment),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Let {
    pub name: String,
    pub ty: Option<String>,
    pub value: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Def {
    pub name: String,
    pub parameters: Vec<String>,
    /// Optional annotation per parameter, index-aligned with `parameters`.
    pub parameter_types: Vec<Option<String>>,
    pub return_type: Option<String>,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct If {
    pub condition: Expr,
    pub then_body: Vec<Stmt>,
    pub else_body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct For {
    pub name: String,
    pub iterable: Expr,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Return {
    pub value: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expression {
    pub expression: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Assignment {
    /// The assignment target; only variables and properties are valid,
    /// which the analyzer and evaluator enforce.
    pub target: Expr,
    pub value: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Group(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Variable(String),
    Property {
        receiver: Box<Expr>,
        name: String,
    },
    Function {
        name: String,
        arguments: Vec<Expr>,
    },
    Method {
        receiver: Box<Expr>,
        name: String,
        arguments: Vec<Expr>,
    },
    ObjectExpr(ObjectExpr),
}

/// An anonymous (optionally named) object literal. Fields and methods
/// share one flat member namespace.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectExpr {
    pub name: Option<String>,
    pub fields: Vec<Let>,
    pub methods: Vec<Def>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Nil,
    Boolean(bool),
    Integer(BigInt),
    Decimal(BigDecimal),
    String(String),
    Character(char),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    /// The operator's source spelling, used in error messages and by the
    /// generator.
    pub fn literal(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }
}
