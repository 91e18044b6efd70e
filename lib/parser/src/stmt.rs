use std::{
    fmt::{self, Display, Formatter},
    rc::Rc,
};

use itertools::Itertools;
use scanner::Token;

use crate::Expr;

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expression(Expr),
    Print(Expr),
    Var { name: Token, initializer: Option<Expr> },
    Block(Vec<Stmt>),
    If { condition: Expr, then_branch: Box<Stmt>, else_branch: Option<Box<Stmt>> },
    While { condition: Expr, body: Box<Stmt> },
    Function(Rc<FunctionDecl>),
    Return { keyword: Token, value: Option<Expr> },
}

/// Shared between the AST and every function value created from it.
#[derive(Debug, PartialEq)]
pub struct FunctionDecl {
    pub name: Token,
    pub params: Vec<Token>,
    pub body: Vec<Stmt>,
}

impl Display for Stmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Expression(expr) => write!(f, "(; {})", expr),
            Stmt::Print(expr) => write!(f, "(print {})", expr),
            Stmt::Var { name, initializer: Some(initializer) } => {
                write!(f, "(var {} {})", name, initializer)
            }
            Stmt::Var { name, initializer: None } => write!(f, "(var {})", name),
            Stmt::Block(stmts) if stmts.is_empty() => write!(f, "(block)"),
            Stmt::Block(stmts) => write!(f, "(block {})", stmts.iter().join(" ")),
            Stmt::If { condition, then_branch, else_branch: Some(else_branch) } => {
                write!(f, "(if {} {} {})", condition, then_branch, else_branch)
            }
            Stmt::If { condition, then_branch, else_branch: None } => {
                write!(f, "(if {} {})", condition, then_branch)
            }
            Stmt::While { condition, body } => write!(f, "(while {} {})", condition, body),
            Stmt::Function(decl) => write!(
                f,
                "(fun {} ({}) {})",
                decl.name,
                decl.params.iter().join(" "),
                decl.body.iter().join(" ")
            ),
            Stmt::Return { value: Some(value), .. } => write!(f, "(return {})", value),
            Stmt::Return { value: None, .. } => write!(f, "(return)"),
        }
    }
}
