//! SQL templates.
//!
//! A template is literal SQL interleaved with substitutions:
//!
//! ```text
//! SELECT * FROM users WHERE id = $id ${name ? "AND name = " + escape(name) : ""}
//!                                ─┬─ ─────────────────────┬──────────────────────
//!                                 │                        └── ${expr}: evaluated, rendered as text
//!                                 └── $ident: direct parameter lookup
//! ```
//!
//! Templates are parsed once by [`compile`] and rendered many times
//! against different parameters.

pub mod cache;
pub mod eval;
mod parser;

pub use cache::TemplateCache;

use crate::error::LurryResult;
use serde_json::Value;
use std::fmt;

/// One piece of a compiled template.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    /// `target.field`
    Member(Box<Expr>, String),
    /// `target[index]`
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// `cond ? then : otherwise`
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// `value ?: fallback`
    Elvis(Box<Expr>, Box<Expr>),
    Call(Function, Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
        }
    }
}

/// Built-in template functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    /// Escape through the active dialect.
    Escape,
    /// Escape each non-null entry and join with commas.
    Join,
    /// Join numeric entries with commas, unquoted.
    JoinNumbers,
    /// Length of a string, array or object.
    Size,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "escape" => Some(Function::Escape),
            "join" => Some(Function::Join),
            "join_numbers" | "joinNumbers" => Some(Function::JoinNumbers),
            "size" => Some(Function::Size),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::Escape => "escape",
            Function::Join => "join",
            Function::JoinNumbers => "join_numbers",
            Function::Size => "size",
        }
    }

    pub fn arity(&self) -> usize {
        1
    }

    pub fn uses_dialect(&self) -> bool {
        matches!(self, Function::Escape | Function::Join)
    }
}

impl Expr {
    /// Whether evaluating this expression consults the dialect.
    pub fn uses_dialect(&self) -> bool {
        match self {
            Expr::Literal(_) | Expr::Var(_) => false,
            Expr::Member(target, _) => target.uses_dialect(),
            Expr::Index(target, index) => target.uses_dialect() || index.uses_dialect(),
            Expr::Unary(_, e) => e.uses_dialect(),
            Expr::Binary(_, l, r) | Expr::Elvis(l, r) => l.uses_dialect() || r.uses_dialect(),
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => cond.uses_dialect() || then.uses_dialect() || otherwise.uses_dialect(),
            Expr::Call(f, args) => f.uses_dialect() || args.iter().any(Expr::uses_dialect),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Var(name) => f.write_str(name),
            Expr::Member(target, field) => write!(f, "{}.{}", target, field),
            Expr::Index(target, index) => write!(f, "{}[{}]", target, index),
            Expr::Unary(UnaryOp::Not, e) => write!(f, "!{}", e),
            Expr::Unary(UnaryOp::Neg, e) => write!(f, "-{}", e),
            Expr::Binary(op, l, r) => write!(f, "({} {} {})", l, op.symbol(), r),
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => write!(f, "({} ? {} : {})", cond, then, otherwise),
            Expr::Elvis(value, fallback) => write!(f, "({} ?: {})", value, fallback),
            Expr::Call(func, args) => {
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", func.name(), args.join(", "))
            }
        }
    }
}

/// A parsed template, ready to render.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTemplate {
    segments: Vec<Segment>,
    uses_dialect: bool,
}

impl CompiledTemplate {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether rendering needs the dialect strategy.
    pub fn uses_dialect(&self) -> bool {
        self.uses_dialect
    }
}

/// Parse raw template text.
pub fn compile(template: &str) -> LurryResult<CompiledTemplate> {
    let segments = parser::parse_template(template)?;
    let uses_dialect = segments.iter().any(|s| match s {
        Segment::Expr(e) => e.uses_dialect(),
        Segment::Text(_) => false,
    });
    Ok(CompiledTemplate {
        segments,
        uses_dialect,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_is_deterministic() {
        let text = "SELECT * FROM t WHERE a = ${escape(a)} ${b ? 'AND b = 1' : ''}";
        assert_eq!(compile(text).unwrap(), compile(text).unwrap());
    }

    #[test]
    fn test_uses_dialect() {
        assert!(!compile("SELECT $id").unwrap().uses_dialect());
        assert!(!compile("SELECT ${size(ids)}").unwrap().uses_dialect());
        assert!(compile("SELECT ${name.escape()}").unwrap().uses_dialect());
        assert!(compile("IN (${ids ? join(ids) : 'NULL'})").unwrap().uses_dialect());
    }

    #[test]
    fn test_expr_display() {
        let t = compile("${a ? escape(b) : 'x'}").unwrap();
        match &t.segments()[0] {
            Segment::Expr(e) => assert_eq!(e.to_string(), "(a ? escape(b) : \"x\")"),
            other => panic!("unexpected segment {:?}", other),
        }
    }
}
