//! Referential formulas over a [`ParsingContext`] (§3 "Expression"), the
//! Rust counterpart of `destructify.parsing.expression.Expression`'s
//! operator-overloaded attribute chains (`this.x`, `this._`, `this._root`).
//!
//! Python builds these lazily via `__getattr__`/dunder operators on a `this`
//! singleton; Rust has no dynamic attribute protocol, so the same chains are
//! built with explicit methods (`field`, `.parent()`, `.root()`, `.index()`)
//! and `std::ops` overloads on [`Expr`] itself.

use crate::context::{NodeId, ParsingContext};
use crate::error::{Error, Result};
use crate::value::Value;
use std::ops::{Add, BitAnd, BitOr, Div, Mul, Rem, Sub};
use std::rc::Rc;

#[derive(Clone, Debug)]
enum PathSeg {
    Parent,
    Root,
    Field(String),
    Index(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

/// A referential formula, evaluated against a parse's [`ParsingContext`] and
/// the node currently being decoded or encoded.
#[derive(Clone)]
pub enum Expr {
    Const(Value),
    /// An attribute chain rooted at `this` (the field currently being sized,
    /// checked, or switched on).
    This(Rc<Vec<PathSeg>>),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// `len_(expr)` — byte length of a bytes/string value, or element count
    /// of an array.
    Len(Box<Expr>),
    Sum(Box<Expr>),
    Min(Box<Expr>),
    Max(Box<Expr>),
    /// Escape hatch for logic that doesn't fit the attribute-chain grammar
    /// (spec Design Notes §9: "user code may still register opaque
    /// closures").
    Closure(Rc<dyn Fn(&ParsingContext, NodeId) -> Result<Value>>),
}

impl std::fmt::Debug for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Const(v) => write!(f, "Const({v:?})"),
            Expr::This(p) => write!(f, "This({p:?})"),
            Expr::Unary(op, e) => write!(f, "Unary({op:?}, {e:?})"),
            Expr::Binary(op, l, r) => write!(f, "Binary({op:?}, {l:?}, {r:?})"),
            Expr::Len(e) => write!(f, "Len({e:?})"),
            Expr::Sum(e) => write!(f, "Sum({e:?})"),
            Expr::Min(e) => write!(f, "Min({e:?})"),
            Expr::Max(e) => write!(f, "Max({e:?})"),
            Expr::Closure(_) => write!(f, "Closure(..)"),
        }
    }
}

/// Starts an attribute chain at the field currently being processed,
/// mirroring `destructify.parsing.expression.this`.
pub fn this() -> Expr {
    Expr::This(Rc::new(Vec::new()))
}

/// `this.field(name)` — shorthand for a single-segment chain.
pub fn field(name: impl Into<String>) -> Expr {
    this().field(name)
}

pub fn len(e: impl Into<Expr>) -> Expr {
    Expr::Len(Box::new(e.into()))
}

pub fn sum(e: impl Into<Expr>) -> Expr {
    Expr::Sum(Box::new(e.into()))
}

pub fn min(e: impl Into<Expr>) -> Expr {
    Expr::Min(Box::new(e.into()))
}

pub fn max(e: impl Into<Expr>) -> Expr {
    Expr::Max(Box::new(e.into()))
}

pub fn closure(
    f: impl Fn(&ParsingContext, NodeId) -> Result<Value> + 'static,
) -> Expr {
    Expr::Closure(Rc::new(f))
}

impl Expr {
    fn push(&self, seg: PathSeg) -> Expr {
        match self {
            Expr::This(path) => {
                let mut v = (**path).clone();
                v.push(seg);
                Expr::This(Rc::new(v))
            }
            other => other.clone(),
        }
    }

    /// `this._` — the enclosing structure's context.
    pub fn parent(&self) -> Expr {
        self.push(PathSeg::Parent)
    }

    /// `this._root` — the outermost structure's context.
    pub fn root(&self) -> Expr {
        self.push(PathSeg::Root)
    }

    /// `this.name` — a named field relative to the current chain position.
    pub fn field(&self, name: impl Into<String>) -> Expr {
        self.push(PathSeg::Field(name.into()))
    }

    /// `this[index]` — indexes into an array-valued chain position.
    pub fn index(&self, i: usize) -> Expr {
        self.push(PathSeg::Index(i))
    }

    pub fn eq(self, other: impl Into<Expr>) -> Expr {
        Expr::Binary(BinOp::Eq, Box::new(self), Box::new(other.into()))
    }

    pub fn ne(self, other: impl Into<Expr>) -> Expr {
        Expr::Binary(BinOp::Ne, Box::new(self), Box::new(other.into()))
    }

    pub fn lt(self, other: impl Into<Expr>) -> Expr {
        Expr::Binary(BinOp::Lt, Box::new(self), Box::new(other.into()))
    }

    pub fn le(self, other: impl Into<Expr>) -> Expr {
        Expr::Binary(BinOp::Le, Box::new(self), Box::new(other.into()))
    }

    pub fn gt(self, other: impl Into<Expr>) -> Expr {
        Expr::Binary(BinOp::Gt, Box::new(self), Box::new(other.into()))
    }

    pub fn ge(self, other: impl Into<Expr>) -> Expr {
        Expr::Binary(BinOp::Ge, Box::new(self), Box::new(other.into()))
    }

    pub fn and(self, other: impl Into<Expr>) -> Expr {
        Expr::Binary(BinOp::And, Box::new(self), Box::new(other.into()))
    }

    pub fn or(self, other: impl Into<Expr>) -> Expr {
        Expr::Binary(BinOp::Or, Box::new(self), Box::new(other.into()))
    }

    /// Evaluates this expression against `node` in `ctx`.
    pub fn eval(&self, ctx: &ParsingContext, node: NodeId) -> Result<Value> {
        match self {
            Expr::Const(v) => Ok(v.clone()),
            Expr::This(path) => eval_path(ctx, node, path),
            Expr::Unary(op, e) => eval_unary(*op, e.eval(ctx, node)?),
            Expr::Binary(op, l, r) => eval_binary(*op, l.eval(ctx, node)?, r.eval(ctx, node)?),
            Expr::Len(e) => {
                let v = e.eval(ctx, node)?;
                if let Some(n) = v.byte_len() {
                    Ok(Value::UInt(n as u64))
                } else if let Some(a) = v.as_array() {
                    Ok(Value::UInt(a.len() as u64))
                } else {
                    Err(Error::definition("", "len_() requires a bytes/str/array value"))
                }
            }
            Expr::Sum(e) => fold_numeric(ctx, node, e, 0.0, |a, b| a + b),
            Expr::Min(e) => fold_numeric_opt(ctx, node, e, f64::min),
            Expr::Max(e) => fold_numeric_opt(ctx, node, e, f64::max),
            Expr::Closure(f) => f(ctx, node),
        }
    }
}

fn fold_numeric(
    ctx: &ParsingContext,
    node: NodeId,
    e: &Expr,
    init: f64,
    f: impl Fn(f64, f64) -> f64,
) -> Result<Value> {
    let v = e.eval(ctx, node)?;
    let arr = v
        .as_array()
        .ok_or_else(|| Error::definition("", "sum_()/min_()/max_() require an array value"))?;
    let mut acc = init;
    for item in arr {
        acc = f(acc, as_f64(item)?);
    }
    Ok(Value::Float(ordered_float::OrderedFloat(acc)))
}

fn fold_numeric_opt(
    ctx: &ParsingContext,
    node: NodeId,
    e: &Expr,
    f: impl Fn(f64, f64) -> f64,
) -> Result<Value> {
    let v = e.eval(ctx, node)?;
    let arr = v
        .as_array()
        .ok_or_else(|| Error::definition("", "sum_()/min_()/max_() require an array value"))?;
    let mut iter = arr.iter();
    let first = iter
        .next()
        .ok_or_else(|| Error::definition("", "min_()/max_() require a non-empty array"))?;
    let mut acc = as_f64(first)?;
    for item in iter {
        acc = f(acc, as_f64(item)?);
    }
    Ok(Value::Float(ordered_float::OrderedFloat(acc)))
}

fn as_f64(v: &Value) -> Result<f64> {
    match v {
        Value::UInt(n) => Ok(*n as f64),
        Value::Int(n) => Ok(*n as f64),
        Value::Float(f) => Ok(f.0),
        _ => Err(Error::definition("", "expected a numeric array element")),
    }
}

fn eval_path(ctx: &ParsingContext, node: NodeId, segs: &[PathSeg]) -> Result<Value> {
    let mut cur = node;
    let mut value: Option<Value> = None;
    for seg in segs {
        match seg {
            PathSeg::Parent => {
                cur = ctx
                    .parent_of(cur)
                    .ok_or_else(|| Error::definition("", "this._ has no enclosing context"))?;
            }
            PathSeg::Root => cur = ctx.root_of(cur),
            PathSeg::Field(name) => {
                value = Some(match &value {
                    // Chained access into a nested structure/array-element
                    // value already resolved earlier in the path.
                    Some(Value::Record(r)) => r
                        .get(name)
                        .cloned()
                        .ok_or_else(|| Error::unknown_dependent_field("", name.clone()))?,
                    Some(_) => {
                        return Err(Error::definition("", "field access on a non-record value"))
                    }
                    None => ctx.get(cur, name)?.clone(),
                });
            }
            PathSeg::Index(i) => {
                let v = value
                    .take()
                    .ok_or_else(|| Error::definition("", "index applied before a field lookup"))?;
                let item = v
                    .as_array()
                    .and_then(|a| a.get(*i))
                    .cloned()
                    .ok_or_else(|| Error::definition("", "array index out of range"))?;
                value = Some(item);
            }
        }
    }
    value.ok_or_else(|| Error::definition("", "expression chain does not resolve to a value"))
}

fn eval_unary(op: UnOp, v: Value) -> Result<Value> {
    match op {
        UnOp::Not => Ok(Value::Bool(!v.as_bool().ok_or_else(|| {
            Error::definition("", "'not' requires a boolean-coercible value")
        })?)),
        UnOp::Neg => match v {
            Value::Int(n) => Ok(Value::Int(-n)),
            Value::UInt(n) => Ok(Value::Int(-(n as i64))),
            Value::Float(f) => Ok(Value::Float(ordered_float::OrderedFloat(-f.0))),
            _ => Err(Error::definition("", "unary '-' requires a numeric value")),
        },
    }
}

fn eval_binary(op: BinOp, l: Value, r: Value) -> Result<Value> {
    if matches!(op, BinOp::And | BinOp::Or) {
        let lb = l
            .as_bool()
            .ok_or_else(|| Error::definition("", "'and'/'or' require boolean-coercible operands"))?;
        let rb = r
            .as_bool()
            .ok_or_else(|| Error::definition("", "'and'/'or' require boolean-coercible operands"))?;
        return Ok(Value::Bool(match op {
            BinOp::And => lb && rb,
            BinOp::Or => lb || rb,
            _ => unreachable!(),
        }));
    }
    if matches!(op, BinOp::Eq | BinOp::Ne) {
        let eq = values_eq(&l, &r);
        return Ok(Value::Bool(if op == BinOp::Eq { eq } else { !eq }));
    }
    let lf = as_f64(&l)?;
    let rf = as_f64(&r)?;
    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => {
            let out = match op {
                BinOp::Add => lf + rf,
                BinOp::Sub => lf - rf,
                BinOp::Mul => lf * rf,
                BinOp::Div => lf / rf,
                BinOp::Rem => lf % rf,
                _ => unreachable!(),
            };
            Ok(promote_like(l, r, out))
        }
        BinOp::Lt => Ok(Value::Bool(lf < rf)),
        BinOp::Le => Ok(Value::Bool(lf <= rf)),
        BinOp::Gt => Ok(Value::Bool(lf > rf)),
        BinOp::Ge => Ok(Value::Bool(lf >= rf)),
        BinOp::Eq | BinOp::Ne | BinOp::And | BinOp::Or => unreachable!(),
    }
}

fn values_eq(l: &Value, r: &Value) -> bool {
    if let (Some(a), Some(b)) = (l.as_int(), r.as_int()) {
        return a == b;
    }
    l == r
}

/// Keeps integer results integral when both operands were integral, so e.g.
/// `this.count - 1` stays a `Value::UInt`/`Value::Int` rather than silently
/// becoming a float that downstream `as_usize()` calls would reject.
fn promote_like(l: Value, r: Value, out: f64) -> Value {
    let both_int = matches!(l, Value::UInt(_) | Value::Int(_))
        && matches!(r, Value::UInt(_) | Value::Int(_));
    if both_int && out.fract() == 0.0 {
        if out >= 0.0 {
            Value::UInt(out as u64)
        } else {
            Value::Int(out as i64)
        }
    } else {
        Value::Float(ordered_float::OrderedFloat(out))
    }
}

impl From<i64> for Expr {
    fn from(v: i64) -> Self {
        Expr::Const(Value::Int(v))
    }
}
impl From<u64> for Expr {
    fn from(v: u64) -> Self {
        Expr::Const(Value::UInt(v))
    }
}
impl From<i32> for Expr {
    fn from(v: i32) -> Self {
        Expr::Const(Value::Int(v as i64))
    }
}
impl From<usize> for Expr {
    fn from(v: usize) -> Self {
        Expr::Const(Value::UInt(v as u64))
    }
}
impl From<bool> for Expr {
    fn from(v: bool) -> Self {
        Expr::Const(Value::Bool(v))
    }
}
impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Const(v)
    }
}

macro_rules! impl_binop {
    ($trait:ident, $method:ident, $variant:ident) => {
        impl<T: Into<Expr>> $trait<T> for Expr {
            type Output = Expr;
            fn $method(self, rhs: T) -> Expr {
                Expr::Binary(BinOp::$variant, Box::new(self), Box::new(rhs.into()))
            }
        }
    };
}

impl_binop!(Add, add, Add);
impl_binop!(Sub, sub, Sub);
impl_binop!(Mul, mul, Mul);
impl_binop!(Div, div, Div);
impl_binop!(Rem, rem, Rem);
impl_binop!(BitAnd, bitand, And);
impl_binop!(BitOr, bitor, Or);

impl std::ops::Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::Unary(UnOp::Neg, Box::new(self))
    }
}

impl std::ops::Not for Expr {
    type Output = Expr;
    fn not(self) -> Expr {
        Expr::Unary(UnOp::Not, Box::new(self))
    }
}
