//! Symbolic index expressions.
//!
//! Extents, halo widths, loop indices and predicates are all [`Expr`] nodes shared
//! through `Arc`. Every node carries a stable `id` that never repeats, so identity
//! comparison is a cheap `id` check and memo tables can be keyed by node pairs.
//!
//! The builder methods fold constants eagerly, the same way index arithmetic is
//! folded during lowering:
//!
//! - arithmetic on two constants produces a literal,
//! - adding or subtracting a known zero returns the other operand,
//! - multiplying by one returns the other operand, multiplying by zero returns zero,
//! - comparisons of constants (or of a node with itself) produce a boolean literal,
//! - `true && x` is `x`, `false && x` is `false`.
//!
//! Nothing else is simplified. In particular `max(x, y)` of two distinct symbolic
//! nodes stays symbolic, which keeps every proof built on top of this layer
//! conservative.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

// Monotonic node ids; uniqueness is all that is required.
static EXPR_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_expr_id() -> u64 {
    EXPR_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Literal value of an expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstValue {
    Int(i64),
    Bool(bool),
}

impl ConstValue {
    pub fn as_int(self) -> Option<i64> {
        match self {
            ConstValue::Int(v) => Some(v),
            ConstValue::Bool(_) => None,
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            ConstValue::Bool(v) => Some(v),
            ConstValue::Int(_) => None,
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Int(v) => write!(f, "{v}"),
            ConstValue::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// Binary operators available to index and predicate expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    /// Floor division.
    Div,
    CeilDiv,
    /// Euclidean remainder.
    Mod,
    Max,
    Lt,
    Le,
    Ge,
    /// Logical conjunction of two boolean operands.
    And,
}

impl BinaryOp {
    /// Returns true if the result of this operator is boolean.
    pub const fn is_predicate(&self) -> bool {
        matches!(self, Self::Lt | Self::Le | Self::Ge | Self::And)
    }

    fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::CeilDiv => "ceilDiv",
            Self::Mod => "%",
            Self::Max => "max",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::And => "&&",
        }
    }
}

/// Evaluate a binary operator on two literals.
///
/// Returns `None` for mismatched operand kinds, division by zero and overflow.
pub fn eval_binary_op(op: BinaryOp, a: ConstValue, b: ConstValue) -> Option<ConstValue> {
    use ConstValue::{Bool, Int};

    match (op, a, b) {
        (BinaryOp::Add, Int(a), Int(b)) => a.checked_add(b).map(Int),
        (BinaryOp::Sub, Int(a), Int(b)) => a.checked_sub(b).map(Int),
        (BinaryOp::Mul, Int(a), Int(b)) => a.checked_mul(b).map(Int),
        (BinaryOp::Div, Int(a), Int(b)) if b != 0 => a.checked_div_euclid(b).map(Int),
        (BinaryOp::CeilDiv, Int(a), Int(b)) if b > 0 => a.checked_neg()?.checked_div_euclid(b)?.checked_neg().map(Int),
        (BinaryOp::Mod, Int(a), Int(b)) if b != 0 => a.checked_rem_euclid(b).map(Int),
        (BinaryOp::Max, Int(a), Int(b)) => Some(Int(a.max(b))),
        (BinaryOp::Lt, Int(a), Int(b)) => Some(Bool(a < b)),
        (BinaryOp::Le, Int(a), Int(b)) => Some(Bool(a <= b)),
        (BinaryOp::Ge, Int(a), Int(b)) => Some(Bool(a >= b)),
        (BinaryOp::And, Bool(a), Bool(b)) => Some(Bool(a && b)),
        _ => None,
    }
}

/// Operation stored in an [`Expr`] node.
#[derive(Debug, Clone)]
pub enum ExprOp {
    Const(ConstValue),
    /// Named runtime value: a symbolic extent or a loop index.
    Var(String),
    Binary(BinaryOp, Arc<Expr>, Arc<Expr>),
}

/// Expression node.
#[derive(derive_more::Debug)]
pub struct Expr {
    /// Stable identity of this node.
    pub id: u64,
    op: ExprOp,
}

/// Conversion into an expression node, so builders accept literals and nodes alike.
pub trait IntoExpr {
    fn into_expr(self) -> Arc<Expr>;
}

impl IntoExpr for Arc<Expr> {
    fn into_expr(self) -> Arc<Expr> {
        self
    }
}

impl IntoExpr for &Arc<Expr> {
    fn into_expr(self) -> Arc<Expr> {
        self.clone()
    }
}

impl IntoExpr for i64 {
    fn into_expr(self) -> Arc<Expr> {
        Expr::int(self)
    }
}

impl IntoExpr for usize {
    fn into_expr(self) -> Arc<Expr> {
        Expr::int(self as i64)
    }
}

impl IntoExpr for i32 {
    fn into_expr(self) -> Arc<Expr> {
        Expr::int(i64::from(self))
    }
}

impl IntoExpr for &str {
    fn into_expr(self) -> Arc<Expr> {
        Expr::var(self)
    }
}

impl Expr {
    fn new(op: ExprOp) -> Arc<Self> {
        Arc::new(Self { id: next_expr_id(), op })
    }

    pub fn constant(value: ConstValue) -> Arc<Self> {
        Self::new(ExprOp::Const(value))
    }

    pub fn int(value: i64) -> Arc<Self> {
        Self::constant(ConstValue::Int(value))
    }

    pub fn bool(value: bool) -> Arc<Self> {
        Self::constant(ConstValue::Bool(value))
    }

    pub fn zero() -> Arc<Self> {
        Self::int(0)
    }

    pub fn var(name: impl Into<String>) -> Arc<Self> {
        Self::new(ExprOp::Var(name.into()))
    }

    pub fn op(&self) -> &ExprOp {
        &self.op
    }

    /// Operands of a binary node, `None` for leaves.
    pub fn operands(&self) -> Option<(&Arc<Expr>, &Arc<Expr>)> {
        match &self.op {
            ExprOp::Binary(_, lhs, rhs) => Some((lhs, rhs)),
            _ => None,
        }
    }

    pub fn as_const(&self) -> Option<ConstValue> {
        match self.op {
            ExprOp::Const(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        self.as_const().and_then(ConstValue::as_int)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_const().and_then(ConstValue::as_bool)
    }

    pub fn is_const(&self) -> bool {
        matches!(self.op, ExprOp::Const(_))
    }

    pub fn is_zero(&self) -> bool {
        self.as_int() == Some(0)
    }

    pub fn is_one(&self) -> bool {
        self.as_int() == Some(1)
    }

    /// Returns true if this node produces a boolean.
    pub fn is_predicate(&self) -> bool {
        match &self.op {
            ExprOp::Const(value) => matches!(value, ConstValue::Bool(_)),
            ExprOp::Var(_) => false,
            ExprOp::Binary(op, ..) => op.is_predicate(),
        }
    }

    /// Identity comparison (same node, not structural equality).
    pub fn same_as(&self, other: &Expr) -> bool {
        self.id == other.id
    }

    /// Build `lhs <op> rhs`, folding constants where possible.
    pub fn binary(op: BinaryOp, lhs: &Arc<Expr>, rhs: &Arc<Expr>) -> Arc<Expr> {
        match fold_binary(op, lhs, rhs) {
            Some(folded) => folded,
            None => Self::new(ExprOp::Binary(op, lhs.clone(), rhs.clone())),
        }
    }

    pub fn add_expr(self: &Arc<Self>, rhs: &Arc<Expr>) -> Arc<Expr> {
        Self::binary(BinaryOp::Add, self, rhs)
    }

    pub fn add_int(self: &Arc<Self>, rhs: i64) -> Arc<Expr> {
        self.add_expr(&Expr::int(rhs))
    }

    pub fn sub_expr(self: &Arc<Self>, rhs: &Arc<Expr>) -> Arc<Expr> {
        Self::binary(BinaryOp::Sub, self, rhs)
    }

    pub fn sub_int(self: &Arc<Self>, rhs: i64) -> Arc<Expr> {
        self.sub_expr(&Expr::int(rhs))
    }

    pub fn mul_expr(self: &Arc<Self>, rhs: &Arc<Expr>) -> Arc<Expr> {
        Self::binary(BinaryOp::Mul, self, rhs)
    }

    pub fn div_expr(self: &Arc<Self>, rhs: &Arc<Expr>) -> Arc<Expr> {
        Self::binary(BinaryOp::Div, self, rhs)
    }

    pub fn ceil_div_expr(self: &Arc<Self>, rhs: &Arc<Expr>) -> Arc<Expr> {
        Self::binary(BinaryOp::CeilDiv, self, rhs)
    }

    pub fn mod_expr(self: &Arc<Self>, rhs: &Arc<Expr>) -> Arc<Expr> {
        Self::binary(BinaryOp::Mod, self, rhs)
    }

    pub fn max_expr(self: &Arc<Self>, rhs: &Arc<Expr>) -> Arc<Expr> {
        Self::binary(BinaryOp::Max, self, rhs)
    }

    pub fn lt_expr(self: &Arc<Self>, rhs: &Arc<Expr>) -> Arc<Expr> {
        Self::binary(BinaryOp::Lt, self, rhs)
    }

    pub fn le_expr(self: &Arc<Self>, rhs: &Arc<Expr>) -> Arc<Expr> {
        Self::binary(BinaryOp::Le, self, rhs)
    }

    pub fn ge_expr(self: &Arc<Self>, rhs: &Arc<Expr>) -> Arc<Expr> {
        Self::binary(BinaryOp::Ge, self, rhs)
    }

    pub fn and_expr(self: &Arc<Self>, rhs: &Arc<Expr>) -> Arc<Expr> {
        Self::binary(BinaryOp::And, self, rhs)
    }

    /// Evaluate with the given variable bindings.
    ///
    /// Returns `None` if a variable is unbound or an operator cannot be evaluated.
    pub fn eval(&self, bindings: &HashMap<String, i64>) -> Option<ConstValue> {
        match &self.op {
            ExprOp::Const(value) => Some(*value),
            ExprOp::Var(name) => bindings.get(name).copied().map(ConstValue::Int),
            ExprOp::Binary(op, lhs, rhs) => eval_binary_op(*op, lhs.eval(bindings)?, rhs.eval(bindings)?),
        }
    }

    /// Names of all variables referenced by this expression, in first-seen order.
    pub fn variables(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match &node.op {
                ExprOp::Const(_) => {}
                ExprOp::Var(name) => {
                    if !names.contains(name) {
                        names.push(name.clone());
                    }
                }
                ExprOp::Binary(_, lhs, rhs) => {
                    stack.push(rhs);
                    stack.push(lhs);
                }
            }
        }
        names
    }
}

fn fold_binary(op: BinaryOp, lhs: &Arc<Expr>, rhs: &Arc<Expr>) -> Option<Arc<Expr>> {
    if let (Some(a), Some(b)) = (lhs.as_const(), rhs.as_const())
        && let Some(value) = eval_binary_op(op, a, b)
    {
        return Some(Expr::constant(value));
    }

    let same = lhs.same_as(rhs);
    match op {
        BinaryOp::Add if lhs.is_zero() => Some(rhs.clone()),
        BinaryOp::Add | BinaryOp::Sub if rhs.is_zero() => Some(lhs.clone()),
        BinaryOp::Sub if same => Some(Expr::zero()),
        BinaryOp::Mul if lhs.is_zero() || rhs.is_zero() => Some(Expr::zero()),
        BinaryOp::Mul if lhs.is_one() => Some(rhs.clone()),
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::CeilDiv if rhs.is_one() => Some(lhs.clone()),
        BinaryOp::Mod if rhs.is_one() => Some(Expr::zero()),
        BinaryOp::Max if same => Some(lhs.clone()),
        BinaryOp::Lt if same => Some(Expr::bool(false)),
        BinaryOp::Le | BinaryOp::Ge if same => Some(Expr::bool(true)),
        BinaryOp::And => match (lhs.as_bool(), rhs.as_bool()) {
            (Some(false), _) | (_, Some(false)) => Some(Expr::bool(false)),
            (Some(true), _) => Some(rhs.clone()),
            (_, Some(true)) => Some(lhs.clone()),
            _ if same => Some(lhs.clone()),
            _ => None,
        },
        _ => None,
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.op {
            ExprOp::Const(value) => write!(f, "{value}"),
            ExprOp::Var(name) => f.write_str(name),
            ExprOp::Binary(op @ (BinaryOp::Max | BinaryOp::CeilDiv), lhs, rhs) => {
                write!(f, "{}({lhs}, {rhs})", op.symbol())
            }
            ExprOp::Binary(op, lhs, rhs) => write!(f, "({lhs} {} {rhs})", op.symbol()),
        }
    }
}
