//! Lowered kernel IR.
//!
//! A [`Kernel`] is a tree of [`Scope`]s holding loops, two-branch conditionals
//! and tensor expressions. Analyses that rewrite the stream never edit a scope in
//! place while walking it: [`Scope::rewrite_at`] rebuilds the instruction list and
//! swaps it in with a single assignment.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::expr::Expr;
use crate::fusion::{AxisId, Fusion, OpId, ParallelType, TensorId};

static INSTR_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
#[display("e{_0}")]
pub struct InstrId(pub u64);

impl InstrId {
    fn fresh() -> Self {
        Self(INSTR_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Lowered view of an axis.
///
/// Resolves to the same [`AxisId`] as the logical axis it was lowered from, so
/// tables keyed by axis identity serve both representations.
#[derive(Debug, Clone)]
pub struct KernelAxis {
    pub axis: AxisId,
    pub start: Arc<Expr>,
    pub stop: Arc<Expr>,
    pub extent: Arc<Expr>,
}

/// Anything that names an axis: a logical [`AxisId`] or a lowered [`KernelAxis`].
pub trait AxisRef {
    fn axis_id(&self) -> AxisId;
}

impl AxisRef for AxisId {
    fn axis_id(&self) -> AxisId {
        *self
    }
}

impl AxisRef for KernelAxis {
    fn axis_id(&self) -> AxisId {
        self.axis
    }
}

impl AxisRef for &KernelAxis {
    fn axis_id(&self) -> AxisId {
        self.axis
    }
}

impl Fusion {
    pub fn lower_axis(&self, axis: AxisId) -> KernelAxis {
        let record = self.axis(axis);
        KernelAxis {
            axis,
            start: record.start.clone(),
            stop: record.stop.clone(),
            extent: record.extent.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum PredicateKind {
    /// Guards the copy of a producer value.
    Shift,
    /// Guards zero-filling of a slot the producer cannot provide.
    Padding,
}

#[derive(Debug, Clone)]
pub struct Predicate {
    pub kind: PredicateKind,
    pub value: Arc<Expr>,
}

impl Predicate {
    pub fn new(kind: PredicateKind, value: Arc<Expr>) -> Self {
        Self { kind, value }
    }
}

#[derive(Debug, Clone)]
pub enum TensorExprKind {
    /// Computes the fusion operation.
    Compute(OpId),
    /// Writes a literal to every element of the output.
    Fill(Arc<Expr>),
}

#[derive(Debug, Clone)]
pub struct TensorExpr {
    pub id: InstrId,
    pub kind: TensorExprKind,
    pub output: TensorId,
    /// Execution condition attached directly to the expression.
    pub predicate: Option<Predicate>,
    /// Contains a block-wide barrier; must not be split across branches.
    pub block_sync: bool,
}

impl TensorExpr {
    pub fn compute(op: OpId, output: TensorId) -> Self {
        Self { id: InstrId::fresh(), kind: TensorExprKind::Compute(op), output, predicate: None, block_sync: false }
    }

    pub fn fill(output: TensorId, value: Arc<Expr>) -> Self {
        Self { id: InstrId::fresh(), kind: TensorExprKind::Fill(value), output, predicate: None, block_sync: false }
    }

    pub fn op(&self) -> Option<OpId> {
        match self.kind {
            TensorExprKind::Compute(op) => Some(op),
            TensorExprKind::Fill(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoopHeader {
    pub axis: AxisId,
    pub index: Arc<Expr>,
    pub start: Arc<Expr>,
    pub stop: Arc<Expr>,
    pub parallel: ParallelType,
}

#[derive(Debug, Clone)]
pub struct ForLoop {
    pub header: LoopHeader,
    pub body: Scope,
}

#[derive(Debug, Clone)]
pub struct IfThenElse {
    pub predicate: Predicate,
    pub then_body: Scope,
    pub else_body: Scope,
}

impl IfThenElse {
    pub fn new(predicate: Predicate) -> Self {
        Self { predicate, then_body: Scope::default(), else_body: Scope::default() }
    }
}

#[derive(Debug, Clone)]
pub enum Instr {
    For(ForLoop),
    If(IfThenElse),
    Tensor(TensorExpr),
}

#[derive(Debug, Clone, Default)]
pub struct Scope {
    instrs: Vec<Instr>,
}

impl From<Vec<Instr>> for Scope {
    fn from(instrs: Vec<Instr>) -> Self {
        Self { instrs }
    }
}

impl Scope {
    pub fn push(&mut self, instr: Instr) {
        self.instrs.push(instr);
    }

    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    pub fn instrs(&self) -> &[Instr] {
        &self.instrs
    }

    pub fn get(&self, pos: usize) -> Option<&Instr> {
        self.instrs.get(pos)
    }

    pub fn get_mut(&mut self, pos: usize) -> Option<&mut Instr> {
        self.instrs.get_mut(pos)
    }

    /// Replace the instruction at `pos` by `f(instr)`.
    ///
    /// The new list is built aside and assigned once; out-of-range positions
    /// leave the scope untouched.
    pub fn rewrite_at(&mut self, pos: usize, f: impl FnOnce(Instr) -> Instr) {
        if pos >= self.instrs.len() {
            return;
        }
        let mut f = Some(f);
        let rewritten = std::mem::take(&mut self.instrs)
            .into_iter()
            .enumerate()
            .map(|(i, instr)| match f.take_if(|_| i == pos) {
                Some(f) => f(instr),
                None => instr,
            })
            .collect();
        self.instrs = rewritten;
    }

    /// All tensor expressions in this scope and its nested scopes, in program order.
    pub fn tensor_exprs(&self) -> Vec<&TensorExpr> {
        let mut out = Vec::new();
        self.collect_tensor_exprs(&mut out);
        out
    }

    fn collect_tensor_exprs<'a>(&'a self, out: &mut Vec<&'a TensorExpr>) {
        for instr in &self.instrs {
            match instr {
                Instr::For(l) => l.body.collect_tensor_exprs(out),
                Instr::If(ite) => {
                    ite.then_body.collect_tensor_exprs(out);
                    ite.else_body.collect_tensor_exprs(out);
                }
                Instr::Tensor(expr) => out.push(expr),
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Kernel {
    pub body: Scope,
}

impl Kernel {
    /// Lower every operation that contributes to a fusion output into its own
    /// loop nest over the output's leaf axes.
    ///
    /// Loops run over the raw axis extents, so halo slots are never visited.
    /// Use [`Kernel::from_fusion_with_extents`] to iterate halo-extended ranges.
    pub fn from_fusion(fusion: &Fusion) -> Self {
        Self::from_fusion_with_extents(fusion, |axis| fusion.axis(axis).extent.clone())
    }

    /// Like [`Kernel::from_fusion`], with the loop stop of every leaf axis taken from `extent`.
    ///
    /// No inlining or loop sharing is attempted; loops over broadcast axes are kept.
    pub fn from_fusion_with_extents(fusion: &Fusion, extent: impl Fn(AxisId) -> Arc<Expr>) -> Self {
        let used = fusion.used_tensors();
        let mut body = Scope::default();
        for op in fusion.ops().iter().filter(|op| used.contains(&op.output)) {
            let mut expr = TensorExpr::compute(op.id, op.output);
            expr.block_sync = fusion.has_block_sync(op.id);

            let mut instr = Instr::Tensor(expr);
            for &axis in fusion.tensor(op.output).domain.leaf.iter().rev() {
                let header = LoopHeader {
                    axis,
                    index: Expr::var(format!("i{}", axis.0)),
                    start: Expr::zero(),
                    stop: extent(axis),
                    parallel: fusion.axis(axis).parallel,
                };
                instr = Instr::For(ForLoop { header, body: Scope::from(vec![instr]) });
            }
            body.push(instr);
        }
        Self { body }
    }
}

// =========================================================================
// Printing
// =========================================================================

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.body.fmt_indented(f, 0)
    }
}

impl Scope {
    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        for instr in &self.instrs {
            match instr {
                Instr::For(l) => {
                    let h = &l.header;
                    writeln!(f, "{pad}for {} in {}..{} ({}) {{", h.index, h.start, h.stop, h.parallel)?;
                    l.body.fmt_indented(f, depth + 1)?;
                    writeln!(f, "{pad}}}")?;
                }
                Instr::If(ite) => {
                    writeln!(f, "{pad}if {} {} {{", ite.predicate.kind, ite.predicate.value)?;
                    ite.then_body.fmt_indented(f, depth + 1)?;
                    if !ite.else_body.is_empty() {
                        writeln!(f, "{pad}}} else {{")?;
                        ite.else_body.fmt_indented(f, depth + 1)?;
                    }
                    writeln!(f, "{pad}}}")?;
                }
                Instr::Tensor(expr) => {
                    let guard = expr.predicate.as_ref().map(|p| format!(" [{} {}]", p.kind, p.value)).unwrap_or_default();
                    match &expr.kind {
                        TensorExprKind::Compute(op) => writeln!(f, "{pad}{} = {op}(..){guard}", expr.output)?,
                        TensorExprKind::Fill(value) => writeln!(f, "{pad}{} = {value}{guard}", expr.output)?,
                    }
                }
            }
        }
        Ok(())
    }
}
