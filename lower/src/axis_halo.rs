//! Per-axis halo widths.

use std::fmt;
use std::sync::Arc;

use halo_ir::Expr;

/// Side of an axis a halo extends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum HaloSide {
    /// Before index zero.
    Low,
    /// Past the extent.
    High,
}

impl HaloSide {
    const fn index(self) -> usize {
        match self {
            HaloSide::Low => 0,
            HaloSide::High => 1,
        }
    }
}

/// Low and high halo widths of one root axis.
///
/// Widths only grow: [`merge`](Self::merge) takes the pointwise maximum.
#[derive(Debug, Clone)]
pub struct AxisHaloWidth {
    widths: [Arc<Expr>; 2],
}

impl Default for AxisHaloWidth {
    fn default() -> Self {
        Self { widths: [Expr::zero(), Expr::zero()] }
    }
}

impl AxisHaloWidth {
    pub fn new(low: Arc<Expr>, high: Arc<Expr>) -> Self {
        Self { widths: [low, high] }
    }

    pub fn width(&self, side: HaloSide) -> &Arc<Expr> {
        &self.widths[side.index()]
    }

    /// Combined width of both sides.
    pub fn total(&self) -> Arc<Expr> {
        self.widths[0].add_expr(&self.widths[1])
    }

    /// Grow one side to cover `other`.
    pub fn merge_side(&mut self, side: HaloSide, other: &Arc<Expr>) {
        let cur = &self.widths[side.index()];
        let merged = match (cur.as_int(), other.as_int()) {
            (Some(a), Some(b)) => Expr::int(a.max(b)),
            (Some(0), None) => other.clone(),
            (None, Some(0)) => return,
            _ => cur.max_expr(other),
        };
        self.widths[side.index()] = merged;
    }

    /// Grow both sides to cover `other`.
    pub fn merge(&mut self, other: &AxisHaloWidth) {
        self.merge_side(HaloSide::Low, other.width(HaloSide::Low));
        self.merge_side(HaloSide::High, other.width(HaloSide::High));
    }

    /// Any side is not known to be zero.
    pub fn has_halo(&self) -> bool {
        self.widths.iter().any(|w| !w.is_zero())
    }
}

impl fmt::Display for AxisHaloWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}, {}>", self.widths[0], self.widths[1])
    }
}
