use halo_ir::{AxisId, Expr, Fusion, TensorId};
use test_case::test_case;

use crate::compare::{ExprEquality, less_equal};
use crate::error::HaloError;
use crate::{ComputeAtMap, HaloConfig, HaloMap};

/// Two independent `set -> shift` chains off one input; returns the two shifted producers.
fn twin_shifts(lhs: i64, rhs: i64) -> (Fusion, TensorId, TensorId) {
    let mut fusion = Fusion::new();
    let tv0 = fusion.add_input([16]);
    let a = fusion.set(tv0).unwrap();
    let b = fusion.set(tv0).unwrap();
    let sa = fusion.shift(a, &[lhs], false).unwrap();
    let sb = fusion.shift(b, &[rhs], false).unwrap();
    let out = fusion.add(sa, sb).unwrap();
    fusion.mark_output(out);
    (fusion, a, b)
}

fn root(fusion: &Fusion, tensor: TensorId) -> AxisId {
    fusion.tensor(tensor).domain.root[0]
}

fn build(fusion: &Fusion, loop_map: &ComputeAtMap) -> HaloMap {
    HaloMap::build(fusion, loop_map, &HaloConfig::default()).unwrap()
}

#[test_case(2, 2, true, true; "equal_widths")]
#[test_case(1, 2, false, true; "smaller_lhs")]
#[test_case(3, 2, false, false; "larger_lhs")]
fn test_compare_constant_widths(lhs: i64, rhs: i64, equal: bool, less_eq: bool) {
    let (fusion, a, b) = twin_shifts(lhs, rhs);
    let mut loop_map = ComputeAtMap::new(&fusion);
    loop_map.map_loop(root(&fusion, a), root(&fusion, b));
    let halo = build(&fusion, &loop_map);

    let (x, y) = (root(&fusion, a), root(&fusion, b));
    assert_eq!(halo.extent_equal(&fusion, &loop_map, x, y).unwrap(), equal);
    assert_eq!(halo.extent_less_equal(&fusion, &loop_map, x, y).unwrap(), less_eq);
}

#[test]
fn test_same_axis_is_equal() {
    let (fusion, a, _) = twin_shifts(2, 1);
    let (loop_map, halo) = crate::test::helpers::analyse(&fusion);
    let x = root(&fusion, a);
    assert!(halo.extent_equal(&fusion, &loop_map, x, x).unwrap());
    assert!(halo.extent_less_equal(&fusion, &loop_map, x, x).unwrap());
}

#[test]
fn test_unmapped_axes_are_rejected() {
    let (fusion, a, b) = twin_shifts(2, 2);
    let (loop_map, halo) = crate::test::helpers::analyse(&fusion);
    let (x, y) = (root(&fusion, a), root(&fusion, b));
    assert_eq!(
        halo.extent_equal(&fusion, &loop_map, x, y).unwrap_err(),
        HaloError::AxesNotMapped { lhs: x, rhs: y }
    );
}

/// Two `[8, 4]` producers shifted along the first axis, each with its leaf axes merged.
fn twin_merges(lhs: i64, rhs: i64) -> (Fusion, ComputeAtMap, TensorId, TensorId) {
    let mut fusion = Fusion::new();
    let tv0 = fusion.add_input([8, 4]);
    let a = fusion.set(tv0).unwrap();
    let b = fusion.set(tv0).unwrap();
    let sa = fusion.shift(a, &[lhs, 0], false).unwrap();
    let sb = fusion.shift(b, &[rhs, 0], false).unwrap();
    let out = fusion.add(sa, sb).unwrap();
    fusion.mark_output(out);
    fusion.merge(a, 0).unwrap();
    fusion.merge(b, 0).unwrap();

    let mut loop_map = ComputeAtMap::new(&fusion);
    let (da, db) = (&fusion.tensor(a).domain, &fusion.tensor(b).domain);
    for (x, y) in da.root.iter().zip(&db.root) {
        loop_map.map_loop(*x, *y);
    }
    loop_map.map_loop(da.leaf[0], db.leaf[0]);
    (fusion, loop_map, a, b)
}

#[test]
fn test_merge_outputs_compare_operands() {
    let (fusion, loop_map, a, b) = twin_merges(1, 1);
    let halo = build(&fusion, &loop_map);
    let (x, y) = (fusion.tensor(a).domain.leaf[0], fusion.tensor(b).domain.leaf[0]);
    assert!(halo.is_halo_merge(x) && halo.is_halo_merge(y));
    assert!(halo.extent_equal(&fusion, &loop_map, x, y).unwrap());
}

#[test]
fn test_merge_outputs_with_different_operands() {
    let (fusion, loop_map, a, b) = twin_merges(1, 2);
    let halo = build(&fusion, &loop_map);
    let (x, y) = (fusion.tensor(a).domain.leaf[0], fusion.tensor(b).domain.leaf[0]);
    assert!(!halo.extent_equal(&fusion, &loop_map, x, y).unwrap());
    assert!(halo.extent_less_equal(&fusion, &loop_map, x, y).unwrap());
    assert!(!halo.extent_less_equal(&fusion, &loop_map, y, x).unwrap());
}

#[test]
fn test_mismatched_halo_presence() {
    let (fusion, mut loop_map, a, b) = twin_merges(1, 1);
    let merged = fusion.tensor(a).domain.leaf[0];
    let plain = fusion.tensor(b).domain.root[1];
    loop_map.map_loop(merged, plain);
    let halo = HaloMap::build(&fusion, &loop_map, &HaloConfig::builder().validate_parallelization(false).build())
        .unwrap();

    let err = halo.extent_equal(&fusion, &loop_map, merged, plain).unwrap_err();
    assert!(matches!(err, HaloError::InvalidComparison { .. }));
}

#[test]
fn test_less_equal_exprs() {
    assert!(less_equal(&Expr::int(1), &Expr::int(2)));
    assert!(!less_equal(&Expr::int(3), &Expr::int(2)));

    let n = Expr::var("n");
    assert!(less_equal(&n, &n));
    // Unresolved symbolic comparisons are not proven.
    assert!(!less_equal(&Expr::var("a"), &Expr::var("b")));
    assert!(!less_equal(&n, &n.add_int(1)));
}

#[test]
fn test_structural_equality() {
    let mut eq = ExprEquality::default();
    let a = Expr::var("n").add_int(1).max_expr(&Expr::var("m"));
    let b = Expr::var("n").add_int(1).max_expr(&Expr::var("m"));
    assert!(eq.equal(&a, &b));
    assert!(eq.equal(&Expr::int(4), &Expr::int(4)));

    let c = Expr::var("n").add_int(2).max_expr(&Expr::var("m"));
    assert!(!eq.equal(&a, &c));
    let d = Expr::var("n").sub_int(1).max_expr(&Expr::var("m"));
    assert!(!eq.equal(&a, &d));
    assert!(!eq.equal(&Expr::int(1), &Expr::bool(true)));
}

#[test]
fn test_structural_equality_on_shared_subgraphs() {
    // Each level reuses its operand twice; only memoization keeps this linear.
    let chain = |name: &str| {
        let mut expr = Expr::var(name);
        for _ in 0..64 {
            expr = expr.add_expr(&expr);
        }
        expr
    };
    let mut eq = ExprEquality::default();
    assert!(eq.equal(&chain("x"), &chain("x")));
    assert!(!eq.equal(&chain("x"), &chain("y")));
}
