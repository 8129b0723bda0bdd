use crate::expr::Expr;
use crate::fusion::Fusion;
use crate::kernel::{AxisRef, Instr, Kernel, Scope, TensorExpr};

#[test]
fn test_from_fusion_builds_loop_nests() {
    let mut fusion = Fusion::new();
    let tv0 = fusion.add_input([8, 4]);
    let tv1 = fusion.set(tv0).unwrap();
    let tv2 = fusion.set(tv1).unwrap();

    let kernel = Kernel::from_fusion(&fusion);
    assert_eq!(kernel.body.len(), 2);

    let Some(Instr::For(outer)) = kernel.body.get(0) else { panic!("expected loop") };
    assert_eq!(outer.header.axis, fusion.tensor(tv1).domain.leaf[0]);
    let Some(Instr::For(inner)) = outer.body.get(0) else { panic!("expected nested loop") };
    assert_eq!(inner.header.stop.as_int(), Some(4));

    let exprs = kernel.body.tensor_exprs();
    assert_eq!(exprs.iter().map(|e| e.output).collect::<Vec<_>>(), vec![tv1, tv2]);
}

#[test]
fn test_rewrite_at_replaces_single_position() {
    let mut fusion = Fusion::new();
    let tv0 = fusion.add_input([8]);
    let tv1 = fusion.set(tv0).unwrap();

    let mut scope = Scope::from(vec![
        Instr::Tensor(TensorExpr::fill(tv1, Expr::int(1))),
        Instr::Tensor(TensorExpr::fill(tv1, Expr::int(2))),
    ]);
    scope.rewrite_at(1, |instr| match instr {
        Instr::Tensor(_) => Instr::Tensor(TensorExpr::fill(tv1, Expr::int(3))),
        other => other,
    });
    scope.rewrite_at(5, |_| unreachable!());

    let values: Vec<_> = scope
        .tensor_exprs()
        .iter()
        .map(|e| match &e.kind {
            crate::kernel::TensorExprKind::Fill(v) => v.as_int(),
            _ => None,
        })
        .collect();
    assert_eq!(values, vec![Some(1), Some(3)]);
}

#[test]
fn test_lowered_axis_resolves_to_same_id() {
    let mut fusion = Fusion::new();
    let tv0 = fusion.add_input([8]);
    let tv1 = fusion.shift(tv0, &[1], false).unwrap();
    let axis = fusion.tensor(tv1).domain.root[0];

    let lowered = fusion.lower_axis(axis);
    assert_eq!(lowered.axis_id(), axis);
    assert_eq!(lowered.start.as_int(), Some(1));
    assert_eq!(lowered.extent.as_int(), Some(8));
}

#[test]
fn test_kernel_display() {
    let mut fusion = Fusion::new();
    let tv0 = fusion.add_input([8]);
    fusion.set(tv0).unwrap();

    let printed = Kernel::from_fusion(&fusion).to_string();
    assert!(printed.starts_with("for i1 in 0..8 (Serial) {"));
    assert!(printed.contains("T1 = op0(..)"));
}

#[test]
fn test_from_fusion_skips_dead_operations() {
    let mut fusion = Fusion::new();
    let tv0 = fusion.add_input([8]);
    let tv1 = fusion.set(tv0).unwrap();
    fusion.shift(tv1, &[4], false).unwrap();
    let tv3 = fusion.set(tv1).unwrap();
    fusion.mark_output(tv3);

    let kernel = Kernel::from_fusion(&fusion);
    let outputs: Vec<_> = kernel.body.tensor_exprs().iter().map(|e| e.output).collect();
    assert_eq!(outputs, vec![tv1, tv3]);
}

#[test]
fn test_from_fusion_with_extents_sets_loop_stops() {
    let mut fusion = Fusion::new();
    let tv0 = fusion.add_input([8]);
    let tv1 = fusion.set(tv0).unwrap();
    let widened = fusion.tensor(tv1).domain.root[0];

    let kernel = Kernel::from_fusion_with_extents(&fusion, |axis| {
        let extent = fusion.axis(axis).extent.clone();
        if axis == widened { extent.add_int(2) } else { extent }
    });
    let Some(Instr::For(l)) = kernel.body.get(0) else { panic!("expected loop") };
    assert_eq!(l.header.stop.as_int(), Some(10));
}
