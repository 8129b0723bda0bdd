use halo_ir::{Fusion, Kernel};

use crate::error::HaloError;
use crate::index::{IndexCompute, LoopNestIndexing};
use crate::loop_map::ComputeAtMap;
use crate::test::helpers::*;

#[test]
fn test_root_indices_follow_loops() {
    let mut fusion = Fusion::new();
    let tv0 = fusion.add_input([8, 4]);
    let tv1 = fusion.set(tv0).unwrap();
    let kernel = Kernel::from_fusion(&fusion);
    let (loops, _) = loop_nest(&kernel.body, 0);

    let loop_map = ComputeAtMap::new(&fusion);
    let indices = LoopNestIndexing::new(&loop_map)
        .consumer_root_pred_indices(&fusion, tv1, &loops, &[false, false])
        .unwrap();
    assert!(!indices.buffer_init);
    let names: Vec<String> = indices.indices.iter().map(|i| i.to_string()).collect();
    assert_eq!(names, vec![index_var(&loops[0]), index_var(&loops[1])]);
}

#[test]
fn test_split_and_merge_are_inverted() {
    let mut fusion = Fusion::new();
    let tv0 = fusion.add_input([8, 4]);
    let tv1 = fusion.set(tv0).unwrap();
    fusion.merge(tv1, 0).unwrap();
    fusion.split(tv1, 0, 3).unwrap();
    let kernel = Kernel::from_fusion(&fusion);
    let (loops, _) = loop_nest(&kernel.body, 0);
    assert_eq!(loops.len(), 2);

    let loop_map = ComputeAtMap::new(&fusion);
    let indices = LoopNestIndexing::new(&loop_map)
        .consumer_root_pred_indices(&fusion, tv1, &loops, &[false, false])
        .unwrap()
        .indices;

    let (outer, inner) = (index_var(&loops[0]), index_var(&loops[1]));
    // Flat position 3 * 5 + 2 = 17 is element (4, 1) of the [8, 4] root domain.
    let bindings = [(outer.as_str(), 5), (inner.as_str(), 2)];
    let values: Vec<_> = indices.iter().map(|i| eval_int(i, &bindings)).collect();
    assert_eq!(values, vec![Some(4), Some(1)]);
}

#[test]
fn test_missing_reduction_loop_marks_buffer_init() {
    let mut fusion = Fusion::new();
    let tv0 = fusion.add_input([8, 16]);
    let tv1 = fusion.sum(tv0, &[1]).unwrap();
    let kernel = Kernel::from_fusion(&fusion);
    let (loops, _) = loop_nest(&kernel.body, 0);

    let loop_map = ComputeAtMap::new(&fusion);
    let indexing = LoopNestIndexing::new(&loop_map);
    let init = indexing.consumer_root_pred_indices(&fusion, tv1, &loops[..1], &[false, false]).unwrap();
    assert!(init.buffer_init);
    assert!(init.indices[1].is_zero());

    let full = indexing.consumer_root_pred_indices(&fusion, tv1, &loops, &[false, false]).unwrap();
    assert!(!full.buffer_init);
}

#[test]
fn test_mapped_loop_supplies_index() {
    let mut fusion = Fusion::new();
    let tv0 = fusion.add_input([8]);
    let tv1 = fusion.set(tv0).unwrap();
    let tv2 = fusion.set(tv1).unwrap();
    let kernel = Kernel::from_fusion(&fusion);
    let (consumer_loops, _) = loop_nest(&kernel.body, 1);

    let mut loop_map = ComputeAtMap::new(&fusion);
    loop_map.compute_at(&fusion, tv1, tv2, 1).unwrap();
    let indices = LoopNestIndexing::new(&loop_map)
        .consumer_root_pred_indices(&fusion, tv1, &consumer_loops, &[false])
        .unwrap();
    assert_eq!(indices.indices[0].to_string(), index_var(&consumer_loops[0]));
}

#[test]
fn test_contiguity_is_rejected() {
    let mut fusion = Fusion::new();
    let tv0 = fusion.add_input([8, 4]);
    let tv1 = fusion.set(tv0).unwrap();
    let loop_map = ComputeAtMap::new(&fusion);
    let indexing = LoopNestIndexing::new(&loop_map);

    assert_eq!(
        indexing.consumer_root_pred_indices(&fusion, tv1, &[], &[true, false]).unwrap_err(),
        HaloError::ContiguousIndexing { tensor: tv1 }
    );
    assert_eq!(
        indexing.consumer_root_pred_indices(&fusion, tv1, &[], &[false]).unwrap_err(),
        HaloError::IndexCountMismatch { tensor: tv1, expected: 2, actual: 1 }
    );
}
