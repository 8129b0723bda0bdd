use halo_ir::{Fusion, ParallelType};

use crate::loop_map::{ComputeAtMap, LoopMap};

#[test]
fn test_unmapped_axes_are_their_own_concrete() {
    let mut fusion = Fusion::new();
    let tv0 = fusion.add_input([8]);
    let tv1 = fusion.set(tv0).unwrap();
    let (a, b) = (fusion.tensor(tv0).domain.root[0], fusion.tensor(tv1).domain.root[0]);

    let map = ComputeAtMap::new(&fusion);
    assert!(map.are_mapped(a, a));
    assert!(!map.are_mapped(a, b));
    assert_eq!(map.concrete(b), b);
    assert_eq!(map.parallel_type(b), ParallelType::Serial);
}

#[test]
fn test_parallel_mapping_implies_loop_mapping() {
    let mut fusion = Fusion::new();
    let tv0 = fusion.add_input([8]);
    let tv1 = fusion.set(tv0).unwrap();
    let tv2 = fusion.set(tv1).unwrap();
    fusion.parallelize(tv2, 0, ParallelType::ThreadX).unwrap();
    let axes: Vec<_> = [tv0, tv1, tv2].iter().map(|t| fusion.tensor(*t).domain.root[0]).collect();

    let mut map = ComputeAtMap::new(&fusion);
    map.map_parallel(axes[2], axes[1]);
    assert!(map.are_mapped(axes[1], axes[2]));
    assert_eq!(map.concrete(axes[2]), axes[1]);
    assert_eq!(map.parallel_type(axes[1]), ParallelType::ThreadX);

    map.map_loop(axes[0], axes[1]);
    assert!(map.are_mapped(axes[0], axes[2]));
    assert_eq!(map.concrete(axes[0]), axes[0]);
    assert_eq!(map.parallel_type(axes[0]), ParallelType::Serial);
}

#[test]
fn test_compute_at_maps_roots_and_leaf_prefix() {
    let mut fusion = Fusion::new();
    let tv0 = fusion.add_input([8, 4]);
    let tv1 = fusion.set(tv0).unwrap();
    let tv2 = fusion.set(tv1).unwrap();
    fusion.split(tv1, 0, 2).unwrap();
    fusion.split(tv2, 0, 2).unwrap();

    let mut map = ComputeAtMap::new(&fusion);
    map.compute_at(&fusion, tv1, tv2, 1).unwrap();

    let (p, c) = (&fusion.tensor(tv1).domain, &fusion.tensor(tv2).domain);
    assert!(map.are_mapped(p.root[0], c.root[0]));
    assert!(map.are_mapped(p.root[1], c.root[1]));
    assert!(map.are_mapped(p.leaf[0], c.leaf[0]));
    assert!(!map.are_mapped(p.leaf[1], c.leaf[1]));
    assert_eq!(map.concrete(c.leaf[0]), c.leaf[0]);
}

#[test]
fn test_concrete_is_smallest_axis_of_parallel_set() {
    let mut fusion = Fusion::new();
    let tv0 = fusion.add_input([8]);
    let tv1 = fusion.set(tv0).unwrap();
    let tv2 = fusion.set(tv1).unwrap();
    let tv3 = fusion.set(tv2).unwrap();
    let axes: Vec<_> = [tv0, tv1, tv2, tv3].iter().map(|t| fusion.tensor(*t).domain.root[0]).collect();

    let mut map = ComputeAtMap::new(&fusion);
    map.map_parallel(axes[3], axes[2]);
    map.map_parallel(axes[2], axes[1]);
    map.map_parallel(axes[1], axes[2]);
    for &axis in &axes[1..] {
        assert_eq!(map.concrete(axis), axes[1]);
    }
    assert!(!map.are_mapped(axes[0], axes[3]));
}
