use bart_ensemble::split_rules::SplitRange;
use bart_ensemble::tree::{DecisionTree, ROOT};
use bart_ensemble::{CutpointTable, TreeError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn table() -> CutpointTable {
    CutpointTable::new(vec![vec![1.0, 2.0, 3.0], vec![0.0, 1.0, 2.0, 3.0, 4.0]]).unwrap()
}

/// Intersects the constraints of every ancestor on `feature`, collected
/// root-first, independently of the tree's own walk.
fn manual_range(tree: &DecisionTree, index: usize, feature: usize, table: &CutpointTable) -> SplitRange {
    let mut path = Vec::new();
    let mut child = index;
    while let Some(parent) = tree.parent(child) {
        path.push((parent, tree.left_child(parent) == Some(child)));
        child = parent;
    }
    path.reverse();

    let mut low = 0isize;
    let mut high = table.n_cutpoints(feature) as isize - 1;
    for (ancestor, went_left) in path {
        if tree.feature(ancestor) != feature {
            continue;
        }
        let cut = tree.cutpoint(ancestor) as isize;
        if went_left {
            high = high.min(cut - 1);
        } else {
            low = low.max(cut + 1);
        }
    }
    SplitRange { low, high }
}

#[test]
fn test_split_range_scenario() {
    let table = CutpointTable::new(vec![vec![1.0, 2.0, 3.0]]).unwrap();
    let mut tree = DecisionTree::new(0.0);
    tree.birth(1, 0, 1, 10.0, 20.0).unwrap();
    let (left, right) = tree.birth(3, 0, 2, 21.0, 22.0).unwrap();

    let node3 = tree.index_of(3).unwrap();
    assert_eq!(tree.split_range(node3, 0, &table), SplitRange { low: 2, high: 2 });
    // Node 6 sits left of cutpoint 2 and right of cutpoint 1
    assert!(tree.split_range(left, 0, &table).is_empty());
    assert!(tree.split_range(right, 0, &table).is_empty());
    assert_eq!(tree.split_range(ROOT, 0, &table), SplitRange { low: 0, high: 2 });

    let node2 = tree.index_of(2).unwrap();
    assert_eq!(tree.split_range(node2, 0, &table), SplitRange { low: 0, high: 0 });
}

#[test]
fn test_split_range_skips_other_features() {
    let table = table();
    let mut tree = DecisionTree::new(0.0);
    tree.birth(1, 1, 3, 0.0, 0.0).unwrap();
    tree.birth(2, 0, 1, 0.0, 0.0).unwrap();
    tree.birth(5, 1, 0, 0.0, 0.0).unwrap();

    // Node 11: right of feature 1 at 0, right of feature 0 at 1, left of feature 1 at 3
    let node = tree.index_of(11).unwrap();
    assert_eq!(tree.split_range(node, 1, &table), SplitRange { low: 1, high: 2 });
    assert_eq!(tree.split_range(node, 0, &table), SplitRange { low: 2, high: 2 });
    assert_eq!(tree.ancestor_cutpoint(node, 1), Some(0));
    assert_eq!(tree.ancestor_cutpoint(node, 0), Some(1));
    assert_eq!(tree.ancestor_cutpoint(ROOT, 0), None);
}

#[test]
fn test_split_range_matches_manual_intersection() {
    let table = table();
    let mut rng = StdRng::seed_from_u64(11);

    for _ in 0..200 {
        let mut tree = DecisionTree::new(0.0);
        for _ in 0..15 {
            let leaves = tree.leaves();
            let leaf = leaves[rng.gen_range(0..leaves.len())];
            let feature = rng.gen_range(0..table.n_features());
            let range = tree.split_range(leaf, feature, &table);
            if range.is_empty() {
                continue;
            }
            let cutpoint = rng.gen_range(range.low..=range.high) as usize;
            let nid = tree.nid(leaf);
            tree.birth_within(&table, nid, feature, cutpoint, 0.0, 0.0).unwrap();
        }

        for index in tree.nodes() {
            for feature in 0..table.n_features() {
                let range = tree.split_range(index, feature, &table);
                assert_eq!(range, manual_range(&tree, index, feature, &table));
                // Repeated calls agree
                assert_eq!(range, tree.split_range(index, feature, &table));
            }
        }
    }
}

#[test]
fn test_usable_split() {
    let table = CutpointTable::new(vec![vec![1.0, 2.0], vec![]]).unwrap();
    let mut tree = DecisionTree::new(0.0);

    assert!(tree.has_usable_split(ROOT, &table));
    assert_eq!(tree.usable_features(ROOT, &table), vec![0]);

    let (left, right) = tree.birth(1, 0, 0, 0.0, 0.0).unwrap();
    assert!(!tree.has_usable_split(left, &table));
    assert!(tree.usable_features(left, &table).is_empty());
    assert!(tree.has_usable_split(right, &table));

    let (_, right_right) = tree.birth(3, 0, 1, 0.0, 0.0).unwrap();
    assert!(!tree.has_usable_split(right_right, &table));
}

#[test]
fn test_birth_within() {
    let table = CutpointTable::new(vec![vec![1.0, 2.0, 3.0]]).unwrap();
    let mut tree = DecisionTree::new(0.0);
    tree.birth_within(&table, 1, 0, 1, 10.0, 20.0).unwrap();

    let before = tree.clone();
    assert_eq!(
        tree.birth_within(&table, 3, 0, 1, 0.0, 0.0),
        Err(TreeError::InadmissibleSplit {
            feature: 0,
            cutpoint: 1,
            low: 2,
            high: 2
        })
    );
    assert_eq!(
        tree.birth_within(&table, 3, 1, 0, 0.0, 0.0),
        Err(TreeError::UnknownFeature {
            feature: 1,
            n_features: 1
        })
    );
    assert_eq!(
        tree.birth_within(&table, 3, 0, 3, 0.0, 0.0),
        Err(TreeError::UnknownCutpoint {
            feature: 0,
            cutpoint: 3,
            n_cutpoints: 3
        })
    );
    assert_eq!(
        tree.birth_within(&table, 9, 0, 2, 0.0, 0.0),
        Err(TreeError::NodeNotFound(9))
    );
    assert_eq!(tree, before);

    tree.birth_within(&table, 3, 0, 2, 21.0, 22.0).unwrap();
    assert_eq!(tree.size(), 5);
}

#[test]
fn test_split_range_helpers() {
    let range = SplitRange { low: 2, high: 4 };
    assert_eq!(range.len(), 3);
    assert!(range.contains(2) && range.contains(4));
    assert!(!range.contains(1) && !range.contains(5));
    assert_eq!(range.iter().collect::<Vec<_>>(), vec![2, 3, 4]);

    let empty = SplitRange { low: 0, high: -1 };
    assert!(empty.is_empty());
    assert_eq!(empty.len(), 0);
    assert!(!empty.contains(0));
    assert_eq!(empty.iter().count(), 0);

    assert_eq!(SplitRange::full(0), empty);
    assert_eq!(SplitRange::full(3), SplitRange { low: 0, high: 2 });
}
