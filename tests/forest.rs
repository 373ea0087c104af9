#![allow(non_snake_case)]

use bart_ensemble::predictor::draw_ranges;
use bart_ensemble::tree::{DecisionTree, ROOT};
use bart_ensemble::{
    CutpointTable, Ensemble, EnsembleError, EnsemblePredictor, PredictError, PredictSettings,
    TreeError,
};

use ndarray::{array, Array2, ShapeBuilder};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_tree(rng: &mut StdRng, table: &CutpointTable, births: usize) -> DecisionTree {
    let mut tree = DecisionTree::new(rng.gen_range(-1.0..1.0));
    for _ in 0..births {
        let leaves = tree.leaves();
        let leaf = leaves[rng.gen_range(0..leaves.len())];
        let feature = rng.gen_range(0..table.n_features());
        let range = tree.split_range(leaf, feature, table);
        if range.is_empty() {
            continue;
        }
        let cutpoint = rng.gen_range(range.low..=range.high) as usize;
        tree.birth_at(
            leaf,
            feature,
            cutpoint,
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        )
        .unwrap();
    }
    tree
}

fn random_ensemble(rng: &mut StdRng, n_draws: usize, n_trees: usize) -> Ensemble {
    let table = CutpointTable::new(vec![
        vec![-1.0, -0.5, 0.0, 0.5, 1.0],
        vec![0.0, 1.0, 2.0],
        vec![10.0, 20.0],
    ])
    .unwrap();
    let draws = (0..n_draws)
        .map(|_| (0..n_trees).map(|_| random_tree(rng, &table, 8)).collect())
        .collect();
    Ensemble::new(draws, table).unwrap()
}

fn random_rows(rng: &mut StdRng, n_rows: usize) -> Array2<f64> {
    Array2::from_shape_fn((n_rows, 3), |(_, j)| match j {
        0 => rng.gen_range(-2.0..2.0),
        1 => rng.gen_range(-1.0..3.0),
        _ => rng.gen_range(0.0..30.0),
    })
}

#[test]
fn test_stump_ensemble_scenario() {
    let table = CutpointTable::new(vec![vec![0.0]]).unwrap();
    let draws = vec![
        vec![DecisionTree::new(1.0), DecisionTree::new(2.0)],
        vec![DecisionTree::new(3.0), DecisionTree::new(4.0)],
    ];
    let ensemble = Ensemble::new(draws, table).unwrap();

    assert_eq!(ensemble.n_draws(), 2);
    assert_eq!(ensemble.n_trees(), 2);
    assert_eq!(ensemble.n_features(), 1);

    let X = array![[0.5]];
    assert_eq!(ensemble.predict(X.view()).unwrap(), array![[3.0], [7.0]]);
}

#[test]
fn test_predictions_sum_trees_per_draw() {
    let mut rng = StdRng::seed_from_u64(1);
    let ensemble = random_ensemble(&mut rng, 4, 5);
    let X = random_rows(&mut rng, 17);

    let predictions = ensemble.predict(X.view()).unwrap();
    assert_eq!(predictions.dim(), (4, 17));

    for d in 0..ensemble.n_draws() {
        for (i, row) in X.rows().into_iter().enumerate() {
            let mut expected = 0.0;
            for tree in ensemble.draw(d) {
                expected += tree.predict(&row, ensemble.cutpoints());
            }
            assert_eq!(predictions[[d, i]], expected);
        }
    }
}

#[test]
fn test_parallel_matches_serial() {
    let mut rng = StdRng::seed_from_u64(2);
    let ensemble = random_ensemble(&mut rng, 13, 7);
    let X = random_rows(&mut rng, 31);

    let serial = ensemble.predict(X.view()).unwrap();
    for n_threads in [Some(2), Some(3), Some(4), Some(64), None] {
        let predictor = EnsemblePredictor::new(&ensemble, PredictSettings::new(n_threads));
        assert_eq!(predictor.predict(X.view()).unwrap(), serial);
    }
}

#[test]
fn test_predictions_are_linear_in_leaf_values() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut ensemble = random_ensemble(&mut rng, 3, 4);
    let X = random_rows(&mut rng, 20);
    let before = ensemble.predict(X.view()).unwrap();

    // Powers of two keep the scaling exact in floating point
    let k = 4.0;
    for tree in ensemble.draw_mut(1) {
        for leaf in tree.leaves() {
            let value = tree.value(leaf);
            tree.set_value(leaf, value * k);
        }
    }
    let after = ensemble.predict(X.view()).unwrap();

    assert_eq!(after.row(0), before.row(0));
    assert_eq!(after.row(1), before.row(1).mapv(|x| x * k));
    assert_eq!(after.row(2), before.row(2));
}

#[test]
fn test_predict_ignores_extra_columns_and_layout() {
    let mut rng = StdRng::seed_from_u64(4);
    let ensemble = random_ensemble(&mut rng, 2, 3);
    let X = random_rows(&mut rng, 9);
    let expected = ensemble.predict(X.view()).unwrap();

    let mut wide = Array2::<f64>::zeros((9, 5));
    wide.slice_mut(ndarray::s![.., ..3]).assign(&X);
    assert_eq!(ensemble.predict(wide.view()).unwrap(), expected);

    let mut column_major = Array2::<f64>::zeros((9, 3).f());
    column_major.assign(&X);
    assert!(!column_major.is_standard_layout());
    assert_eq!(ensemble.predict(column_major.view()).unwrap(), expected);
}

#[test]
fn test_predict_rejects_narrow_matrix() {
    let mut rng = StdRng::seed_from_u64(5);
    let ensemble = random_ensemble(&mut rng, 2, 2);
    let X = Array2::<f64>::zeros((4, 2));

    match ensemble.predict(X.view()) {
        Err(PredictError::FeatureCountMismatch { expected, actual }) => {
            assert_eq!((expected, actual), (3, 2));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_predict_empty_inputs() {
    let mut rng = StdRng::seed_from_u64(6);
    let ensemble = random_ensemble(&mut rng, 3, 2);
    let X = Array2::<f64>::zeros((0, 3));
    assert_eq!(ensemble.predict(X.view()).unwrap().dim(), (3, 0));

    let empty = Ensemble::new(Vec::new(), CutpointTable::new(vec![vec![0.0]]).unwrap()).unwrap();
    let predictor = EnsemblePredictor::new(&empty, PredictSettings::new(Some(4)));
    assert_eq!(predictor.predict(array![[1.0]].view()).unwrap().dim(), (0, 1));
}

#[test]
fn test_draw_ranges_partition_draws() {
    for n_draws in 0..40 {
        for n_workers in 1..9 {
            let ranges = draw_ranges(n_draws, n_workers);
            assert!(ranges.len() <= n_workers);

            let mut next = 0;
            for range in &ranges {
                assert_eq!(range.start, next);
                assert!(!range.is_empty());
                next = range.end;
            }
            assert_eq!(next, n_draws);
        }
    }
    assert_eq!(draw_ranges(10, 4), vec![0..3, 3..6, 6..9, 9..10]);
}

#[test]
fn test_n_workers() {
    let table = CutpointTable::new(vec![vec![0.0]]).unwrap();
    let ensemble = Ensemble::new(vec![vec![DecisionTree::new(0.0)]; 3], table).unwrap();

    let predictor = EnsemblePredictor::new(&ensemble, PredictSettings::new(Some(8)));
    assert_eq!(predictor.n_workers(3), 3);
    assert_eq!(predictor.n_workers(0), 1);
    let predictor = EnsemblePredictor::new(&ensemble, PredictSettings::default());
    assert!(predictor.n_workers(3) >= 1);
}

#[test]
fn test_ensemble_validation() {
    let table = CutpointTable::new(vec![vec![0.0, 1.0]]).unwrap();

    let ragged = vec![vec![DecisionTree::new(0.0); 2], vec![DecisionTree::new(0.0)]];
    assert_eq!(
        Ensemble::new(ragged, table.clone()),
        Err(EnsembleError::RaggedDraw {
            draw: 1,
            expected: 2,
            actual: 1
        })
    );

    assert_eq!(
        Ensemble::with_n_trees(2, vec![vec![DecisionTree::new(0.0)]], table.clone()),
        Err(EnsembleError::RaggedDraw {
            draw: 0,
            expected: 2,
            actual: 1
        })
    );
    let empty = Ensemble::with_n_trees(3, Vec::new(), table.clone()).unwrap();
    assert_eq!((empty.n_draws(), empty.n_trees()), (0, 3));

    let mut bad = DecisionTree::new(0.0);
    bad.birth(1, 0, 2, 0.0, 0.0).unwrap();
    assert_eq!(
        Ensemble::new(vec![vec![DecisionTree::new(0.0), bad]], table),
        Err(EnsembleError::InvalidTree {
            draw: 0,
            tree: 1,
            source: TreeError::UnknownCutpoint {
                feature: 0,
                cutpoint: 2,
                n_cutpoints: 2
            }
        })
    );
}

#[test]
fn test_variable_counts() {
    let table = CutpointTable::new(vec![vec![0.0, 1.0, 2.0], vec![0.0, 1.0]]).unwrap();
    let mut first = DecisionTree::new(0.0);
    first.birth(1, 0, 1, 0.0, 0.0).unwrap();
    first.birth(2, 1, 0, 0.0, 0.0).unwrap();
    first.birth(3, 0, 2, 0.0, 0.0).unwrap();
    let mut second = DecisionTree::new(0.0);
    second.birth(1, 1, 1, 0.0, 0.0).unwrap();

    let draws = vec![vec![first.clone(), second.clone()], vec![second, DecisionTree::new(0.0)]];
    let ensemble = Ensemble::new(draws, table).unwrap();

    assert_eq!(ensemble.variable_counts(), array![[2usize, 2], [0, 1]]);
    assert_eq!(ensemble.tree(0, 0), &first);
    assert_eq!(ensemble.draws().len(), 2);
    assert!(ensemble.tree(1, 1).is_leaf(ROOT));
}
