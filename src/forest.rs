//! An ensemble of posterior draws. Each draw is a sum of `m` decision trees
//! and every tree of every draw splits on the same cutpoint table.
#![allow(non_snake_case)]

use ndarray::{Array2, ArrayView2};

use crate::cutpoints::CutpointTable;
use crate::errors::{EnsembleError, PredictError, TreeError};
use crate::io::variable_counts;
use crate::predictor::{EnsemblePredictor, PredictSettings};
use crate::tree::DecisionTree;

/// `Ensemble` holds `n_draws x n_trees` decision trees and their shared
/// cutpoint table.
#[derive(Debug, Clone, PartialEq)]
pub struct Ensemble {
    draws: Vec<Vec<DecisionTree>>,
    n_trees: usize,
    cutpoints: CutpointTable,
}

impl Ensemble {
    /// Creates an `Ensemble` from trees grouped by draw.
    ///
    /// Every draw must hold the same number of trees, and every split of
    /// every tree must address an existing cutpoint of `cutpoints`.
    pub fn new(draws: Vec<Vec<DecisionTree>>, cutpoints: CutpointTable) -> Result<Self, EnsembleError> {
        let n_trees = draws.first().map_or(0, Vec::len);
        Self::with_n_trees(n_trees, draws, cutpoints)
    }

    /// Creates an `Ensemble` whose draws each hold exactly `n_trees` trees.
    ///
    /// Unlike [`Ensemble::new`] the tree count is kept when `draws` is empty.
    pub fn with_n_trees(
        n_trees: usize,
        draws: Vec<Vec<DecisionTree>>,
        cutpoints: CutpointTable,
    ) -> Result<Self, EnsembleError> {
        for (draw, trees) in draws.iter().enumerate() {
            if trees.len() != n_trees {
                return Err(EnsembleError::RaggedDraw {
                    draw,
                    expected: n_trees,
                    actual: trees.len(),
                });
            }

            for (tree, t) in trees.iter().enumerate() {
                check_splits(t, &cutpoints)
                    .map_err(|source| EnsembleError::InvalidTree { draw, tree, source })?;
            }
        }

        Ok(Self {
            draws,
            n_trees,
            cutpoints,
        })
    }

    /// Number of posterior draws.
    pub fn n_draws(&self) -> usize {
        self.draws.len()
    }

    /// Number of trees summed per draw.
    pub fn n_trees(&self) -> usize {
        self.n_trees
    }

    /// Number of features the trees split on.
    pub fn n_features(&self) -> usize {
        self.cutpoints.n_features()
    }

    /// The shared cutpoint table.
    pub fn cutpoints(&self) -> &CutpointTable {
        &self.cutpoints
    }

    /// All draws in order.
    pub fn draws(&self) -> &[Vec<DecisionTree>] {
        &self.draws
    }

    /// The trees of draw `draw`.
    pub fn draw(&self, draw: usize) -> &[DecisionTree] {
        &self.draws[draw]
    }

    /// Mutable access to the trees of draw `draw`.
    ///
    /// Splits introduced through this handle must stay within the cutpoint
    /// table; this is not re-checked.
    pub fn draw_mut(&mut self, draw: usize) -> &mut [DecisionTree] {
        &mut self.draws[draw]
    }

    /// Tree `tree` of draw `draw`.
    pub fn tree(&self, draw: usize, tree: usize) -> &DecisionTree {
        &self.draws[draw][tree]
    }

    /// Adds the predictions of every tree of `draw` to `output`, one entry
    /// per row of `X`, in tree order. `buffer` is scratch space of the same
    /// length.
    pub(crate) fn accumulate_draw(
        &self,
        draw: usize,
        X: ArrayView2<f64>,
        output: &mut [f64],
        buffer: &mut [f64],
    ) {
        for tree in &self.draws[draw] {
            tree.evaluate_into(X, &self.cutpoints, buffer);
            for (out, value) in output.iter_mut().zip(buffer.iter()) {
                *out += value;
            }
        }
    }

    /// Predicts on the rows of `X` on the calling thread.
    ///
    /// Entry `(d, i)` of the result is the sum over the trees of draw `d` of
    /// the leaf value row `i` routes to.
    pub fn predict(&self, X: ArrayView2<f64>) -> Result<Array2<f64>, PredictError> {
        EnsemblePredictor::new(self, PredictSettings::new(Some(1))).predict(X)
    }

    /// Per-draw feature usage: entry `(d, v)` counts the internal nodes over
    /// all trees of draw `d` that split on feature `v`.
    pub fn variable_counts(&self) -> Array2<usize> {
        let n_features = self.n_features();
        let mut counts = Array2::zeros((self.n_draws(), n_features));

        for (mut row, trees) in counts.rows_mut().into_iter().zip(&self.draws) {
            for tree in trees {
                for (count, used) in row.iter_mut().zip(variable_counts(tree, n_features)) {
                    *count += used;
                }
            }
        }

        counts
    }
}

/// Checks that every internal node of `tree` addresses an existing cutpoint.
pub fn check_splits(tree: &DecisionTree, cutpoints: &CutpointTable) -> Result<(), TreeError> {
    tree.nodes()
        .into_iter()
        .filter(|&index| !tree.is_leaf(index))
        .try_for_each(|index| cutpoints.check(tree.feature(index), tree.cutpoint(index)))
}
