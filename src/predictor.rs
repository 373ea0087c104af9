//! Batched prediction of an [`Ensemble`] over a feature matrix.
//!
//! The output is a row-major `(n_draws, n_rows)` matrix, zero-initialised.
//! Summation order is fixed: for each draw the trees are visited in order and
//! each tree's predictions for all rows are added to that draw's output row
//! before the next tree is visited. This order does not depend on the number
//! of workers, so serial and parallel runs agree bit for bit.
//!
//! Draws are independent. With more than one worker the draws are split into
//! contiguous, non-overlapping ranges, one per worker, so that a single draw's
//! tree loop always runs on one thread and no two workers write the same row.
#![allow(non_snake_case)]

use std::ops::Range;

use log::debug;
use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::errors::PredictError;
use crate::forest::Ensemble;

/// PredictSettings are setting parameters used to initialize a new
/// `EnsemblePredictor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PredictSettings {
    /// Number of worker threads. `None` uses rayon's default and `Some(1)`
    /// runs on the calling thread.
    pub n_threads: Option<usize>,
}

impl PredictSettings {
    /// Creates new `PredictSettings`.
    pub fn new(n_threads: Option<usize>) -> Self {
        Self { n_threads }
    }
}

/// EnsemblePredictor evaluates every tree of every draw of an `Ensemble`
/// against a batch of feature rows.
pub struct EnsemblePredictor<'a> {
    ensemble: &'a Ensemble,
    settings: PredictSettings,
}

impl<'a> EnsemblePredictor<'a> {
    /// Creates an `EnsemblePredictor` over a borrowed ensemble.
    pub fn new(ensemble: &'a Ensemble, settings: PredictSettings) -> Self {
        Self { ensemble, settings }
    }

    /// Number of workers used for `n_draws` draws. Never more workers than
    /// draws and never fewer than one.
    pub fn n_workers(&self, n_draws: usize) -> usize {
        self.settings
            .n_threads
            .unwrap_or_else(rayon::current_num_threads)
            .min(n_draws)
            .max(1)
    }

    /// Predicts on the rows of `X`, which has shape `(n_rows, n_features)`.
    ///
    /// Columns past the ensemble's feature count are ignored.
    pub fn predict(&self, X: ArrayView2<f64>) -> Result<Array2<f64>, PredictError> {
        let n_features = self.ensemble.n_features();
        if X.ncols() < n_features {
            return Err(PredictError::FeatureCountMismatch {
                expected: n_features,
                actual: X.ncols(),
            });
        }

        // Each sample's features contiguous in memory for routing
        let X = X.as_standard_layout();
        let X = X.view();

        let n_draws = self.ensemble.n_draws();
        let n_rows = X.nrows();
        let mut output = vec![0.0; n_draws * n_rows];

        if n_draws > 0 && n_rows > 0 {
            let n_workers = self.n_workers(n_draws);
            let ranges = draw_ranges(n_draws, n_workers);
            debug!(
                "Predicting {} draws x {} rows with {} trees per draw on {} worker(s)",
                n_draws,
                n_rows,
                self.ensemble.n_trees(),
                ranges.len()
            );

            if ranges.len() == 1 {
                self.predict_draws(0..n_draws, X, &mut output);
            } else {
                let draws_per_worker = ranges[0].len();
                let pool = ThreadPoolBuilder::new().num_threads(ranges.len()).build()?;
                pool.install(|| {
                    output
                        .par_chunks_mut(draws_per_worker * n_rows)
                        .zip(ranges.into_par_iter())
                        .for_each(|(chunk, draws)| self.predict_draws(draws, X, chunk));
                });
            }
        }

        Ok(Array2::from_shape_vec((n_draws, n_rows), output)?)
    }

    /// Accumulates the draws in `draws` into `output`, which holds one row of
    /// `X.nrows()` entries per draw, starting at `draws.start`.
    fn predict_draws(&self, draws: Range<usize>, X: ArrayView2<f64>, output: &mut [f64]) {
        let n_rows = X.nrows();
        let mut buffer = vec![0.0; n_rows];

        for (draw, row) in draws.zip(output.chunks_mut(n_rows)) {
            self.ensemble.accumulate_draw(draw, X, row, &mut buffer);
        }
    }
}

/// Splits `0..n_draws` into at most `n_workers` contiguous ranges of equal
/// length, the last one possibly shorter. Together the ranges cover every
/// draw exactly once.
pub fn draw_ranges(n_draws: usize, n_workers: usize) -> Vec<Range<usize>> {
    if n_draws == 0 {
        return Vec::new();
    }

    let per_worker = n_draws.div_ceil(n_workers.max(1));
    (0..n_draws)
        .step_by(per_worker)
        .map(|start| start..(start + per_worker).min(n_draws))
        .collect()
}
